// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Expression compilation.
//!
//! Every expression is compiled against a [`Want`]: an address for
//! assignment targets, a value, or nothing at all for expression
//! statements. Only identifiers and member expressions can produce an
//! address.
//!
//! | Expression | Key Operations | Stack Effect |
//! |------------|----------------|--------------|
//! | Identifier | `Addr`/`GlobalAddr` (+ `Fetch`) | Push address or value |
//! | Member | `PropertyAddr` (+ `Fetch`) | Pop 2, push 1 |
//! | Binary | `Add`/`Mul`/`StrictEq`/... | Pop 2, push 1 |
//! | Assignment | `Store` | Pop 2, push value |
//! | Call | `Call` | Pop args + 3, push result |
//! | Hook call | `Hook` | Pop args, push result; `$name` not bound to a variable |
//! | Function | `Function`, `Capture`... | Push closure |
//! | Object | `NewObject`, `Define*` | Push object |
//!
//! ## Calls
//!
//! Arguments are evaluated first and the callee last, so argument side
//! effects happen before dispatch:
//!
//! ```text
//! f(a, b)          o.m(a)
//!   [a]              [a]
//!   [b]              LoadNumber 1
//!   LoadNumber 2     [o]
//!   LoadUndefined    Dup
//!   [f]              LoadString "m"
//!   Call             PropertyAddr
//!                    Fetch
//!                    Call
//! ```

use super::{Compiler, Want};
use crate::ast::NodeId;
use crate::compiler::bytecode::{AddrKind, Instruction, OpCode, Operand};
use crate::compiler::scope::{Source, is_hook_name};
use crate::vm::value::number_to_string;
use crate::{Error, Result};

impl Compiler<'_> {
    pub(super) fn expression(&mut self, node: NodeId, want: Want) -> Result<()> {
        match self.kind(node) {
            "Identifier" => return self.identifier(node, want),
            "MemberExpression" => return self.member(node, want),
            _ if want == Want::Address => {
                return Err(Error::syntax(format!(
                    "{} is not a valid assignment target",
                    self.kind(node)
                )));
            }
            _ => {}
        }

        let tree = self.tree;
        match self.kind(node) {
            "Literal" => self.literal(node)?,
            "ThisExpression" => {
                self.emit_op(OpCode::LoadThis);
            }
            "BinaryExpression" => {
                let opcode = binary_opcode(tree.str(node, "operator").unwrap_or_default())
                    .ok_or_else(|| self.unsupported_operator(node))?;
                self.expression(tree.expect_child(node, "left")?, Want::Value)?;
                self.expression(tree.expect_child(node, "right")?, Want::Value)?;
                self.emit_op(opcode);
            }
            "LogicalExpression" => self.logical(node)?,
            "UnaryExpression" => self.unary(node)?,
            "UpdateExpression" => self.update(node)?,
            "AssignmentExpression" => self.assignment(node)?,
            "ConditionalExpression" => {
                self.expression(tree.expect_child(node, "test")?, Want::Value)?;
                let else_jump = self.emit_jump(OpCode::JumpIfFalse);
                self.expression(tree.expect_child(node, "consequent")?, Want::Value)?;
                let end_jump = self.emit_jump(OpCode::Jump);
                self.patch_jump(else_jump)?;
                self.expression(tree.expect_child(node, "alternate")?, Want::Value)?;
                self.patch_jump(end_jump)?;
            }
            "CallExpression" => self.call(node)?,
            "FunctionExpression" => self.function_literal(node)?,
            "ObjectExpression" => self.object(node)?,
            _ => return Err(self.unsupported(node)),
        }
        self.finish(want);
        Ok(())
    }

    pub(super) fn identifier(&mut self, node: NodeId, want: Want) -> Result<()> {
        let tree = self.tree;
        match self.scopes.catch_binding(node) {
            Some(slot) => self.local_address(slot),
            None => self.binding_address(tree.identifier_name(node)?)?,
        }
        if want != Want::Address {
            self.emit_op(OpCode::Fetch);
            self.finish(want);
        }
        Ok(())
    }

    fn member(&mut self, node: NodeId, want: Want) -> Result<()> {
        let object = self.tree.expect_child(node, "object")?;
        self.expression(object, Want::Value)?;
        self.property_key(node)?;
        self.emit_op(OpCode::PropertyAddr);
        if want != Want::Address {
            self.emit_op(OpCode::Fetch);
            self.finish(want);
        }
        Ok(())
    }

    /// Pushes the key of a member expression: the dotted name as a string,
    /// or the computed expression's value.
    fn property_key(&mut self, node: NodeId) -> Result<()> {
        let tree = self.tree;
        let property = tree.expect_child(node, "property")?;
        if tree.flag(node, "computed") {
            self.expression(property, Want::Value)
        } else {
            let name = tree.identifier_name(property)?;
            self.emit(Instruction::with_operand(
                OpCode::LoadString,
                Operand::Str(name.to_string()),
            ));
            Ok(())
        }
    }

    fn literal(&mut self, node: NodeId) -> Result<()> {
        let value = self
            .tree
            .scalar(node, "value")
            .ok_or_else(|| Error::syntax("Literal without a value"))?;
        let instruction = match value {
            serde_json::Value::Null => Instruction::simple(OpCode::LoadNull),
            serde_json::Value::Bool(true) => Instruction::simple(OpCode::LoadTrue),
            serde_json::Value::Bool(false) => Instruction::simple(OpCode::LoadFalse),
            serde_json::Value::Number(n) => Instruction::with_operand(
                OpCode::LoadNumber,
                Operand::Number(n.as_f64().unwrap_or(f64::NAN)),
            ),
            serde_json::Value::String(s) => {
                Instruction::with_operand(OpCode::LoadString, Operand::Str(s.clone()))
            }
            other => {
                return Err(Error::syntax(format!("unsupported literal {}", other)));
            }
        };
        self.emit(instruction);
        Ok(())
    }

    fn logical(&mut self, node: NodeId) -> Result<()> {
        let tree = self.tree;
        let jump = match tree.str(node, "operator") {
            Some("&&") => OpCode::JumpIfFalse,
            Some("||") => OpCode::JumpIfTrue,
            _ => return Err(self.unsupported_operator(node)),
        };
        self.expression(tree.expect_child(node, "left")?, Want::Value)?;
        self.emit_op(OpCode::Dup);
        let short_circuit = self.emit_jump(jump);
        self.emit_op(OpCode::Pop);
        self.expression(tree.expect_child(node, "right")?, Want::Value)?;
        self.patch_jump(short_circuit)
    }

    fn unary(&mut self, node: NodeId) -> Result<()> {
        let tree = self.tree;
        let argument = tree.expect_child(node, "argument")?;
        match tree.str(node, "operator") {
            Some("-") => self.unary_op(argument, OpCode::Neg),
            Some("+") => self.unary_op(argument, OpCode::Plus),
            Some("!") => self.unary_op(argument, OpCode::Not),
            Some("typeof") if self.kind(argument) == "Identifier" => {
                self.expression(argument, Want::Address)?;
                self.emit_op(OpCode::TypeOfRef);
                Ok(())
            }
            Some("typeof") => self.unary_op(argument, OpCode::TypeOf),
            Some("delete") => match self.kind(argument) {
                "MemberExpression" => {
                    self.expression(argument, Want::Address)?;
                    self.emit_op(OpCode::Delete);
                    Ok(())
                }
                // Variables cannot be deleted
                "Identifier" => {
                    self.emit_op(OpCode::LoadFalse);
                    Ok(())
                }
                _ => {
                    self.expression(argument, Want::Nothing)?;
                    self.emit_op(OpCode::LoadTrue);
                    Ok(())
                }
            },
            Some("void") => {
                self.expression(argument, Want::Nothing)?;
                self.emit_op(OpCode::LoadUndefined);
                Ok(())
            }
            _ => Err(self.unsupported_operator(node)),
        }
    }

    fn unary_op(&mut self, argument: NodeId, opcode: OpCode) -> Result<()> {
        self.expression(argument, Want::Value)?;
        self.emit_op(opcode);
        Ok(())
    }

    /// `++x` stores and yields x + 1; `x++` stores x + 1 and yields the
    /// stored value minus one.
    fn update(&mut self, node: NodeId) -> Result<()> {
        let tree = self.tree;
        let (step, undo) = match tree.str(node, "operator") {
            Some("++") => (OpCode::Add, OpCode::Sub),
            Some("--") => (OpCode::Sub, OpCode::Add),
            _ => return Err(self.unsupported_operator(node)),
        };
        self.expression(tree.expect_child(node, "argument")?, Want::Address)?;
        self.emit_op(OpCode::Dup);
        self.emit_op(OpCode::Fetch);
        self.emit_op(OpCode::Plus);
        self.load_number(1.0);
        self.emit_op(step);
        self.emit_op(OpCode::Store);
        if !tree.flag(node, "prefix") {
            self.load_number(1.0);
            self.emit_op(undo);
        }
        Ok(())
    }

    fn assignment(&mut self, node: NodeId) -> Result<()> {
        let tree = self.tree;
        let target = tree.expect_child(node, "left")?;
        let value = tree.expect_child(node, "right")?;
        let operator = tree.str(node, "operator").unwrap_or("=");

        self.expression(target, Want::Address)?;
        if operator == "=" {
            self.expression(value, Want::Value)?;
        } else {
            let opcode = operator
                .strip_suffix('=')
                .and_then(binary_opcode)
                .filter(|op| {
                    matches!(op, OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod)
                })
                .ok_or_else(|| self.unsupported_operator(node))?;
            self.emit_op(OpCode::Dup);
            self.emit_op(OpCode::Fetch);
            self.expression(value, Want::Value)?;
            self.emit_op(opcode);
        }
        self.emit_op(OpCode::Store);
        Ok(())
    }

    fn call(&mut self, node: NodeId) -> Result<()> {
        let tree = self.tree;
        let callee = tree.expect_child(node, "callee")?;
        let arguments = tree.list(node, "arguments");
        for &argument in &arguments {
            self.expression(argument, Want::Value)?;
        }
        let argc = arguments.len();

        if self.kind(callee) == "Identifier" {
            let name = tree.identifier_name(callee)?;
            if is_hook_name(name) && !self.is_variable(callee, name) {
                self.emit(Instruction::with_operands(
                    OpCode::Hook,
                    Operand::Str(name.to_string()),
                    Operand::Count(argc as u32),
                ));
                return Ok(());
            }
        }

        self.load_number(argc as f64);
        if self.kind(callee) == "MemberExpression" {
            // The object doubles as `this`
            self.expression(tree.expect_child(callee, "object")?, Want::Value)?;
            self.emit_op(OpCode::Dup);
            self.property_key(callee)?;
            self.emit_op(OpCode::PropertyAddr);
            self.emit_op(OpCode::Fetch);
        } else {
            self.emit_op(OpCode::LoadUndefined);
            self.expression(callee, Want::Value)?;
        }
        self.emit_op(OpCode::Call);
        Ok(())
    }

    /// Creates a closure for a function literal and fills its capture table.
    pub(super) fn function_literal(&mut self, node: NodeId) -> Result<()> {
        let scopes = self.scopes;
        let id = scopes.function_scope(node)?;
        let scope = scopes.get(id);
        self.emit(Instruction::with_three(
            OpCode::Function,
            Operand::Scope(id),
            Operand::Count(scope.freevars.len() as u32),
            Operand::Count(scope.params.len() as u32),
        ));

        for (slot, freevar) in scope.freevars.iter().enumerate() {
            let (source, from) = freevar.resolved.ok_or_else(|| {
                Error::internal(format!("free variable `{}` was never resolved", freevar.name))
            })?;
            let kind = match source {
                Source::Parameter => AddrKind::Param,
                Source::Local => AddrKind::Local,
                Source::FreeVar => AddrKind::Lexical,
                // Looked up on the global object instead
                Source::Global => continue,
            };
            self.emit(Instruction::with_three(
                OpCode::Capture,
                Operand::Addr(kind),
                Operand::Slot(from as u32),
                Operand::Slot(slot as u32),
            ));
        }
        Ok(())
    }

    fn object(&mut self, node: NodeId) -> Result<()> {
        let tree = self.tree;
        self.emit_op(OpCode::NewObject);
        for property in tree.list(node, "properties") {
            if self.kind(property) != "Property" {
                return Err(self.unsupported(property));
            }
            let key = tree.expect_child(property, "key")?;
            if tree.flag(property, "computed") {
                self.expression(key, Want::Value)?;
            } else {
                let name = match self.kind(key) {
                    "Identifier" => tree.identifier_name(key)?.to_string(),
                    "Literal" => match tree.scalar(key, "value") {
                        Some(serde_json::Value::String(s)) => s.clone(),
                        Some(serde_json::Value::Number(n)) => {
                            number_to_string(n.as_f64().unwrap_or(f64::NAN))
                        }
                        _ => return Err(self.unsupported(key)),
                    },
                    _ => return Err(self.unsupported(key)),
                };
                self.emit(Instruction::with_operand(OpCode::LoadString, Operand::Str(name)));
            }

            self.expression(tree.expect_child(property, "value")?, Want::Value)?;
            let define = match tree.str(property, "kind").unwrap_or("init") {
                "init" => OpCode::DefineValue,
                "get" => OpCode::DefineGetter,
                "set" => OpCode::DefineSetter,
                other => {
                    return Err(Error::syntax(format!("unsupported property kind `{}`", other)));
                }
            };
            self.emit_op(define);
        }
        Ok(())
    }

    fn load_number(&mut self, n: f64) {
        self.emit(Instruction::with_operand(OpCode::LoadNumber, Operand::Number(n)));
    }

    fn unsupported_operator(&self, node: NodeId) -> Error {
        Error::syntax(format!(
            "unsupported operator `{}` in {}",
            self.tree.str(node, "operator").unwrap_or("?"),
            self.kind(node)
        ))
    }
}

fn binary_opcode(operator: &str) -> Option<OpCode> {
    Some(match operator {
        "+" => OpCode::Add,
        "-" => OpCode::Sub,
        "*" => OpCode::Mul,
        "/" => OpCode::Div,
        "%" => OpCode::Mod,
        "==" => OpCode::Eq,
        "!=" => OpCode::Ne,
        "===" => OpCode::StrictEq,
        "!==" => OpCode::StrictNe,
        "<" => OpCode::Lt,
        "<=" => OpCode::Le,
        ">" => OpCode::Gt,
        ">=" => OpCode::Ge,
        _ => return None,
    })
}
