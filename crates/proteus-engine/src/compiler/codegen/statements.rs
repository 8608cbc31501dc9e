// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Statement compilation.
//!
//! | Statement | Key Operations | Notes |
//! |-----------|----------------|-------|
//! | `var` | `Addr`, `Store`, `Pop` | Only declarators with an initializer emit code |
//! | function declaration | (none) | Created by the prologue |
//! | `if/else` | `JumpIfFalse`, `Jump` | |
//! | `while` / `for` | `JumpIfFalse`, `Jump` (back) | |
//! | `return` | `Return` | Runs the frame's pending finalizers first |
//! | `throw` | `Throw` | |
//! | `try/catch/finally` | `TryEnter`, `TryExit`, `EndFinally` | See below |
//!
//! ## Try Statements
//!
//! A catch-only statement:
//!
//! ```text
//!   TryEnter catch_label, -
//!   [block]
//!   TryExit
//!   Jump end_label
//! catch_label:
//!   Addr local[clause]; Addr catch[0]; Fetch; Store; Pop
//!   TryExit
//!   [handler]
//! end_label:
//! ```
//!
//! A finally-only statement parks "no value" on the normal path, and the
//! thrown value when unwinding; `EndFinally` rethrows anything but "no
//! value":
//!
//! ```text
//!   TryEnter -, finally_label
//!   [block]
//!   TryExit
//!   LoadEmpty
//! finally_label:
//!   [finalizer]
//!   EndFinally
//! ```
//!
//! With both clauses, the catch-only form is wrapped in the finally-only
//! form so a throw from the handler still runs the finalizer. A `return`
//! that crosses a finalizer parks its value as a link in the pending slot;
//! `EndFinally` then resumes the return.
//!
//! Each catch clause copies the caught value into a slot of its own, past
//! the declared locals, so the parameter never aliases a `var` of the
//! same name.

use super::{Compiler, Want};
use crate::Result;
use crate::ast::NodeId;
use crate::compiler::bytecode::{AddrKind, Instruction, OpCode, Operand};

impl Compiler<'_> {
    pub(super) fn statement(&mut self, node: NodeId) -> Result<()> {
        let tree = self.tree;
        match self.kind(node) {
            "ExpressionStatement" => {
                self.expression(tree.expect_child(node, "expression")?, Want::Nothing)
            }
            "VariableDeclaration" => self.variable_declaration(node),
            // Hoisted into the prologue
            "FunctionDeclaration" | "EmptyStatement" => Ok(()),
            "BlockStatement" => {
                for statement in tree.list(node, "body") {
                    self.statement(statement)?;
                }
                Ok(())
            }
            "ReturnStatement" => {
                match tree.child(node, "argument") {
                    Some(argument) => self.expression(argument, Want::Value)?,
                    None => {
                        self.emit_op(OpCode::LoadUndefined);
                    }
                }
                self.emit_op(OpCode::Return);
                Ok(())
            }
            "IfStatement" => self.if_statement(node),
            "WhileStatement" => self.while_statement(node),
            "ForStatement" => self.for_statement(node),
            "ThrowStatement" => {
                self.expression(tree.expect_child(node, "argument")?, Want::Value)?;
                self.emit_op(OpCode::Throw);
                Ok(())
            }
            "TryStatement" => self.try_statement(node),
            _ => Err(self.unsupported(node)),
        }
    }

    fn variable_declaration(&mut self, node: NodeId) -> Result<()> {
        let tree = self.tree;
        for declarator in tree.list(node, "declarations") {
            // Without an initializer the slot keeps its reserved "no value"
            let Some(init) = tree.child(declarator, "init") else {
                continue;
            };
            self.expression(tree.expect_child(declarator, "id")?, Want::Address)?;
            self.expression(init, Want::Value)?;
            self.emit_op(OpCode::Store);
            self.emit_op(OpCode::Pop);
        }
        Ok(())
    }

    fn if_statement(&mut self, node: NodeId) -> Result<()> {
        let tree = self.tree;
        self.expression(tree.expect_child(node, "test")?, Want::Value)?;
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.statement(tree.expect_child(node, "consequent")?)?;

        match tree.child(node, "alternate") {
            Some(alternate) => {
                let end_jump = self.emit_jump(OpCode::Jump);
                self.patch_jump(else_jump)?;
                self.statement(alternate)?;
                self.patch_jump(end_jump)
            }
            None => self.patch_jump(else_jump),
        }
    }

    fn while_statement(&mut self, node: NodeId) -> Result<()> {
        let tree = self.tree;
        let start = self.here();
        self.expression(tree.expect_child(node, "test")?, Want::Value)?;
        let exit = self.emit_jump(OpCode::JumpIfFalse);
        self.statement(tree.expect_child(node, "body")?)?;
        self.emit_jump_to(OpCode::Jump, start);
        self.patch_jump(exit)
    }

    fn for_statement(&mut self, node: NodeId) -> Result<()> {
        let tree = self.tree;
        if let Some(init) = tree.child(node, "init") {
            if self.kind(init) == "VariableDeclaration" {
                self.variable_declaration(init)?;
            } else {
                self.expression(init, Want::Nothing)?;
            }
        }

        let start = self.here();
        let exit = match tree.child(node, "test") {
            Some(test) => {
                self.expression(test, Want::Value)?;
                Some(self.emit_jump(OpCode::JumpIfFalse))
            }
            None => None,
        };
        self.statement(tree.expect_child(node, "body")?)?;
        if let Some(update) = tree.child(node, "update") {
            self.expression(update, Want::Nothing)?;
        }
        self.emit_jump_to(OpCode::Jump, start);
        match exit {
            Some(exit) => self.patch_jump(exit),
            None => Ok(()),
        }
    }

    fn try_statement(&mut self, node: NodeId) -> Result<()> {
        let tree = self.tree;
        let block = tree.expect_child(node, "block")?;
        let handler = tree.child(node, "handler");
        match tree.child(node, "finalizer") {
            Some(finalizer) => {
                let enter = self.emit(Instruction::with_operands(
                    OpCode::TryEnter,
                    Operand::None,
                    Operand::Label(super::UNPATCHED),
                ));
                match handler {
                    Some(handler) => self.try_catch(block, handler)?,
                    None => self.statement(block)?,
                }
                self.emit_op(OpCode::TryExit);
                self.emit_op(OpCode::LoadEmpty);
                self.patch(enter, 1)?;
                self.statement(finalizer)?;
                self.emit_op(OpCode::EndFinally);
                Ok(())
            }
            None => {
                let handler = handler.ok_or_else(|| self.unsupported(node))?;
                self.try_catch(block, handler)
            }
        }
    }

    fn try_catch(&mut self, block: NodeId, handler: NodeId) -> Result<()> {
        let tree = self.tree;
        let enter = self.emit_jump(OpCode::TryEnter);
        self.statement(block)?;
        self.emit_op(OpCode::TryExit);
        let end = self.emit_jump(OpCode::Jump);

        self.patch(enter, 0)?;
        if let Some(param) = tree.child(handler, "param") {
            self.expression(param, Want::Address)?;
            self.emit(Instruction::with_operands(
                OpCode::Addr,
                Operand::Addr(AddrKind::Catch),
                Operand::Slot(0),
            ));
            self.emit_op(OpCode::Fetch);
            self.emit_op(OpCode::Store);
            self.emit_op(OpCode::Pop);
        }
        self.emit_op(OpCode::TryExit);
        self.statement(tree.expect_child(handler, "body")?)?;
        self.patch_jump(end)
    }
}
