// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Code generation from the resolved scope tree to per-function bytecode.
//!
//! Every [`FunctionScope`](super::scope::FunctionScope) is compiled on its
//! own into a flat instruction array stored back on the scope; the linker
//! then merges the arrays. Jumps carry function-relative labels and
//! function literals name their scope, so a function's code does not depend
//! on where it ends up in the merged program.

mod expressions;
mod statements;

#[cfg(test)]
mod tests;

use tracing::debug;

use crate::ast::{NodeId, SyntaxTree};
use crate::compiler::bytecode::{AddrKind, Instruction, OpCode, Operand};
use crate::compiler::scope::{Binding, ScopeId, ScopeTree};
use crate::{Error, Result};

/// What the code for an expression must leave on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Want {
    /// An address (assignment targets and operands of `delete`/`typeof`)
    Address,
    /// The expression's value
    Value,
    /// Nothing: the expression runs for its effects
    Nothing,
}

/// Compiles one function scope.
pub struct Compiler<'a> {
    tree: &'a SyntaxTree,
    scopes: &'a ScopeTree,
    scope: ScopeId,
    code: Vec<Instruction>,
    /// Highest label bound so far
    last_target: usize,
}

/// Marks a jump operand that has not been patched yet.
const UNPATCHED: usize = usize::MAX;

/// Compiles every scope of `scopes`, storing each scope's instructions on
/// the scope itself.
pub fn emit(tree: &SyntaxTree, scopes: &mut ScopeTree) -> Result<()> {
    for index in 0..scopes.len() {
        let id = ScopeId(index as u32);
        let code = Compiler::new(tree, scopes, id).compile()?;
        debug!(scope = index, instructions = code.len(), "emitted scope");
        scopes.get_mut(id).code = code;
    }
    Ok(())
}

impl<'a> Compiler<'a> {
    /// Creates a compiler for the scope `scope`.
    pub fn new(tree: &'a SyntaxTree, scopes: &'a ScopeTree, scope: ScopeId) -> Self {
        Self {
            tree,
            scopes,
            scope,
            code: Vec::new(),
            last_target: 0,
        }
    }

    /// Compiles the scope: prologue, body, epilogue.
    pub fn compile(mut self) -> Result<Vec<Instruction>> {
        let scopes = self.scopes;
        let scope = scopes.get(self.scope);
        let node = scope.node;

        // Prologue: reserve locals, bind the function's own name, then
        // hoist function declarations
        self.emit(Instruction::with_operand(
            OpCode::Reserve,
            Operand::Count(scope.slot_count() as u32),
        ));
        if let Some(slot) = scope.self_slot {
            self.local_address(slot);
            self.emit_op(OpCode::LoadCallee);
            self.emit_op(OpCode::Store);
            self.emit_op(OpCode::Pop);
        }
        for &declaration in &scope.functions {
            let name = self.tree.expect_child(declaration, "id")?;
            self.identifier(name, Want::Address)?;
            self.function_literal(declaration)?;
            self.emit_op(OpCode::Store);
            self.emit_op(OpCode::Pop);
        }

        let body = if scope.is_root() {
            node
        } else {
            self.tree.expect_child(node, "body")?
        };
        for statement in self.tree.list(body, "body") {
            self.statement(statement)?;
        }

        // Epilogue, unless the body already ends in a return nobody jumps past
        let ends_in_return = self
            .code
            .last()
            .is_some_and(|last| last.opcode == OpCode::Return);
        if !ends_in_return || self.last_target >= self.code.len() {
            self.emit_op(OpCode::LoadUndefined);
            self.emit_op(OpCode::Return);
        }
        Ok(self.code)
    }

    // ========================================================================
    // Emission helpers
    // ========================================================================

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.code.push(instruction);
        self.code.len() - 1
    }

    fn emit_op(&mut self, opcode: OpCode) -> usize {
        self.emit(Instruction::simple(opcode))
    }

    /// Emits a forward jump to be patched later.
    fn emit_jump(&mut self, opcode: OpCode) -> usize {
        self.emit(Instruction::with_operand(opcode, Operand::Label(UNPATCHED)))
    }

    /// Emits a backward jump to an already bound label.
    fn emit_jump_to(&mut self, opcode: OpCode, label: usize) {
        self.emit(Instruction::with_operand(opcode, Operand::Label(label)));
    }

    /// The label of the next instruction.
    fn here(&self) -> usize {
        self.code.len()
    }

    /// Points operand `operand` of the instruction at `at` to the next
    /// instruction.
    fn patch(&mut self, at: usize, operand: usize) -> Result<()> {
        let target = self.here();
        let instruction = self
            .code
            .get_mut(at)
            .ok_or_else(|| Error::internal(format!("patch of missing instruction {}", at)))?;
        instruction.operands[operand] = Operand::Label(target);
        self.last_target = self.last_target.max(target);
        Ok(())
    }

    fn patch_jump(&mut self, at: usize) -> Result<()> {
        self.patch(at, 0)
    }

    /// Pops the value just produced when the caller wants nothing.
    fn finish(&mut self, want: Want) {
        if want == Want::Nothing {
            self.emit_op(OpCode::Pop);
        }
    }

    fn kind(&self, node: NodeId) -> &'a str {
        self.tree.kind(node)
    }

    fn unsupported(&self, node: NodeId) -> Error {
        Error::syntax(format!("unsupported syntax: {}", self.kind(node)))
    }

    // ========================================================================
    // Names
    // ========================================================================

    fn local_address(&mut self, slot: usize) {
        self.emit(Instruction::with_operands(
            OpCode::Addr,
            Operand::Addr(AddrKind::Local),
            Operand::Slot(slot as u32),
        ));
    }

    /// Whether `name` is bound to storage of this function or an enclosing
    /// one (as opposed to the global object or nothing).
    fn is_variable(&self, node: NodeId, name: &str) -> bool {
        self.scopes.catch_binding(node).is_some()
            || matches!(
                self.scopes.get(self.scope).lookup(name),
                Some(Binding::Param(_) | Binding::Local(_) | Binding::Lexical(_))
            )
    }

    /// Emits the address of the variable `name` as seen from this scope.
    fn binding_address(&mut self, name: &str) -> Result<()> {
        let binding = self.scopes.get(self.scope).lookup(name).ok_or_else(|| {
            Error::internal(format!(
                "`{}` is not bound in scope#{}",
                name, self.scope.0
            ))
        })?;
        let (kind, slot) = match binding {
            Binding::Param(slot) => (AddrKind::Param, slot),
            Binding::Local(slot) => (AddrKind::Local, slot),
            Binding::Lexical(slot) => (AddrKind::Lexical, slot),
            Binding::Global => {
                self.emit(Instruction::with_operand(
                    OpCode::GlobalAddr,
                    Operand::Str(name.to_string()),
                ));
                return Ok(());
            }
        };
        self.emit(Instruction::with_operands(
            OpCode::Addr,
            Operand::Addr(kind),
            Operand::Slot(slot as u32),
        ));
        Ok(())
    }
}
