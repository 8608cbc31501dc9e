// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode compiler.
//!
//! Lowers a [`SyntaxTree`] into one linked [`Bytecode`] program.
//!
//! # Module Structure
//!
//! - `scope`: function scopes and free-variable resolution
//! - `codegen`: per-scope code generation
//!   - `codegen::statements`, `codegen::expressions`
//! - `linker`: offset assignment and back-patching
//! - `bytecode`: instruction definitions

pub mod bytecode;
pub mod codegen;
pub mod linker;
pub mod scope;

pub use bytecode::{AddrKind, Bytecode, Instruction, OpCode, Operand};
pub use codegen::{Compiler, Want};
pub use scope::{Binding, FunctionScope, ScopeId, ScopeTree, Source};

use crate::Result;
use crate::ast::SyntaxTree;

/// Compiles a syntax tree: resolve scopes, emit each scope, link.
pub fn compile(tree: &SyntaxTree) -> Result<Bytecode> {
    let mut scopes = ScopeTree::resolve(tree)?;
    codegen::emit(tree, &mut scopes)?;
    linker::link(&mut scopes)
}
