// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # proteus-engine
//!
//! Bytecode compiler and reference-counted virtual machine for a small
//! prototype-based scripting language.
//!
//! ## Overview
//!
//! The engine takes a syntax tree produced by an external front end and
//! runs it:
//! - Scope resolution with closure capture
//! - Per-function bytecode generation and linking
//! - A single heap of counted objects, reclaimed the moment they become
//!   unreachable by count
//! - Properties with descriptors, accessors and prototype chains
//! - A stack VM with traps for `try`/`catch`/`finally` and named host hooks
//!
//! ## Quick Start
//!
//! ```rust
//! use proteus_engine::ast::build::*;
//! use proteus_engine::{Engine, Hooks, Value, VmConfig};
//!
//! let tree = program(vec![expr(call(ident("$check"), vec![binary("+", num(20.0), num(3.0))]))]);
//! let hooks = Hooks::new().with("$check", |vm, args| {
//!     assert_eq!(vm.value(args[0]), Value::Number(23.0));
//!     Ok(args[0])
//! });
//!
//! let mut engine = Engine::new(VmConfig::default()).unwrap();
//! engine.eval_value(&tree, hooks).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod compiler;
pub mod config;
pub mod error;
pub mod gc;
pub mod vm;

pub use ast::SyntaxTree;
pub use compiler::{Bytecode, compile};
pub use config::VmConfig;
pub use error::{Error, Result};
pub use gc::{Heap, ObjId};
pub use vm::{Hooks, Value, Vm};

/// A VM together with the compile step in front of it.
pub struct Engine {
    vm: Vm,
}

impl Engine {
    /// Creates an engine with the given limits.
    pub fn new(config: VmConfig) -> Result<Self> {
        Ok(Self {
            vm: Vm::new(config)?,
        })
    }

    /// Compiles and runs a syntax tree given as ESTree JSON text.
    ///
    /// # Returns
    ///
    /// The snapshot of the top-level unit's completion value (normally
    /// `undefined`), or the first compile or runtime error.
    pub fn eval_json(&mut self, source: &str, hooks: Hooks) -> Result<Value> {
        let tree = SyntaxTree::from_json(source)?;
        self.eval_tree(&tree, hooks)
    }

    /// Like [`eval_json`](Self::eval_json), from an already decoded value.
    pub fn eval_value(&mut self, source: &serde_json::Value, hooks: Hooks) -> Result<Value> {
        let tree = SyntaxTree::from_value(source)?;
        self.eval_tree(&tree, hooks)
    }

    /// Compiles and runs a loaded syntax tree.
    pub fn eval_tree(&mut self, tree: &SyntaxTree, hooks: Hooks) -> Result<Value> {
        let program = compile(tree)?;
        let result = self.vm.run(&program, hooks)?;
        Ok(self.vm.value(result))
    }

    /// The underlying VM.
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// Mutable access to the underlying VM.
    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }
}
