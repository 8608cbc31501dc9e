// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode definitions.

use std::fmt;

use super::scope::ScopeId;
use crate::{Error, Result};

/// A linked program: every function's code merged into one array.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    /// The instructions
    pub instructions: Vec<Instruction>,
    /// Entry offset of each function scope, indexed by scope id
    pub entries: Vec<usize>,
}

impl Bytecode {
    /// Creates a new empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instruction and returns its index.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let index = self.instructions.len();
        self.instructions.push(instruction);
        index
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the program holds no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (offset, instruction) in self.instructions.iter().enumerate() {
            if let Some(scope) = self.entries.iter().position(|&entry| entry == offset) {
                writeln!(f, "scope#{}:", scope)?;
            }
            writeln!(f, "  {:5}  {}", offset, instruction)?;
        }
        Ok(())
    }
}

/// Kinds of storage an address can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrKind {
    /// A declared local of the current frame
    Local,
    /// A parameter of the current frame
    Param,
    /// A slot of the current function's capture table
    Lexical,
    /// A named property of an object
    Property,
    /// The thrown value held by an active trap
    Catch,
}

impl fmt::Display for AddrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddrKind::Local => "local",
            AddrKind::Param => "param",
            AddrKind::Lexical => "lexical",
            AddrKind::Property => "property",
            AddrKind::Catch => "catch",
        };
        f.write_str(name)
    }
}

/// Instruction operands.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Operand {
    /// Unused operand position
    #[default]
    None,
    /// Number literal
    Number(f64),
    /// String literal or name
    Str(String),
    /// Count (locals, arguments, captures)
    Count(u32),
    /// Slot index
    Slot(u32),
    /// Address kind
    Addr(AddrKind),
    /// Function scope, replaced by an `Offset` at link time
    Scope(ScopeId),
    /// Function-relative jump target, replaced by an `Offset` at link time
    Label(usize),
    /// Absolute instruction offset
    Offset(usize),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Number(n) => write!(f, "{}", n),
            Operand::Str(s) => write!(f, "{:?}", s),
            Operand::Count(n) => write!(f, "#{}", n),
            Operand::Slot(n) => write!(f, "[{}]", n),
            Operand::Addr(kind) => write!(f, "{}", kind),
            Operand::Scope(scope) => write!(f, "scope#{}", scope.0),
            Operand::Label(label) => write!(f, "L{}", label),
            Operand::Offset(offset) => write!(f, "@{}", offset),
        }
    }
}

/// A single bytecode instruction: an opcode plus up to three operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation code
    pub opcode: OpCode,
    /// Operands, unused positions hold `Operand::None`
    pub operands: [Operand; 3],
}

impl Instruction {
    /// Creates a new instruction with no operand.
    pub fn simple(opcode: OpCode) -> Self {
        Self {
            opcode,
            operands: Default::default(),
        }
    }

    /// Creates a new instruction with an operand.
    pub fn with_operand(opcode: OpCode, operand: Operand) -> Self {
        Self {
            opcode,
            operands: [operand, Operand::None, Operand::None],
        }
    }

    /// Creates a new instruction with two operands.
    pub fn with_operands(opcode: OpCode, first: Operand, second: Operand) -> Self {
        Self {
            opcode,
            operands: [first, second, Operand::None],
        }
    }

    /// Creates a new instruction with three operands.
    pub fn with_three(opcode: OpCode, first: Operand, second: Operand, third: Operand) -> Self {
        Self {
            opcode,
            operands: [first, second, third],
        }
    }

    fn malformed(&self, index: usize, expected: &str) -> Error {
        Error::internal(format!(
            "{:?}: operand {} is {:?}, expected {}",
            self.opcode, index, self.operands[index], expected
        ))
    }

    /// Decodes a number operand.
    pub fn number(&self, index: usize) -> Result<f64> {
        match self.operands[index] {
            Operand::Number(n) => Ok(n),
            _ => Err(self.malformed(index, "a number")),
        }
    }

    /// Decodes a string operand.
    pub fn string(&self, index: usize) -> Result<&str> {
        match &self.operands[index] {
            Operand::Str(s) => Ok(s),
            _ => Err(self.malformed(index, "a string")),
        }
    }

    /// Decodes a count or slot operand.
    pub fn count(&self, index: usize) -> Result<usize> {
        match self.operands[index] {
            Operand::Count(n) | Operand::Slot(n) => Ok(n as usize),
            _ => Err(self.malformed(index, "a count")),
        }
    }

    /// Decodes an address-kind operand.
    pub fn addr(&self, index: usize) -> Result<AddrKind> {
        match self.operands[index] {
            Operand::Addr(kind) => Ok(kind),
            _ => Err(self.malformed(index, "an address kind")),
        }
    }

    /// Decodes a linked offset operand; `None` when the position is unused.
    pub fn target(&self, index: usize) -> Result<Option<usize>> {
        match self.operands[index] {
            Operand::Offset(offset) => Ok(Some(offset)),
            Operand::None => Ok(None),
            _ => Err(self.malformed(index, "a linked offset")),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.opcode)?;
        for operand in self.operands.iter().filter(|o| **o != Operand::None) {
            write!(f, " {}", operand)?;
        }
        Ok(())
    }
}

/// Operation codes for the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // Frame setup
    /// Push `count` "no value" local slots
    Reserve,

    // Stack operations
    /// Push undefined
    LoadUndefined,
    /// Push null
    LoadNull,
    /// Push true
    LoadTrue,
    /// Push false
    LoadFalse,
    /// Push the "no value" sentinel
    LoadEmpty,
    /// Push a number literal
    LoadNumber,
    /// Push an interned string literal
    LoadString,
    /// Push the current frame's `this`
    LoadThis,
    /// Push the function being run by the current frame
    LoadCallee,
    /// Pop the top value
    Pop,
    /// Duplicate the top value
    Dup,

    // Addresses
    /// Push an address of kind/slot into the current frame
    Addr,
    /// Push a property address on the global object
    GlobalAddr,
    /// Pop key and base, push a property address
    PropertyAddr,
    /// Replace the address on top with its current value
    Fetch,
    /// Pop value and address, store, push the value back
    Store,
    /// Replace the address on top with `true`/`false` after deleting it
    Delete,
    /// `typeof` on an address, tolerating unbound globals
    TypeOfRef,

    // Arithmetic operations
    /// Add top two values
    Add,
    /// Subtract
    Sub,
    /// Multiply
    Mul,
    /// Divide
    Div,
    /// Modulo
    Mod,
    /// Negate (unary minus)
    Neg,
    /// Unary plus (ToNumber)
    Plus,

    // Comparison operations
    /// Equal (==)
    Eq,
    /// Not equal (!=)
    Ne,
    /// Strict equal (===)
    StrictEq,
    /// Strict not equal (!==)
    StrictNe,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,

    // Logical operations
    /// Logical NOT
    Not,
    /// typeof operator
    TypeOf,

    // Control flow
    /// Unconditional jump
    Jump,
    /// Pop and jump if false
    JumpIfFalse,
    /// Pop and jump if true
    JumpIfTrue,

    // Function operations
    /// Create a function object for a scope with `count` capture slots
    Function,
    /// Fill one capture slot of the function on top of the stack
    Capture,
    /// Invoke the callee on top of `args, argc, this, callee`
    Call,
    /// Return from function
    Return,
    /// Invoke a named host hook with `argc` arguments
    Hook,

    // Object operations
    /// Create a new empty object
    NewObject,
    /// Pop value and key, define a data property on the object below
    DefineValue,
    /// Pop function and key, install it as the object's getter
    DefineGetter,
    /// Pop function and key, install it as the object's setter
    DefineSetter,

    // Exceptions
    /// Push a trap with catch and finally targets
    TryEnter,
    /// Pop the innermost trap
    TryExit,
    /// Rethrow a value parked while a finalizer ran
    EndFinally,
    /// Throw the value on top of the stack
    Throw,
}
