// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Bytecode interpreter.
//!
//! The VM state lives in heap roots: the main value stack, the trap stack
//! and a small register file are pinned Vectors, so every value the
//! interpreter holds is counted like any other reference.

use std::rc::Rc;

use tracing::{debug, trace, warn};

use super::builtins::Realm;
use super::frame::Frame;
use super::hooks::Hooks;
use super::value::{Value, abstract_equals, render, strict_equals};
use crate::compiler::bytecode::{AddrKind, Bytecode, Instruction, OpCode};
use crate::config::VmConfig;
use crate::gc::{
    AddressData, Callable, Field, Heap, HeapObject, ObjId, ObjectClass, PropertyDescriptor,
};
use crate::{Error, Result};

/// Register holding a thrown value while the stack unwinds.
pub(crate) const REG_EXCEPTION: usize = 0;
/// Register holding the result of the last [`Vm::call`].
pub(crate) const REG_RESULT: usize = 1;
/// First register used by the realm.
pub(crate) const REG_REALM: usize = 2;
const REGISTER_COUNT: usize = REG_REALM + 3;

/// The virtual machine.
pub struct Vm {
    pub(crate) config: VmConfig,
    pub(crate) heap: Heap,
    pub(crate) code: Rc<Bytecode>,
    pub(crate) hooks: Hooks,
    /// Main value stack
    pub(crate) stack: ObjId,
    /// Stack height
    pub(crate) sp: usize,
    /// Trap stack
    pub(crate) traps: ObjId,
    pub(crate) trap_count: usize,
    pub(crate) registers: ObjId,
    /// Active guest frames, innermost last
    pub(crate) frames: Vec<Frame>,
    /// Program counter
    pub(crate) pc: usize,
    pub(crate) realm: Realm,
}

impl Vm {
    /// Creates a VM with its heap roots and built-in objects.
    pub fn new(config: VmConfig) -> Result<Self> {
        let mut heap = Heap::new(config.property_buckets);
        let stack = heap.new_root_vector(config.stack_size)?;
        let traps = heap.new_root_vector(config.max_traps)?;
        let registers = heap.new_root_vector(REGISTER_COUNT)?;

        let mut vm = Self {
            config,
            heap,
            code: Rc::new(Bytecode::new()),
            hooks: Hooks::new(),
            stack,
            sp: 0,
            traps,
            trap_count: 0,
            registers,
            frames: Vec::new(),
            pc: 0,
            realm: Realm::default(),
        };
        Realm::install(&mut vm)?;
        Ok(vm)
    }

    /// Runs a linked program: creates the entry function for offset 0 and
    /// invokes it with the global object as `this`.
    pub fn run(&mut self, code: &Bytecode, hooks: Hooks) -> Result<ObjId> {
        self.code = Rc::new(code.clone());
        self.hooks = hooks;
        debug!(
            instructions = code.len(),
            hooks = self.hooks.len(),
            "running program"
        );

        let entry = self.heap.new_function(
            self.realm.function_prototype,
            Callable::Guest { entry: 0, arity: 0 },
            0,
        )?;
        match self.call(entry, self.realm.global, &[]) {
            Err(Error::Thrown(_)) => {
                let thrown = self.register(REG_EXCEPTION)?;
                let text = render(&self.heap, thrown);
                self.set_register(REG_EXCEPTION, ObjId::NONE)?;
                Err(Error::Uncaught(text))
            }
            other => other,
        }
    }

    // ========================================================================
    // Embedding API
    // ========================================================================

    /// The configuration this VM was built with.
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Read access to the heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Write access to the heap.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Snapshot of a value.
    pub fn value(&self, id: ObjId) -> Value {
        Value::from_heap(&self.heap, id)
    }

    /// The global object.
    pub fn global(&self) -> ObjId {
        self.realm.global
    }

    /// The built-in objects.
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// Current stack height.
    pub fn stack_height(&self) -> usize {
        self.sp
    }

    /// Number of active guest frames.
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns the interned string for `text`.
    pub fn intern(&mut self, text: &str) -> Result<ObjId> {
        self.heap.new_string(text)
    }

    /// Verifies the heap's counting discipline.
    pub fn check_invariants(&self) -> Result<()> {
        self.heap.check_invariants()
    }

    /// Renders a value the way an uncaught throw is reported.
    pub fn render(&self, id: ObjId) -> String {
        render(&self.heap, id)
    }

    // ========================================================================
    // Roots
    // ========================================================================

    pub(crate) fn register(&self, index: usize) -> Result<ObjId> {
        self.heap.element(self.registers, index)
    }

    pub(crate) fn set_register(&mut self, index: usize, id: ObjId) -> Result<()> {
        self.heap
            .assign(id, self.registers, Field::Element(index as u32))
    }

    pub(crate) fn push(&mut self, id: ObjId) -> Result<()> {
        if self.sp >= self.config.stack_size {
            return Err(Error::StackOverflow {
                limit: self.config.stack_size,
            });
        }
        self.heap
            .assign(id, self.stack, Field::Element(self.sp as u32))?;
        self.sp += 1;
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<()> {
        if self.sp == 0 {
            return Err(Error::internal("value stack underflow"));
        }
        self.sp -= 1;
        self.heap
            .assign(ObjId::NONE, self.stack, Field::Element(self.sp as u32))
    }

    /// Reads the value `depth` slots below the top.
    pub(crate) fn peek(&self, depth: usize) -> Result<ObjId> {
        if depth >= self.sp {
            return Err(Error::internal(format!(
                "peek {} below a stack of height {}",
                depth, self.sp
            )));
        }
        self.slot(self.sp - 1 - depth)
    }

    pub(crate) fn slot(&self, index: usize) -> Result<ObjId> {
        self.heap.element(self.stack, index)
    }

    pub(crate) fn set_slot(&mut self, index: usize, id: ObjId) -> Result<()> {
        self.heap
            .assign(id, self.stack, Field::Element(index as u32))
    }

    /// Pops until the stack is `height` slots high.
    pub(crate) fn truncate(&mut self, height: usize) -> Result<()> {
        while self.sp > height {
            self.pop()?;
        }
        Ok(())
    }

    /// Replaces the top `consumed` slots with `result`. The result is
    /// written into the lowest consumed slot before anything is popped, so
    /// a result reachable only through the operands survives.
    pub(crate) fn complete(&mut self, consumed: usize, result: ObjId) -> Result<()> {
        if consumed == 0 {
            return self.push(result);
        }
        if consumed > self.sp {
            return Err(Error::internal("instruction consumed more than the stack holds"));
        }
        self.set_slot(self.sp - consumed, result)?;
        for _ in 1..consumed {
            self.pop()?;
        }
        Ok(())
    }

    pub(crate) fn frame(&self) -> Result<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| Error::internal("no active frame"))
    }

    // ========================================================================
    // Fetch-decode-execute
    // ========================================================================

    /// Runs until the frame depth drops back to `depth`.
    pub(crate) fn execute(&mut self, depth: usize) -> Result<()> {
        let code = Rc::clone(&self.code);
        while self.frames.len() > depth {
            let instruction = code.instructions.get(self.pc).ok_or_else(|| {
                Error::internal(format!("program counter {} out of range", self.pc))
            })?;
            trace!(pc = self.pc, op = ?instruction.opcode, sp = self.sp, "dispatch");
            self.pc += 1;
            if let Err(err) = self.step(instruction) {
                self.handle_error(err, depth)?;
            }
        }
        Ok(())
    }

    fn step(&mut self, instruction: &Instruction) -> Result<()> {
        match instruction.opcode {
            OpCode::Reserve => {
                let count = instruction.count(0)?;
                for _ in 0..count {
                    self.push(ObjId::NONE)?;
                }
                if let Some(frame) = self.frames.last_mut() {
                    frame.locals = count;
                }
            }

            // Constants
            OpCode::LoadUndefined => self.push(Heap::UNDEFINED)?,
            OpCode::LoadNull => self.push(Heap::NULL)?,
            OpCode::LoadTrue => self.push(Heap::TRUE)?,
            OpCode::LoadFalse => self.push(Heap::FALSE)?,
            OpCode::LoadEmpty => self.push(ObjId::NONE)?,
            OpCode::LoadNumber => {
                let number = self.heap.new_number(instruction.number(0)?)?;
                self.push(number)?;
            }
            OpCode::LoadString => {
                let string = self.heap.new_string(instruction.string(0)?)?;
                self.push(string)?;
            }
            OpCode::LoadThis => {
                let this = self.slot(self.frame()?.this_slot())?;
                self.push(this)?;
            }
            OpCode::LoadCallee => {
                let callee = self.slot(self.frame()?.base)?;
                self.push(callee)?;
            }
            OpCode::Pop => self.pop()?,
            OpCode::Dup => self.push(self.peek(0)?)?,

            // Addresses
            OpCode::Addr => {
                let address = self.heap.new_address(AddressData {
                    kind: instruction.addr(0)?,
                    slot: instruction.count(1)?,
                    base: ObjId::NONE,
                    key: ObjId::NONE,
                    global: false,
                })?;
                self.push(address)?;
            }
            OpCode::GlobalAddr => {
                let key = self.heap.new_string(instruction.string(0)?)?;
                let address = self.heap.new_address(AddressData {
                    kind: AddrKind::Property,
                    slot: 0,
                    base: self.realm.global,
                    key,
                    global: true,
                })?;
                self.push(address)?;
            }
            OpCode::PropertyAddr => {
                let base = self.peek(1)?;
                let key = self.to_property_key(self.peek(0)?)?;
                if self.value(base).is_nullish() {
                    let message = format!(
                        "cannot access property '{}' of {}",
                        self.heap.string(key)?,
                        self.value(base)
                    );
                    self.heap.discard(key)?;
                    return Err(Error::type_error(message));
                }
                let address = self.heap.new_address(AddressData {
                    kind: AddrKind::Property,
                    slot: 0,
                    base,
                    key,
                    global: false,
                })?;
                self.complete(2, address)?;
            }
            OpCode::Fetch => {
                let value = self.read_address(self.peek(0)?)?;
                self.complete(1, value)?;
            }
            OpCode::Store => {
                let value = self.peek(0)?;
                self.write_address(self.peek(1)?, value)?;
                self.complete(2, value)?;
            }
            OpCode::Delete => {
                let address = self.address(self.peek(0)?)?;
                let deleted = match address.kind {
                    AddrKind::Property if self.heap.is_object(address.base) => {
                        self.heap.delete_property(address.base, address.key, false)?
                    }
                    _ => false,
                };
                self.complete(1, self.heap.boolean(deleted))?;
            }
            OpCode::TypeOfRef => {
                let address = self.address(self.peek(0)?)?;
                let name = if address.global
                    && !self.heap.has_property(address.base, address.key)?
                {
                    "undefined"
                } else {
                    let value = self.read_address(self.peek(0)?)?;
                    self.value(value).type_of()
                };
                let result = self.heap.new_string(name)?;
                self.complete(1, result)?;
            }

            // Operators
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Mod
            | OpCode::Eq
            | OpCode::Ne
            | OpCode::StrictEq
            | OpCode::StrictNe
            | OpCode::Lt
            | OpCode::Le
            | OpCode::Gt
            | OpCode::Ge => {
                let right = self.value(self.peek(0)?);
                let left = self.value(self.peek(1)?);
                let result = self.binary(instruction.opcode, &left, &right)?;
                self.complete(2, result)?;
            }
            OpCode::Neg | OpCode::Plus | OpCode::Not | OpCode::TypeOf => {
                let operand = self.value(self.peek(0)?);
                let result = match instruction.opcode {
                    OpCode::Neg => self.heap.new_number(-operand.to_number())?,
                    OpCode::Plus => self.heap.new_number(operand.to_number())?,
                    OpCode::Not => self.heap.boolean(!operand.to_boolean()),
                    _ => self.heap.new_string(operand.type_of())?,
                };
                self.complete(1, result)?;
            }

            // Control flow
            OpCode::Jump => self.pc = self.jump_target(instruction)?,
            OpCode::JumpIfFalse | OpCode::JumpIfTrue => {
                let condition = self.value(self.peek(0)?).to_boolean();
                self.pop()?;
                if condition == (instruction.opcode == OpCode::JumpIfTrue) {
                    self.pc = self.jump_target(instruction)?;
                }
            }

            // Functions
            OpCode::Function => {
                let entry = self.jump_target(instruction)?;
                let captures = instruction.count(1)?;
                let arity = instruction.count(2)?;
                let function = self.heap.new_function(
                    self.realm.function_prototype,
                    Callable::Guest { entry, arity },
                    captures,
                )?;
                self.push(function)?;
            }
            OpCode::Capture => self.capture(instruction)?,
            OpCode::Call => {
                self.invoke(self.pc)?;
            }
            OpCode::Return => self.begin_return()?,
            OpCode::Hook => {
                let name = instruction.string(0)?;
                let argc = instruction.count(1)?;
                let args = (0..argc)
                    .rev()
                    .map(|depth| self.peek(depth))
                    .collect::<Result<Vec<_>>>()?;
                let result = match self.hooks.get(name) {
                    Some(hook) => {
                        debug!(hook = name, argc, "invoking hook");
                        hook(self, &args)?
                    }
                    None => {
                        warn!(hook = name, "no hook registered under this name, skipping");
                        Heap::UNDEFINED
                    }
                };
                self.complete(argc, result)?;
            }

            // Objects
            OpCode::NewObject => {
                let object = self
                    .heap
                    .new_object(self.realm.object_prototype, ObjectClass::Object)?;
                self.push(object)?;
            }
            OpCode::DefineValue | OpCode::DefineGetter | OpCode::DefineSetter => {
                let value = self.peek(0)?;
                let object = self.peek(2)?;
                let key = self.to_property_key(self.peek(1)?)?;
                let desc = match instruction.opcode {
                    OpCode::DefineValue => PropertyDescriptor::open(value),
                    OpCode::DefineGetter => PropertyDescriptor {
                        get: Some(value),
                        enumerable: Some(true),
                        configurable: Some(true),
                        ..PropertyDescriptor::default()
                    },
                    _ => PropertyDescriptor {
                        set: Some(value),
                        enumerable: Some(true),
                        configurable: Some(true),
                        ..PropertyDescriptor::default()
                    },
                };
                self.heap.define_own_property(object, key, desc, true)?;
                self.heap.discard(key)?;
                self.pop()?;
                self.pop()?;
            }

            // Exceptions
            OpCode::TryEnter => {
                if self.trap_count >= self.config.max_traps {
                    return Err(Error::TrapOverflow {
                        limit: self.config.max_traps,
                    });
                }
                let trap = self.heap.new_trap(
                    instruction.target(0)?,
                    instruction.target(1)?,
                    self.sp,
                    self.frames.len(),
                )?;
                self.heap
                    .assign(trap, self.traps, Field::Element(self.trap_count as u32))?;
                self.trap_count += 1;
            }
            OpCode::TryExit => self.pop_trap()?,
            OpCode::EndFinally => {
                let pending = self.peek(0)?;
                if pending.is_none() {
                    self.pop()?;
                } else if self.heap.is_link(pending) {
                    self.set_slot(self.sp - 1, self.heap.deref(pending))?;
                    self.begin_return()?;
                } else {
                    return self.throw_top();
                }
            }
            OpCode::Throw => return self.throw_top(),
        }
        Ok(())
    }

    fn jump_target(&self, instruction: &Instruction) -> Result<usize> {
        instruction.target(0)?.ok_or_else(|| {
            Error::internal(format!("{:?} without a target", instruction.opcode))
        })
    }

    fn binary(&mut self, opcode: OpCode, left: &Value, right: &Value) -> Result<ObjId> {
        let number = |heap: &mut Heap, n: f64| heap.new_number(n);
        match opcode {
            OpCode::Add => {
                let concat = matches!(left, Value::String(_) | Value::Object(_) | Value::Function(_))
                    || matches!(right, Value::String(_) | Value::Object(_) | Value::Function(_));
                if concat {
                    let text = format!("{}{}", left, right);
                    self.heap.new_string(&text)
                } else {
                    number(&mut self.heap, left.to_number() + right.to_number())
                }
            }
            OpCode::Sub => number(&mut self.heap, left.to_number() - right.to_number()),
            OpCode::Mul => number(&mut self.heap, left.to_number() * right.to_number()),
            OpCode::Div => number(&mut self.heap, left.to_number() / right.to_number()),
            OpCode::Mod => number(&mut self.heap, left.to_number() % right.to_number()),
            OpCode::Eq => Ok(self.heap.boolean(abstract_equals(left, right))),
            OpCode::Ne => Ok(self.heap.boolean(!abstract_equals(left, right))),
            OpCode::StrictEq => Ok(self.heap.boolean(strict_equals(left, right))),
            OpCode::StrictNe => Ok(self.heap.boolean(!strict_equals(left, right))),
            OpCode::Lt => Ok(self.heap.boolean(less_than(left, right))),
            OpCode::Gt => Ok(self.heap.boolean(less_than(right, left))),
            OpCode::Le => Ok(self.heap.boolean(less_or_equal(left, right))),
            OpCode::Ge => Ok(self.heap.boolean(less_or_equal(right, left))),
            other => Err(Error::internal(format!("{:?} is not a binary operator", other))),
        }
    }

    // ========================================================================
    // Addresses
    // ========================================================================

    fn address(&self, id: ObjId) -> Result<AddressData> {
        match self.heap.get(id)? {
            HeapObject::Address(address) => Ok(address.clone()),
            other => Err(Error::internal(format!(
                "expected an address, found a {}",
                other.kind_name()
            ))),
        }
    }

    /// Stack index of a local or parameter slot in the current frame.
    fn stack_index(&self, kind: AddrKind, slot: usize) -> Result<usize> {
        let frame = self.frame()?;
        match kind {
            AddrKind::Local if slot < frame.locals => Ok(frame.local_slot(slot)),
            AddrKind::Param if slot < frame.argc => Ok(frame.param_slot(slot)),
            _ => Err(Error::internal(format!(
                "{} slot {} outside the current frame",
                kind, slot
            ))),
        }
    }

    /// The link in slot `slot` of the running function's capture table.
    fn lexical_link(&self, slot: usize) -> Result<ObjId> {
        let function = self.frame()?.function;
        let table = self
            .heap
            .function(function)
            .map(|f| f.captures)
            .ok_or_else(|| Error::internal("running frame has no function"))?;
        let link = self.heap.element(table, slot)?;
        if !self.heap.is_link(link) {
            return Err(Error::internal(format!("capture slot {} holds no link", slot)));
        }
        Ok(link)
    }

    fn read_address(&mut self, id: ObjId) -> Result<ObjId> {
        let address = self.address(id)?;
        let value = match address.kind {
            AddrKind::Local | AddrKind::Param => {
                let index = self.stack_index(address.kind, address.slot)?;
                self.heap.deref(self.slot(index)?)
            }
            AddrKind::Lexical => self.heap.deref(self.lexical_link(address.slot)?),
            AddrKind::Property => {
                if address.global && !self.heap.has_property(address.base, address.key)? {
                    return Err(Error::reference_error(format!(
                        "{} is not defined",
                        self.heap.string(address.key)?
                    )));
                }
                if self.heap.is_object(address.base) {
                    self.get(address.base, address.key)?
                } else {
                    Heap::UNDEFINED
                }
            }
            AddrKind::Catch => {
                let index = self
                    .trap_count
                    .checked_sub(1 + address.slot)
                    .ok_or_else(|| Error::internal("catch address without a trap"))?;
                let trap = self.heap.element(self.traps, index)?;
                self.heap.read_field(trap, Field::Thrown)?
            }
        };
        Ok(if value.is_none() { Heap::UNDEFINED } else { value })
    }

    fn write_address(&mut self, id: ObjId, value: ObjId) -> Result<()> {
        let address = self.address(id)?;
        match address.kind {
            AddrKind::Local | AddrKind::Param => {
                let index = self.stack_index(address.kind, address.slot)?;
                let current = self.slot(index)?;
                if self.heap.is_link(current) {
                    self.heap.assign(value, current, Field::Target)
                } else {
                    self.set_slot(index, value)
                }
            }
            AddrKind::Lexical => {
                let link = self.lexical_link(address.slot)?;
                self.heap.assign(value, link, Field::Target)
            }
            AddrKind::Property => {
                if self.heap.is_object(address.base) {
                    self.put(address.base, address.key, value, false)
                } else {
                    Ok(())
                }
            }
            AddrKind::Catch => Err(Error::internal("catch slots are read-only")),
        }
    }

    /// Fills one capture slot of the function on top of the stack. A stack
    /// slot is promoted to a link in place the first time it is captured.
    fn capture(&mut self, instruction: &Instruction) -> Result<()> {
        let kind = instruction.addr(0)?;
        let source = instruction.count(1)?;
        let dest = instruction.count(2)?;

        let link = match kind {
            AddrKind::Local | AddrKind::Param => {
                let index = self.stack_index(kind, source)?;
                let current = self.slot(index)?;
                if self.heap.is_link(current) {
                    current
                } else {
                    let link = self.heap.new_link(current)?;
                    self.set_slot(index, link)?;
                    link
                }
            }
            AddrKind::Lexical => self.lexical_link(source)?,
            other => {
                return Err(Error::internal(format!("cannot capture a {} address", other)));
            }
        };

        let function = self.peek(0)?;
        let table = self
            .heap
            .function(function)
            .map(|f| f.captures)
            .ok_or_else(|| Error::internal("capture target is not a function"))?;
        self.heap.assign(link, table, Field::Element(dest as u32))
    }

    /// Converts a value into an interned property name.
    pub(crate) fn to_property_key(&mut self, id: ObjId) -> Result<ObjId> {
        if let Ok(HeapObject::String { .. }) = self.heap.get(id) {
            return Ok(id);
        }
        let text = self.value(id).to_string();
        self.heap.new_string(&text)
    }

    // ========================================================================
    // Property access through accessors
    // ========================================================================

    /// `[[Get]]`: reads `name` from `object` or its chain, running a getter
    /// if one is found.
    pub fn get(&mut self, object: ObjId, name: ObjId) -> Result<ObjId> {
        let Some(property) = self.heap.get_property(object, name)? else {
            return Ok(Heap::UNDEFINED);
        };
        let p = self.heap.property(property)?;
        if !p.accessor {
            return Ok(if p.value.is_none() { Heap::UNDEFINED } else { p.value });
        }
        let getter = p.getter;
        if getter.is_none() {
            return Ok(Heap::UNDEFINED);
        }
        self.call(getter, object, &[])
    }

    /// `[[Get]]` by text.
    pub fn get_named(&mut self, object: ObjId, name: &str) -> Result<ObjId> {
        match self.heap.find_string(name) {
            Some(name) => self.get(object, name),
            None => Ok(Heap::UNDEFINED),
        }
    }

    /// `[[Put]]`: assigns through a setter, updates an own data property,
    /// or creates a fresh open data property. Rejected assignments are
    /// silently dropped unless `throw` is set.
    pub fn put(&mut self, object: ObjId, name: ObjId, value: ObjId, throw: bool) -> Result<()> {
        if !self.heap.can_put(object, name)? {
            if throw {
                return Err(Error::type_error(format!(
                    "cannot assign to read-only property '{}'",
                    self.heap.string(name)?
                )));
            }
            return Ok(());
        }

        if let Some(property) = self.heap.get_property(object, name)? {
            let p = self.heap.property(property)?;
            if p.accessor {
                let setter = p.setter;
                self.call(setter, object, &[value])?;
                return Ok(());
            }
            if p.owner == object {
                return self.heap.assign(value, property, Field::Value);
            }
        }
        self.heap
            .define_own_property(object, name, PropertyDescriptor::open(value), throw)?;
        Ok(())
    }

    /// `[[Put]]` by text.
    pub fn put_named(&mut self, object: ObjId, name: &str, value: ObjId) -> Result<()> {
        let name = self.heap.new_string(name)?;
        self.put(object, name, value, true)?;
        self.heap.discard(name)
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    fn pop_trap(&mut self) -> Result<()> {
        if self.trap_count == 0 {
            return Err(Error::internal("trap stack underflow"));
        }
        self.trap_count -= 1;
        self.heap
            .assign(ObjId::NONE, self.traps, Field::Element(self.trap_count as u32))
    }

    /// Drops traps until only `count` remain.
    pub(crate) fn truncate_traps(&mut self, count: usize) -> Result<()> {
        while self.trap_count > count {
            self.pop_trap()?;
        }
        Ok(())
    }

    /// Returns the value on top of the stack from the current frame, first
    /// running the innermost finalizer still guarding it. The value waits
    /// in the finalizer's pending slot as a link; `EndFinally` resumes.
    fn begin_return(&mut self) -> Result<()> {
        let trap_base = self.frame()?.trap_base;
        let depth = self.frames.len();
        while self.trap_count > trap_base {
            let trap = self.heap.element(self.traps, self.trap_count - 1)?;
            let record = match self.heap.get(trap) {
                Ok(HeapObject::Trap(record)) => record.clone(),
                _ => return Err(Error::internal("trap stack holds a non-trap")),
            };
            self.pop_trap()?;
            if let (Some(finally), true) = (record.finally, record.frames == depth) {
                let link = self.heap.new_link(self.peek(0)?)?;
                self.truncate(record.sp)?;
                self.push(link)?;
                trace!(finally, "return runs finalizer");
                self.pc = finally;
                return Ok(());
            }
        }
        self.do_return()
    }

    /// Parks the value on top of the stack and raises it.
    fn throw_top(&mut self) -> Result<()> {
        let value = self.peek(0)?;
        self.set_register(REG_EXCEPTION, value)?;
        self.pop()?;
        Err(Error::Thrown(render(&self.heap, value)))
    }

    /// Routes a catchable error to the innermost trap owned by this loop.
    /// Anything else, or a throw with no such trap, is returned with the
    /// thrown value left in the exception register.
    fn handle_error(&mut self, err: Error, depth: usize) -> Result<()> {
        if !err.is_catchable() {
            return Err(err);
        }
        let thrown = match err {
            Error::Thrown(_) => self.register(REG_EXCEPTION)?,
            ref other => {
                let error = self.new_error(other.guest_name(), &other.guest_message())?;
                self.set_register(REG_EXCEPTION, error)?;
                error
            }
        };

        let trap = match self.trap_count.checked_sub(1) {
            Some(index) => self.heap.element(self.traps, index)?,
            None => ObjId::NONE,
        };
        let record = match self.heap.get(trap) {
            Ok(HeapObject::Trap(record)) if record.frames > depth => record.clone(),
            _ => return Err(Error::Thrown(render(&self.heap, thrown))),
        };
        debug!(
            frames = record.frames,
            sp = record.sp,
            "unwinding to trap"
        );

        self.frames.truncate(record.frames);
        self.truncate(record.sp)?;
        match (record.catch, record.finally) {
            (Some(catch), _) => {
                self.heap.assign(thrown, trap, Field::Thrown)?;
                self.pc = catch;
            }
            (None, Some(finally)) => {
                self.pop_trap()?;
                self.push(thrown)?;
                self.pc = finally;
            }
            (None, None) => return Err(Error::internal("trap without handlers")),
        }
        self.set_register(REG_EXCEPTION, ObjId::NONE)
    }
}

fn less_than(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(a), Value::String(b)) => a < b,
        _ => left.to_number() < right.to_number(),
    }
}

fn less_or_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(a), Value::String(b)) => a <= b,
        _ => left.to_number() <= right.to_number(),
    }
}
