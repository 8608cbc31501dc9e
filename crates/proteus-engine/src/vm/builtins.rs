// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Realm scaffolding and host functions.
//!
//! The object prototype is created first since the function prototype and
//! the global object both inherit from it.
//!
//! | Global | Kind |
//! |--------|------|
//! | `undefined`, `NaN`, `Infinity` | read-only values |
//! | `globalThis` | the global object |
//! | `Object` | `create`, `getPrototypeOf`, `defineProperty`, `keys` |
//! | `Error` | builds `{ name, message }` error objects |
//!
//! `Object.prototype.hasOwnProperty` and `Function.prototype.call` are the
//! only prototype methods.

use super::HostFn;
use super::interpreter::{REG_REALM, Vm};
use super::value::Value;
use crate::gc::{Callable, Heap, ObjId, ObjectClass, PropertyDescriptor};
use crate::{Error, Result};

/// The built-in objects every program starts with.
#[derive(Debug, Clone, Copy, Default)]
pub struct Realm {
    /// Root of every prototype chain
    pub object_prototype: ObjId,
    /// Prototype of every function object
    pub function_prototype: ObjId,
    /// The global object
    pub global: ObjId,
}

impl Realm {
    /// Builds the realm inside `vm`. Its objects are held by VM registers.
    pub(crate) fn install(vm: &mut Vm) -> Result<()> {
        let object_prototype = vm.heap.new_object(Heap::NULL, ObjectClass::Object)?;
        vm.set_register(REG_REALM, object_prototype)?;
        let function_prototype = vm.heap.new_function(
            object_prototype,
            Callable::Host(function_prototype_noop),
            0,
        )?;
        vm.set_register(REG_REALM + 1, function_prototype)?;
        let global = vm.heap.new_object(object_prototype, ObjectClass::Object)?;
        vm.set_register(REG_REALM + 2, global)?;

        vm.realm = Realm {
            object_prototype,
            function_prototype,
            global,
        };

        define_method(vm, object_prototype, "hasOwnProperty", object_has_own_property)?;
        define_method(vm, function_prototype, "call", function_call)?;

        let nan = vm.heap.new_number(f64::NAN)?;
        let infinity = vm.heap.new_number(f64::INFINITY)?;
        define_value(vm, global, "undefined", PropertyDescriptor::data(Heap::UNDEFINED, false, false, false))?;
        define_value(vm, global, "NaN", PropertyDescriptor::data(nan, false, false, false))?;
        define_value(vm, global, "Infinity", PropertyDescriptor::data(infinity, false, false, false))?;
        define_value(vm, global, "globalThis", PropertyDescriptor::data(global, true, false, true))?;

        let object = define_method(vm, global, "Object", object_constructor)?;
        define_value(
            vm,
            object,
            "prototype",
            PropertyDescriptor::data(object_prototype, false, false, false),
        )?;
        define_method(vm, object, "create", object_create)?;
        define_method(vm, object, "getPrototypeOf", object_get_prototype_of)?;
        define_method(vm, object, "defineProperty", object_define_property)?;
        define_method(vm, object, "keys", object_keys)?;

        define_method(vm, global, "Error", error_constructor)?;
        Ok(())
    }
}

fn define_value(vm: &mut Vm, target: ObjId, name: &str, desc: PropertyDescriptor) -> Result<()> {
    let key = vm.heap.new_string(name)?;
    vm.heap.define_own_property(target, key, desc, true)?;
    Ok(())
}

/// Installs a non-enumerable host method and returns the function object.
fn define_method(vm: &mut Vm, target: ObjId, name: &str, f: HostFn) -> Result<ObjId> {
    let function = vm
        .heap
        .new_function(vm.realm.function_prototype, Callable::Host(f), 0)?;
    define_value(vm, target, name, PropertyDescriptor::data(function, true, false, true))?;
    Ok(function)
}

/// Argument `i`, or `undefined` when the caller passed fewer.
pub fn arg(args: &[ObjId], i: usize) -> ObjId {
    match args.get(i) {
        Some(id) if !id.is_none() => *id,
        _ => Heap::UNDEFINED,
    }
}

fn require_object(vm: &Vm, id: ObjId, what: &str) -> Result<ObjId> {
    if vm.heap.is_object(id) {
        Ok(id)
    } else {
        Err(Error::type_error(format!(
            "{} called on non-object {}",
            what,
            vm.value(id)
        )))
    }
}

impl Vm {
    /// Creates an error object with own `name` and `message` properties.
    pub fn new_error(&mut self, name: &str, message: &str) -> Result<ObjId> {
        let error = self
            .heap
            .new_object(self.realm.object_prototype, ObjectClass::Error)?;
        for (key, text) in [("name", name), ("message", message)] {
            let value = self.heap.new_string(text)?;
            define_value(self, error, key, PropertyDescriptor::data(value, true, false, true))?;
        }
        Ok(error)
    }

    /// Reads a descriptor object's field, if present.
    fn descriptor_field(&mut self, object: ObjId, name: &str) -> Result<Option<ObjId>> {
        let Some(key) = self.heap.find_string(name) else {
            return Ok(None);
        };
        if !self.heap.has_property(object, key)? {
            return Ok(None);
        }
        self.get(object, key).map(Some)
    }

    /// ToPropertyDescriptor over a guest object.
    fn to_property_descriptor(&mut self, object: ObjId) -> Result<PropertyDescriptor> {
        let object = require_object(self, object, "Object.defineProperty")?;
        let flag = |vm: &Vm, id: Option<ObjId>| id.map(|id| vm.value(id).to_boolean());

        let enumerable = self.descriptor_field(object, "enumerable")?;
        let configurable = self.descriptor_field(object, "configurable")?;
        let writable = self.descriptor_field(object, "writable")?;
        let desc = PropertyDescriptor {
            value: self.descriptor_field(object, "value")?,
            get: self.descriptor_field(object, "get")?,
            set: self.descriptor_field(object, "set")?,
            writable: flag(self, writable),
            enumerable: flag(self, enumerable),
            configurable: flag(self, configurable),
        };

        for accessor in [desc.get, desc.set] {
            if let Some(id) = accessor {
                match self.value(id) {
                    Value::Undefined | Value::Function(_) => {}
                    other => {
                        return Err(Error::type_error(format!(
                            "accessor must be a function, got {}",
                            other.type_of()
                        )));
                    }
                }
            }
        }
        if desc.is_accessor() && desc.is_data() {
            return Err(Error::type_error(
                "a property descriptor cannot mix accessors with a value or writable",
            ));
        }
        Ok(desc)
    }
}

fn function_prototype_noop(_vm: &mut Vm, _this: ObjId, _args: &[ObjId]) -> Result<ObjId> {
    Ok(Heap::UNDEFINED)
}

/// `Function.prototype.call(thisArg, ...args)`
fn function_call(vm: &mut Vm, this: ObjId, args: &[ObjId]) -> Result<ObjId> {
    if vm.heap.function(this).is_none() {
        return Err(Error::type_error("Function.prototype.call on a non-function"));
    }
    let rest = args.get(1..).unwrap_or(&[]);
    vm.call(this, arg(args, 0), rest)
}

/// `Object.prototype.hasOwnProperty(name)`
fn object_has_own_property(vm: &mut Vm, this: ObjId, args: &[ObjId]) -> Result<ObjId> {
    let this = require_object(vm, this, "hasOwnProperty")?;
    let key = vm.to_property_key(arg(args, 0))?;
    let found = vm.heap.get_own_property(this, key)?.is_some();
    vm.heap.discard(key)?;
    Ok(vm.heap.boolean(found))
}

/// `Object(value)`
fn object_constructor(vm: &mut Vm, _this: ObjId, args: &[ObjId]) -> Result<ObjId> {
    let value = arg(args, 0);
    if vm.heap.is_object(value) {
        return Ok(value);
    }
    vm.heap
        .new_object(vm.realm.object_prototype, ObjectClass::Object)
}

/// `Object.create(proto)`
fn object_create(vm: &mut Vm, _this: ObjId, args: &[ObjId]) -> Result<ObjId> {
    let prototype = arg(args, 0);
    if prototype != Heap::NULL && !vm.heap.is_object(prototype) {
        return Err(Error::type_error(format!(
            "object prototype may only be an object or null: {}",
            vm.value(prototype)
        )));
    }
    vm.heap.new_object(prototype, ObjectClass::Object)
}

/// `Object.getPrototypeOf(object)`
fn object_get_prototype_of(vm: &mut Vm, _this: ObjId, args: &[ObjId]) -> Result<ObjId> {
    let object = require_object(vm, arg(args, 0), "Object.getPrototypeOf")?;
    vm.heap.prototype_of(object)
}

/// `Object.defineProperty(object, name, descriptor)`
fn object_define_property(vm: &mut Vm, _this: ObjId, args: &[ObjId]) -> Result<ObjId> {
    let object = require_object(vm, arg(args, 0), "Object.defineProperty")?;
    let key = vm.to_property_key(arg(args, 1))?;
    let desc = vm.to_property_descriptor(arg(args, 2))?;
    let outcome = vm.heap.define_own_property(object, key, desc, true);
    vm.heap.discard(key)?;
    outcome?;
    Ok(object)
}

/// `Object.keys(object)`: own enumerable names as `{0: .., length: n}`.
fn object_keys(vm: &mut Vm, _this: ObjId, args: &[ObjId]) -> Result<ObjId> {
    let object = require_object(vm, arg(args, 0), "Object.keys")?;
    let mut names = Vec::new();
    for property in vm.heap.own_properties(object)? {
        let p = vm.heap.property(property)?;
        if p.enumerable {
            names.push(p.name);
        }
    }

    let result = vm
        .heap
        .new_object(vm.realm.object_prototype, ObjectClass::Object)?;
    for (index, name) in names.iter().enumerate() {
        let key = vm.heap.new_string(&index.to_string())?;
        vm.heap
            .define_own_property(result, key, PropertyDescriptor::open(*name), true)?;
    }
    let length = vm.heap.new_number(names.len() as f64)?;
    define_value(vm, result, "length", PropertyDescriptor::open(length))?;
    Ok(result)
}

/// `Error(message)`
fn error_constructor(vm: &mut Vm, _this: ObjId, args: &[ObjId]) -> Result<ObjId> {
    let message = match vm.value(arg(args, 0)) {
        Value::Undefined => String::new(),
        other => other.to_string(),
    };
    vm.new_error("Error", &message)
}
