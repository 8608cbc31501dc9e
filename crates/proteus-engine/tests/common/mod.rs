// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Shared helpers for the integration tests.
//!
//! Programs report what they see through two hooks:
//! - `$observe(a, b, ...)` records the value of every argument
//! - `$locals()` records the running frame's local slots

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use proteus_engine::{Heap, Hooks, ObjId, Result, SyntaxTree, Value, Vm, VmConfig, compile};

/// Everything a run reported.
#[derive(Debug, Default)]
pub struct Observations {
    /// `$observe` arguments, in call order
    pub values: Vec<Value>,
    /// One entry per `$locals()` call; unassigned slots are `ObjId::NONE`
    pub locals: Vec<Vec<ObjId>>,
    /// `$locals()` snapshots as values
    pub local_values: Vec<Vec<Value>>,
}

/// Hooks that record into `log`.
pub fn observing_hooks(log: &Rc<RefCell<Observations>>) -> Hooks {
    let values = Rc::clone(log);
    let locals = Rc::clone(log);
    Hooks::new()
        .with("$observe", move |vm, args| {
            let mut log = values.borrow_mut();
            log.values.extend(args.iter().map(|id| vm.value(*id)));
            Ok(Heap::UNDEFINED)
        })
        .with("$locals", move |vm, _args| {
            let slots = vm.locals()?;
            let mut log = locals.borrow_mut();
            log.local_values
                .push(slots.iter().map(|id| vm.value(*id)).collect());
            log.locals.push(slots);
            Ok(Heap::UNDEFINED)
        })
}

/// Compiles and runs `doc` on a fresh VM.
pub fn run_with(vm: &mut Vm, doc: serde_json::Value, hooks: Hooks) -> Result<ObjId> {
    let tree = SyntaxTree::from_value(&doc)?;
    let program = compile(&tree)?;
    vm.run(&program, hooks)
}

/// Runs `doc` with the observing hooks and returns the VM (for heap checks)
/// together with what the program reported.
pub fn observe_on(config: VmConfig, doc: serde_json::Value) -> (Vm, Result<Observations>) {
    let mut vm = Vm::new(config).expect("VM should start");
    let log = Rc::new(RefCell::new(Observations::default()));
    let outcome = run_with(&mut vm, doc, observing_hooks(&log));
    let observed = outcome.map(|_| log.take());
    (vm, observed)
}

/// Runs `doc` with default limits and returns the observed values,
/// panicking on any error.
pub fn observe(doc: serde_json::Value) -> Vec<Value> {
    let (vm, observed) = observe_on(VmConfig::default(), doc);
    let observed = observed.expect("program should run");
    vm.check_invariants().expect("heap should stay consistent");
    observed.values
}

/// Runs `doc` with default limits and returns the error it stopped with.
pub fn run_err(doc: serde_json::Value) -> proteus_engine::Error {
    let (_, observed) = observe_on(VmConfig::default(), doc);
    observed.expect_err("program should fail")
}

/// Shorthand for a number value.
pub fn n(value: f64) -> Value {
    Value::Number(value)
}

/// Shorthand for a string value.
pub fn s(text: &str) -> Value {
    Value::String(text.to_string())
}
