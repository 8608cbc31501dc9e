// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Traps, throws and hook failures.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::*;
use proteus_engine::ast::build::*;
use proteus_engine::{Error, Heap, Hooks, Value, Vm, VmConfig};

fn observe_call(args: Vec<serde_json::Value>) -> serde_json::Value {
    expr(call(ident("$observe"), args))
}

fn add_to(name: &str, amount: f64) -> serde_json::Value {
    expr(assign("+=", ident(name), num(amount)))
}

#[test]
fn test_catch_receives_thrown_value() {
    let values = observe(program(vec![
        try_(
            vec![throw(num(5.0)), observe_call(vec![string("not reached")])],
            Some(("e", vec![observe_call(vec![ident("e")])])),
            None,
        ),
        observe_call(vec![string("after")]),
    ]));
    assert_eq!(values, vec![n(5.0), s("after")]);
}

#[test]
fn test_try_without_throw_skips_handler() {
    let values = observe(program(vec![
        var("log", Some(num(0.0))),
        try_(
            vec![add_to("log", 1.0)],
            Some(("e", vec![add_to("log", 10.0)])),
            Some(vec![add_to("log", 100.0)]),
        ),
        observe_call(vec![ident("log")]),
    ]));
    assert_eq!(values, vec![n(101.0)]);
}

#[test]
fn test_catch_then_finally() {
    // try { log += 1; throw 5; } catch (e) { log += e * 10; } finally { log += 100; }
    let values = observe(program(vec![
        var("log", Some(num(0.0))),
        try_(
            vec![add_to("log", 1.0), throw(num(5.0))],
            Some((
                "e",
                vec![expr(assign(
                    "+=",
                    ident("log"),
                    binary("*", ident("e"), num(10.0)),
                ))],
            )),
            Some(vec![add_to("log", 100.0)]),
        ),
        observe_call(vec![ident("log")]),
    ]));
    assert_eq!(values, vec![n(151.0)]);
}

#[test]
fn test_finally_runs_and_rethrows() {
    // function f() { try { throw 1; } finally { $observe("cleanup"); } }
    // try { f(); } catch (e) { $observe(e); }
    let values = observe(program(vec![
        function(
            "f",
            &[],
            vec![try_(
                vec![throw(num(1.0))],
                None,
                Some(vec![observe_call(vec![string("cleanup")])]),
            )],
        ),
        try_(
            vec![expr(call(ident("f"), vec![]))],
            Some(("e", vec![observe_call(vec![ident("e")])])),
            None,
        ),
    ]));
    assert_eq!(values, vec![s("cleanup"), n(1.0)]);
}

#[test]
fn test_throw_from_handler_still_runs_finally() {
    let values = observe(program(vec![try_(
        vec![try_(
            vec![throw(string("first"))],
            Some(("e", vec![throw(string("second"))])),
            Some(vec![observe_call(vec![string("finally")])]),
        )],
        Some(("outer", vec![observe_call(vec![ident("outer")])])),
        None,
    )]));
    assert_eq!(values, vec![s("finally"), s("second")]);
}

#[test]
fn test_nested_traps_catch_innermost_first() {
    let values = observe(program(vec![try_(
        vec![
            try_(
                vec![throw(num(1.0))],
                Some(("inner", vec![observe_call(vec![ident("inner")])])),
                None,
            ),
            throw(num(2.0)),
        ],
        Some(("outer", vec![observe_call(vec![ident("outer")])])),
        None,
    )]));
    assert_eq!(values, vec![n(1.0), n(2.0)]);
}

#[test]
fn test_throw_unwinds_across_frames() {
    // function deep(n) { if (n === 0) throw "bottom"; return deep(n - 1) + 1; }
    let values = observe(program(vec![
        function(
            "deep",
            &["n"],
            vec![
                if_(
                    binary("===", ident("n"), num(0.0)),
                    throw(string("bottom")),
                    None,
                ),
                ret(Some(binary(
                    "+",
                    call(ident("deep"), vec![binary("-", ident("n"), num(1.0))]),
                    num(1.0),
                ))),
            ],
        ),
        try_(
            vec![expr(call(ident("deep"), vec![num(5.0)]))],
            Some(("e", vec![observe_call(vec![ident("e")])])),
            None,
        ),
        observe_call(vec![string("resumed")]),
    ]));
    assert_eq!(values, vec![s("bottom"), s("resumed")]);
}

#[test]
fn test_stack_is_restored_after_catch() {
    let (vm, observed) = observe_on(
        VmConfig::default(),
        program(vec![
            function("boom", &[], vec![throw(num(1.0))]),
            try_(
                vec![expr(binary(
                    "+",
                    num(1.0),
                    binary("*", num(2.0), call(ident("boom"), vec![])),
                ))],
                Some(("e", vec![])),
                None,
            ),
        ]),
    );
    observed.unwrap();
    assert_eq!(vm.stack_height(), 0);
    assert_eq!(vm.frame_depth(), 0);
    vm.check_invariants().unwrap();
}

#[test]
fn test_return_inside_try_discards_traps() {
    // function f() { try { return 1; } catch (e) { return 2; } }
    // $observe(f()); throw "escaped";
    let err = run_err(program(vec![
        function(
            "f",
            &[],
            vec![try_(
                vec![ret(Some(num(1.0)))],
                Some(("e", vec![ret(Some(num(2.0)))])),
                None,
            )],
        ),
        observe_call(vec![call(ident("f"), vec![])]),
        throw(string("escaped")),
    ]));
    assert!(matches!(err, Error::Uncaught(ref message) if message == "escaped"));
}

#[test]
fn test_catch_parameter_does_not_clobber_var() {
    // var e = 1; try { throw 2; } catch (e) { $observe(e); } $observe(e);
    // function f() { var e = "outer"; try { throw "inner"; } catch (e) {} return e; }
    let values = observe(program(vec![
        var("e", Some(num(1.0))),
        try_(
            vec![throw(num(2.0))],
            Some(("e", vec![observe_call(vec![ident("e")])])),
            None,
        ),
        observe_call(vec![ident("e")]),
        function(
            "f",
            &[],
            vec![
                var("e", Some(string("outer"))),
                try_(vec![throw(string("inner"))], Some(("e", vec![])), None),
                ret(Some(ident("e"))),
            ],
        ),
        observe_call(vec![call(ident("f"), vec![])]),
    ]));
    assert_eq!(values, vec![n(2.0), n(1.0), s("outer")]);
}

#[test]
fn test_return_runs_finally() {
    // function f() { try { return 1; } finally { $observe("fin"); } }
    // $observe(f());
    let (vm, observed) = observe_on(
        VmConfig::default(),
        program(vec![
            function(
                "f",
                &[],
                vec![try_(
                    vec![ret(Some(num(1.0)))],
                    None,
                    Some(vec![observe_call(vec![string("fin")])]),
                )],
            ),
            observe_call(vec![call(ident("f"), vec![])]),
        ]),
    );
    assert_eq!(observed.unwrap().values, vec![s("fin"), n(1.0)]);
    assert_eq!(vm.stack_height(), 0);
    vm.check_invariants().unwrap();
}

#[test]
fn test_return_runs_nested_finalizers_innermost_first() {
    // function f() {
    //   try { try { return "v"; } finally { $observe("inner"); } }
    //   finally { $observe("outer"); }
    // }
    let values = observe(program(vec![
        function(
            "f",
            &[],
            vec![try_(
                vec![try_(
                    vec![ret(Some(string("v")))],
                    None,
                    Some(vec![observe_call(vec![string("inner")])]),
                )],
                None,
                Some(vec![observe_call(vec![string("outer")])]),
            )],
        ),
        observe_call(vec![call(ident("f"), vec![])]),
    ]));
    assert_eq!(values, vec![s("inner"), s("outer"), s("v")]);
}

#[test]
fn test_return_from_handler_runs_finally() {
    // function f() { try { throw 1; } catch (e) { return e + 1; } finally { $observe("fin"); } }
    let values = observe(program(vec![
        function(
            "f",
            &[],
            vec![try_(
                vec![throw(num(1.0))],
                Some(("e", vec![ret(Some(binary("+", ident("e"), num(1.0))))])),
                Some(vec![observe_call(vec![string("fin")])]),
            )],
        ),
        observe_call(vec![call(ident("f"), vec![])]),
    ]));
    assert_eq!(values, vec![s("fin"), n(2.0)]);
}

#[test]
fn test_return_in_finally_wins() {
    // function f() { try { return 1; } finally { return 2; } }
    // function g() { try { throw "lost"; } finally { return "kept"; } }
    let values = observe(program(vec![
        function(
            "f",
            &[],
            vec![try_(
                vec![ret(Some(num(1.0)))],
                None,
                Some(vec![ret(Some(num(2.0)))]),
            )],
        ),
        function(
            "g",
            &[],
            vec![try_(
                vec![throw(string("lost"))],
                None,
                Some(vec![ret(Some(string("kept")))]),
            )],
        ),
        observe_call(vec![call(ident("f"), vec![]), call(ident("g"), vec![])]),
    ]));
    assert_eq!(values, vec![n(2.0), s("kept")]);
}

#[test]
fn test_uncaught_throw_is_reported() {
    let err = run_err(program(vec![throw(string("boom"))]));
    assert!(matches!(err, Error::Uncaught(ref message) if message == "boom"));
    assert_eq!(err.to_string(), "Uncaught boom");
}

#[test]
fn test_uncaught_error_object_renders_name_and_message() {
    let err = run_err(program(vec![throw(call(ident("Error"), vec![string("bad state")]))]));
    assert!(matches!(err, Error::Uncaught(ref message) if message == "Error: bad state"));
}

#[test]
fn test_runtime_errors_are_catchable() {
    let values = observe(program(vec![
        try_(
            vec![expr(ident("missing"))],
            Some((
                "e",
                vec![observe_call(vec![member(ident("e"), "name"), member(ident("e"), "message")])],
            )),
            None,
        ),
        try_(
            vec![expr(member(null(), "x"))],
            Some(("e", vec![observe_call(vec![member(ident("e"), "name")])])),
            None,
        ),
    ]));
    assert_eq!(
        values,
        vec![
            s("ReferenceError"),
            s("missing is not defined"),
            s("TypeError")
        ]
    );
}

#[test]
fn test_guest_throw_through_host_function_reaches_guest_trap() {
    // function thrower() { throw 7; }
    // try { thrower.call(null); } catch (e) { $observe(e); }
    let values = observe(program(vec![
        function("thrower", &[], vec![throw(num(7.0))]),
        try_(
            vec![expr(call(member(ident("thrower"), "call"), vec![null()]))],
            Some(("e", vec![observe_call(vec![ident("e")])])),
            None,
        ),
    ]));
    assert_eq!(values, vec![n(7.0)]);
}

#[test]
fn test_throw_from_getter_reaches_guest_trap() {
    let values = observe(program(vec![
        var("o", Some(object(vec![getter("bad", vec![throw(string("getter"))])]))),
        try_(
            vec![expr(member(ident("o"), "bad"))],
            Some(("e", vec![observe_call(vec![ident("e")])])),
            None,
        ),
    ]));
    assert_eq!(values, vec![s("getter")]);
}

#[test]
fn test_caught_value_can_be_captured() {
    // try { throw 3; } catch (e) { var get = function () { return e; }; }
    // $observe(get());
    let values = observe(program(vec![
        try_(
            vec![throw(num(3.0))],
            Some((
                "e",
                vec![var("get", Some(function_expr(&[], vec![ret(Some(ident("e")))])))],
            )),
            None,
        ),
        observe_call(vec![call(ident("get"), vec![])]),
    ]));
    assert_eq!(values, vec![n(3.0)]);
}

#[test]
fn test_trap_limit() {
    let mut nested = vec![expr(num(0.0))];
    for _ in 0..4 {
        nested = vec![try_(nested, Some(("e", vec![])), None)];
    }
    let (_, observed) = observe_on(VmConfig::default().with_max_traps(3), program(nested));
    assert!(matches!(observed, Err(Error::TrapOverflow { limit: 3 })));
}

#[test]
fn test_missing_hook_yields_undefined() {
    let values = observe(program(vec![observe_call(vec![call(
        ident("$nobody"),
        vec![num(1.0)],
    )])]));
    assert_eq!(values, vec![Value::Undefined]);
}

#[test]
fn test_hook_failure_stops_the_run() {
    let mut vm = Vm::new(VmConfig::default()).unwrap();
    let after = Rc::new(Cell::new(false));
    let flag = Rc::clone(&after);
    let hooks = Hooks::new()
        .with("$fail", |_vm, _args| Err(Error::hook("fail", "asked to fail")))
        .with("$after", move |_vm, _args| {
            flag.set(true);
            Ok(Heap::UNDEFINED)
        });

    // A hook failure is not a guest error: the trap does not see it
    let doc = program(vec![
        try_(
            vec![expr(call(ident("$fail"), vec![]))],
            Some(("e", vec![expr(call(ident("$after"), vec![]))])),
            None,
        ),
        expr(call(ident("$after"), vec![])),
    ]);
    let err = run_with(&mut vm, doc, hooks).unwrap_err();
    assert!(matches!(err, Error::Hook { ref name, .. } if name == "fail"));
    assert!(!after.get());
    assert_eq!(vm.stack_height(), 0);
}
