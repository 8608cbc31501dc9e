// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Calls, closures, globals and host re-entry.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::*;
use proteus_engine::ast::build::*;
use proteus_engine::{Error, Heap, Value, Vm, VmConfig};

fn observe_call(target: serde_json::Value) -> serde_json::Value {
    expr(call(ident("$observe"), vec![target]))
}

#[test]
fn test_counter_closure_accumulates() {
    // function makeCounter() {
    //   var n = 0;
    //   return function () { n = n + 27; return n; };
    // }
    // var counter = makeCounter();
    // $observe(counter()); (four times)
    let mut body = vec![
        function(
            "makeCounter",
            &[],
            vec![
                var("n", Some(num(0.0))),
                ret(Some(function_expr(
                    &[],
                    vec![
                        expr(assign("=", ident("n"), binary("+", ident("n"), num(27.0)))),
                        ret(Some(ident("n"))),
                    ],
                ))),
            ],
        ),
        var("counter", Some(call(ident("makeCounter"), vec![]))),
    ];
    for _ in 0..4 {
        body.push(observe_call(call(ident("counter"), vec![])));
    }
    assert_eq!(
        observe(program(body)),
        vec![n(27.0), n(54.0), n(81.0), n(108.0)]
    );
}

#[test]
fn test_counters_do_not_share_state() {
    let mut body = vec![
        function(
            "make",
            &["step"],
            vec![
                var("total", Some(num(0.0))),
                ret(Some(function_expr(
                    &[],
                    vec![
                        expr(assign("+=", ident("total"), ident("step"))),
                        ret(Some(ident("total"))),
                    ],
                ))),
            ],
        ),
        var("a", Some(call(ident("make"), vec![num(1.0)]))),
        var("b", Some(call(ident("make"), vec![num(10.0)]))),
    ];
    body.push(observe_call(call(ident("a"), vec![])));
    body.push(observe_call(call(ident("b"), vec![])));
    body.push(observe_call(call(ident("a"), vec![])));
    assert_eq!(observe(program(body)), vec![n(1.0), n(10.0), n(2.0)]);
}

#[test]
fn test_capture_through_two_levels() {
    // function outer() {
    //   var x = 1;
    //   function middle() { return function () { x = x * 2; return x; }; }
    //   var inner = middle();
    //   inner(); inner();
    //   return x;
    // }
    let values = observe(program(vec![
        function(
            "outer",
            &[],
            vec![
                var("x", Some(num(1.0))),
                function(
                    "middle",
                    &[],
                    vec![ret(Some(function_expr(
                        &[],
                        vec![
                            expr(assign("=", ident("x"), binary("*", ident("x"), num(2.0)))),
                            ret(Some(ident("x"))),
                        ],
                    )))],
                ),
                var("inner", Some(call(ident("middle"), vec![]))),
                expr(call(ident("inner"), vec![])),
                expr(call(ident("inner"), vec![])),
                ret(Some(ident("x"))),
            ],
        ),
        observe_call(call(ident("outer"), vec![])),
    ]));
    assert_eq!(values, vec![n(4.0)]);
}

#[test]
fn test_recursion() {
    // function fact(n) { if (n <= 1) return 1; return n * fact(n - 1); }
    let values = observe(program(vec![
        function(
            "fact",
            &["n"],
            vec![
                if_(
                    binary("<=", ident("n"), num(1.0)),
                    ret(Some(num(1.0))),
                    None,
                ),
                ret(Some(binary(
                    "*",
                    ident("n"),
                    call(ident("fact"), vec![binary("-", ident("n"), num(1.0))]),
                ))),
            ],
        ),
        observe_call(call(ident("fact"), vec![num(5.0)])),
    ]));
    assert_eq!(values, vec![n(120.0)]);
}

#[test]
fn test_named_function_expression_can_recurse() {
    // var f = function g(n) { return n ? g(n - 1) + 1 : 0; };
    // $observe(f(3)); $observe(typeof g);
    // var h = function g(g) { return g; }; $observe(h(5));
    let values = observe(program(vec![
        var(
            "f",
            Some(named_function_expr(
                "g",
                &["n"],
                vec![ret(Some(conditional(
                    ident("n"),
                    binary(
                        "+",
                        call(ident("g"), vec![binary("-", ident("n"), num(1.0))]),
                        num(1.0),
                    ),
                    num(0.0),
                )))],
            )),
        ),
        observe_call(call(ident("f"), vec![num(3.0)])),
        observe_call(unary("typeof", ident("g"))),
        var(
            "h",
            Some(named_function_expr("g", &["g"], vec![ret(Some(ident("g")))])),
        ),
        observe_call(call(ident("h"), vec![num(5.0)])),
    ]));
    assert_eq!(values, vec![n(3.0), Value::String("undefined".into()), n(5.0)]);
}

#[test]
fn test_declared_dollar_names_are_called_as_functions() {
    // function $twice(x) { return x * 2; }
    // function apply($cb) { return $cb(1); }
    // $observe($twice(4), apply(function (x) { return x + 1; }));
    let values = observe(program(vec![
        function("$twice", &["x"], vec![ret(Some(binary("*", ident("x"), num(2.0))))]),
        function("apply", &["$cb"], vec![ret(Some(call(ident("$cb"), vec![num(1.0)])))]),
        expr(call(
            ident("$observe"),
            vec![
                call(ident("$twice"), vec![num(4.0)]),
                call(
                    ident("apply"),
                    vec![function_expr(&["x"], vec![ret(Some(binary("+", ident("x"), num(1.0))))])],
                ),
            ],
        )),
    ]));
    assert_eq!(values, vec![n(8.0), n(2.0)]);
}

#[test]
fn test_missing_arguments_read_as_undefined() {
    let values = observe(program(vec![
        function("second", &["a", "b"], vec![ret(Some(ident("b")))]),
        observe_call(call(ident("second"), vec![num(1.0)])),
        observe_call(call(ident("second"), vec![num(1.0), num(2.0), num(3.0)])),
    ]));
    assert_eq!(values, vec![Value::Undefined, n(2.0)]);
}

#[test]
fn test_parameters_are_assignable() {
    let values = observe(program(vec![
        function(
            "f",
            &["a"],
            vec![
                expr(assign("=", ident("a"), binary("+", ident("a"), num(1.0)))),
                ret(Some(ident("a"))),
            ],
        ),
        observe_call(call(ident("f"), vec![num(41.0)])),
    ]));
    assert_eq!(values, vec![n(42.0)]);
}

#[test]
fn test_function_without_return_yields_undefined() {
    let values = observe(program(vec![
        function("f", &[], vec![var("x", Some(num(1.0)))]),
        observe_call(call(ident("f"), vec![])),
    ]));
    assert_eq!(values, vec![Value::Undefined]);
}

#[test]
fn test_this_in_method_calls() {
    // var o = { k: 5, get: function () { return this.k; } };
    let values = observe(program(vec![
        var(
            "o",
            Some(object(vec![
                prop("k", num(5.0)),
                prop("read", function_expr(&[], vec![ret(Some(member(this(), "k")))])),
            ])),
        ),
        observe_call(call(member(ident("o"), "read"), vec![])),
    ]));
    assert_eq!(values, vec![n(5.0)]);
}

#[test]
fn test_function_prototype_call_reenters() {
    // function add(b) { return this.a + b; }
    // $observe(add.call({ a: 2 }, 3));
    let values = observe(program(vec![
        function(
            "add",
            &["b"],
            vec![ret(Some(binary("+", member(this(), "a"), ident("b"))))],
        ),
        observe_call(call(
            member(ident("add"), "call"),
            vec![object(vec![prop("a", num(2.0))]), num(3.0)],
        )),
    ]));
    assert_eq!(values, vec![n(5.0)]);
}

#[test]
fn test_hook_calls_back_into_guest_code() {
    let mut vm = Vm::new(VmConfig::default()).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    let hooks = proteus_engine::Hooks::new()
        .with("$apply", |vm, args| {
            let depth = vm.frame_depth();
            let result = vm.call(args[0], Heap::UNDEFINED, &args[1..])?;
            assert_eq!(vm.frame_depth(), depth);
            Ok(result)
        })
        .with("$observe", move |vm, args| {
            log.borrow_mut().push(vm.value(args[0]));
            Ok(Heap::UNDEFINED)
        });

    let doc = program(vec![
        function("double", &["x"], vec![ret(Some(binary("*", ident("x"), num(2.0))))]),
        observe_call(call(ident("$apply"), vec![ident("double"), num(21.0)])),
    ]);
    run_with(&mut vm, doc, hooks).unwrap();
    assert_eq!(*seen.borrow(), vec![n(42.0)]);
    assert_eq!(vm.stack_height(), 0);
    vm.check_invariants().unwrap();
}

#[test]
fn test_globals_are_shared_across_functions() {
    // g = 5; function f() { g = g + 1; return g; } f();
    let values = observe(program(vec![
        expr(assign("=", ident("g"), num(5.0))),
        function(
            "f",
            &[],
            vec![
                expr(assign("=", ident("g"), binary("+", ident("g"), num(1.0)))),
                ret(Some(ident("g"))),
            ],
        ),
        observe_call(call(ident("f"), vec![])),
        observe_call(ident("g")),
    ]));
    assert_eq!(values, vec![n(6.0), n(6.0)]);
}

#[test]
fn test_builtin_globals() {
    let values = observe(program(vec![
        observe_call(ident("undefined")),
        observe_call(binary("===", ident("NaN"), ident("NaN"))),
        observe_call(ident("Infinity")),
        observe_call(binary("===", ident("globalThis"), this())),
    ]));
    assert_eq!(
        values,
        vec![
            Value::Undefined,
            Value::Boolean(false),
            n(f64::INFINITY),
            Value::Boolean(true)
        ]
    );
}

#[test]
fn test_unbound_global_read_is_a_reference_error() {
    let err = run_err(program(vec![observe_call(ident("missing"))]));
    match err {
        Error::Uncaught(message) => {
            assert_eq!(message, "ReferenceError: missing is not defined");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_calling_a_non_function_is_a_type_error() {
    let err = run_err(program(vec![
        var("x", Some(num(1.0))),
        expr(call(ident("x"), vec![])),
    ]));
    assert!(matches!(err, Error::Uncaught(ref message) if message.starts_with("TypeError")));
}

#[test]
fn test_call_depth_limit() {
    // function r() { return r(); } r();
    let (_, observed) = observe_on(
        VmConfig::default().with_max_call_depth(16),
        program(vec![
            function("r", &[], vec![ret(Some(call(ident("r"), vec![])))]),
            expr(call(ident("r"), vec![])),
        ]),
    );
    assert!(matches!(
        observed,
        Err(Error::CallDepthExceeded { limit: 16 })
    ));
}

#[test]
fn test_stack_limit() {
    // function r(a) { return r(a + 1); } r(0);
    let (_, observed) = observe_on(
        VmConfig::default().with_stack_size(64),
        program(vec![
            function(
                "r",
                &["a"],
                vec![ret(Some(call(
                    ident("r"),
                    vec![binary("+", ident("a"), num(1.0))],
                )))],
            ),
            expr(call(ident("r"), vec![num(0.0)])),
        ]),
    );
    assert!(matches!(observed, Err(Error::StackOverflow { limit: 64 })));
}

#[test]
fn test_vm_can_run_twice() {
    let mut vm = Vm::new(VmConfig::default()).unwrap();
    let doc = program(vec![expr(assign("=", ident("runs"), num(1.0)))]);
    run_with(&mut vm, doc, proteus_engine::Hooks::new()).unwrap();

    let log = Rc::new(RefCell::new(Observations::default()));
    let doc = program(vec![observe_call(ident("runs"))]);
    run_with(&mut vm, doc, observing_hooks(&log)).unwrap();
    assert_eq!(log.borrow().values, vec![n(1.0)]);
}
