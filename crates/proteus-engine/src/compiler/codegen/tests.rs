// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Tests for the code generator.

use super::*;
use crate::ast::build::*;
use crate::compiler::scope::ScopeTree;

fn compile_scopes(doc: serde_json::Value) -> Result<Vec<Vec<Instruction>>> {
    let tree = SyntaxTree::from_value(&doc)?;
    let mut scopes = ScopeTree::resolve(&tree)?;
    emit(&tree, &mut scopes)?;
    Ok(scopes.iter().map(|scope| scope.code.clone()).collect())
}

fn compile_ok(doc: serde_json::Value) -> Vec<Vec<Instruction>> {
    compile_scopes(doc).expect("Compilation should succeed")
}

fn opcodes(code: &[Instruction]) -> Vec<OpCode> {
    code.iter().map(|i| i.opcode).collect()
}

#[test]
fn test_empty_program() {
    let scopes = compile_ok(program(vec![]));
    assert_eq!(
        opcodes(&scopes[0]),
        vec![OpCode::Reserve, OpCode::LoadUndefined, OpCode::Return]
    );
}

#[test]
fn test_var_without_initializer_only_reserves() {
    let scopes = compile_ok(program(vec![vars(vec![("a", None), ("b", None)])]));
    assert_eq!(scopes[0][0].operands[0], Operand::Count(2));
    assert_eq!(scopes[0].len(), 3);
}

#[test]
fn test_var_with_initializer() {
    let scopes = compile_ok(program(vec![var("a", Some(num(1000.0)))]));
    assert_eq!(
        opcodes(&scopes[0]),
        vec![
            OpCode::Reserve,
            OpCode::Addr,
            OpCode::LoadNumber,
            OpCode::Store,
            OpCode::Pop,
            OpCode::LoadUndefined,
            OpCode::Return,
        ]
    );
    assert_eq!(scopes[0][1].operands[0], Operand::Addr(AddrKind::Local));
    assert_eq!(scopes[0][1].operands[1], Operand::Slot(0));
}

#[test]
fn test_precedence_follows_tree_shape() {
    // 2 + 3 * 5
    let scopes = compile_ok(program(vec![var(
        "a",
        Some(binary("+", num(2.0), binary("*", num(3.0), num(5.0)))),
    )]));
    let ops = opcodes(&scopes[0]);
    let mul = ops.iter().position(|op| *op == OpCode::Mul).unwrap();
    let add = ops.iter().position(|op| *op == OpCode::Add).unwrap();
    assert!(mul < add);
}

#[test]
fn test_expression_statement_discards_value() {
    let scopes = compile_ok(program(vec![expr(binary("===", num(1.0), num(1.0)))]));
    assert_eq!(
        &opcodes(&scopes[0])[1..5],
        &[OpCode::LoadNumber, OpCode::LoadNumber, OpCode::StrictEq, OpCode::Pop]
    );
}

#[test]
fn test_call_evaluates_callee_last() {
    let scopes = compile_ok(program(vec![
        function("f", &["x"], vec![]),
        expr(call(ident("f"), vec![num(7.0)])),
    ]));
    let ops = opcodes(&scopes[0]);
    let call = ops.iter().position(|op| *op == OpCode::Call).unwrap();
    assert_eq!(
        &ops[call - 5..=call],
        &[
            OpCode::LoadNumber, // argument
            OpCode::LoadNumber, // argc
            OpCode::LoadUndefined,
            OpCode::Addr,
            OpCode::Fetch,
            OpCode::Call
        ]
    );
}

#[test]
fn test_hoisted_function_is_stored_in_prologue() {
    let scopes = compile_ok(program(vec![
        expr(call(ident("f"), vec![])),
        function("f", &[], vec![]),
    ]));
    assert_eq!(
        &opcodes(&scopes[0])[..5],
        &[
            OpCode::Reserve,
            OpCode::Addr,
            OpCode::Function,
            OpCode::Store,
            OpCode::Pop
        ]
    );
}

#[test]
fn test_closure_captures() {
    // function outer() { var n = 0; return function () { n = n + 27; return n; }; }
    let scopes = compile_ok(program(vec![function(
        "outer",
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
    )]));

    let outer = &scopes[1];
    let function = outer
        .iter()
        .position(|i| i.opcode == OpCode::Function)
        .unwrap();
    assert_eq!(outer[function].operands[0], Operand::Scope(ScopeId(2)));
    assert_eq!(outer[function].operands[1], Operand::Count(1));
    let capture = &outer[function + 1];
    assert_eq!(capture.opcode, OpCode::Capture);
    assert_eq!(capture.operands[0], Operand::Addr(AddrKind::Local));
    assert_eq!(capture.operands[1], Operand::Slot(0));
    assert_eq!(capture.operands[2], Operand::Slot(0));

    let inner = &scopes[2];
    assert!(inner.iter().any(|i| {
        i.opcode == OpCode::Addr && i.operands[0] == Operand::Addr(AddrKind::Lexical)
    }));
}

#[test]
fn test_global_names_use_global_addresses() {
    let scopes = compile_ok(program(vec![expr(assign("=", ident("g"), num(1.0)))]));
    assert_eq!(scopes[0][1].opcode, OpCode::GlobalAddr);
    assert_eq!(scopes[0][1].operands[0], Operand::Str("g".into()));
}

#[test]
fn test_global_freevar_is_not_captured() {
    let scopes = compile_ok(program(vec![function("f", &[], vec![expr(ident("g"))])]));
    assert!(!opcodes(&scopes[0]).contains(&OpCode::Capture));
    assert_eq!(scopes[1][1].opcode, OpCode::GlobalAddr);
}

#[test]
fn test_hook_call() {
    let scopes = compile_ok(program(vec![expr(call(ident("$trace"), vec![num(1.0)]))]));
    let hook = scopes[0]
        .iter()
        .find(|i| i.opcode == OpCode::Hook)
        .unwrap();
    assert_eq!(hook.operands[0], Operand::Str("$trace".into()));
    assert_eq!(hook.operands[1], Operand::Count(1));
    assert!(!opcodes(&scopes[0]).contains(&OpCode::Call));
}

#[test]
fn test_declared_dollar_name_is_called_not_hooked() {
    let scopes = compile_ok(program(vec![
        function("$twice", &["x"], vec![ret(Some(binary("*", ident("x"), num(2.0))))]),
        expr(call(ident("$twice"), vec![num(1.0)])),
    ]));
    let ops = opcodes(&scopes[0]);
    assert!(ops.contains(&OpCode::Call));
    assert!(!ops.contains(&OpCode::Hook));
}

#[test]
fn test_duplicate_and_catch_declarations_reserve_distinct_slots() {
    // var a; var a; try {} catch (a) {}
    let scopes = compile_ok(program(vec![
        var("a", None),
        var("a", None),
        try_(vec![], Some(("a", vec![])), None),
    ]));
    assert_eq!(scopes[0][0].operands[0], Operand::Count(3));
    let enter = scopes[0].iter().find(|i| i.opcode == OpCode::TryEnter).unwrap();
    let Operand::Label(catch) = enter.operands[0] else {
        panic!("catch label missing");
    };
    assert_eq!(scopes[0][catch].operands[0], Operand::Addr(AddrKind::Local));
    assert_eq!(scopes[0][catch].operands[1], Operand::Slot(2));
}

#[test]
fn test_named_function_expression_stores_itself_in_prologue() {
    let scopes = compile_ok(program(vec![expr(named_function_expr(
        "g",
        &[],
        vec![ret(Some(ident("g")))],
    ))]));
    let g = &scopes[1];
    assert_eq!(g[0].operands[0], Operand::Count(1));
    assert_eq!(
        opcodes(&g[1..5]),
        vec![OpCode::Addr, OpCode::LoadCallee, OpCode::Store, OpCode::Pop]
    );
    assert_eq!(g[1].operands[1], Operand::Slot(0));
    assert!(!opcodes(&scopes[0]).contains(&OpCode::Capture));
}

#[test]
fn test_method_call_passes_object_as_this() {
    let scopes = compile_ok(program(vec![
        var("o", Some(object(vec![]))),
        expr(call(member(ident("o"), "m"), vec![])),
    ]));
    let ops = opcodes(&scopes[0]);
    let call = ops.iter().position(|op| *op == OpCode::Call).unwrap();
    assert_eq!(
        &ops[call - 5..call],
        &[
            OpCode::Fetch, // o
            OpCode::Dup,
            OpCode::LoadString,
            OpCode::PropertyAddr,
            OpCode::Fetch
        ]
    );
}

#[test]
fn test_if_without_else_gets_epilogue() {
    let scopes = compile_ok(program(vec![function(
        "f",
        &["x"],
        vec![if_(ident("x"), ret(Some(num(1.0))), None)],
    )]));
    let f = &scopes[1];
    let jump = f.iter().find(|i| i.opcode == OpCode::JumpIfFalse).unwrap();
    let Operand::Label(target) = jump.operands[0] else {
        panic!("jump was not patched to a label");
    };
    assert!(target < f.len());
    assert_eq!(f[target].opcode, OpCode::LoadUndefined);
    assert_eq!(f.last().unwrap().opcode, OpCode::Return);
}

#[test]
fn test_explicit_return_skips_epilogue() {
    let scopes = compile_ok(program(vec![function("f", &[], vec![ret(Some(num(1.0)))])]));
    assert_eq!(
        opcodes(&scopes[1]),
        vec![OpCode::Reserve, OpCode::LoadNumber, OpCode::Return]
    );
}

#[test]
fn test_try_catch_layout() {
    let scopes = compile_ok(program(vec![try_(
        vec![throw(num(1.0))],
        Some(("e", vec![])),
        None,
    )]));
    let code = &scopes[0];
    let enter = &code[1];
    assert_eq!(enter.opcode, OpCode::TryEnter);
    let Operand::Label(catch) = enter.operands[0] else {
        panic!("catch label missing");
    };
    assert_eq!(enter.operands[1], Operand::None);
    assert_eq!(
        opcodes(&code[catch..catch + 6]),
        vec![
            OpCode::Addr,
            OpCode::Addr,
            OpCode::Fetch,
            OpCode::Store,
            OpCode::Pop,
            OpCode::TryExit
        ]
    );
    assert_eq!(code[catch + 1].operands[0], Operand::Addr(AddrKind::Catch));
}

#[test]
fn test_try_catch_finally_nests_traps() {
    let scopes = compile_ok(program(vec![try_(
        vec![],
        Some(("e", vec![])),
        Some(vec![]),
    )]));
    let ops = opcodes(&scopes[0]);
    assert_eq!(ops.iter().filter(|op| **op == OpCode::TryEnter).count(), 2);
    assert_eq!(scopes[0][1].operands[0], Operand::None);
    assert!(ops.contains(&OpCode::LoadEmpty));
    assert!(ops.contains(&OpCode::EndFinally));
}

#[test]
fn test_object_literal() {
    let scopes = compile_ok(program(vec![var(
        "o",
        Some(object(vec![
            prop("a", num(1.0)),
            getter("b", vec![ret(Some(num(2.0)))]),
        ])),
    )]));
    let ops = opcodes(&scopes[0]);
    assert!(ops.contains(&OpCode::NewObject));
    assert!(ops.contains(&OpCode::DefineValue));
    assert!(ops.contains(&OpCode::DefineGetter));
}

#[test]
fn test_update_and_compound_assignment() {
    let scopes = compile_ok(program(vec![
        var("i", Some(num(0.0))),
        expr(update("++", false, ident("i"))),
        expr(assign("+=", ident("i"), num(2.0))),
    ]));
    let ops = opcodes(&scopes[0]);
    assert_eq!(ops.iter().filter(|op| **op == OpCode::Store).count(), 3);
    assert!(ops.contains(&OpCode::Sub));
}

#[test]
fn test_invalid_assignment_target() {
    let err = compile_scopes(program(vec![expr(assign("=", num(1.0), num(2.0)))])).unwrap_err();
    assert!(matches!(err, Error::Syntax(_)));
}

#[test]
fn test_unsupported_node() {
    let err = compile_scopes(serde_json::json!({
        "type": "Program",
        "body": [{ "type": "DebuggerStatement" }]
    }))
    .unwrap_err();
    assert!(matches!(err, Error::Syntax(_)));
}
