// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! ESTree node constructors.
//!
//! Embedders without a front end at hand (and the test suites) build syntax
//! trees with these helpers instead of spelling out JSON by hand:
//!
//! ```rust
//! use proteus_engine::ast::build::*;
//!
//! // var a = 20 + 3;
//! let tree = program(vec![var("a", Some(binary("+", num(20.0), num(3.0))))]);
//! assert_eq!(tree["body"][0]["type"], "VariableDeclaration");
//! ```

use serde_json::{Value, json};

/// `Program` with the given statements.
pub fn program(body: Vec<Value>) -> Value {
    json!({ "type": "Program", "body": body })
}

/// `var name = init;`
pub fn var(name: &str, init: Option<Value>) -> Value {
    vars(vec![(name, init)])
}

/// `var a = x, b = y;`
pub fn vars(declarators: Vec<(&str, Option<Value>)>) -> Value {
    let declarations: Vec<Value> = declarators
        .into_iter()
        .map(|(name, init)| {
            json!({ "type": "VariableDeclarator", "id": ident(name), "init": init })
        })
        .collect();
    json!({ "type": "VariableDeclaration", "kind": "var", "declarations": declarations })
}

/// An identifier reference.
pub fn ident(name: &str) -> Value {
    json!({ "type": "Identifier", "name": name })
}

/// A number literal.
pub fn num(value: f64) -> Value {
    json!({ "type": "Literal", "value": value })
}

/// A string literal.
pub fn string(value: &str) -> Value {
    json!({ "type": "Literal", "value": value })
}

/// A boolean literal.
pub fn boolean(value: bool) -> Value {
    json!({ "type": "Literal", "value": value })
}

/// The `null` literal.
pub fn null() -> Value {
    json!({ "type": "Literal", "value": null })
}

/// `this`
pub fn this() -> Value {
    json!({ "type": "ThisExpression" })
}

/// `left op right`
pub fn binary(op: &str, left: Value, right: Value) -> Value {
    json!({ "type": "BinaryExpression", "operator": op, "left": left, "right": right })
}

/// `left && right` / `left || right`
pub fn logical(op: &str, left: Value, right: Value) -> Value {
    json!({ "type": "LogicalExpression", "operator": op, "left": left, "right": right })
}

/// `op argument`
pub fn unary(op: &str, argument: Value) -> Value {
    json!({ "type": "UnaryExpression", "operator": op, "prefix": true, "argument": argument })
}

/// `++x`, `x--`, ...
pub fn update(op: &str, prefix: bool, argument: Value) -> Value {
    json!({ "type": "UpdateExpression", "operator": op, "prefix": prefix, "argument": argument })
}

/// `target op value`
pub fn assign(op: &str, target: Value, value: Value) -> Value {
    json!({ "type": "AssignmentExpression", "operator": op, "left": target, "right": value })
}

/// `test ? consequent : alternate`
pub fn conditional(test: Value, consequent: Value, alternate: Value) -> Value {
    json!({
        "type": "ConditionalExpression",
        "test": test,
        "consequent": consequent,
        "alternate": alternate
    })
}

/// `object.name`
pub fn member(object: Value, name: &str) -> Value {
    json!({ "type": "MemberExpression", "object": object, "property": ident(name), "computed": false })
}

/// `object[property]`
pub fn index(object: Value, property: Value) -> Value {
    json!({ "type": "MemberExpression", "object": object, "property": property, "computed": true })
}

/// `callee(arguments...)`
pub fn call(callee: Value, arguments: Vec<Value>) -> Value {
    json!({ "type": "CallExpression", "callee": callee, "arguments": arguments })
}

/// An expression statement.
pub fn expr(expression: Value) -> Value {
    json!({ "type": "ExpressionStatement", "expression": expression })
}

/// `return argument;`
pub fn ret(argument: Option<Value>) -> Value {
    json!({ "type": "ReturnStatement", "argument": argument })
}

/// `{ body }`
pub fn block(body: Vec<Value>) -> Value {
    json!({ "type": "BlockStatement", "body": body })
}

/// `if (test) consequent else alternate`
pub fn if_(test: Value, consequent: Value, alternate: Option<Value>) -> Value {
    json!({ "type": "IfStatement", "test": test, "consequent": consequent, "alternate": alternate })
}

/// `while (test) body`
pub fn while_(test: Value, body: Value) -> Value {
    json!({ "type": "WhileStatement", "test": test, "body": body })
}

/// `for (init; test; update) body`
pub fn for_(init: Option<Value>, test: Option<Value>, update: Option<Value>, body: Value) -> Value {
    json!({ "type": "ForStatement", "init": init, "test": test, "update": update, "body": body })
}

/// `throw argument;`
pub fn throw(argument: Value) -> Value {
    json!({ "type": "ThrowStatement", "argument": argument })
}

/// `try block catch (param) handler finally finalizer`
pub fn try_(
    body: Vec<Value>,
    handler: Option<(&str, Vec<Value>)>,
    finalizer: Option<Vec<Value>>,
) -> Value {
    let handler = handler.map(|(param, body)| {
        json!({ "type": "CatchClause", "param": ident(param), "body": block(body) })
    });
    json!({
        "type": "TryStatement",
        "block": block(body),
        "handler": handler,
        "finalizer": finalizer.map(block)
    })
}

/// `function name(params) { body }`
pub fn function(name: &str, params: &[&str], body: Vec<Value>) -> Value {
    let params: Vec<Value> = params.iter().map(|p| ident(p)).collect();
    json!({ "type": "FunctionDeclaration", "id": ident(name), "params": params, "body": block(body) })
}

/// `function (params) { body }`
pub fn function_expr(params: &[&str], body: Vec<Value>) -> Value {
    let params: Vec<Value> = params.iter().map(|p| ident(p)).collect();
    json!({ "type": "FunctionExpression", "id": null, "params": params, "body": block(body) })
}

/// `function name(params) { body }` used as an expression.
pub fn named_function_expr(name: &str, params: &[&str], body: Vec<Value>) -> Value {
    let params: Vec<Value> = params.iter().map(|p| ident(p)).collect();
    json!({ "type": "FunctionExpression", "id": ident(name), "params": params, "body": block(body) })
}

/// `{ key: value, ... }`
pub fn object(properties: Vec<Value>) -> Value {
    json!({ "type": "ObjectExpression", "properties": properties })
}

/// `key: value` inside an object literal.
pub fn prop(key: &str, value: Value) -> Value {
    json!({ "type": "Property", "key": ident(key), "value": value, "kind": "init", "computed": false })
}

/// `get key() { body }` inside an object literal.
pub fn getter(key: &str, body: Vec<Value>) -> Value {
    json!({ "type": "Property", "key": ident(key), "value": function_expr(&[], body), "kind": "get", "computed": false })
}

/// `set key(param) { body }` inside an object literal.
pub fn setter(key: &str, param: &str, body: Vec<Value>) -> Value {
    json!({ "type": "Property", "key": ident(key), "value": function_expr(&[param], body), "kind": "set", "computed": false })
}
