// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host-side value snapshots and the language's conversions.

use std::fmt;

use crate::gc::{Heap, HeapObject, ObjId, ObjectClass};

/// A snapshot of a heap value.
///
/// Objects are identified by id; everything else is copied out of the heap
/// so the snapshot stays valid while the VM keeps running.
#[derive(Debug, Clone)]
pub enum Value {
    /// undefined (also what "no value" reads as)
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Non-callable object
    Object(ObjId),
    /// Callable object
    Function(ObjId),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        strict_equals(self, other)
    }
}

impl Value {
    /// Reads `id` out of the heap, looking through links. Anything that is
    /// not a guest-visible value reads as undefined.
    pub fn from_heap(heap: &Heap, id: ObjId) -> Self {
        let id = heap.deref(id);
        if id.is_none() {
            return Value::Undefined;
        }
        match heap.get(id) {
            Ok(HeapObject::Null) => Value::Null,
            Ok(HeapObject::Boolean(b)) => Value::Boolean(*b),
            Ok(HeapObject::Number(n)) => Value::Number(*n),
            Ok(HeapObject::String { text, .. }) => Value::String(text.clone()),
            Ok(HeapObject::Object(object)) if object.function.is_some() => Value::Function(id),
            Ok(HeapObject::Object(_)) => Value::Object(id),
            _ => Value::Undefined,
        }
    }

    /// Returns true if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true if this value is null or undefined.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// The heap id of an object or function.
    pub fn as_object(&self) -> Option<ObjId> {
        match self {
            Value::Object(id) | Value::Function(id) => Some(*id),
            _ => None,
        }
    }

    /// The number, if this is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts the value to a boolean (ToBoolean).
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => !n.is_nan() && *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::Function(_) => true,
        }
    }

    /// Converts the value to a number (ToNumber). Objects convert to NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Object(_) | Value::Function(_) => f64::NAN,
        }
    }

    /// Returns the type of this value as a string.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&number_to_string(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Object(_) => write!(f, "[object Object]"),
            Value::Function(_) => write!(f, "function () {{ [code] }}"),
        }
    }
}

/// ToNumber for string contents.
pub fn string_to_number(text: &str) -> f64 {
    let trimmed = text.trim();
    match trimmed {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.starts_with("0x") || trimmed.starts_with("0X") => {
            u64::from_str_radix(&trimmed[2..], 16)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN)
        }
        // Rust accepts spellings like "inf" and "NaN" that guest code does not
        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// ToString for numbers: the shortest digits that round-trip, written
/// positionally for decimal exponents in `-6..21` and in exponent form
/// (`1e+21`, `1.5e-7`) outside it.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    // `{:e}` yields the shortest round-trip digits as `d[.ddd]e<exp>`
    let scientific = format!("{:e}", n.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    let point = exponent.parse::<i32>().unwrap_or(0) + 1;

    let body = if k <= point && point <= 21 {
        format!("{}{}", digits, "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (whole, fraction) = digits.split_at(point as usize);
        format!("{}.{}", whole, fraction)
    } else if -6 < point && point <= 0 {
        format!("0.{}{}", "0".repeat((-point) as usize), digits)
    } else {
        let sign = if point - 1 < 0 { '-' } else { '+' };
        let (lead, rest) = digits.split_at(1);
        let rest = if rest.is_empty() { String::new() } else { format!(".{}", rest) };
        format!("{}{}e{}{}", lead, rest, sign, (point - 1).abs())
    };
    if n < 0.0 { format!("-{}", body) } else { body }
}

/// Strict equality (`===`). NaN is unequal to itself; the zeroes are equal.
pub fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) => true,
        (Value::Null, Value::Null) => true,
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Object(a), Value::Object(b)) => a == b,
        (Value::Function(a), Value::Function(b)) => a == b,
        _ => false,
    }
}

/// Abstract equality comparison (`==`).
pub fn abstract_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null | Value::Undefined, Value::Null | Value::Undefined) => true,
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            *n == string_to_number(s)
        }
        (Value::Boolean(flag), other) | (other, Value::Boolean(flag)) => {
            let num = if *flag { 1.0 } else { 0.0 };
            abstract_equals(&Value::Number(num), other)
        }
        _ => strict_equals(a, b),
    }
}

/// Same-value comparison on heap ids: the zeroes differ and NaN is
/// unequal to itself.
pub fn same_value(heap: &Heap, a: ObjId, b: ObjId) -> bool {
    if a == b {
        return !matches!(heap.get(a), Ok(HeapObject::Number(n)) if n.is_nan());
    }
    match (Value::from_heap(heap, a), Value::from_heap(heap, b)) {
        (Value::Number(x), Value::Number(y)) => {
            x == y && x.is_sign_negative() == y.is_sign_negative()
        }
        (x, y) => strict_equals(&x, &y),
    }
}

/// Renders a value for diagnostics: errors print as `Name: message`.
pub fn render(heap: &Heap, id: ObjId) -> String {
    let value = Value::from_heap(heap, id);
    if let Some(object) = value.as_object() {
        if matches!(heap.object(object), Ok(o) if o.class == ObjectClass::Error) {
            let field = |name: &str| {
                heap.find_own(object, name)
                    .ok()
                    .flatten()
                    .and_then(|p| heap.property(p).ok())
                    .map(|p| Value::from_heap(heap, p.value).to_string())
                    .unwrap_or_default()
            };
            return format!("{}: {}", field("name"), field("message"));
        }
    }
    value.to_string()
}
