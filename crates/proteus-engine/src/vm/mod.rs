// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The bytecode virtual machine.
//!
//! ## Structure
//!
//! - `interpreter` - VM state and the fetch-decode-execute loop
//! - `frame` - calling convention and re-entrant calls
//! - `value` - value snapshots and conversions
//! - `builtins` - prototypes, the global object and host functions
//! - `hooks` - named host hooks

pub mod builtins;
pub mod frame;
pub mod hooks;
pub mod interpreter;
pub mod value;

use crate::Result;
use crate::gc::ObjId;

pub use builtins::Realm;
pub use frame::Frame;
pub use hooks::{Hook, Hooks};
pub use interpreter::Vm;
pub use value::Value;

/// A function implemented by the host: receives `this` and the arguments,
/// returns the result value.
pub type HostFn = fn(&mut Vm, ObjId, &[ObjId]) -> Result<ObjId>;
