// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Memory management for the runtime.
//!
//! This module contains the object heap and everything built directly on it:
//! - Arena slots addressed by [`ObjId`]
//! - Reference counting through a single [`Heap::assign`] mutator
//! - String interning
//! - The property and prototype engine

pub mod heap;
pub mod object;
pub mod property;

pub use heap::Heap;
pub use object::{
    AddressData, Callable, Field, FunctionData, HeapCell, HeapObject, ObjId, ObjectClass,
    ObjectData, PropertyData, Referrer, TrapData,
};
pub use property::PropertyDescriptor;
