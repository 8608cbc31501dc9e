// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Heap object representation.
//!
//! Every runtime value lives in a heap slot addressed by an [`ObjId`]. A slot
//! holds a [`HeapCell`]: the reference count, the referrer edges that
//! account for it, and the [`HeapObject`] payload itself.

use std::fmt;

use crate::compiler::bytecode::AddrKind;
use crate::vm::HostFn;

/// A reference to a heap slot.
///
/// Id 0 is [`ObjId::NONE`], the "no value" sentinel: it is never allocated
/// and never reference-counted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjId(pub u32);

impl ObjId {
    /// The "no value" sentinel
    pub const NONE: ObjId = ObjId(0);

    /// Whether this is the sentinel.
    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns the arena index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("#none")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// A strong-reference-carrying field of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Object prototype link
    Prototype,
    /// Object's first property
    Head,
    /// Function capture table
    Captures,
    /// Property data value
    Value,
    /// Property getter
    Getter,
    /// Property setter
    Setter,
    /// Property name
    Name,
    /// Next property of the same object
    Next,
    /// Link target
    Target,
    /// Value thrown into a trap
    Thrown,
    /// Base object of a property address
    Base,
    /// Name of a property address
    Key,
    /// Vector element
    Element(u32),
}

/// One strong reference: `owner.field` holds the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Referrer {
    /// The holding object
    pub owner: ObjId,
    /// The holding field
    pub field: Field,
}

/// Class tag of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClass {
    /// Plain object
    Object,
    /// Callable object
    Function,
    /// Error object created for a failed operation or by guest code
    Error,
}

impl ObjectClass {
    /// The tag as guest code would print it.
    pub fn name(self) -> &'static str {
        match self {
            ObjectClass::Object => "Object",
            ObjectClass::Function => "Function",
            ObjectClass::Error => "Error",
        }
    }
}

/// What runs when a function object is invoked.
#[derive(Clone, Copy)]
pub enum Callable {
    /// Bytecode function
    Guest {
        /// Entry offset in the linked program
        entry: usize,
        /// Declared parameter count
        arity: usize,
    },
    /// Native function
    Host(HostFn),
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Guest { entry, arity } => write!(f, "guest@{}/{}", entry, arity),
            Callable::Host(_) => f.write_str("host"),
        }
    }
}

/// Function payload of a callable object.
#[derive(Debug, Clone, Copy)]
pub struct FunctionData {
    /// Code to run
    pub callable: Callable,
    /// Capture table Vector (`NONE` for host functions)
    pub captures: ObjId,
}

/// Payload of an Object-kind slot.
#[derive(Debug, Clone)]
pub struct ObjectData {
    /// Prototype: another object or the pinned `null`
    pub prototype: ObjId,
    /// Whether new properties may be added
    pub extensible: bool,
    /// Class tag
    pub class: ObjectClass,
    /// Most recently added own property
    pub head: ObjId,
    /// Set for callable objects
    pub function: Option<FunctionData>,
}

/// Payload of a Property-kind slot.
#[derive(Debug, Clone)]
pub struct PropertyData {
    /// Interned name
    pub name: ObjId,
    /// Data value (data properties)
    pub value: ObjId,
    /// Getter (accessor properties)
    pub getter: ObjId,
    /// Setter (accessor properties)
    pub setter: ObjId,
    /// Accessor rather than data property
    pub accessor: bool,
    /// `[[Writable]]`
    pub writable: bool,
    /// `[[Enumerable]]`
    pub enumerable: bool,
    /// `[[Configurable]]`
    pub configurable: bool,
    /// Owning object; not counted
    pub owner: ObjId,
    /// Next (older) property of the owner
    pub next: ObjId,
    /// Next entry in the same hash bucket; not counted
    pub hash_next: ObjId,
}

/// Payload of an Address-kind slot.
#[derive(Debug, Clone)]
pub struct AddressData {
    /// Storage kind
    pub kind: AddrKind,
    /// Slot index (locals, params, captures, traps)
    pub slot: usize,
    /// Base object (property addresses)
    pub base: ObjId,
    /// Property name (property addresses)
    pub key: ObjId,
    /// A global binding: reading it while absent is a ReferenceError
    pub global: bool,
}

/// Payload of a Trap-kind slot.
#[derive(Debug, Clone)]
pub struct TrapData {
    /// Catch handler offset
    pub catch: Option<usize>,
    /// Finalizer offset
    pub finally: Option<usize>,
    /// Stack height to unwind to
    pub sp: usize,
    /// Frame depth the trap belongs to
    pub frames: usize,
    /// Value caught by the handler
    pub thrown: ObjId,
}

/// The tagged variant over every heap object kind.
#[derive(Debug, Clone)]
pub enum HeapObject {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// A number
    Number(f64),
    /// An interned string with its hash
    String {
        /// The text
        text: String,
        /// FNV-1a hash of the text
        hash: u32,
    },
    /// An object
    Object(ObjectData),
    /// A property record
    Property(PropertyData),
    /// A storage location
    Address(AddressData),
    /// By-reference indirection to another value
    Link(ObjId),
    /// Fixed-size array of ids
    Vector(Vec<ObjId>),
    /// An active exception handler
    Trap(TrapData),
}

impl HeapObject {
    /// Kind name, as printed by diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            HeapObject::Undefined => "undefined",
            HeapObject::Null => "null",
            HeapObject::Boolean(_) => "boolean",
            HeapObject::Number(_) => "number",
            HeapObject::String { .. } => "string",
            HeapObject::Object(_) => "object",
            HeapObject::Property(_) => "property",
            HeapObject::Address(_) => "addr",
            HeapObject::Link(_) => "link",
            HeapObject::Vector(_) => "vector",
            HeapObject::Trap(_) => "trap",
        }
    }

    /// Every counted field and its current occupant, in release order.
    pub fn counted_fields(&self) -> Vec<(Field, ObjId)> {
        match self {
            HeapObject::Object(object) => {
                let mut fields = vec![
                    (Field::Head, object.head),
                    (Field::Prototype, object.prototype),
                ];
                if let Some(function) = &object.function {
                    fields.push((Field::Captures, function.captures));
                }
                fields
            }
            HeapObject::Property(property) => vec![
                (Field::Value, property.value),
                (Field::Getter, property.getter),
                (Field::Setter, property.setter),
                (Field::Name, property.name),
                (Field::Next, property.next),
            ],
            HeapObject::Address(address) => {
                vec![(Field::Base, address.base), (Field::Key, address.key)]
            }
            HeapObject::Link(target) => vec![(Field::Target, *target)],
            HeapObject::Vector(elements) => elements
                .iter()
                .enumerate()
                .map(|(i, id)| (Field::Element(i as u32), *id))
                .collect(),
            HeapObject::Trap(trap) => vec![(Field::Thrown, trap.thrown)],
            _ => Vec::new(),
        }
    }
}

/// One occupied heap slot.
#[derive(Debug, Clone)]
pub struct HeapCell {
    /// Pinned cells are never counted and never reclaimed
    pub pinned: bool,
    /// Number of strong references
    pub refcount: u32,
    /// Who holds those references
    pub referrers: Vec<Referrer>,
    /// The payload
    pub object: HeapObject,
}

impl HeapCell {
    /// Creates an unreferenced cell.
    pub fn new(object: HeapObject) -> Self {
        Self {
            pinned: false,
            refcount: 0,
            referrers: Vec::new(),
            object,
        }
    }

    /// Creates a pinned cell.
    pub fn pinned(object: HeapObject) -> Self {
        Self {
            pinned: true,
            ..Self::new(object)
        }
    }
}
