// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Property and prototype engine.
//!
//! An object's own properties form a singly linked list starting at its
//! `head`, newest first. A global open-chained hash table, keyed by the
//! interned name's hash combined with the owner id, indexes the same
//! records for lookup and is kept in step with the list on every insert and
//! removal.
//!
//! Only the parts that never run guest code live here. Reading through a
//! getter or writing through a setter needs the VM, see
//! [`Vm::get`](crate::vm::Vm::get) and [`Vm::put`](crate::vm::Vm::put).

use super::heap::Heap;
use super::object::{Field, HeapObject, ObjId, PropertyData};
use crate::vm::value::same_value;
use crate::{Error, Result};

/// A property descriptor with every field optional.
///
/// Getter and setter use `undefined` for "no function", as guest code
/// writes them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PropertyDescriptor {
    /// `[[Value]]`
    pub value: Option<ObjId>,
    /// `[[Get]]`
    pub get: Option<ObjId>,
    /// `[[Set]]`
    pub set: Option<ObjId>,
    /// `[[Writable]]`
    pub writable: Option<bool>,
    /// `[[Enumerable]]`
    pub enumerable: Option<bool>,
    /// `[[Configurable]]`
    pub configurable: Option<bool>,
}

impl PropertyDescriptor {
    /// A fully specified data descriptor.
    pub fn data(value: ObjId, writable: bool, enumerable: bool, configurable: bool) -> Self {
        Self {
            value: Some(value),
            writable: Some(writable),
            enumerable: Some(enumerable),
            configurable: Some(configurable),
            ..Self::default()
        }
    }

    /// The descriptor a plain assignment creates.
    pub fn open(value: ObjId) -> Self {
        Self::data(value, true, true, true)
    }

    /// Whether `get` or `set` is present.
    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    /// Whether `value` or `writable` is present.
    pub fn is_data(&self) -> bool {
        self.value.is_some() || self.writable.is_some()
    }

    /// Neither data nor accessor.
    pub fn is_generic(&self) -> bool {
        !self.is_accessor() && !self.is_data()
    }

    /// Whether every field is absent.
    pub fn is_empty(&self) -> bool {
        self.is_generic() && self.enumerable.is_none() && self.configurable.is_none()
    }
}

/// Getter/setter slot contents for a descriptor field.
fn accessor_slot(function: Option<ObjId>) -> ObjId {
    match function {
        None | Some(Heap::UNDEFINED) => ObjId::NONE,
        Some(id) => id,
    }
}

fn accessor_field(slot: ObjId) -> ObjId {
    if slot.is_none() { Heap::UNDEFINED } else { slot }
}

impl Heap {
    /// Returns a property record.
    pub fn property(&self, id: ObjId) -> Result<&PropertyData> {
        match self.get(id)? {
            HeapObject::Property(property) => Ok(property),
            other => Err(Error::internal(format!(
                "{:?} is a {}, not a property",
                id,
                other.kind_name()
            ))),
        }
    }

    fn property_mut(&mut self, id: ObjId) -> Result<&mut PropertyData> {
        match self.get_mut(id)? {
            HeapObject::Property(property) => Ok(property),
            other => Err(Error::internal(format!(
                "{:?} is a {}, not a property",
                id,
                other.kind_name()
            ))),
        }
    }

    /// The object's prototype (the pinned `null` at the chain's end).
    pub fn prototype_of(&self, object: ObjId) -> Result<ObjId> {
        Ok(self.object(object)?.prototype)
    }

    // ========================================================================
    // Hash table
    // ========================================================================

    fn bucket(&self, object: ObjId, name: ObjId) -> Result<usize> {
        let hash = match self.get(name)? {
            HeapObject::String { hash, .. } => *hash,
            other => {
                return Err(Error::internal(format!(
                    "property name {:?} is a {}",
                    name,
                    other.kind_name()
                )));
            }
        };
        let mixed = hash ^ object.0.wrapping_mul(0x9e37_79b1);
        Ok(mixed as usize % self.buckets.len())
    }

    fn hash_insert(&mut self, property: ObjId) -> Result<()> {
        let (owner, name) = {
            let p = self.property(property)?;
            (p.owner, p.name)
        };
        let bucket = self.bucket(owner, name)?;
        let head = self.buckets[bucket];
        self.property_mut(property)?.hash_next = head;
        self.buckets[bucket] = property;
        Ok(())
    }

    /// Removes a property from its hash chain.
    pub(crate) fn unhash(&mut self, property: ObjId) -> Result<()> {
        let (owner, name, after) = {
            let p = self.property(property)?;
            (p.owner, p.name, p.hash_next)
        };
        let bucket = self.bucket(owner, name)?;

        if self.buckets[bucket] == property {
            self.buckets[bucket] = after;
            return Ok(());
        }
        let mut cursor = self.buckets[bucket];
        while !cursor.is_none() {
            let next = self.property(cursor)?.hash_next;
            if next == property {
                self.property_mut(cursor)?.hash_next = after;
                return Ok(());
            }
            cursor = next;
        }
        Err(Error::internal(format!(
            "property {:?} missing from its hash chain",
            property
        )))
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// The own property record for `name`, if any.
    pub fn get_own_property(&self, object: ObjId, name: ObjId) -> Result<Option<ObjId>> {
        let mut cursor = self.buckets[self.bucket(object, name)?];
        while !cursor.is_none() {
            let property = self.property(cursor)?;
            if property.owner == object && property.name == name {
                return Ok(Some(cursor));
            }
            cursor = property.hash_next;
        }
        Ok(None)
    }

    /// Searches `object` and then its prototype chain.
    pub fn get_property(&self, object: ObjId, name: ObjId) -> Result<Option<ObjId>> {
        let mut current = object;
        while current != Heap::NULL {
            if let Some(property) = self.get_own_property(current, name)? {
                return Ok(Some(property));
            }
            current = self.prototype_of(current)?;
        }
        Ok(None)
    }

    /// Own-property lookup by text; never allocates.
    pub fn find_own(&self, object: ObjId, name: &str) -> Result<Option<ObjId>> {
        match self.find_string(name) {
            Some(name) => self.get_own_property(object, name),
            None => Ok(None),
        }
    }

    /// Whether `name` is found on `object` or its chain.
    pub fn has_property(&self, object: ObjId, name: ObjId) -> Result<bool> {
        Ok(self.get_property(object, name)?.is_some())
    }

    /// The full descriptor of a property record.
    pub fn descriptor(&self, property: ObjId) -> Result<PropertyDescriptor> {
        let p = self.property(property)?;
        let mut desc = PropertyDescriptor {
            enumerable: Some(p.enumerable),
            configurable: Some(p.configurable),
            ..PropertyDescriptor::default()
        };
        if p.accessor {
            desc.get = Some(accessor_field(p.getter));
            desc.set = Some(accessor_field(p.setter));
        } else {
            desc.value = Some(if p.value.is_none() { Heap::UNDEFINED } else { p.value });
            desc.writable = Some(p.writable);
        }
        Ok(desc)
    }

    /// Whether an assignment of `name` on `object` would be allowed.
    pub fn can_put(&self, object: ObjId, name: ObjId) -> Result<bool> {
        if let Some(own) = self.get_own_property(object, name)? {
            let p = self.property(own)?;
            return Ok(if p.accessor { !p.setter.is_none() } else { p.writable });
        }
        let extensible = self.object(object)?.extensible;
        let prototype = self.prototype_of(object)?;
        if prototype == Heap::NULL {
            return Ok(extensible);
        }
        match self.get_property(prototype, name)? {
            None => Ok(extensible),
            Some(inherited) => {
                let p = self.property(inherited)?;
                if p.accessor {
                    Ok(!p.setter.is_none())
                } else {
                    Ok(extensible && p.writable)
                }
            }
        }
    }

    /// Own property records in insertion order.
    pub fn own_properties(&self, object: ObjId) -> Result<Vec<ObjId>> {
        let mut properties = Vec::new();
        let mut cursor = self.object(object)?.head;
        while !cursor.is_none() {
            properties.push(cursor);
            cursor = self.property(cursor)?.next;
        }
        properties.reverse();
        Ok(properties)
    }

    /// Own property names in insertion order.
    pub fn own_keys(&self, object: ObjId) -> Result<Vec<ObjId>> {
        self.own_properties(object)?
            .into_iter()
            .map(|property| Ok(self.property(property)?.name))
            .collect()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    fn reject(&self, throw: bool, name: ObjId, reason: &str) -> Result<bool> {
        if throw {
            let name = self.string(name).unwrap_or("?");
            Err(Error::type_error(format!("{}: {}", reason, name)))
        } else {
            Ok(false)
        }
    }

    /// Removes an own property. Non-configurable properties are kept and
    /// reported (or thrown, when `throw` is set).
    pub fn delete_property(&mut self, object: ObjId, name: ObjId, throw: bool) -> Result<bool> {
        let Some(property) = self.get_own_property(object, name)? else {
            return Ok(true);
        };
        if !self.property(property)?.configurable {
            return self.reject(throw, name, "cannot delete property");
        }

        let next = self.property(property)?.next;
        let head = self.object(object)?.head;
        if head == property {
            self.assign(next, object, Field::Head)?;
            return Ok(true);
        }
        let mut cursor = head;
        while !cursor.is_none() {
            let after = self.property(cursor)?.next;
            if after == property {
                self.assign(next, cursor, Field::Next)?;
                return Ok(true);
            }
            cursor = after;
        }
        Err(Error::internal(format!(
            "property {:?} missing from the list of {:?}",
            property, object
        )))
    }

    /// Defines or updates an own property following the
    /// `[[DefineOwnProperty]]` state transitions.
    pub fn define_own_property(
        &mut self,
        object: ObjId,
        name: ObjId,
        desc: PropertyDescriptor,
        throw: bool,
    ) -> Result<bool> {
        let Some(property) = self.get_own_property(object, name)? else {
            if !self.object(object)?.extensible {
                return self.reject(throw, name, "object is not extensible");
            }
            self.insert_property(object, name, &desc)?;
            return Ok(true);
        };

        if desc.is_empty() {
            return Ok(true);
        }
        let current = self.descriptor(property)?;
        if self.is_subset(&desc, &current) {
            return Ok(true);
        }

        let configurable = current.configurable == Some(true);
        if !configurable {
            if desc.configurable == Some(true) {
                return self.reject(throw, name, "cannot redefine property");
            }
            if desc.enumerable.is_some() && desc.enumerable != current.enumerable {
                return self.reject(throw, name, "cannot redefine property");
            }
        }

        if desc.is_generic() {
            // Only the flags change
        } else if current.is_data() != desc.is_data() {
            if !configurable {
                return self.reject(throw, name, "cannot redefine property");
            }
            self.convert_property(property, desc.is_accessor())?;
        } else if current.is_data() {
            if !configurable && current.writable == Some(false) {
                if desc.writable == Some(true) {
                    return self.reject(throw, name, "cannot redefine property");
                }
                if let (Some(new), Some(old)) = (desc.value, current.value) {
                    if !same_value(self, new, old) {
                        return self.reject(throw, name, "cannot redefine property");
                    }
                }
            }
        } else if !configurable {
            let changed = |new: Option<ObjId>, old: Option<ObjId>| {
                matches!((new, old), (Some(n), Some(o)) if accessor_slot(Some(n)) != accessor_slot(Some(o)))
            };
            if changed(desc.set, current.set) || changed(desc.get, current.get) {
                return self.reject(throw, name, "cannot redefine property");
            }
        }

        self.apply_descriptor(property, &desc)?;
        Ok(true)
    }

    /// Whether every field present in `desc` already matches `current`.
    fn is_subset(&self, desc: &PropertyDescriptor, current: &PropertyDescriptor) -> bool {
        let same = |new: Option<ObjId>, old: Option<ObjId>| match (new, old) {
            (None, _) => true,
            (Some(n), Some(o)) => same_value(self, n, o),
            (Some(_), None) => false,
        };
        let same_flag = |new: Option<bool>, old: Option<bool>| new.is_none() || new == old;

        same(desc.value, current.value)
            && same(desc.get, current.get)
            && same(desc.set, current.set)
            && same_flag(desc.writable, current.writable)
            && same_flag(desc.enumerable, current.enumerable)
            && same_flag(desc.configurable, current.configurable)
    }

    fn insert_property(
        &mut self,
        object: ObjId,
        name: ObjId,
        desc: &PropertyDescriptor,
    ) -> Result<ObjId> {
        let accessor = desc.is_accessor();
        let property = self.alloc_property(HeapObject::Property(PropertyData {
            name: ObjId::NONE,
            value: ObjId::NONE,
            getter: ObjId::NONE,
            setter: ObjId::NONE,
            accessor,
            writable: !accessor && desc.writable.unwrap_or(false),
            enumerable: desc.enumerable.unwrap_or(false),
            configurable: desc.configurable.unwrap_or(false),
            owner: object,
            next: ObjId::NONE,
            hash_next: ObjId::NONE,
        }))?;

        self.assign(name, property, Field::Name)?;
        if accessor {
            self.assign(accessor_slot(desc.get), property, Field::Getter)?;
            self.assign(accessor_slot(desc.set), property, Field::Setter)?;
        } else {
            self.assign(desc.value.unwrap_or(Heap::UNDEFINED), property, Field::Value)?;
        }

        let head = self.object(object)?.head;
        self.assign(head, property, Field::Next)?;
        self.assign(property, object, Field::Head)?;
        self.hash_insert(property)?;
        Ok(property)
    }

    /// Flips a property between data and accessor, keeping its flags and
    /// resetting the rest to defaults.
    fn convert_property(&mut self, property: ObjId, to_accessor: bool) -> Result<()> {
        if to_accessor {
            self.assign(ObjId::NONE, property, Field::Value)?;
        } else {
            self.assign(ObjId::NONE, property, Field::Getter)?;
            self.assign(ObjId::NONE, property, Field::Setter)?;
            self.assign(Heap::UNDEFINED, property, Field::Value)?;
        }
        let p = self.property_mut(property)?;
        p.accessor = to_accessor;
        p.writable = false;
        Ok(())
    }

    fn apply_descriptor(&mut self, property: ObjId, desc: &PropertyDescriptor) -> Result<()> {
        if let Some(value) = desc.value {
            self.assign(value, property, Field::Value)?;
        }
        if desc.get.is_some() {
            self.assign(accessor_slot(desc.get), property, Field::Getter)?;
        }
        if desc.set.is_some() {
            self.assign(accessor_slot(desc.set), property, Field::Setter)?;
        }
        let p = self.property_mut(property)?;
        if let Some(writable) = desc.writable {
            p.writable = writable;
        }
        if let Some(enumerable) = desc.enumerable {
            p.enumerable = enumerable;
        }
        if let Some(configurable) = desc.configurable {
            p.configurable = configurable;
        }
        Ok(())
    }
}
