// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The reference-counted object heap.
//!
//! Slots are allocated from an arena and addressed by [`ObjId`]; ids are
//! never reused, so a reclaimed slot stays empty and [`Heap::contains`]
//! reports it gone. Every strong reference is installed through
//! [`Heap::assign`], which records a [`Referrer`] edge on the target next to
//! its count. When a count reaches zero the object is reclaimed and its own
//! outgoing references are released in turn.
//!
//! Cycles are never detected: two objects holding only each other stay
//! allocated forever.

use rustc_hash::FxHashMap;
use tracing::trace;

use super::object::{
    AddressData, Callable, Field, FunctionData, HeapCell, HeapObject, ObjId, ObjectClass,
    ObjectData, Referrer, TrapData,
};
use crate::{Error, Result};

/// 32-bit FNV-1a hash of a string.
pub fn fnv1a(text: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in text.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// The object heap.
#[derive(Debug)]
pub struct Heap {
    /// Slot 0 is the "no value" sentinel and stays empty
    cells: Vec<Option<HeapCell>>,
    /// Intern index: hash to live strings; not counted
    strings: FxHashMap<u32, Vec<ObjId>>,
    /// Global property hash table heads; not counted
    pub(crate) buckets: Vec<ObjId>,
    live: usize,
}

impl Heap {
    /// The pinned `undefined`
    pub const UNDEFINED: ObjId = ObjId(1);
    /// The pinned `null`
    pub const NULL: ObjId = ObjId(2);
    /// The pinned `true`
    pub const TRUE: ObjId = ObjId(3);
    /// The pinned `false`
    pub const FALSE: ObjId = ObjId(4);

    /// Creates a heap holding only the pinned constants.
    pub fn new(property_buckets: usize) -> Self {
        let mut heap = Self {
            cells: vec![None],
            strings: FxHashMap::default(),
            buckets: vec![ObjId::NONE; property_buckets.max(1)],
            live: 0,
        };
        for object in [
            HeapObject::Undefined,
            HeapObject::Null,
            HeapObject::Boolean(true),
            HeapObject::Boolean(false),
        ] {
            heap.cells.push(Some(HeapCell::pinned(object)));
            heap.live += 1;
        }
        heap
    }

    fn alloc(&mut self, cell: HeapCell) -> Result<ObjId> {
        let index = u32::try_from(self.cells.len())
            .map_err(|_| Error::internal("heap id space exhausted"))?;
        self.cells.push(Some(cell));
        self.live += 1;
        Ok(ObjId(index))
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Whether `id` names a live slot.
    pub fn contains(&self, id: ObjId) -> bool {
        matches!(self.cells.get(id.index()), Some(Some(_)))
    }

    /// Returns a live cell.
    pub fn cell(&self, id: ObjId) -> Result<&HeapCell> {
        match self.cells.get(id.index()) {
            Some(Some(cell)) => Ok(cell),
            Some(None) if id.is_none() => Err(Error::internal("dereferenced the no-value id")),
            Some(None) => Err(Error::internal(format!("heap id {:?} was reclaimed", id))),
            None => Err(Error::internal(format!(
                "heap id {:?} out of range ({} slots)",
                id,
                self.cells.len()
            ))),
        }
    }

    fn cell_mut(&mut self, id: ObjId) -> Result<&mut HeapCell> {
        let len = self.cells.len();
        match self.cells.get_mut(id.index()) {
            Some(Some(cell)) => Ok(cell),
            Some(None) => Err(Error::internal(format!("heap id {:?} was reclaimed", id))),
            None => Err(Error::internal(format!(
                "heap id {:?} out of range ({} slots)",
                id, len
            ))),
        }
    }

    /// Returns the payload of a live slot.
    #[inline]
    pub fn get(&self, id: ObjId) -> Result<&HeapObject> {
        Ok(&self.cell(id)?.object)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: ObjId) -> Result<&mut HeapObject> {
        Ok(&mut self.cell_mut(id)?.object)
    }

    /// Returns the object payload, or an internal error for other kinds.
    pub fn object(&self, id: ObjId) -> Result<&ObjectData> {
        match self.get(id)? {
            HeapObject::Object(object) => Ok(object),
            other => Err(Error::internal(format!(
                "{:?} is a {}, not an object",
                id,
                other.kind_name()
            ))),
        }
    }

    pub(crate) fn object_mut(&mut self, id: ObjId) -> Result<&mut ObjectData> {
        match self.get_mut(id)? {
            HeapObject::Object(object) => Ok(object),
            other => Err(Error::internal(format!(
                "{:?} is a {}, not an object",
                id,
                other.kind_name()
            ))),
        }
    }

    /// Whether `id` is a live Object-kind slot.
    pub fn is_object(&self, id: ObjId) -> bool {
        matches!(self.get(id), Ok(HeapObject::Object(_)))
    }

    /// The function payload of a callable object.
    pub fn function(&self, id: ObjId) -> Option<FunctionData> {
        match self.get(id) {
            Ok(HeapObject::Object(object)) => object.function,
            _ => None,
        }
    }

    /// The text of a String-kind slot.
    pub fn string(&self, id: ObjId) -> Result<&str> {
        match self.get(id)? {
            HeapObject::String { text, .. } => Ok(text),
            other => Err(Error::internal(format!(
                "{:?} is a {}, not a string",
                id,
                other.kind_name()
            ))),
        }
    }

    /// Current reference count (zero for pinned slots).
    pub fn refcount(&self, id: ObjId) -> u32 {
        self.cell(id).map(|cell| cell.refcount).unwrap_or(0)
    }

    /// The referrer edges accounting for `id`'s count.
    pub fn referrers(&self, id: ObjId) -> &[Referrer] {
        self.cell(id)
            .map(|cell| cell.referrers.as_slice())
            .unwrap_or(&[])
    }

    /// Number of live slots, pinned ones included.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of slots ever allocated (the next id).
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// The pinned boolean for `value`.
    #[inline]
    pub fn boolean(&self, value: bool) -> ObjId {
        if value { Self::TRUE } else { Self::FALSE }
    }

    // ========================================================================
    // Factories
    // ========================================================================

    /// Allocates a number.
    pub fn new_number(&mut self, value: f64) -> Result<ObjId> {
        self.alloc(HeapCell::new(HeapObject::Number(value)))
    }

    /// Returns the interned string for `text`, allocating it on a miss.
    pub fn new_string(&mut self, text: &str) -> Result<ObjId> {
        if let Some(id) = self.find_string(text) {
            return Ok(id);
        }
        let hash = fnv1a(text);
        let id = self.alloc(HeapCell::new(HeapObject::String {
            text: text.to_string(),
            hash,
        }))?;
        self.strings.entry(hash).or_default().push(id);
        Ok(id)
    }

    /// Probes the intern index without allocating.
    pub fn find_string(&self, text: &str) -> Option<ObjId> {
        self.strings.get(&fnv1a(text))?.iter().copied().find(|id| {
            matches!(self.get(*id), Ok(HeapObject::String { text: t, .. }) if t == text)
        })
    }

    /// Whether `id` is still in the intern index.
    pub fn is_interned(&self, id: ObjId) -> bool {
        match self.get(id) {
            Ok(HeapObject::String { hash, .. }) => self
                .strings
                .get(hash)
                .is_some_and(|ids| ids.contains(&id)),
            _ => false,
        }
    }

    fn unintern(&mut self, id: ObjId, hash: u32) {
        if let Some(ids) = self.strings.get_mut(&hash) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.strings.remove(&hash);
            }
        }
    }

    /// Allocates a plain object.
    pub fn new_object(&mut self, prototype: ObjId, class: ObjectClass) -> Result<ObjId> {
        let id = self.alloc(HeapCell::new(HeapObject::Object(ObjectData {
            prototype: ObjId::NONE,
            extensible: true,
            class,
            head: ObjId::NONE,
            function: None,
        })))?;
        self.assign(prototype, id, Field::Prototype)?;
        Ok(id)
    }

    /// Allocates a function object with an empty capture table of
    /// `captures` slots (host functions get none).
    pub fn new_function(
        &mut self,
        prototype: ObjId,
        callable: Callable,
        captures: usize,
    ) -> Result<ObjId> {
        let id = self.new_object(prototype, ObjectClass::Function)?;
        self.object_mut(id)?.function = Some(FunctionData {
            callable,
            captures: ObjId::NONE,
        });
        if let Callable::Guest { .. } = callable {
            let table = self.new_vector(captures)?;
            self.assign(table, id, Field::Captures)?;
        }
        Ok(id)
    }

    /// Allocates an address.
    pub fn new_address(&mut self, address: AddressData) -> Result<ObjId> {
        let (base, key) = (address.base, address.key);
        let id = self.alloc(HeapCell::new(HeapObject::Address(AddressData {
            base: ObjId::NONE,
            key: ObjId::NONE,
            ..address
        })))?;
        self.assign(base, id, Field::Base)?;
        self.assign(key, id, Field::Key)?;
        Ok(id)
    }

    /// Allocates a link to `target`.
    pub fn new_link(&mut self, target: ObjId) -> Result<ObjId> {
        let id = self.alloc(HeapCell::new(HeapObject::Link(ObjId::NONE)))?;
        self.assign(target, id, Field::Target)?;
        Ok(id)
    }

    /// Allocates a zero-filled vector.
    pub fn new_vector(&mut self, len: usize) -> Result<ObjId> {
        self.alloc(HeapCell::new(HeapObject::Vector(vec![ObjId::NONE; len])))
    }

    /// Allocates a pinned vector, used for VM roots.
    pub fn new_root_vector(&mut self, len: usize) -> Result<ObjId> {
        self.alloc(HeapCell::pinned(HeapObject::Vector(vec![ObjId::NONE; len])))
    }

    /// Allocates a trap record.
    pub fn new_trap(
        &mut self,
        catch: Option<usize>,
        finally: Option<usize>,
        sp: usize,
        frames: usize,
    ) -> Result<ObjId> {
        self.alloc(HeapCell::new(HeapObject::Trap(TrapData {
            catch,
            finally,
            sp,
            frames,
            thrown: ObjId::NONE,
        })))
    }

    pub(crate) fn alloc_property(&mut self, object: HeapObject) -> Result<ObjId> {
        self.alloc(HeapCell::new(object))
    }

    // ========================================================================
    // Vectors and links
    // ========================================================================

    /// Number of elements of a vector.
    pub fn vector_len(&self, vector: ObjId) -> Result<usize> {
        match self.get(vector)? {
            HeapObject::Vector(elements) => Ok(elements.len()),
            other => Err(Error::internal(format!(
                "{:?} is a {}, not a vector",
                vector,
                other.kind_name()
            ))),
        }
    }

    /// Reads one vector element.
    pub fn element(&self, vector: ObjId, index: usize) -> Result<ObjId> {
        self.read_field(vector, Field::Element(index as u32))
    }

    /// The target of a link, or `id` itself for any other kind.
    pub fn deref(&self, id: ObjId) -> ObjId {
        match self.get(id) {
            Ok(HeapObject::Link(target)) => *target,
            _ => id,
        }
    }

    /// Whether `id` is a link.
    pub fn is_link(&self, id: ObjId) -> bool {
        matches!(self.get(id), Ok(HeapObject::Link(_)))
    }

    /// Permutes `vector[start..start + order.len()]` so that position `k`
    /// receives the element previously at `start + order[k]`. Referrer
    /// edges move with their elements; counts are unchanged.
    pub fn reorder(&mut self, vector: ObjId, start: usize, order: &[usize]) -> Result<()> {
        let mut seen = vec![false; order.len()];
        for &from in order {
            match seen.get_mut(from) {
                Some(flag) if !*flag => *flag = true,
                _ => return Err(Error::internal(format!("{:?} is not a permutation", order))),
            }
        }

        let old: Vec<ObjId> = (0..order.len())
            .map(|k| self.element(vector, start + k))
            .collect::<Result<_>>()?;

        for (k, id) in old.iter().enumerate() {
            self.drop_edge(*id, Referrer {
                owner: vector,
                field: Field::Element((start + k) as u32),
            })?;
        }
        for (k, &from) in order.iter().enumerate() {
            let id = old[from];
            let field = Field::Element((start + k) as u32);
            self.write_field(vector, field, id)?;
            self.add_edge(id, Referrer { owner: vector, field })?;
        }
        Ok(())
    }

    // ========================================================================
    // Reference counting
    // ========================================================================

    /// Reads the current occupant of `owner.field`.
    pub fn read_field(&self, owner: ObjId, field: Field) -> Result<ObjId> {
        let object = self.get(owner)?;
        let value = match (object, field) {
            (HeapObject::Object(o), Field::Prototype) => Some(o.prototype),
            (HeapObject::Object(o), Field::Head) => Some(o.head),
            (HeapObject::Object(o), Field::Captures) => o.function.map(|f| f.captures),
            (HeapObject::Property(p), Field::Value) => Some(p.value),
            (HeapObject::Property(p), Field::Getter) => Some(p.getter),
            (HeapObject::Property(p), Field::Setter) => Some(p.setter),
            (HeapObject::Property(p), Field::Name) => Some(p.name),
            (HeapObject::Property(p), Field::Next) => Some(p.next),
            (HeapObject::Address(a), Field::Base) => Some(a.base),
            (HeapObject::Address(a), Field::Key) => Some(a.key),
            (HeapObject::Link(target), Field::Target) => Some(*target),
            (HeapObject::Trap(t), Field::Thrown) => Some(t.thrown),
            (HeapObject::Vector(elements), Field::Element(i)) => elements.get(i as usize).copied(),
            _ => None,
        };
        value.ok_or_else(|| {
            Error::internal(format!(
                "{} {:?} has no field {:?}",
                object.kind_name(),
                owner,
                field
            ))
        })
    }

    fn write_field(&mut self, owner: ObjId, field: Field, value: ObjId) -> Result<()> {
        let object = self.get_mut(owner)?;
        let kind = object.kind_name();
        let slot = match (object, field) {
            (HeapObject::Object(o), Field::Prototype) => Some(&mut o.prototype),
            (HeapObject::Object(o), Field::Head) => Some(&mut o.head),
            (HeapObject::Object(o), Field::Captures) => o.function.as_mut().map(|f| &mut f.captures),
            (HeapObject::Property(p), Field::Value) => Some(&mut p.value),
            (HeapObject::Property(p), Field::Getter) => Some(&mut p.getter),
            (HeapObject::Property(p), Field::Setter) => Some(&mut p.setter),
            (HeapObject::Property(p), Field::Name) => Some(&mut p.name),
            (HeapObject::Property(p), Field::Next) => Some(&mut p.next),
            (HeapObject::Address(a), Field::Base) => Some(&mut a.base),
            (HeapObject::Address(a), Field::Key) => Some(&mut a.key),
            (HeapObject::Link(target), Field::Target) => Some(target),
            (HeapObject::Trap(t), Field::Thrown) => Some(&mut t.thrown),
            (HeapObject::Vector(elements), Field::Element(i)) => elements.get_mut(i as usize),
            _ => None,
        };
        match slot {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::internal(format!(
                "{} {:?} has no field {:?}",
                kind, owner, field
            ))),
        }
    }

    /// Stores `target` into `owner.field`, retaining the new occupant before
    /// releasing the old one.
    pub fn assign(&mut self, target: ObjId, owner: ObjId, field: Field) -> Result<()> {
        let old = self.read_field(owner, field)?;
        let referrer = Referrer { owner, field };
        self.add_edge(target, referrer)?;
        self.write_field(owner, field, target)?;
        self.release(old, referrer)
    }

    fn counted(&self, id: ObjId) -> Result<bool> {
        if id.is_none() {
            return Ok(false);
        }
        Ok(!self.cell(id)?.pinned)
    }

    fn add_edge(&mut self, target: ObjId, referrer: Referrer) -> Result<()> {
        if !self.counted(target)? {
            return Ok(());
        }
        let cell = self.cell_mut(target)?;
        cell.refcount += 1;
        cell.referrers.push(referrer);
        Ok(())
    }

    /// Removes one referrer edge and returns the remaining count.
    fn drop_edge(&mut self, target: ObjId, referrer: Referrer) -> Result<u32> {
        if !self.counted(target)? {
            return Ok(u32::MAX);
        }
        let cell = self.cell_mut(target)?;
        let position = cell
            .referrers
            .iter()
            .position(|edge| *edge == referrer)
            .ok_or_else(|| {
                Error::internal(format!(
                    "{:?} has no referrer edge for {:?}.{:?}",
                    target, referrer.owner, referrer.field
                ))
            })?;
        cell.referrers.swap_remove(position);
        cell.refcount = cell.refcount.checked_sub(1).ok_or_else(|| {
            Error::internal(format!("refcount underflow on {:?}", target))
        })?;
        Ok(cell.refcount)
    }

    /// Drops the reference `referrer` holds on `id`, reclaiming everything
    /// whose count reaches zero.
    fn release(&mut self, id: ObjId, referrer: Referrer) -> Result<()> {
        let mut pending = vec![(id, referrer)];
        while let Some((id, referrer)) = pending.pop() {
            if self.drop_edge(id, referrer)? != 0 {
                continue;
            }
            let children = self.reclaim(id)?;
            pending.extend(children.into_iter().rev());
        }
        Ok(())
    }

    /// Empties a slot whose count reached zero and returns the references
    /// it held, in release order.
    fn reclaim(&mut self, id: ObjId) -> Result<Vec<(ObjId, Referrer)>> {
        match self.get(id)? {
            HeapObject::String { hash, .. } => {
                let hash = *hash;
                self.unintern(id, hash);
            }
            HeapObject::Property(_) => self.unhash(id)?,
            _ => {}
        }

        let cell = self.cells[id.index()]
            .take()
            .ok_or_else(|| Error::internal(format!("double reclaim of {:?}", id)))?;
        self.live -= 1;
        trace!(id = id.0, kind = cell.object.kind_name(), "reclaimed");

        Ok(cell
            .object
            .counted_fields()
            .into_iter()
            .filter(|(_, child)| !child.is_none())
            .map(|(field, child)| (child, Referrer { owner: id, field }))
            .collect())
    }

    /// Reclaims `id` if nothing references it. Used for values created on
    /// the host side and then abandoned.
    pub fn discard(&mut self, id: ObjId) -> Result<()> {
        if !self.counted(id)? || self.cell(id)?.refcount != 0 {
            return Ok(());
        }
        let mut pending = self.reclaim(id)?;
        pending.reverse();
        while let Some((child, referrer)) = pending.pop() {
            if self.drop_edge(child, referrer)? == 0 {
                pending.extend(self.reclaim(child)?.into_iter().rev());
            }
        }
        Ok(())
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Verifies the counting discipline over the whole heap: every count
    /// equals its number of referrer edges, every edge names a field that
    /// really holds the object, every counted field is backed by exactly one
    /// edge, and no unpinned object lives with a zero count.
    pub fn check_invariants(&self) -> Result<()> {
        for (index, cell) in self.cells.iter().enumerate() {
            let Some(cell) = cell else { continue };
            let id = ObjId(index as u32);

            if cell.pinned {
                if cell.refcount != 0 || !cell.referrers.is_empty() {
                    return Err(Error::internal(format!("pinned {:?} carries a count", id)));
                }
            } else {
                if cell.refcount as usize != cell.referrers.len() {
                    return Err(Error::internal(format!(
                        "{:?}: count {} but {} referrers",
                        id,
                        cell.refcount,
                        cell.referrers.len()
                    )));
                }
                if cell.refcount == 0 {
                    return Err(Error::internal(format!(
                        "{:?} ({}) is unreferenced but still allocated",
                        id,
                        cell.object.kind_name()
                    )));
                }
            }

            for referrer in &cell.referrers {
                if self.read_field(referrer.owner, referrer.field)? != id {
                    return Err(Error::internal(format!(
                        "{:?} lists {:?}.{:?} as a referrer, which holds something else",
                        id, referrer.owner, referrer.field
                    )));
                }
            }

            for (field, target) in cell.object.counted_fields() {
                if target.is_none() {
                    continue;
                }
                let target_cell = self.cell(target)?;
                if target_cell.pinned {
                    continue;
                }
                let edges = target_cell
                    .referrers
                    .iter()
                    .filter(|edge| edge.owner == id && edge.field == field)
                    .count();
                if edges != 1 {
                    return Err(Error::internal(format!(
                        "{:?}.{:?} holds {:?} with {} matching edges",
                        id, field, target, edges
                    )));
                }
            }
        }
        Ok(())
    }

    /// One-line description of a slot for debugging.
    pub fn describe(&self, id: ObjId) -> String {
        let Ok(cell) = self.cell(id) else {
            return format!("{:?} <empty>", id);
        };
        let payload = match &cell.object {
            HeapObject::Number(n) => format!(" {}", n),
            HeapObject::String { text, .. } => format!(" {:?}", text),
            HeapObject::Boolean(b) => format!(" {}", b),
            HeapObject::Object(o) => format!(" {} proto={:?}", o.class.name(), o.prototype),
            HeapObject::Link(target) => format!(" -> {:?}", target),
            HeapObject::Vector(elements) => format!(" len={}", elements.len()),
            HeapObject::Address(a) => format!(" {}[{}]", a.kind, a.slot),
            _ => String::new(),
        };
        if cell.pinned {
            return format!("{:?} {}{} pinned", id, cell.object.kind_name(), payload);
        }
        let referrers: Vec<String> = cell
            .referrers
            .iter()
            .map(|r| format!("{:?}.{:?}", r.owner, r.field))
            .collect();
        format!(
            "{:?} {}{} refs={} [{}]",
            id,
            cell.object.kind_name(),
            payload,
            cell.refcount,
            referrers.join(", ")
        )
    }
}
