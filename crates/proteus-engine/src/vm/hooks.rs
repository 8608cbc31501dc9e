// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Named host hooks.
//!
//! A call whose callee is an identifier starting with `$` compiles to a
//! `Hook` instruction instead of a guest call. When it runs, the VM looks the
//! name up here and invokes the callable synchronously with the evaluated
//! arguments. A name with no entry logs a warning and evaluates to
//! `undefined`.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::Vm;
use crate::Result;
use crate::gc::ObjId;

/// A hook callable.
pub type Hook = Rc<dyn Fn(&mut Vm, &[ObjId]) -> Result<ObjId>>;

/// The table of hooks handed to [`Vm::run`].
#[derive(Clone, Default)]
pub struct Hooks {
    table: FxHashMap<String, Hook>,
}

impl Hooks {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hook and returns the table, for chaining.
    pub fn with<F>(mut self, name: &str, hook: F) -> Self
    where
        F: Fn(&mut Vm, &[ObjId]) -> Result<ObjId> + 'static,
    {
        self.insert(name, hook);
        self
    }

    /// Adds or replaces a hook.
    pub fn insert<F>(&mut self, name: &str, hook: F)
    where
        F: Fn(&mut Vm, &[ObjId]) -> Result<ObjId> + 'static,
    {
        self.table.insert(normalize(name).to_string(), Rc::new(hook));
    }

    /// Looks a hook up by name, with or without its `$` prefix.
    pub fn get(&self, name: &str) -> Option<Hook> {
        self.table.get(normalize(name)).cloned()
    }

    /// Whether a hook is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(normalize(name))
    }

    /// Number of hooks.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn normalize(name: &str) -> &str {
    name.strip_prefix('$').unwrap_or(name)
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
