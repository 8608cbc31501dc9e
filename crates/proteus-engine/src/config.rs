// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resource limits for a VM instance.

use serde::{Deserialize, Serialize};

/// Configuration for a [`Vm`](crate::vm::Vm).
///
/// Every limit here is hard: running past one aborts the run instead of
/// growing the underlying storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Slots in the main value stack
    pub stack_size: usize,

    /// Maximum number of nested guest frames
    pub max_call_depth: usize,

    /// Slots in the trap (try/catch) stack
    pub max_traps: usize,

    /// Bucket count of the global property hash table
    pub property_buckets: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_size: 4096,
            max_call_depth: 512,
            max_traps: 256,
            property_buckets: 1024,
        }
    }
}

impl VmConfig {
    /// Sets the main value stack size.
    pub fn with_stack_size(mut self, slots: usize) -> Self {
        self.stack_size = slots;
        self
    }

    /// Sets the maximum guest call depth.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Sets the trap stack size.
    pub fn with_max_traps(mut self, traps: usize) -> Self {
        self.max_traps = traps;
        self
    }

    /// Sets the property hash table bucket count (at least one).
    pub fn with_property_buckets(mut self, buckets: usize) -> Self {
        self.property_buckets = buckets.max(1);
        self
    }

    /// Parses a configuration from JSON, filling absent fields with defaults.
    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
