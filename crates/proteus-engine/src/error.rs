// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the compiler and the virtual machine.

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while compiling or executing a program.
///
/// The variants fall into three groups:
///
/// - engine defects (`Internal`) and exhausted hard limits, which always
///   abort the run;
/// - guest-language errors (`TypeError`, `ReferenceError`, `RangeError`),
///   which guest code can catch when a trap covers the failing point;
/// - input problems (`Syntax`, `Json`) reported before anything runs.
#[derive(Debug, Error)]
pub enum Error {
    /// Engine invariant violated
    #[error("InternalError: {0}")]
    Internal(String),

    /// Main value stack exhausted
    #[error("InternalError: value stack overflow (limit {limit} slots)")]
    StackOverflow {
        /// Configured stack size
        limit: usize,
    },

    /// Too many nested guest frames
    #[error("RangeError: maximum call depth exceeded (limit {limit})")]
    CallDepthExceeded {
        /// Configured call depth
        limit: usize,
    },

    /// Too many nested try blocks
    #[error("InternalError: trap stack overflow (limit {limit})")]
    TrapOverflow {
        /// Configured trap stack size
        limit: usize,
    },

    /// Type error (wrong operand type)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Reference error (unbound name)
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// Range error (value out of range)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// A guest value was thrown across a host boundary; the value itself is
    /// parked in the VM's exception register.
    #[error("thrown: {0}")]
    Thrown(String),

    /// A guest throw that no trap handled
    #[error("Uncaught {0}")]
    Uncaught(String),

    /// A harness hook reported a failure
    #[error("{name}: {message}")]
    Hook {
        /// Hook name, without its `$`
        name: String,
        /// What went wrong
        message: String,
    },

    /// Malformed or unsupported syntax tree
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// Syntax-tree JSON could not be decoded
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a new TypeError
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a new ReferenceError
    pub fn reference_error(msg: impl Into<String>) -> Self {
        Self::ReferenceError(msg.into())
    }

    /// Create a new SyntaxError
    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax(msg.into())
    }

    /// Create a hook failure
    pub fn hook(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether guest code may observe this error through a trap.
    pub fn is_catchable(&self) -> bool {
        matches!(
            self,
            Self::TypeError(_) | Self::ReferenceError(_) | Self::RangeError(_) | Self::Thrown(_)
        )
    }

    /// The guest-visible `name` of a catchable error.
    pub fn guest_name(&self) -> &'static str {
        match self {
            Self::TypeError(_) => "TypeError",
            Self::ReferenceError(_) => "ReferenceError",
            Self::RangeError(_) | Self::CallDepthExceeded { .. } => "RangeError",
            _ => "Error",
        }
    }

    /// The message without its category prefix.
    pub fn guest_message(&self) -> String {
        match self {
            Self::TypeError(msg) | Self::ReferenceError(msg) | Self::RangeError(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
