// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Merges per-scope code into one program.
//!
//! Scopes are laid out in creation order, so the top-level unit always
//! starts at offset 0. Function-relative labels are rebased onto the
//! scope's offset and scope references become that scope's entry offset.

use tracing::debug;

use super::bytecode::{Bytecode, Operand};
use super::scope::{ScopeId, ScopeTree};
use crate::{Error, Result};

/// Assigns offsets, back-patches operands and returns the merged program.
pub fn link(scopes: &mut ScopeTree) -> Result<Bytecode> {
    let mut entries = Vec::with_capacity(scopes.len());
    let mut offset = 0;
    for scope in scopes.iter() {
        entries.push(offset);
        offset += scope.code.len();
    }

    let mut program = Bytecode::new();
    for (index, &base) in entries.iter().enumerate() {
        let scope = scopes.get_mut(ScopeId(index as u32));
        scope.offset = Some(base);
        for instruction in &scope.code {
            let mut instruction = instruction.clone();
            for operand in instruction.operands.iter_mut() {
                *operand = match *operand {
                    Operand::Label(label) if label < scope.code.len() => {
                        Operand::Offset(base + label)
                    }
                    Operand::Label(label) => {
                        return Err(Error::internal(format!(
                            "scope#{} jumps to label {} past its {} instructions",
                            index,
                            label,
                            scope.code.len()
                        )));
                    }
                    Operand::Scope(target) => {
                        let entry = entries.get(target.index()).ok_or_else(|| {
                            Error::internal(format!("reference to unknown scope#{}", target.0))
                        })?;
                        Operand::Offset(*entry)
                    }
                    _ => continue,
                };
            }
            program.emit(instruction);
        }
    }
    program.entries = entries;

    debug!(
        scopes = program.entries.len(),
        instructions = program.len(),
        "linked program"
    );
    Ok(program)
}
