// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Calling convention.
//!
//! A call site pushes `args..., argc, this, callee` and executes `Call`. For
//! a guest callee the window is rearranged in place into
//!
//! ```text
//! [FUNCTION, THIS, PARAM[0..argc], ARGC, LOCAL[0..n], temporaries...]
//!  ^ base                                ^ fp
//! ```
//!
//! and the callee's `Reserve` pushes its locals. `Return` writes the result
//! over the FUNCTION slot and pops everything above it.

use tracing::trace;

use super::interpreter::{REG_RESULT, Vm};
use crate::gc::{Callable, Heap, ObjId};
use crate::{Error, Result};

/// One active guest invocation.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The function object being run
    pub function: ObjId,
    /// Stack index of the FUNCTION slot
    pub base: usize,
    /// Parameter slots, after padding to the declared arity
    pub argc: usize,
    /// Stack index of the first local
    pub fp: usize,
    /// Locals reserved by the prologue
    pub locals: usize,
    /// Where the caller resumes
    pub return_pc: usize,
    /// Trap stack height at entry
    pub trap_base: usize,
}

impl Frame {
    /// Stack index of parameter `i`.
    pub fn param_slot(&self, i: usize) -> usize {
        self.fp - 1 - self.argc + i
    }

    /// Stack index of local `j`.
    pub fn local_slot(&self, j: usize) -> usize {
        self.fp + j
    }

    /// Stack index of `this`.
    pub fn this_slot(&self) -> usize {
        self.base + 1
    }
}

impl Vm {
    /// Dispatches the call window on top of the stack. Host functions run
    /// to completion here; guest functions get a frame and the program
    /// counter moves to their entry. Returns whether a frame was pushed.
    pub(crate) fn invoke(&mut self, return_pc: usize) -> Result<bool> {
        let callee = self.peek(0)?;
        let this = self.peek(1)?;
        let argc = self
            .value(self.peek(2)?)
            .as_number()
            .ok_or_else(|| Error::internal("call window without an argument count"))?
            as usize;
        let start = self
            .sp
            .checked_sub(argc + 3)
            .ok_or_else(|| Error::internal("call window larger than the stack"))?;

        let Some(function) = self.heap.function(callee) else {
            return Err(Error::type_error(format!(
                "{} is not a function",
                self.value(callee)
            )));
        };

        match function.callable {
            Callable::Host(f) => {
                let args = (0..argc)
                    .map(|i| self.slot(start + i))
                    .collect::<Result<Vec<_>>>()?;
                let result = f(self, this, &args)?;
                self.complete(argc + 3, result)?;
                Ok(false)
            }
            Callable::Guest { entry, arity } => {
                if self.frames.len() >= self.config.max_call_depth {
                    return Err(Error::CallDepthExceeded {
                        limit: self.config.max_call_depth,
                    });
                }

                let mut order = vec![argc + 2, argc + 1];
                order.extend(0..argc);
                order.push(argc);
                self.heap.reorder(self.stack, start, &order)?;

                let mut params = argc;
                if arity > argc {
                    self.pop()?;
                    for _ in argc..arity {
                        self.push(ObjId::NONE)?;
                    }
                    let count = self.heap.new_number(arity as f64)?;
                    self.push(count)?;
                    params = arity;
                }

                trace!(entry, argc, depth = self.frames.len() + 1, "enter frame");
                self.frames.push(Frame {
                    function: callee,
                    base: start,
                    argc: params,
                    fp: self.sp,
                    locals: 0,
                    return_pc,
                    trap_base: self.trap_count,
                });
                self.pc = entry;
                Ok(true)
            }
        }
    }

    /// Leaves the current frame with the value on top of the stack.
    pub(crate) fn do_return(&mut self) -> Result<()> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::internal("return without a frame"))?;
        let value = self.peek(0)?;
        self.set_slot(frame.base, value)?;
        self.truncate(frame.base + 1)?;
        self.truncate_traps(frame.trap_base)?;
        trace!(return_pc = frame.return_pc, "leave frame");
        self.pc = frame.return_pc;
        Ok(())
    }

    /// Calls `function` with `this` and `args` from host code, running a
    /// nested interpreter loop for guest functions.
    ///
    /// The result is parked in a register and stays valid until the next
    /// call. A throw nobody caught comes back as [`Error::Thrown`] with the
    /// value still parked, so an enclosing guest trap can pick it up.
    pub fn call(&mut self, function: ObjId, this: ObjId, args: &[ObjId]) -> Result<ObjId> {
        let depth = self.frames.len();
        let height = self.sp;
        let traps = self.trap_count;
        let pc = self.pc;

        let outcome = self.call_inner(function, this, args, depth);
        if let Err(err) = outcome {
            self.frames.truncate(depth);
            self.truncate(height)?;
            self.truncate_traps(traps)?;
            self.pc = pc;
            return Err(err);
        }

        let result = self.slot(height)?;
        let result = if result.is_none() { Heap::UNDEFINED } else { result };
        self.set_register(REG_RESULT, result)?;
        self.truncate(height)?;
        Ok(result)
    }

    fn call_inner(
        &mut self,
        function: ObjId,
        this: ObjId,
        args: &[ObjId],
        depth: usize,
    ) -> Result<()> {
        for &arg in args {
            self.push(arg)?;
        }
        let argc = self.heap.new_number(args.len() as f64)?;
        self.push(argc)?;
        self.push(this)?;
        self.push(function)?;
        if self.invoke(self.pc)? {
            self.execute(depth)?;
        }
        Ok(())
    }

    /// Current values of the running frame's locals, looking through links.
    /// Unassigned slots read as `ObjId::NONE`.
    pub fn locals(&self) -> Result<Vec<ObjId>> {
        let frame = self.frame()?;
        (0..frame.locals)
            .map(|j| Ok(self.heap.deref(self.slot(frame.local_slot(j))?)))
            .collect()
    }

    /// Current value of the running frame's parameter `i`.
    pub fn param(&self, i: usize) -> Result<ObjId> {
        let frame = self.frame()?;
        if i >= frame.argc {
            return Ok(Heap::UNDEFINED);
        }
        Ok(self.heap.deref(self.slot(frame.param_slot(i))?))
    }
}
