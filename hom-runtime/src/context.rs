//!
//! Facilities for manipulating call-frame contexts and block contexts.
//!
//! A context is an object whose payload is a [`ContextData`]: the local
//! slots, the messenger (calling context) link forming the implicit call
//! chain, the completion state, and either a native function pointer or a
//! bytecode instruction pointer.
//!
//! The first four locals are fixed: `0 = self`, `1 = defining class`,
//! `2 = weak self-reference to the context`, `3 = null`; parameters and
//! method locals follow.
//!
//! A block context additionally captures its origin frame. Local indices
//! below the origin's effective length alias the origin (reads and writes
//! forward to it) and the block's own locals come after.
//!

use crate::object::Object;
use crate::primitives::NativeFn;
use crate::ObjRef;

/// How a context runs: as a native call or as interpreted bytecode.
pub enum Dispatch {
    /// A native method.
    Native(NativeFn),
    /// A compiled method with its saved instruction pointer.
    Bytecode {
        /// The next instruction's offset.
        ip: usize,
    },
}

/// The closure state of a block context.
pub struct BlockExt {
    /// The captured enclosing context.
    pub origin: ObjRef,
    /// Where the block's body starts, for reset and re-entry.
    pub start_ip: usize,
    /// Whether `break` was signalled on this block.
    pub break_called: bool,
    /// Whether `continue` was signalled on this block.
    pub continue_called: bool,
    /// Whether the enclosing construct traps `break` at this level.
    pub break_trapped: bool,
    /// Whether the enclosing construct traps `continue` at this level.
    pub continue_trapped: bool,
}

/// The state of a call frame.
pub struct ContextData {
    /// The local slots (for blocks: only the block's own slots).
    pub locals: Vec<ObjRef>,
    /// The calling context (null at the chain's end, cleared on unwind).
    pub messenger: ObjRef,
    /// The frame's result: its last local assignment.
    pub result: ObjRef,
    /// The caller slot a `*_RESULT` send stores the result into.
    pub result_slot: Option<u8>,
    /// Whether the frame has completed.
    pub done: bool,
    /// The dispatch state.
    pub dispatch: Dispatch,
    /// The closure state, present on block contexts only.
    pub block: Option<BlockExt>,
}

impl ContextData {
    /// A fresh method frame with the given number of local slots.
    pub fn new(locals_count: usize, dispatch: Dispatch) -> Self {
        Self {
            locals: vec![ObjRef::null(); locals_count],
            messenger: ObjRef::null(),
            result: ObjRef::null(),
            result_slot: None,
            done: false,
            dispatch,
            block: None,
        }
    }

    /// A fresh block frame capturing `origin`, with `own_locals` slots of its
    /// own and its body starting at `start_ip`.
    pub fn block_over(origin: ObjRef, own_locals: usize, start_ip: usize) -> Self {
        Self {
            locals: vec![ObjRef::null(); own_locals],
            messenger: ObjRef::null(),
            result: ObjRef::null(),
            result_slot: None,
            done: false,
            dispatch: Dispatch::Bytecode { ip: start_ip },
            block: Some(BlockExt {
                origin,
                start_ip,
                break_called: false,
                continue_called: false,
                break_trapped: false,
                continue_trapped: false,
            }),
        }
    }
}

impl ObjRef {
    fn with_context<R>(&self, f: impl FnOnce(&ContextData) -> R) -> Option<R> {
        if self.is_null() {
            return None;
        }
        let object = self.borrow();
        object.as_context().map(f)
    }

    fn with_context_mut<R>(&self, f: impl FnOnce(&mut ContextData) -> R) -> Option<R> {
        if self.is_null() {
            return None;
        }
        let mut object = self.borrow_mut();
        object.as_context_mut().map(f)
    }

    fn block_origin(&self) -> Option<Option<ObjRef>> {
        self.with_context(|ctx| ctx.block.as_ref().map(|ext| ext.origin.clone()))
    }

    /// The effective number of local slots (origin's effective length plus
    /// own slots for blocks; zero for non-contexts).
    pub fn locals_len(&self) -> usize {
        let info = self.with_context(|ctx| {
            (
                ctx.block.as_ref().map(|ext| ext.origin.clone()),
                ctx.locals.len(),
            )
        });
        match info {
            None => 0,
            Some((Some(origin), own)) => origin.locals_len() + own,
            Some((None, own)) => own,
        }
    }

    /// Read a local slot, forwarding aliased indices to the origin.
    pub fn local(&self, index: usize) -> Option<ObjRef> {
        match self.block_origin()? {
            Some(origin) => {
                let split = origin.locals_len();
                if index < split {
                    origin.local(index)
                } else {
                    self.with_context(|ctx| ctx.locals.get(index - split).cloned())?
                }
            }
            None => self.with_context(|ctx| ctx.locals.get(index).cloned())?,
        }
    }

    /// Write a local slot, forwarding aliased indices to the origin.
    pub fn set_local(&self, index: usize, value: ObjRef) -> Option<()> {
        match self.block_origin()? {
            Some(origin) => {
                let split = origin.locals_len();
                if index < split {
                    origin.set_local(index, value)
                } else {
                    self.with_context_mut(|ctx| {
                        ctx.locals.get_mut(index - split).map(|slot| *slot = value)
                    })?
                }
            }
            None => {
                self.with_context_mut(|ctx| ctx.locals.get_mut(index).map(|slot| *slot = value))?
            }
        }
    }

    /// Write a local slot and make the value this frame's result.
    pub fn assign_local(&self, index: usize, value: ObjRef) -> Option<()> {
        self.set_local(index, value.clone())?;
        self.set_result(value);
        Some(())
    }

    /// Read a parameter (parameters start at local slot 4).
    pub fn parameter(&self, index: usize) -> Option<ObjRef> {
        self.local(4 + index)
    }

    /// The first local slot owned by this block itself (its first parameter).
    pub fn block_own_start(&self) -> Option<usize> {
        let origin = self.block_origin()??;
        Some(origin.locals_len())
    }

    /// Whether this context has completed.
    pub fn is_done(&self) -> bool {
        self.with_context(|ctx| ctx.done).unwrap_or(false)
    }

    /// Mark this context as completed.
    pub fn mark_done(&self) {
        let _ = self.with_context_mut(|ctx| ctx.done = true);
    }

    /// The frame's result.
    pub fn result(&self) -> ObjRef {
        self.with_context(|ctx| ctx.result.clone())
            .unwrap_or_else(ObjRef::null)
    }

    /// Replace the frame's result.
    pub fn set_result(&self, value: ObjRef) {
        let _ = self.with_context_mut(|ctx| ctx.result = value);
    }

    /// The caller slot this frame's result will be stored into, if any.
    pub fn result_slot(&self) -> Option<u8> {
        self.with_context(|ctx| ctx.result_slot).flatten()
    }

    /// Name the caller slot this frame's result is stored into.
    pub fn set_result_slot(&self, slot: Option<u8>) {
        let _ = self.with_context_mut(|ctx| ctx.result_slot = slot);
    }

    /// The calling context.
    pub fn messenger(&self) -> ObjRef {
        self.with_context(|ctx| ctx.messenger.clone())
            .unwrap_or_else(ObjRef::null)
    }

    /// Set the calling context.
    pub fn set_messenger(&self, messenger: ObjRef) {
        let _ = self.with_context_mut(|ctx| ctx.messenger = messenger);
    }

    /// Clear and return the calling context, so a retained block does not
    /// keep its whole call chain alive.
    pub fn take_messenger(&self) -> ObjRef {
        self.with_context_mut(|ctx| std::mem::take(&mut ctx.messenger))
            .unwrap_or_else(ObjRef::null)
    }

    /// The saved instruction pointer of a bytecode frame.
    pub fn ip(&self) -> Option<usize> {
        self.with_context(|ctx| match ctx.dispatch {
            Dispatch::Bytecode { ip } => Some(ip),
            Dispatch::Native(_) => None,
        })
        .flatten()
    }

    /// Save the instruction pointer of a bytecode frame.
    pub fn set_ip(&self, ip: usize) {
        let _ = self.with_context_mut(|ctx| {
            if let Dispatch::Bytecode { ip: slot } = &mut ctx.dispatch {
                *slot = ip;
            }
        });
    }

    /// The native function of a native frame.
    pub fn native_fn(&self) -> Option<NativeFn> {
        self.with_context(|ctx| match ctx.dispatch {
            Dispatch::Native(function) => Some(function),
            Dispatch::Bytecode { .. } => None,
        })
        .flatten()
    }

    /// Whether this context is a block context.
    pub fn is_block(&self) -> bool {
        self.with_context(|ctx| ctx.block.is_some())
            .unwrap_or(false)
    }

    /// Rewind a block for re-entry: instruction pointer back to the body
    /// start, done and break/continue cleared.
    pub fn reset(&self) {
        let _ = self.with_context_mut(|ctx| {
            ctx.done = false;
            if let Some(ext) = ctx.block.as_mut() {
                ext.break_called = false;
                ext.continue_called = false;
                let start_ip = ext.start_ip;
                if let Dispatch::Bytecode { ip } = &mut ctx.dispatch {
                    *ip = start_ip;
                }
            }
        });
    }

    /// Whether `break` was signalled on this block.
    pub fn break_called(&self) -> bool {
        self.with_context(|ctx| ctx.block.as_ref().map_or(false, |ext| ext.break_called))
            .unwrap_or(false)
    }

    /// Whether `continue` was signalled on this block.
    pub fn continue_called(&self) -> bool {
        self.with_context(|ctx| ctx.block.as_ref().map_or(false, |ext| ext.continue_called))
            .unwrap_or(false)
    }

    /// Trap or untrap `break` at this block's level.
    pub fn set_break_trapped(&self, trapped: bool) {
        let _ = self.with_context_mut(|ctx| {
            if let Some(ext) = ctx.block.as_mut() {
                ext.break_trapped = trapped;
            }
        });
    }

    /// Trap or untrap `continue` at this block's level.
    pub fn set_continue_trapped(&self, trapped: bool) {
        let _ = self.with_context_mut(|ctx| {
            if let Some(ext) = ctx.block.as_mut() {
                ext.continue_trapped = trapped;
            }
        });
    }

    /// Signal `break`: flag the block, mark it done, and propagate outward
    /// unless trapped at this level.
    pub fn signal_break(&self) {
        let propagate = self
            .with_context_mut(|ctx| {
                let ext = ctx.block.as_mut()?;
                ext.break_called = true;
                ctx.done = true;
                if ext.break_trapped {
                    None
                } else {
                    Some(ext.origin.clone())
                }
            })
            .flatten();

        if let Some(origin) = propagate {
            if origin.is_block() {
                origin.signal_break();
            }
        }
    }

    /// Signal `continue`: flag the block, mark it done, and propagate outward
    /// unless trapped at this level.
    pub fn signal_continue(&self) {
        let propagate = self
            .with_context_mut(|ctx| {
                let ext = ctx.block.as_mut()?;
                ext.continue_called = true;
                ctx.done = true;
                if ext.continue_trapped {
                    None
                } else {
                    Some(ext.origin.clone())
                }
            })
            .flatten();

        if let Some(origin) = propagate {
            if origin.is_block() {
                origin.signal_continue();
            }
        }
    }
}

/// Allocate a plain method frame as an object of the given context class.
pub fn make_context(context_class: ObjRef, data: ContextData) -> ObjRef {
    let context = ObjRef::new(Object::with_payload(
        context_class,
        crate::object::Payload::Context(data),
    ));
    // The fixed weak self-reference lives at local slot 2 on method frames.
    if !context.is_block() {
        let _ = context.set_local(2, context.weak());
    }
    context
}
