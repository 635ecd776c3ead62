//!
//! The bytecode interpreter.
//!
//! `execute` is a single iterative trampoline: a nested bytecode send swaps
//! the local `(ip, code, context)` triple to the callee and keeps looping, so
//! logical call depth is bounded by the context chain, not the native stack.
//! Native sends are invoked as ordinary calls from the loop and may
//! themselves re-enter `execute` (to run a block argument, say).
//!
//! After every instruction, completed frames are unwound along the messenger
//! chain: the finished frame's messenger link is cleared (a retained block
//! must not keep its call chain alive), its result is stored into the
//! caller's named slot when the send asked for one, and execution resumes at
//! the caller's saved instruction pointer, or returns when the finished
//! frame is the one `execute` was entered with.
//!

use std::convert::TryFrom;
use std::rc::Rc;

use hom_core::float::decode_number;
use hom_core::Opcode;

use crate::class;
use crate::context::{make_context, ContextData};
use crate::error::Fault;
use crate::message;
use crate::registry::Registry;
use crate::ObjRef;

enum Step {
    /// The instruction completed; keep going in the same frame.
    Continue,
    /// The instruction dispatched a send; switch to the callee frame.
    Call(ObjRef),
}

/// Run a context to completion and return its result.
pub fn execute(registry: &mut Registry, entry: &ObjRef) -> Result<ObjRef, Fault> {
    let mut current = entry.clone();
    let mut code = frame_code(&current);

    loop {
        if let Some(native) = current.native_fn() {
            if !current.is_done() {
                let result = native(registry, &current)?;
                current.set_result(result);
                current.mark_done();
            }
        } else if !current.is_done() {
            let blob = match code.clone() {
                Some(blob) => blob,
                None => {
                    return Err(Fault::domain(
                        "context has no bytecode to run",
                        current.clone(),
                    ))
                }
            };
            let ip = current.ip().unwrap_or(0);
            if ip >= blob.len() {
                current.mark_done();
            } else {
                match step(registry, &current, &blob, ip)? {
                    Step::Continue => {}
                    Step::Call(callee) => {
                        current = callee;
                        code = frame_code(&current);
                    }
                }
            }
        }

        while current.is_done() {
            let result = current.result();
            let messenger = current.take_messenger();

            if let Some(slot) = current.result_slot() {
                if !messenger.is_null() {
                    messenger
                        .assign_local(slot as usize, result.clone())
                        .ok_or_else(|| {
                            Fault::invalid_index("local slot", slot as usize, messenger.clone())
                        })?;
                }
            }

            if current.ptr_eq(entry) || messenger.is_null() {
                // Either the frame this call was entered with finished (so a
                // pending native call regains control), or the chain ran out.
                return Ok(result);
            }

            current = messenger;
            code = frame_code(&current);
        }
    }
}

fn step(
    registry: &mut Registry,
    current: &ObjRef,
    code: &Rc<Vec<u8>>,
    ip: usize,
) -> Result<Step, Fault> {
    let opcode = match Opcode::try_from(code[ip]) {
        Ok(opcode) => opcode,
        Err(byte) => {
            return Err(Fault::unknown_opcode(
                byte,
                &frame_class_name(current),
                ip,
                current.clone(),
            ))
        }
    };

    match opcode {
        Opcode::Noop => {
            current.set_ip(ip + 1);
        }
        Opcode::ContextEnd => {
            current.set_ip(ip + 1);
            current.mark_done();
        }
        Opcode::Assign => {
            let dest = operand(code, ip + 1, current, ip)?;
            let src = operand(code, ip + 2, current, ip)?;
            let value = load_local(current, src)?;
            store_local(current, dest, value)?;
            current.set_ip(ip + 3);
        }
        Opcode::AssignProperty | Opcode::AssignClassProperty => {
            let dest = operand(code, ip + 1, current, ip)?;
            let index = operand(code, ip + 2, current, ip)? as usize;
            let holder_slot = if opcode == Opcode::AssignProperty { 0 } else { 1 };
            let holder = load_local(current, holder_slot)?;
            if holder.is_null() {
                return Err(Fault::invalid_index("property", index, current.clone()));
            }
            let value = holder
                .borrow()
                .property(index)
                .ok_or_else(|| Fault::invalid_index("property", index, current.clone()))?;
            store_local(current, dest, value)?;
            current.set_ip(ip + 3);
        }
        Opcode::SetProperty | Opcode::SetClassProperty => {
            let index = operand(code, ip + 1, current, ip)? as usize;
            let src = operand(code, ip + 2, current, ip)?;
            let holder_slot = if opcode == Opcode::SetProperty { 0 } else { 1 };
            let holder = load_local(current, holder_slot)?;
            let value = load_local(current, src)?;
            if holder.is_null() {
                return Err(Fault::invalid_index("property", index, current.clone()));
            }
            holder
                .borrow_mut()
                .set_property(index, value)
                .ok_or_else(|| Fault::invalid_index("property", index, current.clone()))?;
            current.set_ip(ip + 3);
        }
        Opcode::AssignClass => {
            let dest = operand(code, ip + 1, current, ip)?;
            let hash = operand_u32(code, ip + 2, current, ip)?;
            let class = registry.resolve_hash(hash).map_err(|mut fault| {
                fault.context = current.clone();
                fault
            })?;
            store_local(current, dest, class)?;
            current.set_ip(ip + 6);
        }
        Opcode::AssignConstInt => {
            let dest = operand(code, ip + 1, current, ip)?;
            let value = operand_u32(code, ip + 2, current, ip)? as i32;
            store_local(current, dest, registry.make_integer(i64::from(value)))?;
            current.set_ip(ip + 6);
        }
        Opcode::AssignConstNum => {
            let dest = operand(code, ip + 1, current, ip)?;
            let mantissa = operand_i64(code, ip + 2, current, ip)?;
            let exponent = operand_u32(code, ip + 10, current, ip)? as i32;
            let value = decode_number(mantissa, exponent);
            store_local(current, dest, registry.make_number(value))?;
            current.set_ip(ip + 14);
        }
        Opcode::AssignConstTxt => {
            let dest = operand(code, ip + 1, current, ip)?;
            let body = code
                .get(ip + 2..)
                .filter(|body| !body.is_empty())
                .ok_or_else(|| truncated(current, ip))?;
            let terminator = body
                .iter()
                .position(|byte| *byte == 0)
                .ok_or_else(|| truncated(current, ip))?;
            let text = std::str::from_utf8(&body[..terminator]).map_err(|_| {
                Fault::domain("invalid UTF-8 in a text constant", current.clone())
            })?;
            store_local(current, dest, registry.make_text(text))?;
            current.set_ip(ip + 3 + terminator);
        }
        Opcode::Block => {
            let result_slot = operand(code, ip + 1, current, ip)?;
            let own_locals = operand(code, ip + 2, current, ip)?;
            let body_size = operand_u16(code, ip + 3, current, ip)? as usize;
            let start_ip = ip + 5;
            let block = make_context(
                registry.block_class(),
                ContextData::block_over(current.clone(), own_locals as usize, start_ip),
            );
            store_local(current, result_slot, block)?;
            // The body only runs when the block is messaged later.
            current.set_ip(start_ip + body_size);
        }
        Opcode::Message
        | Opcode::MessageSuper
        | Opcode::MessageResult
        | Opcode::MessageSuperResult => {
            let wants_result =
                matches!(opcode, Opcode::MessageResult | Opcode::MessageSuperResult);
            let is_super = matches!(opcode, Opcode::MessageSuper | Opcode::MessageSuperResult);

            let object_slot = operand(code, ip + 1, current, ip)?;
            let (result_slot, selector_at) = if wants_result {
                (Some(operand(code, ip + 2, current, ip)?), ip + 3)
            } else {
                (None, ip + 2)
            };
            let selector = operand_u32(code, selector_at, current, ip)?;
            let count = operand(code, selector_at + 4, current, ip)? as usize;
            let params_at = selector_at + 5;

            let mut arguments = Vec::with_capacity(count);
            for index in 0..count {
                let slot = operand(code, params_at + index, current, ip)?;
                arguments.push(load_local(current, slot)?);
            }
            current.set_ip(params_at + count);

            let receiver = load_local(current, object_slot)?;
            let callee = if is_super {
                message::message_super(registry, &receiver, selector, current)?
            } else {
                message::message(registry, &receiver, selector, current)?
            };
            callee.set_result_slot(result_slot);
            for (index, value) in arguments.into_iter().enumerate() {
                callee.set_local(4 + index, value).ok_or_else(|| {
                    Fault::invalid_index("parameter slot", 4 + index, callee.clone())
                })?;
            }
            return Ok(Step::Call(callee));
        }
    }

    Ok(Step::Continue)
}

/// The bytecode blob of the frame's defining class (blocks reach it through
/// local aliasing).
fn frame_code(context: &ObjRef) -> Option<Rc<Vec<u8>>> {
    let class = context.local(1)?;
    if class.is_null() {
        return None;
    }
    let object = class.borrow();
    let data = object.as_class()?;
    Some(Rc::clone(&data.bytecode))
}

fn frame_class_name(context: &ObjRef) -> String {
    class::class_name(&context.local(1).unwrap_or_else(ObjRef::null))
}

fn truncated(context: &ObjRef, ip: usize) -> Fault {
    Fault::truncated(&frame_class_name(context), ip, context.clone())
}

fn operand(code: &[u8], at: usize, context: &ObjRef, ip: usize) -> Result<u8, Fault> {
    code.get(at).copied().ok_or_else(|| truncated(context, ip))
}

fn operand_u16(code: &[u8], at: usize, context: &ObjRef, ip: usize) -> Result<u16, Fault> {
    let bytes = code
        .get(at..at + 2)
        .ok_or_else(|| truncated(context, ip))?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn operand_u32(code: &[u8], at: usize, context: &ObjRef, ip: usize) -> Result<u32, Fault> {
    let bytes = code
        .get(at..at + 4)
        .ok_or_else(|| truncated(context, ip))?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn operand_i64(code: &[u8], at: usize, context: &ObjRef, ip: usize) -> Result<i64, Fault> {
    let bytes = code
        .get(at..at + 8)
        .ok_or_else(|| truncated(context, ip))?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(i64::from_be_bytes(raw))
}

fn load_local(context: &ObjRef, slot: u8) -> Result<ObjRef, Fault> {
    context
        .local(slot as usize)
        .ok_or_else(|| Fault::invalid_index("local slot", slot as usize, context.clone()))
}

fn store_local(context: &ObjRef, slot: u8, value: ObjRef) -> Result<(), Fault> {
    context
        .assign_local(slot as usize, value)
        .ok_or_else(|| Fault::invalid_index("local slot", slot as usize, context.clone()))
}
