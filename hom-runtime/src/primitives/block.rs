use crate::error::Fault;
use crate::interpreter::execute;
use crate::primitives::{argument, block_value, receiver, PrimitiveDef};
use crate::registry::Registry;
use crate::ObjRef;

pub static INSTANCE_PRIMITIVES: &[PrimitiveDef] = &[
    ("value", 0, self::value),
    ("value:", 1, self::value_with),
    ("whileTrue:", 1, self::while_true),
    ("break", 0, self::brk),
    ("continue", 0, self::cont),
    ("rescue:", 1, self::rescue),
];

/// Rewind a block and run it to completion.
pub(crate) fn run_block(registry: &mut Registry, block: &ObjRef) -> Result<ObjRef, Fault> {
    block.reset();
    execute(registry, block)
}

fn value(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Block>>#value";

    let block = block_value(&receiver(context), SIGNATURE, context)?;
    run_block(registry, &block)
}

fn value_with(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Block>>#value:";

    let block = block_value(&receiver(context), SIGNATURE, context)?;
    // The block's first own local receives the argument.
    if let Some(slot) = block.block_own_start() {
        let _ = block.set_local(slot, argument(context, 0));
    }
    run_block(registry, &block)
}

fn while_true(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Block>>#whileTrue:";

    let condition = block_value(&receiver(context), SIGNATURE, context)?;
    let body = block_value(&argument(context, 0), SIGNATURE, context)?;

    // The loop traps break/continue on its body.
    body.set_break_trapped(true);
    body.set_continue_trapped(true);

    let outcome = loop {
        let decision = run_block(registry, &condition);
        let keep_going = match decision {
            Ok(value) => match truthiness(&value) {
                Some(flag) => flag,
                None => {
                    break Err(Fault::domain(
                        format!("'{}': the condition must produce a Boolean", SIGNATURE),
                        context.clone(),
                    ))
                }
            },
            Err(fault) => break Err(fault),
        };
        if !keep_going {
            break Ok(ObjRef::null());
        }

        if let Err(fault) = run_block(registry, &body) {
            break Err(fault);
        }
        if body.break_called() {
            break Ok(ObjRef::null());
        }
        // A continue only ends the iteration; the next reset clears it.
    };

    body.set_break_trapped(false);
    body.set_continue_trapped(false);
    outcome
}

fn brk(_: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Block>>#break";

    let block = block_value(&receiver(context), SIGNATURE, context)?;
    block.signal_break();
    Ok(ObjRef::null())
}

fn cont(_: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Block>>#continue";

    let block = block_value(&receiver(context), SIGNATURE, context)?;
    block.signal_continue();
    Ok(ObjRef::null())
}

fn rescue(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Block>>#rescue:";

    let block = block_value(&receiver(context), SIGNATURE, context)?;
    let handler = block_value(&argument(context, 0), SIGNATURE, context)?;

    match run_block(registry, &block) {
        Ok(value) => Ok(value),
        Err(fault) => {
            // The handler's first own local receives the fault text.
            if let Some(slot) = handler.block_own_start() {
                let _ = handler.set_local(slot, registry.make_text(&fault.message));
            }
            run_block(registry, &handler)
        }
    }
}

fn truthiness(value: &ObjRef) -> Option<bool> {
    if value.is_null() {
        return None;
    }
    value.borrow().as_boolean()
}
