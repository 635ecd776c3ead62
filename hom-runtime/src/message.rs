//!
//! Message dispatch.
//!
//! Dispatch resolves a selector against the receiver's method tables and
//! builds the call frame for it; it never runs the frame. Instance sends
//! search the receiver's class chain; sends to a class object search the
//! class object's own chain through the class-side tables; super sends start
//! the walk at the super of the caller's defining class.
//!

use log::trace;

use crate::class::{self, MethodKind, VTableEntry};
use crate::context::{make_context, ContextData, Dispatch};
use crate::error::Fault;
use crate::registry::Registry;
use crate::ObjRef;

/// Resolve `selector` against `object` and build the context for the send.
///
/// Fails with an unresolved-message fault naming the selector and the
/// receiver's class if no entry exists anywhere in the chain. Pure given the
/// current registry state.
pub fn message(
    registry: &Registry,
    object: &ObjRef,
    selector: u32,
    caller: &ObjRef,
) -> Result<ObjRef, Fault> {
    if object.is_null() {
        return Err(Fault::null_receiver(
            &registry.selector_name(selector),
            caller.clone(),
        ));
    }

    let resolved = if object.borrow().is_class() {
        class::find_class_method(object, selector)
    } else {
        class::find_method(&object.class_of(), selector)
    };
    let (entry, found_in) =
        resolved.ok_or_else(|| unresolved(registry, object, selector, caller))?;

    trace!(
        "send `{}` to {}",
        registry.selector_name(selector),
        object.display()
    );
    build_context(registry, &entry, found_in, object, caller)
}

/// Like [`message`], but the resolution walk starts at the super of the
/// caller's defining class.
pub fn message_super(
    registry: &Registry,
    object: &ObjRef,
    selector: u32,
    caller: &ObjRef,
) -> Result<ObjRef, Fault> {
    if object.is_null() {
        return Err(Fault::null_receiver(
            &registry.selector_name(selector),
            caller.clone(),
        ));
    }

    let defining = caller.local(1).unwrap_or_else(ObjRef::null);
    let start = class::super_class(&defining);
    let (entry, found_in) = class::find_method(&start, selector)
        .ok_or_else(|| unresolved(registry, object, selector, caller))?;

    trace!(
        "super send `{}` to {}",
        registry.selector_name(selector),
        object.display()
    );
    build_context(registry, &entry, found_in, object, caller)
}

/// Intern `name` and send it as a selector.
pub fn message_name(
    registry: &mut Registry,
    object: &ObjRef,
    name: &str,
    caller: &ObjRef,
) -> Result<ObjRef, Fault> {
    let selector = registry.intern_selector(name);
    message(registry, object, selector, caller)
}

fn unresolved(registry: &Registry, object: &ObjRef, selector: u32, caller: &ObjRef) -> Fault {
    let class = if object.borrow().is_class() {
        object.clone()
    } else {
        object.class_of()
    };
    Fault::unresolved(
        &registry.selector_name(selector),
        &class::class_name(&class),
        caller.clone(),
    )
}

fn build_context(
    registry: &Registry,
    entry: &VTableEntry,
    found_in: ObjRef,
    object: &ObjRef,
    caller: &ObjRef,
) -> Result<ObjRef, Fault> {
    let dispatch = match entry.kind {
        MethodKind::Native(function) => Dispatch::Native(function),
        MethodKind::Bytecode { offset } => Dispatch::Bytecode {
            ip: offset as usize,
        },
        MethodKind::UnlinkedSuper => {
            return Err(Fault::registry_miss(format!(
                "unlinked method 0x{:08x} in class `{}`",
                entry.hash_id,
                class::class_name(&found_in)
            )))
        }
    };

    let locals_count = entry.locals as usize + 4;
    let context = make_context(
        registry.context_class(),
        ContextData::new(locals_count, dispatch),
    );

    // The defining class is the entry's owner; fall back to the class whose
    // table held the entry if the owner is gone.
    let defining = entry.owner.normal();
    let defining = if defining.is_null() { found_in } else { defining };

    let _ = context.set_local(0, object.clone());
    let _ = context.set_local(1, defining);
    let _ = context.set_local(3, ObjRef::null());
    context.set_messenger(caller.clone());
    Ok(context)
}
