use crate::class;
use crate::error::Fault;
use crate::primitives::{argument, receiver, PrimitiveDef};
use crate::registry::Registry;
use crate::ObjRef;

pub static INSTANCE_PRIMITIVES: &[PrimitiveDef] = &[
    ("class", 0, self::class_),
    ("sameAs:", 1, self::same_as),
    ("asText", 0, self::as_text),
];

/// Class-side methods, inherited by every class object through the chain walk.
pub static CLASS_PRIMITIVES: &[PrimitiveDef] = &[
    ("new", 0, self::new),
    ("name", 0, self::name),
    ("superclass", 0, self::superclass),
];

fn class_(_: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    Ok(receiver(context).class_of())
}

fn same_as(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    let identical = receiver(context).ptr_eq(&argument(context, 0));
    Ok(registry.make_boolean(identical))
}

fn as_text(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    Ok(registry.make_text(&receiver(context).display()))
}

fn new(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    let class = receiver(context);
    registry.make_instance(&class)
}

fn name(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    let class = receiver(context);
    Ok(registry.make_text(&class::class_name(&class)))
}

fn superclass(_: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    Ok(class::super_class(&receiver(context)))
}
