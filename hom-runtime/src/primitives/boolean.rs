use crate::error::Fault;
use crate::primitives::{argument, block_value, boolean_value, receiver, PrimitiveDef};
use crate::registry::Registry;
use crate::ObjRef;

pub static INSTANCE_PRIMITIVES: &[PrimitiveDef] = &[
    ("not", 0, self::not),
    ("then:", 1, self::then),
    ("then:else:", 2, self::then_else),
];

fn not(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Boolean>>#not";

    let this = boolean_value(&receiver(context), SIGNATURE, context)?;
    Ok(registry.make_boolean(!this))
}

fn then(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Boolean>>#then:";

    let this = boolean_value(&receiver(context), SIGNATURE, context)?;
    let body = block_value(&argument(context, 0), SIGNATURE, context)?;
    if this {
        super::block::run_block(registry, &body)
    } else {
        Ok(ObjRef::null())
    }
}

fn then_else(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Boolean>>#then:else:";

    let this = boolean_value(&receiver(context), SIGNATURE, context)?;
    let body = block_value(&argument(context, 0), SIGNATURE, context)?;
    let alternative = block_value(&argument(context, 1), SIGNATURE, context)?;
    if this {
        super::block::run_block(registry, &body)
    } else {
        super::block::run_block(registry, &alternative)
    }
}
