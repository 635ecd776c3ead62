use crate::error::Fault;
use crate::primitives::{argument, receiver, text_value, PrimitiveDef};
use crate::registry::Registry;
use crate::ObjRef;

pub static INSTANCE_PRIMITIVES: &[PrimitiveDef] = &[
    ("+", 1, self::concat),
    ("length", 0, self::length),
    ("=", 1, self::eq),
    ("asText", 0, self::as_text),
];

fn concat(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Text>>#+";

    let this = text_value(&receiver(context), SIGNATURE, context)?;
    // Anything concatenates; non-text arguments render first.
    let other = argument(context, 0).display();
    Ok(registry.make_text(&format!("{}{}", this, other)))
}

fn length(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Text>>#length";

    let this = text_value(&receiver(context), SIGNATURE, context)?;
    Ok(registry.make_integer(this.chars().count() as i64))
}

fn eq(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Text>>#=";

    let this = text_value(&receiver(context), SIGNATURE, context)?;
    let equal = match text_value(&argument(context, 0), SIGNATURE, context) {
        Ok(other) => this == other,
        Err(_) => false,
    };
    Ok(registry.make_boolean(equal))
}

fn as_text(_: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    Ok(receiver(context))
}
