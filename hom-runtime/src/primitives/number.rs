use crate::error::Fault;
use crate::primitives::{argument, number_value, receiver, PrimitiveDef};
use crate::registry::Registry;
use crate::ObjRef;

pub static INSTANCE_PRIMITIVES: &[PrimitiveDef] = &[
    ("+", 1, self::plus),
    ("-", 1, self::minus),
    ("*", 1, self::times),
    ("/", 1, self::divide),
    ("<", 1, self::lt),
    ("=", 1, self::eq),
    ("asText", 0, self::as_text),
];

fn plus(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Number>>#+";

    let this = number_value(&receiver(context), SIGNATURE, context)?;
    let other = number_value(&argument(context, 0), SIGNATURE, context)?;
    Ok(registry.make_number(this + other))
}

fn minus(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Number>>#-";

    let this = number_value(&receiver(context), SIGNATURE, context)?;
    let other = number_value(&argument(context, 0), SIGNATURE, context)?;
    Ok(registry.make_number(this - other))
}

fn times(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Number>>#*";

    let this = number_value(&receiver(context), SIGNATURE, context)?;
    let other = number_value(&argument(context, 0), SIGNATURE, context)?;
    Ok(registry.make_number(this * other))
}

fn divide(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Number>>#/";

    let this = number_value(&receiver(context), SIGNATURE, context)?;
    let other = number_value(&argument(context, 0), SIGNATURE, context)?;
    if other == 0.0 {
        return Err(Fault::domain("division by zero", context.clone()));
    }
    Ok(registry.make_number(this / other))
}

fn lt(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Number>>#<";

    let this = number_value(&receiver(context), SIGNATURE, context)?;
    let other = number_value(&argument(context, 0), SIGNATURE, context)?;
    Ok(registry.make_boolean(this < other))
}

fn eq(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Number>>#=";

    let this = number_value(&receiver(context), SIGNATURE, context)?;
    let equal = match number_value(&argument(context, 0), SIGNATURE, context) {
        Ok(other) => this == other,
        Err(_) => false,
    };
    Ok(registry.make_boolean(equal))
}

fn as_text(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Number>>#asText";

    let this = number_value(&receiver(context), SIGNATURE, context)?;
    Ok(registry.make_text(&this.to_string()))
}
