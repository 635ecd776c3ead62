use rand::Rng;

use crate::error::Fault;
use crate::primitives::{argument, integer_value, number_value, receiver, PrimitiveDef};
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
    ("random", 0, self::random),
];

fn is_number(value: &ObjRef) -> bool {
    !value.is_null() && value.borrow().as_number().is_some()
}

fn plus(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Integer>>#+";

    let this = integer_value(&receiver(context), SIGNATURE, context)?;
    let other = argument(context, 0);
    if is_number(&other) {
        let other = number_value(&other, SIGNATURE, context)?;
        return Ok(registry.make_number(this as f64 + other));
    }
    let other = integer_value(&other, SIGNATURE, context)?;
    let value = this
        .checked_add(other)
        .ok_or_else(|| Fault::domain("integer overflow in `+`", context.clone()))?;
    Ok(registry.make_integer(value))
}

fn minus(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Integer>>#-";

    let this = integer_value(&receiver(context), SIGNATURE, context)?;
    let other = argument(context, 0);
    if is_number(&other) {
        let other = number_value(&other, SIGNATURE, context)?;
        return Ok(registry.make_number(this as f64 - other));
    }
    let other = integer_value(&other, SIGNATURE, context)?;
    let value = this
        .checked_sub(other)
        .ok_or_else(|| Fault::domain("integer overflow in `-`", context.clone()))?;
    Ok(registry.make_integer(value))
}

fn times(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Integer>>#*";

    let this = integer_value(&receiver(context), SIGNATURE, context)?;
    let other = argument(context, 0);
    if is_number(&other) {
        let other = number_value(&other, SIGNATURE, context)?;
        return Ok(registry.make_number(this as f64 * other));
    }
    let other = integer_value(&other, SIGNATURE, context)?;
    let value = this
        .checked_mul(other)
        .ok_or_else(|| Fault::domain("integer overflow in `*`", context.clone()))?;
    Ok(registry.make_integer(value))
}

fn divide(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Integer>>#/";

    let this = integer_value(&receiver(context), SIGNATURE, context)?;
    let other = argument(context, 0);
    if is_number(&other) {
        let other = number_value(&other, SIGNATURE, context)?;
        if other == 0.0 {
            return Err(Fault::domain("division by zero", context.clone()));
        }
        return Ok(registry.make_number(this as f64 / other));
    }
    let other = integer_value(&other, SIGNATURE, context)?;
    let value = this
        .checked_div(other)
        .ok_or_else(|| Fault::domain("division by zero", context.clone()))?;
    Ok(registry.make_integer(value))
}

fn lt(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Integer>>#<";

    let this = integer_value(&receiver(context), SIGNATURE, context)?;
    let other = number_value(&argument(context, 0), SIGNATURE, context)?;
    Ok(registry.make_boolean((this as f64) < other))
}

fn eq(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Integer>>#=";

    let this = integer_value(&receiver(context), SIGNATURE, context)?;
    let equal = match number_value(&argument(context, 0), SIGNATURE, context) {
        Ok(other) => (this as f64) == other,
        Err(_) => false,
    };
    Ok(registry.make_boolean(equal))
}

fn as_text(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Integer>>#asText";

    let this = integer_value(&receiver(context), SIGNATURE, context)?;
    Ok(registry.make_text(&this.to_string()))
}

fn random(registry: &mut Registry, context: &ObjRef) -> Result<ObjRef, Fault> {
    const SIGNATURE: &str = "Integer>>#random";

    let this = integer_value(&receiver(context), SIGNATURE, context)?;
    if this <= 0 {
        return Err(Fault::domain(
            format!("'{}': receiver must be positive", SIGNATURE),
            context.clone(),
        ));
    }
    let mut rng = rand::thread_rng();
    Ok(registry.make_integer(rng.gen_range(0, this) + 1))
}
