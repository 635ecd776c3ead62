/// Primitives for the **Block** class.
pub mod block;
/// Primitives for the **Boolean** class.
pub mod boolean;
/// Primitives for the **Integer** class.
pub mod integer;
/// Primitives for the **Number** class.
pub mod number;
/// Primitives for the **Object** class.
pub mod object;
/// Primitives for the **Text** class.
pub mod text;

use crate::error::Fault;
use crate::registry::Registry;
use crate::ObjRef;

/// A native method: takes the freshly created context and returns the
/// result reference.
pub type NativeFn = fn(&mut Registry, &ObjRef) -> Result<ObjRef, Fault>;

/// A native constructor, run over a freshly allocated instance.
pub type NativeConstructor = fn(&mut Registry, &ObjRef) -> Result<(), Fault>;

/// A primitive definition: selector, parameter count, implementation.
pub type PrimitiveDef = (&'static str, u8, NativeFn);

/// The receiver of the send (`locals[0]`).
pub(crate) fn receiver(context: &ObjRef) -> ObjRef {
    context.local(0).unwrap_or_else(ObjRef::null)
}

/// The n-th parameter of the send (`locals[4 + n]`).
pub(crate) fn argument(context: &ObjRef, index: usize) -> ObjRef {
    context.parameter(index).unwrap_or_else(ObjRef::null)
}

pub(crate) fn integer_value(
    value: &ObjRef,
    signature: &str,
    context: &ObjRef,
) -> Result<i64, Fault> {
    if !value.is_null() {
        if let Some(value) = value.borrow().as_integer() {
            return Ok(value);
        }
    }
    Err(wrong_type(signature, "an Integer", context))
}

/// A numeric value: integers promote to floating point.
pub(crate) fn number_value(
    value: &ObjRef,
    signature: &str,
    context: &ObjRef,
) -> Result<f64, Fault> {
    if !value.is_null() {
        let object = value.borrow();
        if let Some(value) = object.as_number() {
            return Ok(value);
        }
        if let Some(value) = object.as_integer() {
            return Ok(value as f64);
        }
    }
    Err(wrong_type(signature, "a Number", context))
}

pub(crate) fn text_value(
    value: &ObjRef,
    signature: &str,
    context: &ObjRef,
) -> Result<String, Fault> {
    if !value.is_null() {
        if let Some(value) = value.borrow().as_text() {
            return Ok(value.to_string());
        }
    }
    Err(wrong_type(signature, "a Text", context))
}

pub(crate) fn boolean_value(
    value: &ObjRef,
    signature: &str,
    context: &ObjRef,
) -> Result<bool, Fault> {
    if !value.is_null() {
        if let Some(value) = value.borrow().as_boolean() {
            return Ok(value);
        }
    }
    Err(wrong_type(signature, "a Boolean", context))
}

pub(crate) fn block_value(
    value: &ObjRef,
    signature: &str,
    context: &ObjRef,
) -> Result<ObjRef, Fault> {
    if value.is_block() {
        return Ok(value.clone());
    }
    Err(wrong_type(signature, "a Block", context))
}

fn wrong_type(signature: &str, expected: &str, context: &ObjRef) -> Fault {
    Fault::domain(
        format!("'{}': wrong type (expected {})", signature, expected),
        context.clone(),
    )
}
