//!
//! The runtime's failure type.
//!
//! There is a single failure kind: a `Fault` carries a category, a
//! human-readable message, and a handle to the context that was live at the
//! failure point (null for failures outside any send). The interpreter never
//! catches faults: they propagate through `Result` past any number of
//! logical contexts until ordinary native code (or the outermost caller)
//! handles them.
//!

use thiserror::Error;

use crate::ObjRef;

/// The category of a runtime fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// No method table entry anywhere in a super chain.
    UnresolvedMessage,
    /// The interpreter met an unimplemented or truncated instruction.
    UnknownOpcode,
    /// A class was recorded under an already-present hash.
    RegistryConflict,
    /// A class hash or name could not be resolved.
    RegistryMiss,
    /// A property or local slot index out of range.
    InvalidIndex,
    /// A domain error raised by a native method.
    Domain,
}

/// A runtime failure.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct Fault {
    /// The failure category.
    pub kind: FaultKind,
    /// The human-readable description.
    pub message: String,
    /// The context live at the failure point (null outside any send).
    pub context: ObjRef,
}

impl Fault {
    /// Build a fault from its parts.
    pub fn new(kind: FaultKind, message: impl Into<String>, context: ObjRef) -> Self {
        Self {
            kind,
            message: message.into(),
            context,
        }
    }

    /// No method table entry anywhere in the super chain.
    pub fn unresolved(selector: &str, class_name: &str, context: ObjRef) -> Self {
        Self::new(
            FaultKind::UnresolvedMessage,
            format!(
                "message `{}` not understood by class `{}`",
                selector, class_name
            ),
            context,
        )
    }

    /// A message was sent to a null reference.
    pub fn null_receiver(selector: &str, context: ObjRef) -> Self {
        Self::new(
            FaultKind::UnresolvedMessage,
            format!("message `{}` sent to a null reference", selector),
            context,
        )
    }

    /// The interpreter met an unknown opcode.
    pub fn unknown_opcode(byte: u8, class_name: &str, offset: usize, context: ObjRef) -> Self {
        Self::new(
            FaultKind::UnknownOpcode,
            format!(
                "unknown opcode 0x{:02x} in class `{}` at offset {}",
                byte, class_name, offset
            ),
            context,
        )
    }

    /// An instruction ran past the end of its bytecode.
    pub fn truncated(class_name: &str, offset: usize, context: ObjRef) -> Self {
        Self::new(
            FaultKind::UnknownOpcode,
            format!(
                "truncated instruction in class `{}` at offset {}",
                class_name, offset
            ),
            context,
        )
    }

    /// A class was recorded under an already-present hash.
    pub fn registry_conflict(name: &str) -> Self {
        Self::new(
            FaultKind::RegistryConflict,
            format!("a class named `{}` is already recorded", name),
            ObjRef::null(),
        )
    }

    /// A class hash or name could not be resolved.
    pub fn registry_miss(what: impl Into<String>) -> Self {
        Self::new(FaultKind::RegistryMiss, what, ObjRef::null())
    }

    /// A property or local slot index out of range.
    pub fn invalid_index(what: &str, index: usize, context: ObjRef) -> Self {
        Self::new(
            FaultKind::InvalidIndex,
            format!("invalid {} index {}", what, index),
            context,
        )
    }

    /// A domain error raised by a native method.
    pub fn domain(message: impl Into<String>, context: ObjRef) -> Self {
        Self::new(FaultKind::Domain, message, context)
    }
}
