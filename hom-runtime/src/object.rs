//!
//! Facilities for manipulating runtime objects.
//!
//! Every reference-counted value in the runtime is an `Object`: a handle to
//! its class, an owned array of property references whose length is the
//! cumulative property count over the super chain, and a native payload.
//! Classes and contexts are objects too; their extra state lives in the
//! payload.
//!

use std::convert::TryInto;

use hom_core::float::{decode_number, encode_number};

use crate::class::ClassData;
use crate::context::ContextData;
use crate::error::{Fault, FaultKind};
use crate::ObjRef;

/// The native (non-property) payload of an object.
pub enum Payload {
    /// No native payload.
    None,
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Number(f64),
    /// A text value.
    Text(String),
    /// A boolean value.
    Boolean(bool),
    /// The state of a class (the object is a class).
    Class(ClassData),
    /// The state of a call frame (the object is a context).
    Context(ContextData),
}

/// A runtime object.
pub struct Object {
    /// The object's class.
    ///
    /// Strong for ordinary objects; only the two bootstrap classes hold weak
    /// links here, to break the class-of-classes cycle.
    pub class: ObjRef,
    /// The object's property slots.
    pub properties: Vec<ObjRef>,
    /// The object's native payload.
    pub payload: Payload,
}

impl Object {
    /// Construct a payload-free instance with the given property count.
    pub fn new(class: ObjRef, property_count: usize) -> Self {
        Self {
            class,
            properties: vec![ObjRef::null(); property_count],
            payload: Payload::None,
        }
    }

    /// Construct an object carrying a native payload and no properties.
    pub fn with_payload(class: ObjRef, payload: Payload) -> Self {
        Self {
            class,
            properties: Vec::new(),
            payload,
        }
    }

    /// Get the object's class.
    pub fn class(&self) -> &ObjRef {
        &self.class
    }

    /// Read a property slot.
    pub fn property(&self, index: usize) -> Option<ObjRef> {
        self.properties.get(index).cloned()
    }

    /// Write a property slot.
    pub fn set_property(&mut self, index: usize, value: ObjRef) -> Option<()> {
        *self.properties.get_mut(index)? = value;
        Some(())
    }

    /// Whether this object is a class.
    pub fn is_class(&self) -> bool {
        matches!(self.payload, Payload::Class(_))
    }

    /// Whether this object is a context.
    pub fn is_context(&self) -> bool {
        matches!(self.payload, Payload::Context(_))
    }

    /// Access the class state, if this object is a class.
    pub fn as_class(&self) -> Option<&ClassData> {
        match &self.payload {
            Payload::Class(data) => Some(data),
            _ => None,
        }
    }

    /// Mutably access the class state, if this object is a class.
    pub fn as_class_mut(&mut self) -> Option<&mut ClassData> {
        match &mut self.payload {
            Payload::Class(data) => Some(data),
            _ => None,
        }
    }

    /// Access the context state, if this object is a context.
    pub fn as_context(&self) -> Option<&ContextData> {
        match &self.payload {
            Payload::Context(data) => Some(data),
            _ => None,
        }
    }

    /// Mutably access the context state, if this object is a context.
    pub fn as_context_mut(&mut self) -> Option<&mut ContextData> {
        match &mut self.payload {
            Payload::Context(data) => Some(data),
            _ => None,
        }
    }

    /// The integer payload, if any.
    pub fn as_integer(&self) -> Option<i64> {
        match self.payload {
            Payload::Integer(value) => Some(value),
            _ => None,
        }
    }

    /// The floating-point payload, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self.payload {
            Payload::Number(value) => Some(value),
            _ => None,
        }
    }

    /// The text payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// The boolean payload, if any.
    pub fn as_boolean(&self) -> Option<bool> {
        match self.payload {
            Payload::Boolean(value) => Some(value),
            _ => None,
        }
    }
}

// Payload tags of the archive encoding.
const TAG_NONE: u8 = 0;
const TAG_INTEGER: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_TEXT: u8 = 3;
const TAG_BOOLEAN: u8 = 4;

impl Object {
    /// Write the native payload for an archive.
    ///
    /// Properties are the archive's concern and are not included.
    pub fn serialize(&self) -> Vec<u8> {
        match &self.payload {
            Payload::Integer(value) => {
                let mut bytes = vec![TAG_INTEGER];
                bytes.extend_from_slice(&value.to_be_bytes());
                bytes
            }
            Payload::Number(value) => {
                let (mantissa, exponent) = encode_number(*value);
                let mut bytes = vec![TAG_NUMBER];
                bytes.extend_from_slice(&mantissa.to_be_bytes());
                bytes.extend_from_slice(&exponent.to_be_bytes());
                bytes
            }
            Payload::Text(value) => {
                let mut bytes = vec![TAG_TEXT];
                bytes.extend_from_slice(value.as_bytes());
                bytes
            }
            Payload::Boolean(value) => vec![TAG_BOOLEAN, *value as u8],
            Payload::None | Payload::Class(_) | Payload::Context(_) => vec![TAG_NONE],
        }
    }

    /// Read the native payload back from an archive.
    pub fn unserialize(&mut self, bytes: &[u8]) -> Result<(), Fault> {
        let malformed = || {
            Fault::new(
                FaultKind::Domain,
                "malformed native payload",
                ObjRef::null(),
            )
        };

        let (tag, rest) = bytes.split_first().ok_or_else(malformed)?;
        self.payload = match *tag {
            TAG_NONE => Payload::None,
            TAG_INTEGER => {
                let raw: [u8; 8] = rest.try_into().map_err(|_| malformed())?;
                Payload::Integer(i64::from_be_bytes(raw))
            }
            TAG_NUMBER => {
                if rest.len() != 12 {
                    return Err(malformed());
                }
                let mantissa = i64::from_be_bytes(rest[..8].try_into().unwrap());
                let exponent = i32::from_be_bytes(rest[8..].try_into().unwrap());
                Payload::Number(decode_number(mantissa, exponent))
            }
            TAG_TEXT => {
                let text = String::from_utf8(rest.to_vec()).map_err(|_| malformed())?;
                Payload::Text(text)
            }
            TAG_BOOLEAN => match rest {
                [0] => Payload::Boolean(false),
                [1] => Payload::Boolean(true),
                _ => return Err(malformed()),
            },
            _ => return Err(malformed()),
        };
        Ok(())
    }
}

impl ObjRef {
    /// Get the class of the referenced object (null for the null handle).
    pub fn class_of(&self) -> ObjRef {
        if self.is_null() {
            return ObjRef::null();
        }
        self.borrow().class.normal()
    }

    /// Get a human-readable rendering of the referenced value.
    pub fn display(&self) -> String {
        if self.is_null() {
            return String::from("null");
        }
        let object = self.borrow();
        match &object.payload {
            Payload::None => format!(
                "instance of {}",
                crate::class::class_name(&object.class.normal())
            ),
            Payload::Integer(value) => value.to_string(),
            Payload::Number(value) => value.to_string(),
            Payload::Text(value) => value.clone(),
            Payload::Boolean(value) => value.to_string(),
            Payload::Class(data) => data.name.clone(),
            Payload::Context(data) => {
                if data.block.is_some() {
                    String::from("a Block")
                } else {
                    String::from("a Context")
                }
            }
        }
    }
}
