use std::convert::TryFrom;
use std::fmt;

/// An instruction opcode.
///
/// Instructions are encoded as the opcode byte followed by its operands.
/// Operands are one-byte local-slot indices unless stated otherwise, and all
/// multi-byte integers are big-endian.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// No operation (1 byte).
    Noop = 0x00,
    /// Send a message, discarding the result
    /// (7+N bytes: object slot, 4-byte selector, parameter count N, N parameter slots).
    Message = 0x01,
    /// Send a message to the super chain, discarding the result (7+N bytes).
    MessageSuper = 0x02,
    /// Send a message, storing the result
    /// (8+N bytes: object slot, result slot, 4-byte selector, parameter count, parameter slots).
    MessageResult = 0x03,
    /// Send a message to the super chain, storing the result (8+N bytes).
    MessageSuperResult = 0x04,
    /// Allocate a block context over the current frame
    /// (5 bytes: result slot, own-local count, 2-byte body size).
    Block = 0x05,
    /// Mark the current context as done (1 byte).
    ContextEnd = 0x06,
    /// Copy a local (3 bytes: destination, source).
    Assign = 0x07,
    /// Read one of self's properties into a local (3 bytes: destination, property index).
    AssignProperty = 0x08,
    /// Read one of the defining class's properties into a local (3 bytes).
    AssignClassProperty = 0x09,
    /// Resolve a class by hash into a local (6 bytes: destination, 4-byte class hash).
    AssignClass = 0x0a,
    /// Materialize an integer constant (6 bytes: destination, 4-byte signed value).
    AssignConstInt = 0x0b,
    /// Materialize a floating-point constant
    /// (14 bytes: destination, 8-byte mantissa, 4-byte exponent).
    AssignConstNum = 0x0c,
    /// Materialize a text constant (variable: destination, NUL-terminated UTF-8).
    AssignConstTxt = 0x0d,
    /// Write a local into one of self's properties (3 bytes: property index, source).
    SetProperty = 0x0e,
    /// Write a local into one of the defining class's properties (3 bytes).
    SetClassProperty = 0x0f,
}

impl Opcode {
    /// Get the instruction's name.
    #[rustfmt::skip]
    pub fn name(self) -> &'static str {
        match self {
            Self::Noop                => "NOOP",
            Self::Message             => "MESSAGE",
            Self::MessageSuper        => "MESG_SUPER",
            Self::MessageResult       => "MESG_RESULT",
            Self::MessageSuperResult  => "MESG_SUPER_RESULT",
            Self::Block               => "BLOCK",
            Self::ContextEnd          => "CONTEXT_END",
            Self::Assign              => "ASSIGN",
            Self::AssignProperty      => "ASSIGN_PROP",
            Self::AssignClassProperty => "ASSIGN_CLASS_PROP",
            Self::AssignClass         => "ASSIGN_CLASS",
            Self::AssignConstInt      => "ASSIGN_CONST_INT",
            Self::AssignConstNum      => "ASSIGN_CONST_NUM",
            Self::AssignConstTxt      => "ASSIGN_CONST_TXT",
            Self::SetProperty         => "SET_PROP",
            Self::SetClassProperty    => "SET_CLASS_PROP",
        }
    }

    /// Get the instruction's name padded so that every padded name is of the same length.
    #[rustfmt::skip]
    pub fn padded_name(self) -> &'static str {
        match self {
            Self::Noop                => "NOOP             ",
            Self::Message             => "MESSAGE          ",
            Self::MessageSuper        => "MESG_SUPER       ",
            Self::MessageResult       => "MESG_RESULT      ",
            Self::MessageSuperResult  => "MESG_SUPER_RESULT",
            Self::Block               => "BLOCK            ",
            Self::ContextEnd          => "CONTEXT_END      ",
            Self::Assign              => "ASSIGN           ",
            Self::AssignProperty      => "ASSIGN_PROP      ",
            Self::AssignClassProperty => "ASSIGN_CLASS_PROP",
            Self::AssignClass         => "ASSIGN_CLASS     ",
            Self::AssignConstInt      => "ASSIGN_CONST_INT ",
            Self::AssignConstNum      => "ASSIGN_CONST_NUM ",
            Self::AssignConstTxt      => "ASSIGN_CONST_TXT ",
            Self::SetProperty         => "SET_PROP         ",
            Self::SetClassProperty    => "SET_CLASS_PROP   ",
        }
    }

    /// Get the instruction's encoded size, if it is fixed.
    ///
    /// Message sends and text constants have variable encodings and return `None`.
    #[rustfmt::skip]
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Noop                => Some(1),
            Self::ContextEnd          => Some(1),
            Self::Assign              => Some(3),
            Self::AssignProperty      => Some(3),
            Self::AssignClassProperty => Some(3),
            Self::SetProperty         => Some(3),
            Self::SetClassProperty    => Some(3),
            Self::Block               => Some(5),
            Self::AssignClass         => Some(6),
            Self::AssignConstInt      => Some(6),
            Self::AssignConstNum      => Some(14),
            Self::Message             => None,
            Self::MessageSuper        => None,
            Self::MessageResult       => None,
            Self::MessageSuperResult  => None,
            Self::AssignConstTxt      => None,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Noop),
            0x01 => Ok(Self::Message),
            0x02 => Ok(Self::MessageSuper),
            0x03 => Ok(Self::MessageResult),
            0x04 => Ok(Self::MessageSuperResult),
            0x05 => Ok(Self::Block),
            0x06 => Ok(Self::ContextEnd),
            0x07 => Ok(Self::Assign),
            0x08 => Ok(Self::AssignProperty),
            0x09 => Ok(Self::AssignClassProperty),
            0x0a => Ok(Self::AssignClass),
            0x0b => Ok(Self::AssignConstInt),
            0x0c => Ok(Self::AssignConstNum),
            0x0d => Ok(Self::AssignConstTxt),
            0x0e => Ok(Self::SetProperty),
            0x0f => Ok(Self::SetClassProperty),
            other => Err(other),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_raw_bytes() {
        for raw in 0x00..=0x0fu8 {
            let opcode = Opcode::try_from(raw).expect("value within the opcode range");
            assert_eq!(opcode as u8, raw);
        }
    }

    #[test]
    fn rejects_unknown_bytes() {
        assert_eq!(Opcode::try_from(0x10), Err(0x10));
        assert_eq!(Opcode::try_from(0xff), Err(0xff));
    }

    #[test]
    fn padded_names_share_a_width() {
        let width = Opcode::Noop.padded_name().len();
        for raw in 0x00..=0x0fu8 {
            let opcode = Opcode::try_from(raw).unwrap();
            assert_eq!(opcode.padded_name().len(), width, "{}", opcode);
            assert_eq!(opcode.padded_name().trim_end(), opcode.name());
        }
    }
}
