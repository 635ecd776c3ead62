//!
//! Shared bytecode definitions for the Hashed Object Machine.
//!
//! This crate is what a bytecode producer and the runtime agree on: the
//! opcode set and its operand layout, the portable floating-point constant
//! encoding, and a disassembler over raw instruction streams.
//!

/// Facilities for disassembling bytecode.
pub mod disasm;
/// The portable floating-point constant encoding.
pub mod float;
/// The instruction set.
pub mod opcode;

pub use crate::float::{decode_number, encode_number};
pub use crate::opcode::Opcode;
