//! On-disk format of a compiled progs image.
//!
//! A progs image is a packed little-endian binary: a 16-field header of
//! 32-bit words followed by six lumps (statements, global definitions,
//! field definitions, functions, string data, global data). This crate
//! holds the record layouts and the opcode table; it performs no
//! validation beyond decoding individual records. The runtime crate owns
//! whole-image validation.

pub mod defs;
pub mod header;
pub mod opcode;

pub use defs::{DefType, Definition, FunctionDef, DEF_TYPE_MASK};
pub use header::{ImageHeader, Lump, FORMAT_VERSION, HEADER_BYTES};
pub use opcode::{Opcode, OperandKind, Statement};
