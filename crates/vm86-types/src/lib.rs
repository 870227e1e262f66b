//! Shared types for vm86.
//!
//! This crate defines the machine state every other stage works against:
//! the aliased register file, the flat address map, the `.data` segment,
//! and the compile error type.

mod error;
pub mod data;
pub mod layout;
pub mod register;

pub use data::{Chunk, DataError, DataSegment};
pub use error::{CompileError, ErrorCategory, ErrorCode};
pub use register::{flags, Reg, RegClass, Registers, REGISTER_COUNT};

/// Result type used throughout the compiler.
pub type Result<T> = std::result::Result<T, CompileError>;
