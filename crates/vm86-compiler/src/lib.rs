//! vm86 compiler: turns `<name> proc near` ... `endp` source text into a
//! [`Procedure`] of decoded [`Instruction`]s.
//!
//! ```text
//! source → header → pass 1 (locals, labels, count) → label fixup
//!        → pass 2 (data + decode) → Procedure
//! ```

pub mod data_decl;
pub mod decode;
pub mod dispatch;
pub mod instruction;
pub mod proc;

pub use data_decl::{decode_data, DataLine, Directive};
pub use decode::{decode, DecodeError, DecodeResult};
pub use instruction::{
    AddressOp, Condition, ImmOp, IndexOp, Instruction, LoadOp, Memory, PairOp, RegOp, Shape,
    StoreOp, TripleOp, WideOp,
};
pub use proc::{compile, procedure_name, Labels, PendingLabels, Prepared, Procedure};
