//! The machine's flat 32-bit address map.
//!
//! Register values that are used as pointers are plain `u32` addresses into
//! this map, never host pointers. Three disjoint regions exist:
//!
//! ```text
//! 0x0001_0000  .data segment   (data_size bytes)
//! 0x0040_0000  code            (one address per instruction of a procedure)
//! 0x0080_0000  stack           (4 * stack_words bytes, grows downward)
//! ```

/// First address of the data segment.
pub const DATA_BASE: u32 = 0x0001_0000;

/// Address of instruction 0 of a procedure. Instruction `i` lives at
/// `CODE_BASE + i`; labels resolve to these addresses.
pub const CODE_BASE: u32 = 0x0040_0000;

/// Lowest address of the stack region.
pub const STACK_BASE: u32 = 0x0080_0000;

/// Return address pushed before a procedure runs and checked by `retn`.
pub const SENTINEL_RETURN: u32 = 0xbeaf;

/// Code address of the instruction at `index`.
pub fn code_address(index: usize) -> u32 {
    CODE_BASE.wrapping_add(index as u32)
}

/// Instruction index for a code address, if the address lies in the code
/// region and below `len`.
pub fn code_index(address: u32, len: usize) -> Option<usize> {
    let index = address.checked_sub(CODE_BASE)? as usize;
    (index < len).then_some(index)
}
