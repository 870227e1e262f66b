//! vm86 parser: normalized line reader plus the cursor-based primitives that
//! recognize mnemonics, registers, numbers and symbolic operands.

pub mod cursor;
pub mod line;
pub mod operand;

pub use cursor::Cursor;
pub use line::{is_endp, label, local, normalize, proc_header, read_lines, section, Section, SourceLine};
pub use operand::{
    compare_ignore_case, find_ignore_case, instruction_name, local_value, number_value,
    offset_value, register, segment_name, value, variable_name, Symbols,
};
