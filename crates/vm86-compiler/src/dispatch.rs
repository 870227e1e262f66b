//! Per-shape dispatch tables.
//!
//! Each table is sorted by mnemonic and searched with a case-insensitive
//! binary search. A mnemonic that is missing from the table of the shape its
//! operands were classified as is a compile error.

use vm86_parser::find_ignore_case;

use crate::instruction::{
    AddressOp, Condition, ImmOp, LoadOp, PairOp, RegOp, StoreOp, TripleOp, WideOp,
};

pub type Table<T> = [(&'static str, T)];

pub static NONE: [(&str, ()); 1] = [("retn", ())];

pub static CALL: [(&str, ()); 1] = [("call", ())];

pub static REG: [(&str, RegOp); 11] = [
    ("dec", RegOp::Dec),
    ("inc", RegOp::Inc),
    ("ja", RegOp::Jump(Condition::Above)),
    ("jbe", RegOp::Jump(Condition::BelowOrEqual)),
    ("jmp", RegOp::Jump(Condition::Always)),
    ("jnb", RegOp::Jump(Condition::NotBelow)),
    ("jnz", RegOp::Jump(Condition::NotZero)),
    ("jz", RegOp::Jump(Condition::Zero)),
    ("not", RegOp::Not),
    ("pop", RegOp::Pop),
    ("push", RegOp::Push),
];

pub static IMM: [(&str, ImmOp); 7] = [
    ("ja", ImmOp::Jump(Condition::Above)),
    ("jbe", ImmOp::Jump(Condition::BelowOrEqual)),
    ("jmp", ImmOp::Jump(Condition::Always)),
    ("jnb", ImmOp::Jump(Condition::NotBelow)),
    ("jnz", ImmOp::Jump(Condition::NotZero)),
    ("jz", ImmOp::Jump(Condition::Zero)),
    ("push", ImmOp::Push),
];

pub static REG_REG: [(&str, PairOp); 11] = [
    ("add", PairOp::Add),
    ("and", PairOp::And),
    ("cmp", PairOp::Cmp),
    ("mov", PairOp::Mov),
    ("movzx", PairOp::Movzx),
    ("or", PairOp::Or),
    ("sar", PairOp::Sar),
    ("shl", PairOp::Shl),
    ("shr", PairOp::Shr),
    ("sub", PairOp::Sub),
    ("xor", PairOp::Xor),
];

pub static REG_REG_REG: [(&str, TripleOp); 1] = [("shrd", TripleOp::Shrd)];

pub static REG_IMM: [(&str, PairOp); 10] = [
    ("add", PairOp::Add),
    ("and", PairOp::And),
    ("cmp", PairOp::Cmp),
    ("mov", PairOp::Mov),
    ("or", PairOp::Or),
    ("sar", PairOp::Sar),
    ("shl", PairOp::Shl),
    ("shr", PairOp::Shr),
    ("sub", PairOp::Sub),
    ("xor", PairOp::Xor),
];

pub static REG_MEM: [(&str, LoadOp); 8] = [
    ("add", LoadOp::Add),
    ("and", LoadOp::And),
    ("cmp", LoadOp::Cmp),
    ("imul", LoadOp::Imul),
    ("mov", LoadOp::Mov),
    ("or", LoadOp::Or),
    ("sub", LoadOp::Sub),
    ("xor", LoadOp::Xor),
];

pub static LEA: [(&str, AddressOp); 1] = [("lea", AddressOp::Lea)];

pub static JUMP_TABLE: [(&str, Condition); 6] = [
    ("ja", Condition::Above),
    ("jbe", Condition::BelowOrEqual),
    ("jmp", Condition::Always),
    ("jnb", Condition::NotBelow),
    ("jnz", Condition::NotZero),
    ("jz", Condition::Zero),
];

pub static MEM: [(&str, WideOp); 2] = [("div", WideOp::Div), ("mul", WideOp::Mul)];

pub static MEM_REG: [(&str, StoreOp); 2] = [("cmp", StoreOp::Cmp), ("mov", StoreOp::Mov)];

pub static MEM_IMM: [(&str, StoreOp); 2] = [("cmp", StoreOp::Cmp), ("mov", StoreOp::Mov)];

/// Look up `mnemonic` in `table`.
pub fn lookup<T: Copy>(table: &Table<T>, mnemonic: &str) -> Option<T> {
    find_ignore_case(table, mnemonic).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;
    use vm86_parser::compare_ignore_case;

    fn assert_sorted<T>(table: &Table<T>) {
        for pair in table.windows(2) {
            assert_eq!(
                compare_ignore_case(pair[0].0, pair[1].0),
                Ordering::Less,
                "{} before {}",
                pair[0].0,
                pair[1].0
            );
        }
    }

    #[test]
    fn test_every_table_is_sorted() {
        assert_sorted(&REG);
        assert_sorted(&IMM);
        assert_sorted(&REG_REG);
        assert_sorted(&REG_IMM);
        assert_sorted(&REG_MEM);
        assert_sorted(&JUMP_TABLE);
        assert_sorted(&MEM);
        assert_sorted(&MEM_REG);
        assert_sorted(&MEM_IMM);
    }

    #[test]
    fn test_jump_entries_agree_across_tables() {
        for (name, cond) in JUMP_TABLE.iter() {
            assert!(cond.mnemonic().eq_ignore_ascii_case(name));
            assert_eq!(lookup(&REG, name), Some(RegOp::Jump(*cond)));
            assert_eq!(lookup(&IMM, name), Some(ImmOp::Jump(*cond)));
        }
    }

    #[test]
    fn test_lookup_ignores_case() {
        assert_eq!(lookup(&REG_REG, "MOVZX"), Some(PairOp::Movzx));
        assert_eq!(lookup(&MEM, "Div"), Some(WideOp::Div));
        assert_eq!(lookup(&REG_IMM, "movzx"), None);
        assert_eq!(lookup(&NONE, "ret"), None);
    }
}
