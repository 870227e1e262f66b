//! Register aliasing and data segment behaviour.

use proptest::prelude::*;
use vm86_types::layout::DATA_BASE;
use vm86_types::{DataError, DataSegment, Reg, Registers};

// ─────────────────────────────────────────────────────────────────────
// Register file
// ─────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_full_write_is_visible_through_every_alias(v in any::<u32>()) {
        let mut regs = Registers::new();
        regs.set(Reg::EAX, v);
        prop_assert_eq!(regs.value(Reg::AL), v & 0xff);
        prop_assert_eq!(regs.value(Reg::AH), (v >> 8) & 0xff);
        prop_assert_eq!(regs.value(Reg::AX), v & 0xffff);
        prop_assert_eq!(regs.value(Reg::EAX), v);
    }

    #[test]
    fn prop_low_byte_write_preserves_upper_bits(v in any::<u32>(), b in any::<u8>()) {
        let mut regs = Registers::new();
        regs.set(Reg::ECX, v);
        regs.set(Reg::CL, u32::from(b));
        prop_assert_eq!(regs.value(Reg::ECX), (v & 0xffff_ff00) | u32::from(b));
    }

    #[test]
    fn prop_word_write_preserves_high_half(v in any::<u32>(), w in any::<u16>()) {
        let mut regs = Registers::new();
        regs.set(Reg::EBX, v);
        regs.set(Reg::BX, u32::from(w));
        prop_assert_eq!(regs.value(Reg::EBX), (v & 0xffff_0000) | u32::from(w));
    }
}

#[test]
fn test_clear_zeroes_every_slot() {
    let mut regs = Registers::new();
    regs.set(Reg::EDI, 7);
    regs.set_flags(0xff);
    regs.clear();
    assert_eq!(regs, Registers::new());
}

#[test]
fn test_names_round_trip_the_register_table() {
    let pairs = [
        (Reg::EAX, "eax"),
        (Reg::ESP, "esp"),
        (Reg::AH, "ah"),
        (Reg::DL, "dl"),
        (Reg::CX, "cx"),
    ];
    for (reg, name) in pairs {
        assert_eq!(reg.name(), name);
        assert_eq!(reg.to_string(), name);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Data segment
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_continuation_grows_the_last_chunk() {
    let mut data = DataSegment::new(64);
    data.add("buf", Some(&[1, 2]), 2).unwrap();
    data.add("buf", Some(&[3, 4]), 2).unwrap();
    assert_eq!(data.get("buf"), Some((DATA_BASE, 4)));
    assert_eq!(data.bytes_of("buf"), Some(&[1u8, 2, 3, 4][..]));
}

#[test]
fn test_chunks_are_contiguous() {
    let mut data = DataSegment::new(64);
    data.add("a", Some(b"xy"), 2).unwrap();
    data.add("b", Some(b"z"), 1).unwrap();
    assert_eq!(data.get("a"), Some((DATA_BASE, 2)));
    assert_eq!(data.get("b"), Some((DATA_BASE + 2, 1)));
    assert_eq!(data.len(), 3);
}

#[test]
fn test_extending_the_last_chunk_advances_the_cursor() {
    let mut data = DataSegment::new(64);
    data.add("a", Some(b"x"), 1).unwrap();
    data.add("a", Some(b"yz"), 2).unwrap();
    assert_eq!(data.get("a"), Some((DATA_BASE, 3)));
    data.add("b", None, 4).unwrap();
    assert_eq!(data.get("b"), Some((DATA_BASE + 3, 4)));
    assert_eq!(data.len(), 7);
}

#[test]
fn test_re_adding_a_non_last_chunk_fails() {
    let mut data = DataSegment::new(64);
    data.add("a", Some(b"x"), 1).unwrap();
    data.add("b", Some(b"y"), 1).unwrap();
    assert_eq!(
        data.add("a", Some(b"z"), 1),
        Err(DataError::NotLastChunk("a".into()))
    );
    assert_eq!(data.len(), 2);
}

#[test]
fn test_add_past_capacity_fails() {
    let mut data = DataSegment::new(4);
    data.add("a", None, 3).unwrap();
    assert_eq!(
        data.add("b", None, 2),
        Err(DataError::Exhausted { need: 2, free: 1 })
    );
    assert!(!data.is("b"));
}

#[test]
fn test_word_and_cstr_access() {
    let mut data = DataSegment::new(16);
    data.add("s", Some(b"hi\0"), 3).unwrap();
    data.add("w", None, 4).unwrap();
    let w = data.address_of("w").unwrap();
    assert!(data.store_u32(w, 0xdead_beef));
    assert_eq!(data.load_u32(w), Some(0xdead_beef));
    assert_eq!(data.load_u8(w), Some(0xef));
    assert_eq!(data.read_cstr(DATA_BASE), Some(&b"hi"[..]));
    assert_eq!(data.load_u32(DATA_BASE + 14), None);
    assert_eq!(data.load_u8(DATA_BASE - 1), None);
}

proptest! {
    #[test]
    fn prop_continuation_concatenates(parts in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..8), 1..6)) {
        let mut data = DataSegment::new(256);
        let mut expected = Vec::new();
        for part in &parts {
            data.add("blob", Some(part), part.len()).unwrap();
            expected.extend_from_slice(part);
        }
        prop_assert_eq!(data.bytes_of("blob").unwrap(), &expected[..]);
    }
}
