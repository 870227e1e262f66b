//! The x86-32 register file with partial-register aliasing.
//!
//! Every register operand is carried as a [`Reg`], a one-byte index encoding
//! `(class << 4) | slot`. The slot selects one of the 16 32-bit storage words,
//! the class selects which view of that word is read or written:
//!
//! | class | view      | example |
//! |-------|-----------|---------|
//! | 0     | full u32  | `eax`   |
//! | 1     | low u8    | `al`    |
//! | 2     | high u8   | `ah`    |
//! | 3     | low u16   | `ax`    |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of 32-bit register slots.
pub const REGISTER_COUNT: usize = 16;

const SLOT_MASK: u8 = 0x0f;

/// Which part of a 32-bit slot a [`Reg`] reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegClass {
    Full32,
    Low8,
    High8,
    Low16,
}

impl RegClass {
    fn bits(self) -> u8 {
        match self {
            Self::Full32 => 0,
            Self::Low8 => 1,
            Self::High8 => 2,
            Self::Low16 => 3,
        }
    }
}

/// A register operand: slot number plus alias class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reg(u8);

impl Reg {
    // ── Full 32-bit slots ──
    pub const EAX: Self = Self(0);
    pub const EBX: Self = Self(1);
    pub const ECX: Self = Self(2);
    pub const EDX: Self = Self(3);
    pub const ESP: Self = Self(4);
    pub const EBP: Self = Self(5);
    pub const ESI: Self = Self(6);
    pub const EDI: Self = Self(7);
    pub const CS: Self = Self(8);
    pub const DS: Self = Self(9);
    pub const SS: Self = Self(10);
    pub const ES: Self = Self(11);
    pub const FS: Self = Self(12);
    pub const GS: Self = Self(13);
    pub const EIP: Self = Self(14);
    pub const EFLAGS: Self = Self(15);

    // ── Low bytes ──
    pub const AL: Self = Self(0x10);
    pub const BL: Self = Self(0x11);
    pub const CL: Self = Self(0x12);
    pub const DL: Self = Self(0x13);

    // ── High bytes ──
    pub const AH: Self = Self(0x20);
    pub const BH: Self = Self(0x21);
    pub const CH: Self = Self(0x22);
    pub const DH: Self = Self(0x23);

    // ── Low words ──
    pub const AX: Self = Self(0x30);
    pub const BX: Self = Self(0x31);
    pub const CX: Self = Self(0x32);
    pub const DX: Self = Self(0x33);

    /// Decode a raw index encoding. Returns `None` for a class above 3.
    pub fn new(encoding: u8) -> Option<Self> {
        (encoding < 0x40).then_some(Self(encoding))
    }

    /// Build an encoding from its parts. Returns `None` if `slot >= 16`.
    pub fn from_parts(class: RegClass, slot: u8) -> Option<Self> {
        (usize::from(slot) < REGISTER_COUNT).then_some(Self((class.bits() << 4) | slot))
    }

    /// The raw `(class << 4) | slot` encoding.
    pub fn encoding(self) -> u8 {
        self.0
    }

    /// The 32-bit storage slot this register aliases.
    pub fn slot(self) -> usize {
        usize::from(self.0 & SLOT_MASK)
    }

    pub fn class(self) -> RegClass {
        match (self.0 >> 4) & 3 {
            0 => RegClass::Full32,
            1 => RegClass::Low8,
            2 => RegClass::High8,
            _ => RegClass::Low16,
        }
    }

    /// Canonical lowercase mnemonic, or `"unk"` for encodings that have no
    /// x86 spelling (segment registers, flags, sub-views of ESP..EDI).
    pub fn name(self) -> &'static str {
        match self.0 {
            0x00 => "eax",
            0x01 => "ebx",
            0x02 => "ecx",
            0x03 => "edx",
            0x04 => "esp",
            0x05 => "ebp",
            0x06 => "esi",
            0x07 => "edi",
            0x10 => "al",
            0x11 => "bl",
            0x12 => "cl",
            0x13 => "dl",
            0x20 => "ah",
            0x21 => "bh",
            0x22 => "ch",
            0x23 => "dh",
            0x30 => "ax",
            0x31 => "bx",
            0x32 => "cx",
            0x33 => "dx",
            _ => "unk",
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bits of the EFLAGS slot. Only `CF`, `ZF` and `SF` are ever produced.
pub mod flags {
    pub const CF: u32 = 1 << 0;
    pub const PF: u32 = 1 << 2;
    pub const AF: u32 = 1 << 4;
    pub const ZF: u32 = 1 << 6;
    pub const SF: u32 = 1 << 7;
    pub const OF: u32 = 1 << 11;
}

/// The 16-slot register file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registers {
    slots: [u32; REGISTER_COUNT],
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every slot.
    pub fn clear(&mut self) {
        self.slots = [0; REGISTER_COUNT];
    }

    /// Read `reg` through its alias view.
    pub fn value(&self, reg: Reg) -> u32 {
        debug_assert!(reg.slot() < REGISTER_COUNT);
        let word = self.slots[reg.slot()];
        match reg.class() {
            RegClass::Full32 => word,
            RegClass::Low8 => word & 0xff,
            RegClass::High8 => (word >> 8) & 0xff,
            RegClass::Low16 => word & 0xffff,
        }
    }

    /// Write `value` through the alias view of `reg`. Bytes outside the view
    /// keep their previous contents.
    pub fn set(&mut self, reg: Reg, value: u32) {
        debug_assert!(reg.slot() < REGISTER_COUNT);
        let word = &mut self.slots[reg.slot()];
        *word = match reg.class() {
            RegClass::Full32 => value,
            RegClass::Low8 => (*word & !0xff) | (value & 0xff),
            RegClass::High8 => (*word & !0xff00) | ((value & 0xff) << 8),
            RegClass::Low16 => (*word & !0xffff) | (value & 0xffff),
        };
    }

    pub fn flags(&self) -> u32 {
        self.slots[Reg::EFLAGS.slot()]
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.slots[Reg::EFLAGS.slot()] = flags;
    }

    /// The stack top. ESP is the only storage for it.
    pub fn esp(&self) -> u32 {
        self.slots[Reg::ESP.slot()]
    }

    pub fn esp_mut(&mut self) -> &mut u32 {
        &mut self.slots[Reg::ESP.slot()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_writes_keep_the_rest_of_the_slot() {
        let mut regs = Registers::new();
        regs.set(Reg::EDX, 0x1122_3344);
        regs.set(Reg::DH, 0xaa);
        assert_eq!(regs.value(Reg::EDX), 0x1122_aa44);
        regs.set(Reg::DX, 0xbeef);
        assert_eq!(regs.value(Reg::EDX), 0x1122_beef);
        assert_eq!(regs.value(Reg::DL), 0xef);
    }

    #[test]
    fn test_unknown_encodings_have_a_sentinel_name() {
        assert_eq!(Reg::EFLAGS.name(), "unk");
        assert_eq!(Reg::new(0x34).map(Reg::name), Some("unk"));
        assert_eq!(Reg::new(0x40), None);
        assert_eq!(Reg::from_parts(RegClass::Low8, 16), None);
    }
}
