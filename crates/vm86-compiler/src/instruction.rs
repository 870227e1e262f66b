//! Decoded instruction model.
//!
//! One [`Instruction`] variant per operand shape. Each variant carries the
//! operation selected from that shape's dispatch table, so a value of this
//! type can only describe a mnemonic/shape pair the dialect supports.

use std::fmt;

use serde::{Deserialize, Serialize};
use vm86_types::{flags, Reg};

// ══════════════════════════════════════════════════════════════════════
// Conditions
// ══════════════════════════════════════════════════════════════════════

/// Branch condition of a `j*` mnemonic, evaluated against EFLAGS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// `jmp`
    Always,
    /// `jz`: ZF
    Zero,
    /// `jnz`: !ZF
    NotZero,
    /// `jnb`: !CF
    NotBelow,
    /// `jbe`: ZF | CF
    BelowOrEqual,
    /// `ja`: !(ZF | CF)
    Above,
}

impl Condition {
    /// Is the branch taken for this EFLAGS value?
    pub fn holds(self, eflags: u32) -> bool {
        let zf = eflags & flags::ZF != 0;
        let cf = eflags & flags::CF != 0;
        match self {
            Self::Always => true,
            Self::Zero => zf,
            Self::NotZero => !zf,
            Self::NotBelow => !cf,
            Self::BelowOrEqual => zf || cf,
            Self::Above => !(zf || cf),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Always => "jmp",
            Self::Zero => "jz",
            Self::NotZero => "jnz",
            Self::NotBelow => "jnb",
            Self::BelowOrEqual => "jbe",
            Self::Above => "ja",
        }
    }
}

// ══════════════════════════════════════════════════════════════════════
// Per-shape operations
// ══════════════════════════════════════════════════════════════════════

/// `op r0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegOp {
    Push,
    Pop,
    Not,
    Inc,
    Dec,
    Jump(Condition),
}

/// `op v0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImmOp {
    Push,
    Jump(Condition),
}

/// `op r0, r1` and `op r0, v0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairOp {
    Add,
    And,
    Cmp,
    Mov,
    Movzx,
    Or,
    Sar,
    Shl,
    Shr,
    Sub,
    Xor,
}

/// `op r0, [r1 + v0]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOp {
    Add,
    And,
    Cmp,
    Imul,
    Mov,
    Or,
    Sub,
    Xor,
}

/// `op r0, r1, r2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripleOp {
    Shrd,
}

/// `op r0, [r1 + r2 {+,*} v0]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressOp {
    Lea,
}

/// The operator between `r2` and `v0` in an indexed `lea`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOp {
    /// `r1 + r2 + v0`
    Add,
    /// `r1 + r2 * v0`
    Mul,
}

/// `op [r0 + v0]`, operating on EDX:EAX.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WideOp {
    Div,
    Mul,
}

/// `op [r0 + v0], r1` and `op [r0 + v0], v1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOp {
    Cmp,
    Mov,
}

/// A `[base + disp]` memory operand. `[r]` has `disp == 0`; `[r - v]` stores
/// the two's complement of `v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Memory {
    pub base: Reg,
    pub disp: u32,
}

// ══════════════════════════════════════════════════════════════════════
// Shapes
// ══════════════════════════════════════════════════════════════════════

/// The structural category of an operand list. Each shape has its own
/// dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    None,
    Call,
    Reg,
    Imm,
    RegReg,
    RegRegReg,
    RegImm,
    RegMem,
    Lea,
    JumpTable,
    Mem,
    MemReg,
    MemImm,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "no operands",
            Self::Call => "call target",
            Self::Reg => "r0",
            Self::Imm => "v0",
            Self::RegReg => "r0, r1",
            Self::RegRegReg => "r0, r1, r2",
            Self::RegImm => "r0, v0",
            Self::RegMem => "r0, [r1 + v0]",
            Self::Lea => "r0, [r1 + r2 op v0]",
            Self::JumpTable => "v0[r0 * v1]",
            Self::Mem => "[r0 + v0]",
            Self::MemReg => "[r0 + v0], r1",
            Self::MemImm => "[r0 + v0], v1",
        };
        f.write_str(s)
    }
}

// ══════════════════════════════════════════════════════════════════════
// Instruction
// ══════════════════════════════════════════════════════════════════════

/// A fully resolved instruction. Immutable once compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Instruction {
    Retn,
    /// Call a host function by name.
    Call { target: String },
    Reg { op: RegOp, r0: Reg },
    Imm { op: ImmOp, v0: u32 },
    RegReg { op: PairOp, r0: Reg, r1: Reg },
    RegRegReg { op: TripleOp, r0: Reg, r1: Reg, r2: Reg },
    RegImm { op: PairOp, r0: Reg, v0: u32 },
    RegMem { op: LoadOp, r0: Reg, mem: Memory },
    Lea {
        op: AddressOp,
        r0: Reg,
        r1: Reg,
        r2: Reg,
        index: IndexOp,
        v0: u32,
    },
    /// `jxx v0[r0 * v1]`: branch through a table of code addresses.
    JumpTable { cond: Condition, v0: u32, r0: Reg, v1: u32 },
    Mem { op: WideOp, mem: Memory },
    MemReg { op: StoreOp, mem: Memory, r1: Reg },
    MemImm { op: StoreOp, mem: Memory, v1: u32 },
}

impl Instruction {
    pub fn shape(&self) -> Shape {
        match self {
            Self::Retn => Shape::None,
            Self::Call { .. } => Shape::Call,
            Self::Reg { .. } => Shape::Reg,
            Self::Imm { .. } => Shape::Imm,
            Self::RegReg { .. } => Shape::RegReg,
            Self::RegRegReg { .. } => Shape::RegRegReg,
            Self::RegImm { .. } => Shape::RegImm,
            Self::RegMem { .. } => Shape::RegMem,
            Self::Lea { .. } => Shape::Lea,
            Self::JumpTable { .. } => Shape::JumpTable,
            Self::Mem { .. } => Shape::Mem,
            Self::MemReg { .. } => Shape::MemReg,
            Self::MemImm { .. } => Shape::MemImm,
        }
    }
}

// ── Display ──

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.disp as i32 {
            0 => write!(f, "[{}]", self.base),
            d if d < 0 => write!(f, "[{} - {:#x}]", self.base, d.unsigned_abs()),
            _ => write!(f, "[{} + {:#x}]", self.base, self.disp),
        }
    }
}

impl RegOp {
    fn mnemonic(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Not => "not",
            Self::Inc => "inc",
            Self::Dec => "dec",
            Self::Jump(cond) => cond.mnemonic(),
        }
    }
}

impl ImmOp {
    fn mnemonic(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Jump(cond) => cond.mnemonic(),
        }
    }
}

impl PairOp {
    fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::And => "and",
            Self::Cmp => "cmp",
            Self::Mov => "mov",
            Self::Movzx => "movzx",
            Self::Or => "or",
            Self::Sar => "sar",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::Sub => "sub",
            Self::Xor => "xor",
        }
    }
}

impl LoadOp {
    fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::And => "and",
            Self::Cmp => "cmp",
            Self::Imul => "imul",
            Self::Mov => "mov",
            Self::Or => "or",
            Self::Sub => "sub",
            Self::Xor => "xor",
        }
    }
}

impl WideOp {
    fn mnemonic(self) -> &'static str {
        match self {
            Self::Div => "div",
            Self::Mul => "mul",
        }
    }
}

impl StoreOp {
    fn mnemonic(self) -> &'static str {
        match self {
            Self::Cmp => "cmp",
            Self::Mov => "mov",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retn => f.write_str("retn"),
            Self::Call { target } => write!(f, "call {target}"),
            Self::Reg { op, r0 } => write!(f, "{} {r0}", op.mnemonic()),
            Self::Imm { op, v0 } => write!(f, "{} {v0:#x}", op.mnemonic()),
            Self::RegReg { op, r0, r1 } => write!(f, "{} {r0}, {r1}", op.mnemonic()),
            Self::RegRegReg {
                op: TripleOp::Shrd,
                r0,
                r1,
                r2,
            } => write!(f, "shrd {r0}, {r1}, {r2}"),
            Self::RegImm { op, r0, v0 } => write!(f, "{} {r0}, {v0:#x}", op.mnemonic()),
            Self::RegMem { op, r0, mem } => write!(f, "{} {r0}, {mem}", op.mnemonic()),
            Self::Lea {
                op: AddressOp::Lea,
                r0,
                r1,
                r2,
                index,
                v0,
            } => {
                let sym = match index {
                    IndexOp::Add => '+',
                    IndexOp::Mul => '*',
                };
                write!(f, "lea {r0}, [{r1} + {r2} {sym} {v0:#x}]")
            }
            Self::JumpTable { cond, v0, r0, v1 } => {
                write!(f, "{} {v0:#x}[{r0} * {v1}]", cond.mnemonic())
            }
            Self::Mem { op, mem } => write!(f, "{} {mem}", op.mnemonic()),
            Self::MemReg { op, mem, r1 } => write!(f, "{} {mem}, {r1}", op.mnemonic()),
            Self::MemImm { op, mem, v1 } => write!(f, "{} {mem}, {v1:#x}", op.mnemonic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_truth_table() {
        let zf = flags::ZF;
        let cf = flags::CF | flags::SF;
        assert!(Condition::Zero.holds(zf));
        assert!(!Condition::NotZero.holds(zf));
        assert!(Condition::BelowOrEqual.holds(cf));
        assert!(!Condition::NotBelow.holds(cf));
        assert!(Condition::Above.holds(0));
        assert!(!Condition::Above.holds(zf));
        assert!(Condition::Always.holds(zf | cf));
    }

    #[test]
    fn test_display_memory_operands() {
        let mem = Memory {
            base: Reg::EBP,
            disp: 8,
        };
        let neg = Memory {
            base: Reg::EBP,
            disp: (-4i32) as u32,
        };
        assert_eq!(mem.to_string(), "[ebp + 0x8]");
        assert_eq!(neg.to_string(), "[ebp - 0x4]");
        let insn = Instruction::RegMem {
            op: LoadOp::Mov,
            r0: Reg::EAX,
            mem,
        };
        assert_eq!(insn.to_string(), "mov eax, [ebp + 0x8]");
    }
}
