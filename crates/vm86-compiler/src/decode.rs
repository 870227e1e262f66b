//! Instruction decoder: mnemonic, then structural operand classification,
//! then a lookup in the classified shape's dispatch table.

use thiserror::Error;
use tracing::trace;
use vm86_parser::{
    instruction_name, local_value, number_value, offset_value, register, value, variable_name,
    Cursor, Symbols,
};
use vm86_types::{ErrorCode, Reg};

use crate::dispatch::{self, Table};
use crate::instruction::{IndexOp, Instruction, Memory, Shape};

/// Why a single line failed to decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected a mnemonic")]
    MissingMnemonic,

    #[error("expected a register at `{0}`")]
    ExpectedRegister(String),

    #[error("expected {expected} at `{found}`")]
    Malformed {
        expected: &'static str,
        found: String,
    },

    #[error("unexpected trailing text `{0}`")]
    Trailing(String),

    #[error("unknown mnemonic '{mnemonic}' for operands `{shape}`")]
    UnknownMnemonic { mnemonic: String, shape: Shape },

    #[error("unresolved symbol '{0}'")]
    Unresolved(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl DecodeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingMnemonic | Self::Malformed { .. } | Self::Trailing(_) => {
                ErrorCode::MALFORMED_OPERAND
            }
            Self::ExpectedRegister(_) => ErrorCode::UNKNOWN_REGISTER,
            Self::UnknownMnemonic { .. } => ErrorCode::UNKNOWN_MNEMONIC,
            Self::Unresolved(_) => ErrorCode::UNRESOLVED_SYMBOL,
            Self::InvalidData(_) => ErrorCode::INVALID_DATA,
        }
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;

// ══════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════

fn select<T: Copy>(table: &Table<T>, mnemonic: &str, shape: Shape) -> DecodeResult<T> {
    dispatch::lookup(table, mnemonic).ok_or_else(|| DecodeError::UnknownMnemonic {
        mnemonic: mnemonic.to_string(),
        shape,
    })
}

fn expect_register(cur: &mut Cursor<'_>) -> DecodeResult<Reg> {
    register(cur).ok_or_else(|| DecodeError::ExpectedRegister(cur.rest().to_string()))
}

fn expect_byte(cur: &mut Cursor<'_>, b: u8, expected: &'static str) -> DecodeResult<()> {
    if cur.eat(b) {
        cur.skip_spaces();
        Ok(())
    } else {
        Err(DecodeError::Malformed {
            expected,
            found: cur.rest().to_string(),
        })
    }
}

fn finish(cur: &Cursor<'_>) -> DecodeResult<()> {
    if cur.at_end() {
        Ok(())
    } else {
        Err(DecodeError::Trailing(cur.rest().to_string()))
    }
}

/// A value operand, reporting an identifier-looking failure as unresolved.
fn expect_value(cur: &mut Cursor<'_>, syms: &Symbols<'_>) -> DecodeResult<u32> {
    value(cur, syms).ok_or_else(|| unresolved_or_malformed(cur, "a value"))
}

fn unresolved_or_malformed(cur: &Cursor<'_>, expected: &'static str) -> DecodeError {
    let rest = cur.rest();
    let token = rest
        .rsplit(|c: char| c == ':' || c == ' ')
        .next()
        .unwrap_or(rest);
    let name = token
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .next()
        .unwrap_or("");
    if name
        .bytes()
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
    {
        DecodeError::Unresolved(name.to_string())
    } else {
        DecodeError::Malformed {
            expected,
            found: rest.to_string(),
        }
    }
}

/// The tail of a memory operand after `[base`: `]`, `+ v]` or `- v]`.
fn displacement(cur: &mut Cursor<'_>, syms: &Symbols<'_>) -> DecodeResult<u32> {
    if cur.eat(b']') {
        cur.skip_spaces();
        return Ok(0);
    }
    let negative = if cur.eat(b'+') {
        false
    } else if cur.eat(b'-') {
        true
    } else {
        return Err(DecodeError::Malformed {
            expected: "`+`, `-` or `]`",
            found: cur.rest().to_string(),
        });
    };
    cur.skip_spaces();
    let v = expect_value(cur, syms)?;
    expect_byte(cur, b']', "`]`")?;
    Ok(if negative { v.wrapping_neg() } else { v })
}

/// `[base]`, `[base + v]` or `[base - v]`, starting at the `[`.
fn memory(cur: &mut Cursor<'_>, syms: &Symbols<'_>) -> DecodeResult<Memory> {
    expect_byte(cur, b'[', "`[`")?;
    let base = expect_register(cur)?;
    let disp = displacement(cur, syms)?;
    Ok(Memory { base, disp })
}

// ══════════════════════════════════════════════════════════════════════
// Decoder
// ══════════════════════════════════════════════════════════════════════

/// Decode one normalized code line.
pub fn decode(line: &str, syms: &Symbols<'_>) -> DecodeResult<Instruction> {
    let mut cur = Cursor::new(line);
    let name = instruction_name(&mut cur).ok_or(DecodeError::MissingMnemonic)?;

    let insn = if cur.at_end() {
        select(&dispatch::NONE, name, Shape::None)?;
        Instruction::Retn
    } else if cur.peek() == Some(b'[') {
        decode_memory_first(name, &mut cur, syms)?
    } else if let Some(r0) = register(&mut cur) {
        decode_register_first(name, r0, &mut cur, syms)?
    } else if dispatch::lookup(&dispatch::CALL, name).is_some() {
        let target = variable_name(&mut cur).ok_or_else(|| DecodeError::Malformed {
            expected: "a call target",
            found: cur.rest().to_string(),
        })?;
        finish(&cur)?;
        Instruction::Call {
            target: target.to_string(),
        }
    } else {
        decode_value_first(name, &mut cur, syms)?
    };

    trace!(line, %insn, "decode");
    Ok(insn)
}

/// `op [r0 + v0]`, `op [r0 + v0], r1`, `op [r0 + v0], v1`
fn decode_memory_first(
    name: &str,
    cur: &mut Cursor<'_>,
    syms: &Symbols<'_>,
) -> DecodeResult<Instruction> {
    let mem = memory(cur, syms)?;
    cur.skip_separators(b",");

    if cur.at_end() {
        let op = select(&dispatch::MEM, name, Shape::Mem)?;
        return Ok(Instruction::Mem { op, mem });
    }
    if let Some(r1) = register(cur) {
        finish(cur)?;
        let op = select(&dispatch::MEM_REG, name, Shape::MemReg)?;
        return Ok(Instruction::MemReg { op, mem, r1 });
    }
    let v1 = expect_value(cur, syms)?;
    finish(cur)?;
    let op = select(&dispatch::MEM_IMM, name, Shape::MemImm)?;
    Ok(Instruction::MemImm { op, mem, v1 })
}

/// Every shape whose first operand is a register.
fn decode_register_first(
    name: &str,
    r0: Reg,
    cur: &mut Cursor<'_>,
    syms: &Symbols<'_>,
) -> DecodeResult<Instruction> {
    cur.skip_separators(b",");

    if cur.at_end() {
        let op = select(&dispatch::REG, name, Shape::Reg)?;
        return Ok(Instruction::Reg { op, r0 });
    }

    if let Some(r1) = register(cur) {
        cur.skip_separators(b",");
        if cur.at_end() {
            let op = select(&dispatch::REG_REG, name, Shape::RegReg)?;
            return Ok(Instruction::RegReg { op, r0, r1 });
        }
        let r2 = expect_register(cur)?;
        finish(cur)?;
        let op = select(&dispatch::REG_REG_REG, name, Shape::RegRegReg)?;
        return Ok(Instruction::RegRegReg { op, r0, r1, r2 });
    }

    if cur.peek() == Some(b'[') {
        return decode_register_memory(name, r0, cur, syms);
    }

    let v0 = if cur.eat_keyword("offset") {
        offset_value(cur, syms).ok_or_else(|| unresolved_or_malformed(cur, "an offset"))?
    } else if let Some(v) = number_value(cur) {
        v
    } else if let Some(v) = local_value(cur, syms.locals) {
        v
    } else {
        return Err(unresolved_or_malformed(cur, "a register, memory operand or value"));
    };
    finish(cur)?;
    let op = select(&dispatch::REG_IMM, name, Shape::RegImm)?;
    Ok(Instruction::RegImm { op, r0, v0 })
}

/// `op r0, [r1 + v0]` or the indexed `op r0, [r1 + r2 {+,*} v0]`.
fn decode_register_memory(
    name: &str,
    r0: Reg,
    cur: &mut Cursor<'_>,
    syms: &Symbols<'_>,
) -> DecodeResult<Instruction> {
    expect_byte(cur, b'[', "`[`")?;
    let r1 = expect_register(cur)?;

    let mut probe = *cur;
    if probe.eat(b'+') {
        probe.skip_spaces();
        if let Some(r2) = register(&mut probe) {
            let index = if probe.eat(b'+') {
                IndexOp::Add
            } else if probe.eat(b'*') {
                IndexOp::Mul
            } else {
                return Err(DecodeError::Malformed {
                    expected: "`+` or `*`",
                    found: probe.rest().to_string(),
                });
            };
            probe.skip_spaces();
            let v0 = expect_value(&mut probe, syms)?;
            expect_byte(&mut probe, b']', "`]`")?;
            finish(&probe)?;
            *cur = probe;
            let op = select(&dispatch::LEA, name, Shape::Lea)?;
            return Ok(Instruction::Lea {
                op,
                r0,
                r1,
                r2,
                index,
                v0,
            });
        }
    }

    let disp = displacement(cur, syms)?;
    finish(cur)?;
    let op = select(&dispatch::REG_MEM, name, Shape::RegMem)?;
    Ok(Instruction::RegMem {
        op,
        r0,
        mem: Memory { base: r1, disp },
    })
}

/// `op v0` or the jump table form `op v0[r0 * v1]`.
fn decode_value_first(
    name: &str,
    cur: &mut Cursor<'_>,
    syms: &Symbols<'_>,
) -> DecodeResult<Instruction> {
    let v0 = expect_value(cur, syms)?;

    if cur.eat(b'[') {
        cur.skip_spaces();
        let r0 = expect_register(cur)?;
        expect_byte(cur, b'*', "`*`")?;
        let v1 = expect_value(cur, syms)?;
        expect_byte(cur, b']', "`]`")?;
        finish(cur)?;
        let cond = select(&dispatch::JUMP_TABLE, name, Shape::JumpTable)?;
        return Ok(Instruction::JumpTable { cond, v0, r0, v1 });
    }

    finish(cur)?;
    let op = select(&dispatch::IMM, name, Shape::Imm)?;
    Ok(Instruction::Imm { op, v0 })
}
