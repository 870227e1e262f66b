//! Operand primitives.
//!
//! Every function here takes a `&mut Cursor` and either consumes a match
//! (plus trailing whitespace) and returns `Some`, or returns `None` with the
//! cursor left exactly where it was. Callers build alternation by simply
//! trying one primitive after another.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::trace;
use vm86_types::{DataSegment, Reg};

use crate::cursor::Cursor;

/// Symbol tables an operand may refer to.
#[derive(Debug, Clone, Copy)]
pub struct Symbols<'a> {
    /// Stack-frame constants declared as `name = dword ptr n`.
    pub locals: &'a BTreeMap<String, u32>,
    /// Label name to code address.
    pub labels: &'a BTreeMap<String, u32>,
    pub data: &'a DataSegment,
}

// ══════════════════════════════════════════════════════════════════════
// Table lookup
// ══════════════════════════════════════════════════════════════════════

/// ASCII case-insensitive ordering.
pub fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|b| b.to_ascii_lowercase())
        .cmp(b.bytes().map(|b| b.to_ascii_lowercase()))
}

/// Binary search a table sorted by lowercase name.
pub fn find_ignore_case<'t, T>(table: &'t [(&str, T)], name: &str) -> Option<&'t T> {
    table
        .binary_search_by(|(key, _)| compare_ignore_case(key, name))
        .ok()
        .map(|i| &table[i].1)
}

/// The 20 register spellings, sorted.
const REGISTERS: [(&str, Reg); 20] = [
    ("ah", Reg::AH),
    ("al", Reg::AL),
    ("ax", Reg::AX),
    ("bh", Reg::BH),
    ("bl", Reg::BL),
    ("bx", Reg::BX),
    ("ch", Reg::CH),
    ("cl", Reg::CL),
    ("cx", Reg::CX),
    ("dh", Reg::DH),
    ("dl", Reg::DL),
    ("dx", Reg::DX),
    ("eax", Reg::EAX),
    ("ebp", Reg::EBP),
    ("ebx", Reg::EBX),
    ("ecx", Reg::ECX),
    ("edi", Reg::EDI),
    ("edx", Reg::EDX),
    ("esi", Reg::ESI),
    ("esp", Reg::ESP),
];

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

// ══════════════════════════════════════════════════════════════════════
// Names
// ══════════════════════════════════════════════════════════════════════

/// A mnemonic: an alphabetic run followed by whitespace or end of line.
pub fn instruction_name<'a>(cur: &mut Cursor<'a>) -> Option<&'a str> {
    let mut c = *cur;
    let name = c.take_while(|b| b.is_ascii_alphabetic());
    if name.is_empty() || c.peek().is_some_and(|b| !b.is_ascii_whitespace()) {
        return None;
    }
    c.skip_spaces();
    *cur = c;
    Some(name)
}

/// An identifier: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn variable_name<'a>(cur: &mut Cursor<'a>) -> Option<&'a str> {
    let mut c = *cur;
    if !c.peek().is_some_and(is_ident_start) {
        return None;
    }
    let name = c.take_while(is_ident_continue);
    c.skip_spaces();
    *cur = c;
    Some(name)
}

/// A segment prefix such as `ds:`. Returns the segment name without the colon.
pub fn segment_name<'a>(cur: &mut Cursor<'a>) -> Option<&'a str> {
    let mut c = *cur;
    let name = c.take_while(|b| b.is_ascii_alphabetic());
    if name.is_empty() || !c.eat(b':') {
        return None;
    }
    c.skip_spaces();
    *cur = c;
    Some(name)
}

/// One of the 20 supported register spellings, case-insensitive.
pub fn register(cur: &mut Cursor<'_>) -> Option<Reg> {
    let mut c = *cur;
    let name = c.take_while(|b| b.is_ascii_alphabetic());
    if name.is_empty() || c.peek().is_some_and(is_ident_continue) {
        return None;
    }
    let reg = *find_ignore_case(&REGISTERS, name)?;
    c.skip_spaces();
    *cur = c;
    trace!(name, encoding = reg.encoding(), "register");
    Some(reg)
}

// ══════════════════════════════════════════════════════════════════════
// Values
// ══════════════════════════════════════════════════════════════════════

/// A numeric literal: optional `-`, a hex-digit run, optional trailing `h`.
///
/// Without the `h` suffix the run must be all decimal digits. A literal
/// immediately followed by a letter or `_` is rejected so that identifiers
/// such as `dead_beef` are not mistaken for numbers.
pub fn number_value(cur: &mut Cursor<'_>) -> Option<u32> {
    let mut c = *cur;
    let negative = c.eat(b'-');
    let digits = c.take_while(|b| b.is_ascii_hexdigit());
    if digits.is_empty() {
        return None;
    }
    let hex = c.eat(b'h') || c.eat(b'H');
    if c.peek().is_some_and(is_ident_start) {
        return None;
    }

    let value = if hex {
        u32::from_str_radix(digits, 16).ok()?
    } else if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse::<u32>().ok()?
    } else {
        return None;
    };

    c.skip_spaces();
    *cur = c;
    Some(if negative { value.wrapping_neg() } else { value })
}

/// An identifier declared in the locals table.
pub fn local_value(cur: &mut Cursor<'_>, locals: &BTreeMap<String, u32>) -> Option<u32> {
    let mut c = *cur;
    let name = variable_name(&mut c)?;
    let value = *locals.get(name)?;
    *cur = c;
    trace!(name, value, "local");
    Some(value)
}

/// `[segment:] [short] name`, resolved to an address.
///
/// `ds:` names resolve against the data segment, `cs:` names against the
/// label table. Unqualified names try labels first, then data.
pub fn offset_value(cur: &mut Cursor<'_>, syms: &Symbols<'_>) -> Option<u32> {
    let mut c = *cur;
    let segment = segment_name(&mut c);
    c.eat_keyword("short");
    let name = variable_name(&mut c)?;

    let value = match segment {
        Some(seg) if seg.eq_ignore_ascii_case("ds") => syms.data.address_of(name)?,
        Some(seg) if seg.eq_ignore_ascii_case("cs") => *syms.labels.get(name)?,
        _ => match syms.labels.get(name) {
            Some(address) => *address,
            None => syms.data.address_of(name)?,
        },
    };

    *cur = c;
    trace!(name, value, "offset");
    Some(value)
}

/// Any value operand: a number, then a local, then an offset.
pub fn value(cur: &mut Cursor<'_>, syms: &Symbols<'_>) -> Option<u32> {
    if let Some(v) = number_value(cur) {
        return Some(v);
    }
    if let Some(v) = local_value(cur, syms.locals) {
        return Some(v);
    }
    offset_value(cur, syms)
}
