//! `.data` line decoder for `db`, `dw` and `dd` declarations.
//!
//! ```text
//! format      db "hello: %x", 0ah, 0dh, 0
//! off_5A74B0  dd offset loc_6B2B50
//!             dd offset loc_58A945        ; continues off_5A74B0
//! ```

use vm86_parser::{number_value, offset_value, Cursor, Symbols};

use crate::decode::{DecodeError, DecodeResult};

/// Element width of a data directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// `db`: bytes, numbers or quoted characters.
    Byte,
    /// `dw`: little-endian 16-bit words.
    Word,
    /// `dd`: little-endian 32-bit words, numbers or `offset name`.
    Dword,
}

impl Directive {
    fn parse(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("db") {
            Some(Self::Byte)
        } else if token.eq_ignore_ascii_case("dw") {
            Some(Self::Word)
        } else if token.eq_ignore_ascii_case("dd") {
            Some(Self::Dword)
        } else {
            None
        }
    }

    fn bits(self) -> u32 {
        match self {
            Self::Byte => 8,
            Self::Word => 16,
            Self::Dword => 32,
        }
    }
}

/// One decoded data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLine<'a> {
    /// `None` for a continuation line that starts with the directive.
    pub label: Option<&'a str>,
    pub directive: Directive,
    pub bytes: Vec<u8>,
}

fn invalid(msg: impl Into<String>) -> DecodeError {
    DecodeError::InvalidData(msg.into())
}

/// Accept `v` if it fits `bits` either unsigned or as a sign-extended
/// negative literal.
fn narrow(v: u32, bits: u32) -> Option<u32> {
    let max = if bits == 32 { u32::MAX } else { (1 << bits) - 1 };
    let min = -(1i64 << (bits - 1));
    let signed = v as i32;
    if v <= max || (signed < 0 && i64::from(signed) >= min) {
        Some(v & max)
    } else {
        None
    }
}

/// Decode one normalized line of a `.data` section.
pub fn decode_data<'a>(line: &'a str, syms: &Symbols<'_>) -> DecodeResult<DataLine<'a>> {
    let mut cur = Cursor::new(line);
    let first = cur.take_while(|b| !b.is_ascii_whitespace());
    cur.skip_spaces();

    let (label, directive) = match Directive::parse(first) {
        Some(d) => (None, d),
        None => {
            let token = cur.take_while(|b| !b.is_ascii_whitespace());
            cur.skip_spaces();
            let d = Directive::parse(token)
                .ok_or_else(|| invalid(format!("unknown directive `{token}` for '{first}'")))?;
            (Some(first), d)
        }
    };

    let mut bytes = Vec::new();
    loop {
        cur.skip_separators(b",");
        if cur.at_end() {
            break;
        }

        if directive == Directive::Byte {
            if let Some(q @ (b'"' | b'\'')) = cur.peek() {
                cur.bump();
                let text = cur.take_while(|b| b != q);
                if !cur.eat(q) {
                    return Err(invalid("unterminated string"));
                }
                bytes.extend_from_slice(text.as_bytes());
                continue;
            }
        }

        let element = if cur.eat(b'?') {
            0
        } else if directive == Directive::Dword && cur.eat_keyword("offset") {
            offset_value(&mut cur, syms)
                .ok_or_else(|| DecodeError::Unresolved(cur.rest().trim().to_string()))?
        } else if let Some(v) = number_value(&mut cur) {
            narrow(v, directive.bits())
                .ok_or_else(|| invalid(format!("{v:#x} does not fit {} bits", directive.bits())))?
        } else {
            return Err(invalid(format!("unexpected `{}`", cur.rest())));
        };

        match directive {
            Directive::Byte => bytes.push(element as u8),
            Directive::Word => bytes.extend_from_slice(&(element as u16).to_le_bytes()),
            Directive::Dword => bytes.extend_from_slice(&element.to_le_bytes()),
        }
    }

    if bytes.is_empty() {
        return Err(invalid("empty declaration"));
    }
    Ok(DataLine {
        label,
        directive,
        bytes,
    })
}
