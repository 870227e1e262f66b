//! Line reader and line-level classifiers.
//!
//! Source text is processed one normalized line at a time. Normalization
//! drops `\r`, strips `;` comments and collapses whitespace, all outside of
//! quoted strings, so every later stage can assume single spaces and no
//! leading or trailing blanks.

use crate::cursor::Cursor;
use crate::operand::{number_value, variable_name};

/// A non-empty normalized line and its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub number: u32,
    pub text: String,
}

/// Which segment subsequent lines belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Data,
    Code,
}

/// Normalize one raw line.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for ch in raw.chars() {
        if let Some(q) = quote {
            out.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            ';' => break,
            '\r' => {}
            c if c.is_whitespace() => pending_space = true,
            c => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

/// Split `source` at `\n` and yield every line that is non-empty after
/// normalization.
pub fn read_lines(source: &str) -> impl Iterator<Item = SourceLine> + '_ {
    source.split('\n').enumerate().filter_map(|(i, raw)| {
        let text = normalize(raw);
        (!text.is_empty()).then(|| SourceLine {
            number: i as u32 + 1,
            text,
        })
    })
}

// ══════════════════════════════════════════════════════════════════════
// Classifiers
// ══════════════════════════════════════════════════════════════════════

/// The procedure name from a `<name> proc near` header line.
pub fn proc_header(line: &str) -> Option<&str> {
    let tokens: Vec<&str> = line.split(' ').collect();
    tokens.windows(3).find_map(|w| {
        (w[1].eq_ignore_ascii_case("proc") && w[2].eq_ignore_ascii_case("near")).then_some(w[0])
    })
}

/// Does this line terminate the procedure?
pub fn is_endp(line: &str) -> bool {
    line.split(' ').any(|t| t.eq_ignore_ascii_case("endp"))
}

/// A `.data` or `.code` switch.
pub fn section(line: &str) -> Option<Section> {
    let head = line.get(..5)?;
    if head.eq_ignore_ascii_case(".data") {
        Some(Section::Data)
    } else if head.eq_ignore_ascii_case(".code") {
        Some(Section::Code)
    } else {
        None
    }
}

/// The name of a `label:` line. The name runs up to the first `:` and may
/// not contain whitespace.
pub fn label(line: &str) -> Option<&str> {
    let end = line.find(|c: char| c == ':' || c.is_whitespace())?;
    (end > 0 && line[end..].starts_with(':')).then(|| &line[..end])
}

/// A stack-local declaration: `name = dword|word|byte|qword [ptr] n`.
pub fn local(line: &str) -> Option<(&str, u32)> {
    let mut cur = Cursor::new(line);
    let name = variable_name(&mut cur)?;
    if !cur.eat(b'=') {
        return None;
    }
    cur.skip_spaces();

    let width = cur.take_while(|b| !b.is_ascii_whitespace());
    if !["dword", "word", "byte", "qword"]
        .iter()
        .any(|w| width.eq_ignore_ascii_case(w))
    {
        return None;
    }
    cur.skip_spaces();
    cur.eat_keyword("ptr");

    let value = number_value(&mut cur)?;
    Some((name, value))
}
