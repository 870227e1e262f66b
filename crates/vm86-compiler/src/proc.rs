//! Two-pass procedure compiler.
//!
//! 1. **Header**: find `<name> proc near`.
//! 2. **Prepare**: record locals and `label:` positions, count code lines up
//!    to `endp`. A body without `endp` is rejected.
//! 3. **Fixup**: convert pending label indices into code addresses.
//! 4. **Compile**: decode data lines into the data segment and code lines
//!    into instructions, then check the count against pass 1.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vm86_parser::{is_endp, label, local, proc_header, read_lines, section, Section, SourceLine, Symbols};
use vm86_types::layout::{code_address, code_index};
use vm86_types::{CompileError, DataError, DataSegment, ErrorCode};

use crate::data_decl::decode_data;
use crate::decode::{decode, DecodeError};
use crate::instruction::Instruction;

// ══════════════════════════════════════════════════════════════════════
// Label tables
// ══════════════════════════════════════════════════════════════════════

/// Labels recorded during pass 1: name → instruction index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingLabels(BTreeMap<String, usize>);

impl PendingLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, index: usize) {
        if let Some(prev) = self.0.insert(name.to_string(), index) {
            warn!(name, prev, index, "label redefined");
        }
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert every index to its code address.
    pub fn resolve(self) -> Labels {
        Labels(
            self.0
                .into_iter()
                .map(|(name, index)| (name, code_address(index)))
                .collect(),
        )
    }
}

/// Resolved labels: name → code address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(BTreeMap<String, u32>);

impl Labels {
    pub fn get(&self, name: &str) -> Option<u32> {
        self.0.get(name).copied()
    }

    pub fn as_map(&self) -> &BTreeMap<String, u32> {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(name, address)| (name.as_str(), *address))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ══════════════════════════════════════════════════════════════════════
// Procedure
// ══════════════════════════════════════════════════════════════════════

/// A compiled procedure. Immutable after [`compile`] returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Procedure {
    name: String,
    locals: BTreeMap<String, u32>,
    labels: Labels,
    instructions: Box<[Instruction]>,
}

impl Procedure {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locals(&self) -> &BTreeMap<String, u32> {
        &self.locals
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Index of the instruction at a code address.
    pub fn index_of(&self, address: u32) -> Option<usize> {
        code_index(address, self.len())
    }
}

// ══════════════════════════════════════════════════════════════════════
// Compiler
// ══════════════════════════════════════════════════════════════════════

/// Result of pass 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prepared {
    /// Number of instructions pass 2 must produce.
    pub count: usize,
    /// Index (into the body lines) of the first non-local line.
    pub code_start: usize,
    /// Whether an `endp` line closed the body.
    pub terminated: bool,
}

/// The procedure name from the first `<name> proc near` header, if any.
pub fn procedure_name(source: &str) -> Option<String> {
    read_lines(source).find_map(|line| proc_header(&line.text).map(str::to_string))
}

fn located(code: ErrorCode, message: impl Into<String>, line: &SourceLine) -> CompileError {
    CompileError::new(code, message, line.number, line.text.clone())
}

fn decode_error(err: DecodeError, line: &SourceLine) -> CompileError {
    located(err.code(), err.to_string(), line)
}

fn data_error(err: DataError, line: &SourceLine) -> CompileError {
    let code = match err {
        DataError::Exhausted { .. } => ErrorCode::DATA_EXHAUSTED,
        DataError::NotLastChunk(_) => ErrorCode::DUPLICATE_DATA,
    };
    located(code, err.to_string(), line)
}

struct ProcCompiler {
    name: String,
    locals: BTreeMap<String, u32>,
}

impl ProcCompiler {
    /// Pass 1.
    fn prepare(&mut self, body: &[SourceLine]) -> (Prepared, PendingLabels) {
        let mut pending = PendingLabels::new();
        let mut count = 0;
        let mut code_start = None;
        let mut in_data = false;
        let mut terminated = false;

        for (i, line) in body.iter().enumerate() {
            let text = line.text.as_str();
            if let Some((name, value)) = local(text) {
                debug!(name, value, "local");
                self.locals.insert(name.to_string(), value);
                continue;
            }
            if code_start.is_none() {
                code_start = Some(i);
            }

            match section(text) {
                Some(Section::Data) => {
                    in_data = true;
                    continue;
                }
                Some(Section::Code) => {
                    in_data = false;
                    continue;
                }
                None => {}
            }
            if in_data {
                continue;
            }
            if let Some(name) = label(text) {
                debug!(name, index = count, "label");
                pending.insert(name, count);
                continue;
            }
            if is_endp(text) {
                terminated = true;
                break;
            }
            count += 1;
        }

        let prepared = Prepared {
            count,
            code_start: code_start.unwrap_or(body.len()),
            terminated,
        };
        debug!(procedure = %self.name, count, labels = pending.len(), terminated, "prepare");
        (prepared, pending)
    }

    /// Pass 2.
    fn compile(
        &self,
        body: &[SourceLine],
        prepared: Prepared,
        labels: &Labels,
        data: &mut DataSegment,
    ) -> Result<Vec<Instruction>, CompileError> {
        let mut instructions = Vec::with_capacity(prepared.count);
        let mut last_data: Option<String> = None;
        let mut in_data = false;

        for line in &body[prepared.code_start.min(body.len())..] {
            let text = line.text.as_str();
            match section(text) {
                Some(Section::Data) => {
                    in_data = true;
                    continue;
                }
                Some(Section::Code) => {
                    in_data = false;
                    continue;
                }
                None => {}
            }
            if local(text).is_some() {
                continue;
            }

            let syms = Symbols {
                locals: &self.locals,
                labels: labels.as_map(),
                data: &*data,
            };

            if in_data {
                let decl = decode_data(text, &syms).map_err(|e| decode_error(e, line))?;
                let name = match decl.label {
                    Some(name) => name.to_string(),
                    None => last_data.clone().ok_or_else(|| {
                        located(
                            ErrorCode::INVALID_DATA,
                            "data continuation without a preceding label",
                            line,
                        )
                    })?,
                };
                data.add(&name, Some(&decl.bytes), decl.bytes.len())
                    .map_err(|e| data_error(e, line))?;
                last_data = Some(name);
                continue;
            }

            if label(text).is_some() {
                continue;
            }
            if is_endp(text) {
                break;
            }
            let insn = decode(text, &syms).map_err(|e| decode_error(e, line))?;
            instructions.push(insn);
        }

        debug!(procedure = %self.name, count = instructions.len(), "compile");
        Ok(instructions)
    }
}

/// Compile one procedure. `.data` declarations are appended to `data`; on
/// failure `data` is left as it was.
pub fn compile(source: &str, data: &mut DataSegment) -> Result<Procedure, CompileError> {
    let lines: Vec<SourceLine> = read_lines(source).collect();

    let (header, name) = lines
        .iter()
        .enumerate()
        .find_map(|(i, line)| proc_header(&line.text).map(|name| (i, name.to_string())))
        .ok_or_else(|| {
            CompileError::unlocated(
                ErrorCode::MISSING_PROC_HEADER,
                "missing `<name> proc near` header",
            )
        })?;
    let body = &lines[header + 1..];

    let mut compiler = ProcCompiler {
        name,
        locals: BTreeMap::new(),
    };

    let (prepared, pending) = compiler.prepare(body);
    if !prepared.terminated {
        return Err(CompileError::unlocated(
            ErrorCode::MISSING_ENDP,
            format!("procedure '{}' has no `endp`", compiler.name),
        ));
    }
    if prepared.count == 0 {
        return Err(CompileError::unlocated(
            ErrorCode::EMPTY_PROCEDURE,
            format!("procedure '{}' has no instructions", compiler.name),
        ));
    }
    let labels = pending.resolve();

    let snapshot = data.clone();
    let instructions = match compiler.compile(body, prepared, &labels, data) {
        Ok(instructions) => instructions,
        Err(err) => {
            *data = snapshot;
            return Err(err);
        }
    };

    if instructions.len() != prepared.count {
        *data = snapshot;
        return Err(CompileError::unlocated(
            ErrorCode::COUNT_MISMATCH,
            format!(
                "procedure '{}': compiled {} instructions, expected {}",
                compiler.name,
                instructions.len(),
                prepared.count
            ),
        ));
    }

    Ok(Procedure {
        name: compiler.name,
        locals: compiler.locals,
        labels,
        instructions: instructions.into_boxed_slice(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_labels_resolve_to_code_addresses() {
        let mut pending = PendingLabels::new();
        pending.insert("start", 0);
        pending.insert("done", 4);
        let labels = pending.resolve();
        assert_eq!(labels.get("start"), Some(code_address(0)));
        assert_eq!(labels.get("done"), Some(code_address(4)));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn test_prepare_counts_code_lines_only() {
        let source = "p proc near\narg_0 = dword ptr 8\n.data\nx db 1\n.code\nstart:\npush ebp\npop ebp\nretn\np endp\nnop";
        let lines: Vec<SourceLine> = read_lines(source).collect();
        let mut compiler = ProcCompiler {
            name: "p".into(),
            locals: BTreeMap::new(),
        };
        let (prepared, pending) = compiler.prepare(&lines[1..]);
        assert_eq!(prepared.count, 3);
        assert_eq!(prepared.code_start, 1);
        assert!(prepared.terminated);
        assert_eq!(pending.get("start"), Some(0));
        assert_eq!(compiler.locals.get("arg_0"), Some(&8));
    }

    #[test]
    fn test_prepare_notes_a_missing_endp() {
        let lines: Vec<SourceLine> = read_lines("p proc near
push ebp
retn").collect();
        let mut compiler = ProcCompiler {
            name: "p".into(),
            locals: BTreeMap::new(),
        };
        let (prepared, _) = compiler.prepare(&lines[1..]);
        assert_eq!(prepared.count, 2);
        assert!(!prepared.terminated);
    }
}
