use serde::{Deserialize, Serialize};
use std::fmt;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    Symbol,
    Structure,
}

/// Numeric compile error code (E100–E399).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Syntax errors (E100–E199) ──
    pub const MALFORMED_OPERAND: Self = Self(100);
    pub const UNKNOWN_MNEMONIC: Self = Self(101);
    pub const UNKNOWN_REGISTER: Self = Self(102);
    pub const INVALID_DATA: Self = Self(103);

    // ── Symbol errors (E200–E299) ──
    pub const UNRESOLVED_SYMBOL: Self = Self(200);
    pub const DUPLICATE_DATA: Self = Self(201);

    // ── Structure errors (E300–E399) ──
    pub const MISSING_PROC_HEADER: Self = Self(300);
    pub const EMPTY_PROCEDURE: Self = Self(301);
    pub const COUNT_MISMATCH: Self = Self(302);
    pub const DATA_EXHAUSTED: Self = Self(303);
    pub const MISSING_ENDP: Self = Self(304);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Syntax,
            200..=299 => ErrorCategory::Symbol,
            _ => ErrorCategory::Structure,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Symbol => write!(f, "symbol"),
            Self::Structure => write!(f, "structure"),
        }
    }
}

/// A located compile failure.
///
/// Compilation stops at the first failure; the procedure is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    /// Error code (e.g., E101).
    pub code: ErrorCode,
    /// Error category (derived from code).
    pub category: ErrorCategory,
    /// Human-readable error message.
    pub message: String,
    /// 1-based source line, 0 when the failure is not tied to a line.
    pub line: u32,
    /// The normalized source line (comments stripped).
    pub source_line: String,
}

impl CompileError {
    pub fn new(
        code: ErrorCode,
        message: impl Into<String>,
        line: u32,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            code,
            category: code.category(),
            message: message.into(),
            line,
            source_line: source_line.into(),
        }
    }

    /// An error that concerns the procedure as a whole.
    pub fn unlocated(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message, 0, "")
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [{}] {}",
            self.line, self.code, self.category, self.message
        )?;
        if !self.source_line.is_empty() {
            write!(f, " `{}`", self.source_line)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_category() {
        assert_eq!(
            ErrorCode::UNKNOWN_MNEMONIC.category(),
            ErrorCategory::Syntax
        );
        assert_eq!(
            ErrorCode::UNRESOLVED_SYMBOL.category(),
            ErrorCategory::Symbol
        );
        assert_eq!(
            ErrorCode::COUNT_MISMATCH.category(),
            ErrorCategory::Structure
        );
        assert_eq!(ErrorCode::MISSING_ENDP.category(), ErrorCategory::Structure);
    }

    #[test]
    fn test_error_display() {
        let err = CompileError::new(
            ErrorCode::UNKNOWN_MNEMONIC,
            "unknown mnemonic 'fld'",
            7,
            "fld st0",
        );
        assert_eq!(
            err.to_string(),
            "7: E101 [syntax] unknown mnemonic 'fld' `fld st0`"
        );
    }

    #[test]
    fn test_compile_error_json_round_trip() {
        let err = CompileError::new(
            ErrorCode::UNRESOLVED_SYMBOL,
            "unresolved symbol 'loc_1'",
            3,
            "jmp loc_1",
        );
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"code\":200"));
        assert!(json.contains("\"category\":\"symbol\""));
        let back: CompileError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
