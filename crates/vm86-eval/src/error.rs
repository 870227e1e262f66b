//! Runtime faults raised while executing a procedure.

use thiserror::Error;

/// A fault raised by the interpreter, the stack or a host function.
///
/// Compiled code is trusted to be well-formed, so every variant here is a
/// contract violation by the running procedure or its host. The machine is
/// left in whatever state it reached; call [`Machine::reset`] before reuse.
///
/// [`Machine::reset`]: crate::Machine::reset
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("stack overflow: push with esp = {esp:#x}")]
    StackOverflow { esp: u32 },

    #[error("stack underflow: read at {address:#x} past the stack top")]
    StackUnderflow { address: u32 },

    /// A load or store outside the data segment and the stack.
    #[error("bad address {address:#x} ({len} bytes)")]
    BadAddress { address: u32, len: u32 },

    /// A jump to something that is not an instruction of the running procedure.
    #[error("bad jump target {0:#x}")]
    BadJumpTarget(u32),

    #[error("unresolved call to '{0}'")]
    UnresolvedCall(String),

    #[error("divide by zero")]
    DivideByZero,

    /// `retn` popped something other than the return sentinel.
    #[error("corrupt return address {0:#x}")]
    CorruptReturn(u32),

    #[error("instruction budget of {0} exhausted")]
    BudgetExhausted(u64),

    /// Raised by a host function.
    #[error("host function '{name}' failed: {message}")]
    Host { name: String, message: String },
}

impl EvalError {
    /// Convenience constructor for host functions.
    pub fn host(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Host {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Result alias for interpreter operations.
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_show_hex_addresses() {
        let err = EvalError::BadAddress {
            address: 0x10,
            len: 4,
        };
        assert_eq!(err.to_string(), "bad address 0x10 (4 bytes)");
        assert_eq!(
            EvalError::CorruptReturn(0xbeef).to_string(),
            "corrupt return address 0xbeef"
        );
    }

    #[test]
    fn test_host_constructor() {
        let err = EvalError::host("printf", "bad format");
        assert_eq!(err.to_string(), "host function 'printf' failed: bad format");
    }
}
