//! vm86 interpreter.
//!
//! A [`Machine`] owns a register file, a stack, a data segment and a text
//! store of compiled procedures. Host code compiles procedure source into
//! it, seeds registers or the stack, registers native functions for `call`,
//! and runs:
//!
//! ```
//! use vm86_eval::Machine;
//! use vm86_types::Reg;
//!
//! let mut machine = Machine::default();
//! let proc = machine
//!     .compile("low_byte proc near\nand eax, 0FFh\nretn\nlow_byte endp")
//!     .unwrap();
//! machine.registers_mut().set(Reg::EAX, 0x1234);
//! machine.run(&proc).unwrap();
//! assert_eq!(machine.registers().value(Reg::EAX), 0x34);
//! ```

pub mod config;
pub mod error;
pub mod exec;
pub mod machine;
pub mod shared;
pub mod stack;
pub mod text;

pub use config::{ConfigError, MachineConfig};
pub use error::{EvalError, EvalResult};
pub use exec::compare;
pub use machine::{host_fn, HostFn, Machine};
pub use shared::SharedMachine;
pub use stack::Stack;
pub use text::Text;
