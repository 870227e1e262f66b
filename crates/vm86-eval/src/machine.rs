//! Machine state: registers, stack, data segment, text store and host
//! functions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use vm86_compiler::Procedure;
use vm86_types::layout::STACK_BASE;
use vm86_types::{CompileError, DataSegment, Registers};

use crate::config::{ConfigError, MachineConfig};
use crate::error::{EvalError, EvalResult};
use crate::stack::Stack;
use crate::text::Text;

/// A native function callable from procedure code with `call name`.
///
/// It reads its arguments with [`Machine::arg`] and returns results in
/// registers. Arguments are left on the stack for the calling code to clean up.
pub type HostFn = Arc<dyn Fn(&mut Machine) -> EvalResult<()> + Send + Sync>;

/// Wrap a closure as a [`HostFn`].
pub fn host_fn<F>(f: F) -> HostFn
where
    F: Fn(&mut Machine) -> EvalResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One virtual CPU.
pub struct Machine {
    pub(crate) config: MachineConfig,
    pub(crate) registers: Registers,
    pub(crate) stack: Stack,
    pub(crate) data: DataSegment,
    pub(crate) text: Text,
    pub(crate) functions: BTreeMap<String, HostFn>,
}

impl Machine {
    /// Build a machine, rejecting a configuration whose regions overlap or
    /// leave the 32-bit address space.
    pub fn new(config: MachineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: MachineConfig) -> Self {
        let stack = Stack::new(config.stack_words, STACK_BASE);
        let mut registers = Registers::new();
        *registers.esp_mut() = stack.end();
        debug!(
            data_size = config.data_size,
            stack_words = config.stack_words,
            "machine: new"
        );
        Self {
            config,
            registers,
            stack,
            data: DataSegment::new(config.data_size),
            text: Text::new(),
            functions: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn data(&self) -> &DataSegment {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut DataSegment {
        &mut self.data
    }

    pub fn text(&self) -> &Text {
        &self.text
    }

    pub fn text_mut(&mut self) -> &mut Text {
        &mut self.text
    }

    /// Zero the registers and the stack. Data and compiled procedures stay.
    pub fn reset(&mut self) {
        self.registers.clear();
        self.stack.clear(self.registers.esp_mut());
    }

    // ══════════════════════════════════════════════════════════════════════
    // Procedures
    // ══════════════════════════════════════════════════════════════════════

    /// Compile `source` into the text store, its `.data` into this machine's
    /// data segment.
    pub fn compile(&mut self, source: &str) -> Result<Arc<Procedure>, CompileError> {
        self.text.compile(source, &mut self.data)
    }

    /// Run a compiled procedure by name, falling back to a host function.
    pub fn call(&mut self, name: &str) -> EvalResult<()> {
        if let Some(proc) = self.text.proc(name) {
            return self.run(&proc);
        }
        let f = self
            .function(name)
            .ok_or_else(|| EvalError::UnresolvedCall(name.to_string()))?;
        f(self)
    }

    // ── Host functions ──────────────────────────────────────────────────

    /// Register `f` under `name`, or deregister with `None`. Returns the
    /// previous function.
    pub fn set_function(&mut self, name: &str, f: Option<HostFn>) -> Option<HostFn> {
        match f {
            Some(f) => {
                debug!(name, "machine: register function");
                self.functions.insert(name.to_string(), f)
            }
            None => {
                debug!(name, "machine: deregister function");
                self.functions.remove(name)
            }
        }
    }

    pub fn function(&self, name: &str) -> Option<HostFn> {
        self.functions.get(name).cloned()
    }

    // ══════════════════════════════════════════════════════════════════════
    // Stack
    // ══════════════════════════════════════════════════════════════════════

    pub fn push(&mut self, value: u32) -> EvalResult<()> {
        self.stack.push(self.registers.esp_mut(), value)
    }

    pub fn pop(&mut self) -> EvalResult<u32> {
        self.stack.pop(self.registers.esp_mut())
    }

    /// The word `depth` slots above the stack top. Inside a host function
    /// depth 0 is the last value pushed before the `call`.
    pub fn arg(&self, depth: u32) -> EvalResult<u32> {
        self.stack.top(self.registers.esp(), depth)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Memory
    // ══════════════════════════════════════════════════════════════════════

    // Data and stack are the only mapped regions; code addresses are jump
    // targets and never readable.

    pub fn load_u32(&self, address: u32) -> EvalResult<u32> {
        self.data
            .load_u32(address)
            .or_else(|| self.stack.load_u32(address))
            .ok_or(EvalError::BadAddress { address, len: 4 })
    }

    pub fn load_u8(&self, address: u32) -> EvalResult<u8> {
        self.data
            .load_u8(address)
            .or_else(|| self.stack.load_u8(address))
            .ok_or(EvalError::BadAddress { address, len: 1 })
    }

    pub fn store_u32(&mut self, address: u32, value: u32) -> EvalResult<()> {
        if self.data.store_u32(address, value) || self.stack.store_u32(address, value) {
            Ok(())
        } else {
            Err(EvalError::BadAddress { address, len: 4 })
        }
    }

    pub fn store_u8(&mut self, address: u32, value: u8) -> EvalResult<()> {
        if self.data.store_u8(address, value) || self.stack.store_u8(address, value) {
            Ok(())
        } else {
            Err(EvalError::BadAddress { address, len: 1 })
        }
    }

    /// A NUL-terminated string in the data segment, without the terminator.
    pub fn read_cstr(&self, address: u32) -> EvalResult<&[u8]> {
        self.data
            .read_cstr(address)
            .ok_or(EvalError::BadAddress { address, len: 1 })
    }
}

impl Default for Machine {
    fn default() -> Self {
        // The default configuration is always valid.
        Self::build(MachineConfig::default())
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("config", &self.config)
            .field("registers", &self.registers)
            .field("stack", &self.stack)
            .field("data", &self.data)
            .field("text", &self.text)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm86_types::layout::DATA_BASE;
    use vm86_types::Reg;

    fn small() -> Machine {
        Machine::new(MachineConfig {
            data_size: 32,
            stack_words: 8,
        })
        .unwrap()
    }

    #[test]
    fn test_new_machine_has_an_empty_stack() {
        let m = small();
        assert_eq!(m.registers().esp(), STACK_BASE + 32);
        assert_eq!(m.stack().depth(m.registers().esp()), 0);
    }

    #[test]
    fn test_overlapping_regions_are_rejected() {
        let config = MachineConfig {
            data_size: 0x80_0000,
            stack_words: 16,
        };
        assert!(matches!(
            Machine::new(config),
            Err(ConfigError::DataOverlapsCode { .. })
        ));
    }

    #[test]
    fn test_push_is_visible_through_esp_and_memory() {
        let mut m = small();
        m.push(0x1234).unwrap();
        let esp = m.registers().value(Reg::ESP);
        assert_eq!(esp, STACK_BASE + 28);
        assert_eq!(m.load_u32(esp).unwrap(), 0x1234);
        assert_eq!(m.arg(0).unwrap(), 0x1234);
        assert_eq!(m.pop().unwrap(), 0x1234);
    }

    #[test]
    fn test_memory_routes_to_data_and_stack() {
        let mut m = small();
        m.store_u32(DATA_BASE, 7).unwrap();
        m.store_u8(STACK_BASE, 9).unwrap();
        assert_eq!(m.load_u32(DATA_BASE).unwrap(), 7);
        assert_eq!(m.load_u8(STACK_BASE).unwrap(), 9);
        assert_eq!(
            m.load_u32(0x0040_0000),
            Err(EvalError::BadAddress {
                address: 0x0040_0000,
                len: 4
            })
        );
        // Straddles the end of the data segment.
        assert!(m.load_u32(DATA_BASE + 30).is_err());
    }

    #[test]
    fn test_reset_keeps_data_and_text() {
        let mut m = small();
        m.compile("f proc near\n.data\nx db 5\n.code\nretn\nf endp")
            .unwrap();
        m.registers_mut().set(Reg::EAX, 1);
        m.push(2).unwrap();
        m.reset();
        assert_eq!(m.registers().value(Reg::EAX), 0);
        assert_eq!(m.registers().esp(), m.stack().end());
        assert!(m.data().is("x"));
        assert_eq!(m.text().len(), 1);
    }

    #[test]
    fn test_set_function_registers_and_deregisters() {
        let mut m = small();
        let f = host_fn(|m| {
            m.registers_mut().set(Reg::EAX, 42);
            Ok(())
        });
        assert!(m.set_function("answer", Some(f)).is_none());
        m.call("answer").unwrap();
        assert_eq!(m.registers().value(Reg::EAX), 42);
        assert!(m.set_function("answer", None).is_some());
        assert_eq!(
            m.call("answer"),
            Err(EvalError::UnresolvedCall("answer".into()))
        );
    }
}
