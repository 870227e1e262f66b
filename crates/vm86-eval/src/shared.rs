//! A process-wide machine behind a lock, for hosts that drive one virtual
//! CPU from several threads.
//!
//! Hold the guard for a whole compile-and-run cycle so no other thread can
//! change registers between setup and result collection:
//!
//! ```
//! use vm86_eval::shared;
//! use vm86_types::Reg;
//!
//! let mut machine = shared::instance().lock();
//! let proc = machine
//!     .compile("twice proc near\nadd eax, eax\nretn\ntwice endp")
//!     .unwrap();
//! machine.registers_mut().set(Reg::EAX, 21);
//! machine.run(&proc).unwrap();
//! assert_eq!(machine.registers().value(Reg::EAX), 42);
//! ```

use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};

use crate::machine::Machine;

#[derive(Debug, Default)]
pub struct SharedMachine {
    inner: Mutex<Machine>,
}

impl SharedMachine {
    pub fn new(machine: Machine) -> Self {
        Self {
            inner: Mutex::new(machine),
        }
    }

    /// Block until the machine is free.
    pub fn lock(&self) -> MutexGuard<'_, Machine> {
        self.inner.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, Machine>> {
        self.inner.try_lock()
    }

    /// Run `f` with the lock held.
    pub fn with<R>(&self, f: impl FnOnce(&mut Machine) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn into_inner(self) -> Machine {
        self.inner.into_inner()
    }
}

static INSTANCE: Lazy<SharedMachine> = Lazy::new(SharedMachine::default);

/// The process-wide machine, built with the default configuration on first use.
pub fn instance() -> &'static SharedMachine {
    &INSTANCE
}
