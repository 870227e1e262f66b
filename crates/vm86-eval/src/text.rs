//! The text store: compiled procedures cached by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};
use vm86_compiler::{compile, procedure_name, Procedure};
use vm86_types::{CompileError, DataSegment};

/// Procedures compiled so far, keyed by their header name.
///
/// A cached procedure is returned for any later source with the same header
/// name, even if the body differs. [`remove`](Self::remove) it first to
/// recompile.
#[derive(Debug, Clone, Default)]
pub struct Text {
    procs: BTreeMap<String, Arc<Procedure>>,
}

impl Text {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `source`, or return the cached procedure of the same name.
    /// Failed compiles are not cached and leave `data` unchanged.
    pub fn compile(
        &mut self,
        source: &str,
        data: &mut DataSegment,
    ) -> Result<Arc<Procedure>, CompileError> {
        if let Some(name) = procedure_name(source) {
            if let Some(proc) = self.procs.get(&name) {
                debug!(%name, "text: cached");
                return Ok(Arc::clone(proc));
            }
        }

        let proc = match compile(source, data) {
            Ok(proc) => Arc::new(proc),
            Err(err) => {
                warn!(error = %err, "text: compile failed");
                return Err(err);
            }
        };
        debug!(name = proc.name(), len = proc.len(), "text: compiled");
        self.procs
            .insert(proc.name().to_string(), Arc::clone(&proc));
        Ok(proc)
    }

    /// Add an already compiled procedure, replacing any of the same name.
    pub fn insert(&mut self, proc: Procedure) -> Option<Arc<Procedure>> {
        self.procs.insert(proc.name().to_string(), Arc::new(proc))
    }

    pub fn proc(&self, name: &str) -> Option<Arc<Procedure>> {
        self.procs.get(name).cloned()
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<Procedure>> {
        self.procs.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.procs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }
}
