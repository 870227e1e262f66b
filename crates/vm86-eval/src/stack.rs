//! The machine stack: a fixed block of 32-bit slots mapped at a byte address.
//!
//! The stack grows downwards. ESP lives in the register file, so every
//! operation takes it by reference instead of keeping its own copy; a
//! procedure that writes ESP directly (`mov esp, ebp`) moves the stack top.
//!
//! ```text
//! base                                  esp                end()
//!  │ free ...                            │ top │ ... │ oldest │
//! ```

use crate::error::{EvalError, EvalResult};

#[derive(Debug, Clone)]
pub struct Stack {
    bytes: Vec<u8>,
    base: u32,
}

impl Stack {
    /// Zeroed stack of `words` slots starting at byte address `base`.
    /// The slot count is capped so that [`end`](Self::end) fits in a `u32`.
    pub fn new(words: usize, base: u32) -> Self {
        let words = words.min((u32::MAX - base) as usize / 4);
        Self {
            bytes: vec![0; words * 4],
            base,
        }
    }

    /// Lowest mapped address.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// One past the highest mapped address; ESP of an empty stack.
    pub fn end(&self) -> u32 {
        self.base.wrapping_add(self.bytes.len() as u32)
    }

    /// Number of slots.
    pub fn words(&self) -> usize {
        self.bytes.len() / 4
    }

    /// Slots in use for a given ESP.
    pub fn depth(&self, esp: u32) -> usize {
        (self.end().saturating_sub(esp) / 4) as usize
    }

    /// Zero every slot and reset ESP to [`end`](Self::end).
    pub fn clear(&mut self, esp: &mut u32) {
        self.bytes.fill(0);
        *esp = self.end();
    }

    // ── Stack discipline ────────────────────────────────────────────────

    pub fn push(&mut self, esp: &mut u32, word: u32) -> EvalResult<()> {
        let next = esp
            .checked_sub(4)
            .filter(|&address| address >= self.base)
            .ok_or(EvalError::StackOverflow { esp: *esp })?;
        if !self.store_u32(next, word) {
            return Err(EvalError::BadAddress {
                address: next,
                len: 4,
            });
        }
        *esp = next;
        Ok(())
    }

    pub fn pop(&self, esp: &mut u32) -> EvalResult<u32> {
        let word = self.top(*esp, 0)?;
        *esp = esp.wrapping_add(4);
        Ok(word)
    }

    /// The word `depth` slots above the top without popping. Depth 0 is the
    /// most recent push.
    pub fn top(&self, esp: u32, depth: u32) -> EvalResult<u32> {
        let address = depth
            .checked_mul(4)
            .and_then(|offset| esp.checked_add(offset))
            .ok_or(EvalError::StackUnderflow { address: u32::MAX })?;
        if address < self.base {
            return Err(EvalError::BadAddress { address, len: 4 });
        }
        self.load_u32(address)
            .ok_or(EvalError::StackUnderflow { address })
    }

    // ── Byte access ─────────────────────────────────────────────────────

    /// Does `[address, address + len)` fall inside the stack?
    pub fn contains(&self, address: u32, len: u32) -> bool {
        self.range(address, len).is_some()
    }

    fn range(&self, address: u32, len: u32) -> Option<std::ops::Range<usize>> {
        let start = address.checked_sub(self.base)? as usize;
        let end = start.checked_add(len as usize)?;
        (end <= self.bytes.len()).then_some(start..end)
    }

    pub fn load_u8(&self, address: u32) -> Option<u8> {
        self.range(address, 1).map(|r| self.bytes[r.start])
    }

    pub fn load_u32(&self, address: u32) -> Option<u32> {
        let r = self.range(address, 4)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[r]);
        Some(u32::from_le_bytes(word))
    }

    pub fn store_u8(&mut self, address: u32, value: u8) -> bool {
        match self.range(address, 1) {
            Some(r) => {
                self.bytes[r.start] = value;
                true
            }
            None => false,
        }
    }

    pub fn store_u32(&mut self, address: u32, value: u32) -> bool {
        match self.range(address, 4) {
            Some(r) => {
                self.bytes[r].copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }
}
