//! The `.data` segment: an append-only byte arena with named chunks.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::layout::DATA_BASE;

/// Errors raised by [`DataSegment::add`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// The arena has no room for the requested bytes.
    #[error("data segment exhausted: need {need} bytes, {free} free")]
    Exhausted { need: usize, free: usize },

    /// A name was re-declared after other chunks were appended.
    #[error("data label '{0}' can only be extended while it is the last chunk")]
    NotLastChunk(String),
}

/// A named region of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Byte offset from the start of the arena.
    pub offset: u32,
    /// Byte length.
    pub size: u32,
}

/// Fixed-capacity bump allocator backing `.data` declarations.
///
/// Chunks are contiguous and monotonically increasing. Adding under the name
/// of the most recently appended chunk grows that chunk in place, which is how
/// a label's data can span several `db`/`dd` lines.
#[derive(Debug, Clone)]
pub struct DataSegment {
    bytes: Vec<u8>,
    /// Write cursor: offset of the next free byte.
    used: u32,
    labels: BTreeMap<String, Chunk>,
}

impl DataSegment {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
            used: 0,
            labels: BTreeMap::new(),
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes used so far.
    pub fn len(&self) -> usize {
        self.used as usize
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Is `name` a known data label?
    pub fn is(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    pub fn chunk(&self, name: &str) -> Option<Chunk> {
        self.labels.get(name).copied()
    }

    /// Absolute address and size of `name`.
    pub fn get(&self, name: &str) -> Option<(u32, u32)> {
        self.chunk(name)
            .map(|chunk| (DATA_BASE + chunk.offset, chunk.size))
    }

    /// Absolute address of `name`.
    pub fn address_of(&self, name: &str) -> Option<u32> {
        self.get(name).map(|(address, _)| address)
    }

    /// The bytes currently recorded under `name`.
    pub fn bytes_of(&self, name: &str) -> Option<&[u8]> {
        let chunk = self.chunk(name)?;
        let start = chunk.offset as usize;
        self.bytes.get(start..start + chunk.size as usize)
    }

    /// Append `size` bytes under `name`. `bytes` may be shorter than `size`
    /// (or absent); the remainder is left zeroed.
    pub fn add(&mut self, name: &str, bytes: Option<&[u8]>, size: usize) -> Result<(), DataError> {
        let free = self.capacity() - self.len();
        if size > free {
            return Err(DataError::Exhausted { need: size, free });
        }

        let offset = self.used;
        match self.labels.get_mut(name) {
            Some(chunk) if chunk.offset + chunk.size == offset => chunk.size += size as u32,
            Some(_) => return Err(DataError::NotLastChunk(name.to_string())),
            None => {
                self.labels.insert(
                    name.to_string(),
                    Chunk {
                        offset,
                        size: size as u32,
                    },
                );
            }
        }

        let start = offset as usize;
        let dst = &mut self.bytes[start..start + size];
        dst.fill(0);
        if let Some(src) = bytes {
            let n = src.len().min(size);
            dst[..n].copy_from_slice(&src[..n]);
        }
        self.used += size as u32;

        debug!(name, offset = start, size, "data: add");
        Ok(())
    }

    /// Does `[address, address + len)` fall inside the arena?
    pub fn contains(&self, address: u32, len: u32) -> bool {
        self.range(address, len).is_some()
    }

    fn range(&self, address: u32, len: u32) -> Option<std::ops::Range<usize>> {
        let start = address.checked_sub(DATA_BASE)? as usize;
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

    /// Store a byte. Returns `false` if the address is outside the arena.
    pub fn store_u8(&mut self, address: u32, value: u8) -> bool {
        match self.range(address, 1) {
            Some(r) => {
                self.bytes[r.start] = value;
                true
            }
            None => false,
        }
    }

    /// Store a little-endian word. Returns `false` if out of range.
    pub fn store_u32(&mut self, address: u32, value: u32) -> bool {
        match self.range(address, 4) {
            Some(r) => {
                self.bytes[r].copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Read a NUL-terminated byte string starting at `address`. Stops at the
    /// end of the arena if no terminator is found.
    pub fn read_cstr(&self, address: u32) -> Option<&[u8]> {
        let r = self.range(address, 0)?;
        let tail = &self.bytes[r.start..];
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Some(&tail[..end])
    }

    /// Iterate `(name, chunk)` pairs in name order.
    pub fn chunks(&self) -> impl Iterator<Item = (&str, Chunk)> {
        self.labels.iter().map(|(name, chunk)| (name.as_str(), *chunk))
    }
}
