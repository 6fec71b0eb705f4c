//! Growable byte protocol buffer.
//!
//! [`Proto`] carries structured payloads across the user/kernel boundary:
//! IPC requests and replies, and kernel event payloads. The buffer is a
//! flat byte vector with an explicit size (never delimiter-bound) and a
//! read cursor for sequential decoding.

extern crate alloc;

use alloc::vec::Vec;

/// A growable byte buffer with sequential encode/decode helpers.
///
/// Integers are encoded little-endian, four bytes each.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Proto {
    data: Vec<u8>,
    offset: usize,
}

impl Proto {
    /// Creates an empty buffer.
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            offset: 0,
        }
    }

    /// Discards all content and resets the read cursor.
    pub fn clear(&mut self) {
        self.data.clear();
        self.offset = 0;
    }

    /// Replaces the content with a copy of `bytes` and resets the cursor.
    pub fn copy_from(&mut self, bytes: &[u8]) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
        self.offset = 0;
    }

    /// Appends raw bytes.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Appends a little-endian `i32`.
    pub fn add_int(&mut self, val: i32) {
        self.data.extend_from_slice(&val.to_le_bytes());
    }

    /// Appends a length-prefixed string.
    pub fn add_str(&mut self, s: &str) {
        self.add_int(i32::try_from(s.len()).unwrap_or(0));
        self.data.extend_from_slice(s.as_bytes());
    }

    /// Reads the next `i32` at the cursor, advancing it.
    ///
    /// Returns `None` when fewer than four bytes remain.
    pub fn read_int(&mut self) -> Option<i32> {
        let bytes = self.data.get(self.offset..self.offset + 4)?;
        self.offset += 4;
        Some(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads the next length-prefixed string at the cursor, advancing it.
    ///
    /// Returns `None` on truncated input or invalid UTF-8.
    pub fn read_str(&mut self) -> Option<&str> {
        let saved = self.offset;
        let len = self.read_int()?;
        let Ok(len) = usize::try_from(len) else {
            self.offset = saved;
            return None;
        };
        let Some(bytes) = self.data.get(self.offset..self.offset + len) else {
            self.offset = saved;
            return None;
        };
        match core::str::from_utf8(bytes) {
            Ok(s) => {
                self.offset += len;
                Some(s)
            }
            Err(_) => {
                self.offset = saved;
                None
            }
        }
    }

    /// Resets the read cursor to the start.
    pub fn rewind(&mut self) {
        self.offset = 0;
    }

    /// The full encoded content.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of encoded bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// `true` when no bytes are encoded.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
