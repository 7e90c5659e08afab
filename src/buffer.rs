//! In-memory growable byte buffer with a position cursor (spec §4.1).

use crate::error::ContainerError;

/// A growable byte buffer with a seekable cursor.
///
/// Reads past the end of the buffer fail with [`ContainerError::UnexpectedEndOfStream`]. Writes
/// are append-at-cursor: writing past the current length grows the buffer, filling any gap with
/// zeros.
#[derive(Default)]
pub struct Buffer {
    data: Vec<u8>,
    pos: u64,
}

impl Buffer {
    /// Creates an empty buffer with the cursor at position zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps existing bytes as a buffer, with the cursor at position zero.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// Reads exactly `dst.len()` bytes from the cursor position, advancing the cursor.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<(), ContainerError> {
        let pos = self.pos as usize;
        let end = pos
            .checked_add(dst.len())
            .ok_or(ContainerError::UnexpectedEndOfStream)?;
        let Some(src) = self.data.get(pos..end) else {
            return Err(ContainerError::UnexpectedEndOfStream);
        };
        dst.copy_from_slice(src);
        self.pos = end as u64;
        Ok(())
    }

    /// Writes `src` at the cursor position, growing the buffer (zero-filling any gap) as needed,
    /// and advances the cursor.
    pub fn write(&mut self, src: &[u8]) {
        let pos = self.pos as usize;
        let end = pos + src.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[pos..end].copy_from_slice(src);
        self.pos = end as u64;
    }

    /// Returns the current cursor position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Moves the cursor to `pos`. Does not grow the buffer; a subsequent `write` from beyond the
    /// current length will still grow it to cover the gap.
    pub fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }

    /// The number of bytes currently stored in the buffer.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Returns `true` if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrows the full contents of the buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Discards all bytes and resets the cursor to zero.
    pub fn clear(&mut self) {
        self.data.clear();
        self.pos = 0;
    }
}
