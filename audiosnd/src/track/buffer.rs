//! Owned sample storage with read-only views
//!
//! `SampleBuffer` owns a boxed byte region whose address stays fixed for
//! its whole lifetime, so views can be handed to device I/O without
//! copying. Views borrow the buffer and cannot outlive it.

use crate::error::{Error, Result};
use crate::format::ByteOrder;
use std::ops::Deref;

/// Contiguous interleaved PCM bytes with a read position and a limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    data: Box<[u8]>,
    byte_order: ByteOrder,
    position: usize,
    limit: usize,
}

impl SampleBuffer {
    /// Zero-filled buffer of `len` bytes
    pub fn zeroed(len: usize, byte_order: ByteOrder) -> Self {
        Self::from_vec(vec![0u8; len], byte_order)
    }

    /// Take ownership of existing bytes
    pub fn from_vec(bytes: Vec<u8>, byte_order: ByteOrder) -> Self {
        let data = bytes.into_boxed_slice();
        let limit = data.len();
        Self {
            data,
            byte_order,
            position: 0,
            limit,
        }
    }

    /// Allocated capacity in bytes
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of readable bytes (`limit`)
    pub fn len(&self) -> usize {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.limit == 0
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.limit {
            return Err(Error::InvalidTrack(format!(
                "position {} beyond limit {}",
                position, self.limit
            )));
        }
        self.position = position;
        Ok(())
    }

    /// Shrink or restore the readable region. The position is clamped.
    pub fn set_limit(&mut self, limit: usize) -> Result<()> {
        if limit > self.data.len() {
            return Err(Error::InvalidTrack(format!(
                "limit {} beyond capacity {}",
                limit,
                self.data.len()
            )));
        }
        self.limit = limit;
        self.position = self.position.min(limit);
        Ok(())
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    /// View of `[position, limit)`
    pub fn view(&self) -> BufferView<'_> {
        BufferView::new(&self.data[self.position..self.limit], self.byte_order)
    }

    /// View of `[0, limit)` regardless of the read position
    pub fn rewound(&self) -> BufferView<'_> {
        BufferView::new(&self.data[..self.limit], self.byte_order)
    }

    /// View of `[start, end)`; `None` when the range is outside `[0, limit)`
    pub fn slice(&self, start: usize, end: usize) -> Option<BufferView<'_>> {
        if start > end || end > self.limit {
            return None;
        }
        Some(BufferView::new(&self.data[start..end], self.byte_order))
    }

    /// Raw readable bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.limit]
    }

    /// Mutable access used while a producer fills the buffer
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data[..self.limit]
    }
}

/// Read-only borrowed slice of a `SampleBuffer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferView<'a> {
    bytes: &'a [u8],
    byte_order: ByteOrder,
}

impl<'a> BufferView<'a> {
    pub fn new(bytes: &'a [u8], byte_order: ByteOrder) -> Self {
        Self { bytes, byte_order }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl Deref for BufferView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}
