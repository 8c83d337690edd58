//! Relay frames and the bounded frame buffer.
//!
//! Inbound frames are copied into a [`FrameBuffer`] before the relay policy
//! sees them. The buffer has a fixed capacity; a frame that does not fit is
//! rejected with [`Error::BufferOverflow`] and the buffer keeps its previous
//! contents.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default frame buffer capacity in bytes.
pub const DEFAULT_FRAME_CAPACITY: usize = 128;

// ============================================================================
// FrameType
// ============================================================================

/// Data frame opcode relayed through the tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// UTF-8 text frame.
    Text,
    /// Binary frame.
    Binary,
}

impl FrameType {
    /// Returns the frame type name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// FrameRef
// ============================================================================

/// Borrowed view of a buffered inbound frame.
///
/// Valid only for the duration of the callback that receives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef<'a> {
    kind: FrameType,
    payload: &'a [u8],
}

impl<'a> FrameRef<'a> {
    /// Creates a frame view.
    #[inline]
    #[must_use]
    pub const fn new(kind: FrameType, payload: &'a [u8]) -> Self {
        Self { kind, payload }
    }

    /// Returns the frame type.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> FrameType {
        self.kind
    }

    /// Returns the payload bytes.
    #[inline]
    #[must_use]
    pub const fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Returns the payload length.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Returns the payload as text for status lines.
    #[inline]
    #[must_use]
    pub fn text_lossy(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.payload)
    }
}

// ============================================================================
// FrameBuffer
// ============================================================================

/// Fixed-capacity buffer holding the most recent inbound frame.
///
/// Overwritten on every accepted frame, never grown.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl FrameBuffer {
    /// Creates a zeroed buffer of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Returns the capacity in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the length of the buffered frame.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no frame is buffered.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the buffered bytes.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Checks that a payload of `len` bytes fits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferOverflow`] when `len` exceeds the capacity.
    #[inline]
    pub fn check_fits(&self, len: usize) -> Result<()> {
        if len > self.capacity() {
            return Err(Error::buffer_overflow(len, self.capacity()));
        }
        Ok(())
    }

    /// Replaces the buffered frame with `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferOverflow`] when the payload is larger than the
    /// capacity. The buffer is not modified in that case.
    pub fn fill(&mut self, payload: &[u8]) -> Result<&[u8]> {
        self.check_fits(payload.len())?;
        self.data[..payload.len()].copy_from_slice(payload);
        self.len = payload.len();
        Ok(self.as_slice())
    }

    /// Forgets the buffered frame.
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_CAPACITY)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_default_capacity() {
        let buffer = FrameBuffer::default();
        assert_eq!(buffer.capacity(), DEFAULT_FRAME_CAPACITY);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fill_overwrites_previous_frame() {
        let mut buffer = FrameBuffer::new(16);
        buffer.fill(b"hello world").unwrap();
        let second = buffer.fill(b"bye").unwrap();
        assert_eq!(second, b"bye");
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_fill_exact_capacity() {
        let mut buffer = FrameBuffer::new(4);
        assert_eq!(buffer.fill(b"abcd").unwrap(), b"abcd");
    }

    #[test]
    fn test_fill_empty_frame() {
        let mut buffer = FrameBuffer::new(4);
        buffer.fill(b"ab").unwrap();
        assert!(buffer.fill(b"").unwrap().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_overflow_leaves_buffer_intact() {
        let mut buffer = FrameBuffer::new(4);
        buffer.fill(b"ok").unwrap();

        let err = buffer.fill(b"too long").unwrap_err();
        assert!(matches!(
            err,
            Error::BufferOverflow {
                len: 8,
                capacity: 4
            }
        ));
        assert_eq!(buffer.as_slice(), b"ok");
    }

    #[test]
    fn test_frame_ref_accessors() {
        let frame = FrameRef::new(FrameType::Text, b"hello");
        assert_eq!(frame.kind(), FrameType::Text);
        assert_eq!(frame.len(), 5);
        assert_eq!(frame.text_lossy(), "hello");
        assert_eq!(FrameType::Binary.to_string(), "binary");
    }

    proptest! {
        #[test]
        fn prop_overflow_never_truncates(
            capacity in 1usize..256,
            previous in proptest::collection::vec(any::<u8>(), 0..64),
            extra in 1usize..512,
        ) {
            let mut buffer = FrameBuffer::new(capacity);
            let previous = &previous[..previous.len().min(capacity)];
            buffer.fill(previous).unwrap();

            let oversized = vec![0xAB; capacity + extra];
            let result = buffer.fill(&oversized);

            let is_overflow = matches!(result, Err(Error::BufferOverflow { .. }));
            prop_assert!(is_overflow);
            prop_assert_eq!(buffer.as_slice(), previous);
        }
    }
}
