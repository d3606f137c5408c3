//! Byte streams used by pool and slab persistence.
//!
//! [`Stream`] is deliberately narrower than `std::io::{Read, Write}`: reads
//! and writes are all-or-nothing, and `tell` reports the number of bytes
//! written so far.

use std::io;

/// Sequential all-or-nothing byte stream.
pub trait Stream {
    /// Write all of `bytes`.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Fill all of `bytes`. Running out of input is
    /// [`io::ErrorKind::UnexpectedEof`].
    fn read(&mut self, bytes: &mut [u8]) -> io::Result<()>;

    /// Current write offset.
    fn tell(&self) -> u64;
}

impl<S: Stream + ?Sized> Stream for &mut S {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn read(&mut self, bytes: &mut [u8]) -> io::Result<()> {
        (**self).read(bytes)
    }

    fn tell(&self) -> u64 {
        (**self).tell()
    }
}

/// In-memory stream over a growable buffer.
///
/// Writes append; reads consume from a separate read position, so a stream
/// can be written and then read back without rewinding.
#[derive(Clone, Debug, Default)]
pub struct MemoryStream {
    data: Vec<u8>,
    read_pos: usize,
}

impl MemoryStream {
    /// Create an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stream whose readable content is `data`.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data, read_pos: 0 }
    }

    /// Everything written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the stream, returning its buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    /// Move the read position back to the start.
    pub fn rewind(&mut self) {
        self.read_pos = 0;
    }
}

impl Stream for MemoryStream {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn read(&mut self, bytes: &mut [u8]) -> io::Result<()> {
        let end = self.read_pos + bytes.len();
        let src = self
            .data
            .get(self.read_pos..end)
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        bytes.copy_from_slice(src);
        self.read_pos = end;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.data.len() as u64
    }
}
