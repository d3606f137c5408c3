//! Positional file access and a [`Stream`] over it.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::stream::Stream;

/// How a [`File`] is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Existing file, read only.
    Read,
    /// Created or truncated, write only.
    Write,
}

/// A file accessed by absolute offsets.
#[derive(Debug)]
pub struct File {
    inner: fs::File,
    access: Access,
}

impl File {
    /// Open `name` with the given access.
    pub fn open(name: impl AsRef<Path>, access: Access) -> io::Result<Self> {
        let inner = match access {
            Access::Read => fs::File::open(name)?,
            Access::Write => fs::File::create(name)?,
        };
        Ok(Self { inner, access })
    }

    /// The access mode this file was opened with.
    pub fn access(&self) -> Access {
        self.access
    }

    /// Read into `buf` starting at `offset`, returning the byte count.
    ///
    /// Stops early only at end of file.
    pub fn read(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<u64> {
        self.inner.seek(SeekFrom::Start(offset))?;
        let mut done = 0;
        while done < buf.len() {
            match self.inner.read(&mut buf[done..]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(done as u64)
    }

    /// Write `buf` starting at `offset`, returning the byte count.
    ///
    /// Stops early only if the file stops accepting bytes.
    pub fn write(&mut self, offset: u64, buf: &[u8]) -> io::Result<u64> {
        self.inner.seek(SeekFrom::Start(offset))?;
        let mut done = 0;
        while done < buf.len() {
            match self.inner.write(&buf[done..]) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(done as u64)
    }

    /// Size of the file in bytes.
    pub fn tell(&self) -> io::Result<u64> {
        Ok(self.inner.metadata()?.len())
    }

    /// Read the whole file into memory.
    pub fn map(&mut self) -> io::Result<Vec<u8>> {
        let len = usize::try_from(self.tell()?)
            .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "file too large to map"))?;
        let mut data = vec![0u8; len];
        let read = self.read(0, &mut data)?;
        data.truncate(read as usize);
        Ok(data)
    }

    /// Flush and close the file.
    pub fn close(mut self) -> io::Result<()> {
        if self.access == Access::Write {
            self.inner.flush()?;
            self.inner.sync_all()?;
        }
        Ok(())
    }
}

/// [`Stream`] over a [`File`], tracking one running offset for both reads
/// and writes.
#[derive(Debug)]
pub struct FileStream {
    file: File,
    offset: u64,
}

impl FileStream {
    /// Stream from the start of `file`.
    pub fn new(file: File) -> Self {
        Self { file, offset: 0 }
    }

    /// Open `name` and stream from its start.
    pub fn open(name: impl AsRef<Path>, access: Access) -> io::Result<Self> {
        Ok(Self::new(File::open(name, access)?))
    }

    /// Give back the file.
    pub fn into_file(self) -> File {
        self.file
    }
}

impl Stream for FileStream {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let written = self.file.write(self.offset, bytes)?;
        self.offset += written;
        if written < bytes.len() as u64 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        Ok(())
    }

    fn read(&mut self, bytes: &mut [u8]) -> io::Result<()> {
        let read = self.file.read(self.offset, bytes)?;
        self.offset += read;
        if read < bytes.len() as u64 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");

        let mut file = File::open(&path, Access::Write).unwrap();
        assert_eq!(file.write(0, b"hello").unwrap(), 5);
        assert_eq!(file.write(5, b" world").unwrap(), 6);
        assert_eq!(file.tell().unwrap(), 11);
        file.close().unwrap();

        let mut file = File::open(&path, Access::Read).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(file.read(6, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(file.map().unwrap(), b"hello world");
    }

    #[test]
    fn read_past_end_is_short() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        let mut file = File::open(&path, Access::Write).unwrap();
        file.write(0, &[1, 2, 3]).unwrap();
        file.close().unwrap();

        let mut file = File::open(&path, Access::Read).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(file.read(1, &mut buf).unwrap(), 2);
    }

    #[test]
    fn open_missing_for_read_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = File::open(dir.path().join("nope"), Access::Read).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn file_stream_round_trip_and_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.bin");

        let mut out = FileStream::open(&path, Access::Write).unwrap();
        out.write(&[9; 10]).unwrap();
        assert_eq!(out.tell(), 10);
        out.into_file().close().unwrap();

        let mut input = FileStream::open(&path, Access::Read).unwrap();
        let mut buf = [0u8; 6];
        input.read(&mut buf).unwrap();
        let err = input.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
