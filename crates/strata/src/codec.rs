//! Little-endian primitives for the pool and slab formats.
//!
//! Every persisted structure starts with 4 magic bytes and a `u32` version.
//! There is no padding and no self-describing schema.

use tracing::debug;

use crate::error::PersistError;
use crate::stream::Stream;

/// Format version written by this build and the only one it loads.
pub const FORMAT_VERSION: u32 = 1;

// ── Primitive writers ───────────────────────────────────────────

/// Write a little-endian u32.
pub fn write_u32_le(s: &mut dyn Stream, v: u32) -> Result<(), PersistError> {
    s.write(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian u64.
pub fn write_u64_le(s: &mut dyn Stream, v: u64) -> Result<(), PersistError> {
    s.write(&v.to_le_bytes())?;
    Ok(())
}

/// Write a slice of u32 words, each little-endian.
pub fn write_u32_words(s: &mut dyn Stream, words: &[u32]) -> Result<(), PersistError> {
    for &w in words {
        write_u32_le(s, w)?;
    }
    Ok(())
}

/// Write a slice of u64 words, each little-endian.
pub fn write_u64_words(s: &mut dyn Stream, words: &[u64]) -> Result<(), PersistError> {
    if cfg!(target_endian = "little") {
        s.write(bytemuck::cast_slice(words))?;
    } else {
        for &w in words {
            write_u64_le(s, w)?;
        }
    }
    Ok(())
}

/// Write the magic bytes followed by [`FORMAT_VERSION`].
pub fn write_header(s: &mut dyn Stream, magic: [u8; 4]) -> Result<(), PersistError> {
    s.write(&magic)?;
    write_u32_le(s, FORMAT_VERSION)
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a little-endian u32.
pub fn read_u32_le(s: &mut dyn Stream) -> Result<u32, PersistError> {
    let mut buf = [0u8; 4];
    s.read(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a little-endian u64.
pub fn read_u64_le(s: &mut dyn Stream) -> Result<u64, PersistError> {
    let mut buf = [0u8; 8];
    s.read(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a u64 that must fit a `usize`.
pub fn read_len(s: &mut dyn Stream, what: &str) -> Result<usize, PersistError> {
    let v = read_u64_le(s)?;
    usize::try_from(v).map_err(|_| malformed(format!("{what} {v} does not fit in usize")))
}

/// Fill `words` with little-endian u64 values.
pub fn read_u64_words(s: &mut dyn Stream, words: &mut [u64]) -> Result<(), PersistError> {
    s.read(bytemuck::cast_slice_mut(words))?;
    for w in words.iter_mut() {
        *w = u64::from_le(*w);
    }
    Ok(())
}

/// Read and validate the magic bytes and version.
pub fn read_header(s: &mut dyn Stream, expected: [u8; 4]) -> Result<(), PersistError> {
    let mut found = [0u8; 4];
    s.read(&mut found)?;
    if found != expected {
        debug!(?expected, ?found, "rejecting load: bad magic");
        return Err(PersistError::InvalidMagic { expected, found });
    }
    let version = read_u32_le(s)?;
    if version != FORMAT_VERSION {
        debug!(version, "rejecting load: unsupported version");
        return Err(PersistError::UnsupportedVersion { found: version });
    }
    Ok(())
}

/// Build a [`PersistError::Malformed`], logging the rejection.
pub fn malformed(detail: String) -> PersistError {
    debug!(%detail, "rejecting load: malformed");
    PersistError::Malformed { detail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    #[test]
    fn integers_are_little_endian() {
        let mut s = MemoryStream::new();
        write_u32_le(&mut s, 0x0102_0304).unwrap();
        write_u64_le(&mut s, 1).unwrap();
        assert_eq!(&s.as_bytes()[..4], &[4, 3, 2, 1]);
        assert_eq!(&s.as_bytes()[4..], &[1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn word_slices_match_scalar_encoding() {
        let mut bulk = MemoryStream::new();
        write_u64_words(&mut bulk, &[1, u64::MAX - 1]).unwrap();
        let mut scalar = MemoryStream::new();
        write_u64_le(&mut scalar, 1).unwrap();
        write_u64_le(&mut scalar, u64::MAX - 1).unwrap();
        assert_eq!(bulk.as_bytes(), scalar.as_bytes());

        let mut words = [0u64; 2];
        read_u64_words(&mut bulk, &mut words).unwrap();
        assert_eq!(words, [1, u64::MAX - 1]);
    }

    #[test]
    fn header_rejects_wrong_magic() {
        let mut s = MemoryStream::new();
        write_header(&mut s, *b"slab").unwrap();
        let err = read_header(&mut s, *b"pool").unwrap_err();
        assert!(matches!(
            err,
            PersistError::InvalidMagic { found, .. } if &found == b"slab"
        ));
    }

    #[test]
    fn header_rejects_future_version() {
        let mut s = MemoryStream::new();
        s.write(b"pool").unwrap();
        write_u32_le(&mut s, 2).unwrap();
        let err = read_header(&mut s, *b"pool").unwrap_err();
        assert!(matches!(err, PersistError::UnsupportedVersion { found: 2 }));
    }

    #[test]
    fn truncated_header_is_io_error() {
        let mut s = MemoryStream::from_bytes(b"po".to_vec());
        assert!(matches!(
            read_header(&mut s, *b"pool"),
            Err(PersistError::Io(_))
        ));
    }
}
