//! Error types for configuration and persistence.
//!
//! Allocation itself never produces an error value: exhaustion is `None`.
//! These types cover the operations that can fail for reasons other than
//! running out of memory.

use std::error::Error;
use std::fmt;
use std::io;

/// A configuration value was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration cannot be used.
    Invalid {
        /// Human-readable description of the problem.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { reason } => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl Error for ConfigError {}

/// Errors from saving or loading a [`Pool`](crate::Pool) or [`Slab`](crate::Slab).
///
/// A failed load never leaves partially-initialised state behind: every
/// buffer acquired during the call has been released by the time the error
/// is returned.
#[derive(Debug)]
pub enum PersistError {
    /// The underlying stream failed, including short reads.
    Io(io::Error),
    /// The header does not start with the expected magic bytes.
    InvalidMagic {
        /// Magic bytes this loader accepts.
        expected: [u8; 4],
        /// Magic bytes found in the stream.
        found: [u8; 4],
    },
    /// The format version is not supported by this build.
    UnsupportedVersion {
        /// The version found in the stream.
        found: u32,
    },
    /// The header or payload is internally inconsistent.
    Malformed {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// The allocator could not provide the buffers being loaded.
    OutOfMemory {
        /// Number of bytes requested.
        requested: usize,
    },
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidMagic { expected, found } => write!(
                f,
                "invalid magic bytes: expected {:?}, found {:?}",
                String::from_utf8_lossy(expected),
                String::from_utf8_lossy(found)
            ),
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported format version {found}")
            }
            Self::Malformed { detail } => write!(f, "malformed data: {detail}"),
            Self::OutOfMemory { requested } => {
                write!(f, "out of memory: could not allocate {requested} bytes")
            }
        }
    }
}

impl Error for PersistError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PersistError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
