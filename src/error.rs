//! Error kinds surfaced by this crate.
//!
//! This mirrors the small hand-rolled error types used elsewhere in this codebase (see
//! `UnsupportedCompressionError`) rather than pulling in a derive-based error crate: each variant
//! gets a manual `Display` impl and the whole enum implements [`std::error::Error`], so it
//! converts into [`anyhow::Error`] at call sites via `?` the same way the rest of this crate does.

use std::fmt;

/// Errors that can be raised while reading or writing a container stream.
#[derive(Debug)]
#[non_exhaustive]
pub enum ContainerError {
    /// The underlying stream ended before the declared number of bytes were available.
    Truncated {
        /// Number of bytes the format declared it would supply.
        expected: u64,
        /// Number of bytes actually available before the stream ended.
        actual: u64,
    },

    /// The header's `Magic` field did not match the caller's expected value.
    BadMagic {
        /// The magic the caller expected.
        expected: [u8; 4],
        /// The magic actually present in the header.
        found: [u8; 4],
    },

    /// The header's `MinVersion` exceeds the version this reader supports.
    VersionTooNew {
        /// The minimum reader version the file requires.
        min_version: u32,
        /// The highest version this reader supports.
        supported: u32,
    },

    /// Decompressing the payload failed.
    InflateError(std::io::Error),

    /// The stored SHA-1 digest did not match the recomputed digest of the payload.
    IntegrityError {
        /// The digest recorded in the header.
        expected: [u8; 20],
        /// The digest actually computed over the inflated payload.
        actual: [u8; 20],
    },

    /// An array frame was ended on the write side after its cursor advanced past the frame
    /// header, but zero elements were ever counted via `next_element`.
    MalformedArray,

    /// Writing the header, directory, or payload to the underlying stream failed.
    FinalizationError(std::io::Error),

    /// A read inside a chunk codec ran past the end of the in-memory buffer.
    UnexpectedEndOfStream,

    /// The header named a compression algorithm this crate does not recognize.
    UnsupportedCompression(u32),
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { expected, actual } => write!(
                f,
                "stream ended early: expected {expected} bytes, found {actual}"
            ),
            Self::BadMagic { expected, found } => write!(
                f,
                "bad container magic: expected {expected:02x?}, found {found:02x?}"
            ),
            Self::VersionTooNew {
                min_version,
                supported,
            } => write!(
                f,
                "container requires reader version {min_version}, this reader supports up to {supported}"
            ),
            Self::InflateError(e) => write!(f, "failed to decompress payload: {e}"),
            Self::IntegrityError { expected, actual } => write!(
                f,
                "integrity check failed: header sha1 {} != computed sha1 {}",
                hex(expected),
                hex(actual)
            ),
            Self::MalformedArray => write!(
                f,
                "array frame was written to without any elements being counted"
            ),
            Self::FinalizationError(e) => write!(f, "failed to finalize container: {e}"),
            Self::UnexpectedEndOfStream => {
                write!(f, "read past the end of the chunk buffer")
            }
            Self::UnsupportedCompression(code) => {
                write!(f, "unrecognized compression code {code}")
            }
        }
    }
}

impl std::error::Error for ContainerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InflateError(e) | Self::FinalizationError(e) => Some(e),
            _ => None,
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
