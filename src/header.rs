//! On-disk layout of the container header and chunk directory (spec §3).

use static_assertions::const_assert_eq;
use std::mem::size_of;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, LE, U32, U64};

use crate::error::ContainerError;

/// The fixed 64-byte header at the start of every container stream.
///
/// All multi-byte integers are little-endian on disk, regardless of host endianness; this struct
/// uses [`zerocopy`]'s byte-order wrapper types so that reading/writing it never requires a
/// manual byte swap.
#[derive(Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct ContainerHeader {
    /// Caller-chosen constant identifying the file kind. The envelope itself is magic-agnostic;
    /// callers verify this against their own expected value.
    pub magic: [u8; 4],
    /// The writer's current format version.
    pub target_version: U32<LE>,
    /// The minimum reader version that can understand this payload.
    pub min_version: U32<LE>,
    /// Number of entries in the chunk directory.
    pub num_chunks: U32<LE>,
    /// Length of the payload after decompression.
    pub uncompressed_size: U64<LE>,
    /// Compression algorithm: 0 = none, 1 = deflate. Other values are reserved.
    pub compression: U32<LE>,
    /// Length of the payload as stored on the stream.
    pub compressed_size: U64<LE>,
    /// SHA-1 digest of the uncompressed payload.
    pub sha1: [u8; 20],
    /// Reserved; always written as zero.
    pub padding: [u8; 8],
}

/// Length in bytes of [`ContainerHeader`] on disk.
pub const HEADER_LEN: usize = size_of::<ContainerHeader>();
const_assert_eq!(HEADER_LEN, 64);

/// One entry in the chunk directory: a chunk id and its byte range within the uncompressed
/// payload.
#[derive(Clone, Copy, IntoBytes, FromBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct ChunkEntry {
    /// The chunk's id. Not required to be unique; the reader selects the first match.
    pub id: U32<LE>,
    /// Byte offset of the chunk within the uncompressed payload.
    pub offset: U64<LE>,
    /// Length in bytes of the chunk.
    pub length: U64<LE>,
}

/// Length in bytes of [`ChunkEntry`] on disk.
pub const CHUNK_ENTRY_LEN: usize = size_of::<ChunkEntry>();
const_assert_eq!(CHUNK_ENTRY_LEN, 20);

/// Identifies "no compression" in the header's `Compression` field.
pub const COMPRESSION_NONE: u32 = 0;
/// Identifies whole-payload raw-deflate compression in the header's `Compression` field.
pub const COMPRESSION_DEFLATE: u32 = 1;

/// The compression algorithms this crate can read and write.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum Compression {
    /// No compression; the payload is stored as-is.
    #[default]
    None,
    /// Raw DEFLATE (no gzip envelope), via `flate2`.
    Deflate,
}

impl Compression {
    pub(crate) fn to_code(self) -> u32 {
        match self {
            Self::None => COMPRESSION_NONE,
            Self::Deflate => COMPRESSION_DEFLATE,
        }
    }

    pub(crate) fn try_from_code(code: u32) -> Result<Self, ContainerError> {
        match code {
            COMPRESSION_NONE => Ok(Self::None),
            COMPRESSION_DEFLATE => Ok(Self::Deflate),
            other => Err(ContainerError::UnsupportedCompression(other)),
        }
    }
}
