//! Reading a container stream (spec §4.2, construction in `READING` mode).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use sha1::{Digest, Sha1};
use tracing::{debug, debug_span, trace, warn};
use zerocopy::{FromZeros, IntoBytes};

use crate::buffer::Buffer;
use crate::chunk_stream::{ChunkStream, Mode};
use crate::error::ContainerError;
use crate::header::{ChunkEntry, Compression, ContainerHeader};

/// The block size used when copying the compressed payload off the underlying stream.
const READ_BLOCK_SIZE: usize = 2048;

/// Options controlling how a container stream is opened for reading.
#[derive(Clone, Debug)]
pub struct ReadOptions {
    /// If `Some`, the header's `Magic` field must match this value or [`ContainerError::BadMagic`]
    /// is raised. If `None`, the magic is not checked.
    pub expected_magic: Option<[u8; 4]>,
    /// The highest format version this reader supports. If the header's `MinVersion` exceeds
    /// this, [`ContainerError::VersionTooNew`] is raised.
    pub supported_version: u32,
    /// If `true`, the uncompressed payload's SHA-1 digest is recomputed and compared against the
    /// header's stored digest; a mismatch raises [`ContainerError::IntegrityError`]. This is
    /// opt-in, as recomputing the digest requires a full pass over the payload.
    pub verify_integrity: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            expected_magic: None,
            supported_version: u32::MAX,
            verify_integrity: false,
        }
    }
}

/// A container stream opened for reading.
///
/// Construction reads the header, the chunk directory, and the whole payload, then (if
/// compressed) inflates it; after that this type is immutable. There is no way to obtain a second
/// live borrow of its buffer while a chunk codec runs, so a codec cannot recursively open another
/// chunk on the same container — this is enforced by the borrow checker, not by a runtime check.
pub struct ContainerReader {
    header: ContainerHeader,
    directory: Vec<ChunkEntry>,
    buffer: Buffer,
}

impl ContainerReader {
    /// Opens a container stream from a file path, using default [`ReadOptions`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ReadOptions::default())
    }

    /// Opens a container stream from a file path.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ReadOptions) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("opening {}", path.as_ref().display()))?;
        Self::from_reader(file, options)
    }

    /// Reads a container stream from any [`Read`] implementation.
    ///
    /// If the inflated payload's length disagrees with the header's declared
    /// `UncompressedSize`, that is treated as non-fatal: a `tracing::warn!` event is emitted and
    /// construction proceeds using the bytes actually inflated, rather than failing outright. This
    /// is the `SizeMismatch` policy; [`Self::uncompressed_size`] always reflects the actually
    /// inflated length, which may therefore differ from what the header declared.
    pub fn from_reader<R: Read>(mut reader: R, options: ReadOptions) -> Result<Self> {
        let _span = debug_span!("ContainerReader::from_reader").entered();

        let mut header = ContainerHeader::new_zeroed();
        reader
            .read_exact(header.as_mut_bytes())
            .context("reading container header")?;

        if let Some(expected) = options.expected_magic {
            if header.magic != expected {
                return Err(ContainerError::BadMagic {
                    expected,
                    found: header.magic,
                }
                .into());
            }
        }

        let min_version = header.min_version.get();
        if min_version > options.supported_version {
            return Err(ContainerError::VersionTooNew {
                min_version,
                supported: options.supported_version,
            }
            .into());
        }

        let num_chunks = header.num_chunks.get();
        debug!(num_chunks, "reading chunk directory");
        let mut directory = Vec::with_capacity(num_chunks as usize);
        for _ in 0..num_chunks {
            let mut entry = ChunkEntry::new_zeroed();
            reader
                .read_exact(entry.as_mut_bytes())
                .context("reading chunk directory entry")?;
            directory.push(entry);
        }

        let compressed_size = header.compressed_size.get();
        trace!(compressed_size, "reading payload");
        let mut compressed = Vec::with_capacity(compressed_size as usize);
        let mut remaining = compressed_size;
        let mut block = [0u8; READ_BLOCK_SIZE];
        while remaining > 0 {
            let want = (remaining as usize).min(READ_BLOCK_SIZE);
            match reader.read(&mut block[..want]) {
                Ok(0) => {
                    return Err(ContainerError::Truncated {
                        expected: compressed_size,
                        actual: compressed_size - remaining,
                    }
                    .into());
                }
                Ok(n) => {
                    compressed.extend_from_slice(&block[..n]);
                    remaining -= n as u64;
                }
                Err(e) => return Err(e).context("reading payload"),
            }
        }

        let compression = Compression::try_from_code(header.compression.get())?;
        let uncompressed_size = header.uncompressed_size.get();

        let uncompressed = match compression {
            Compression::None => compressed,
            Compression::Deflate => {
                let mut out = Vec::with_capacity(uncompressed_size as usize);
                let mut decoder = flate2::read::DeflateDecoder::new(compressed.as_slice());
                decoder
                    .read_to_end(&mut out)
                    .map_err(ContainerError::InflateError)?;
                out
            }
        };

        if uncompressed.len() as u64 != uncompressed_size {
            // SizeMismatch policy: non-fatal. We proceed with the bytes we actually inflated.
            warn!(
                declared = uncompressed_size,
                actual = uncompressed.len(),
                "inflated payload size does not match the header's UncompressedSize"
            );
        }

        if options.verify_integrity {
            let actual: [u8; 20] = Sha1::digest(&uncompressed).into();
            if actual != header.sha1 {
                return Err(ContainerError::IntegrityError {
                    expected: header.sha1,
                    actual,
                }
                .into());
            }
        }

        Ok(Self {
            header,
            directory,
            buffer: Buffer::from_vec(uncompressed),
        })
    }

    /// The writer's declared target version.
    pub fn target_version(&self) -> u32 {
        self.header.target_version.get()
    }

    /// The minimum reader version the file requires.
    pub fn min_version(&self) -> u32 {
        self.header.min_version.get()
    }

    /// The number of entries in the chunk directory.
    pub fn num_chunks(&self) -> u32 {
        self.header.num_chunks.get()
    }

    /// The length of the uncompressed payload, as actually inflated (see the `SizeMismatch`
    /// policy documented on [`Self::from_reader`]).
    pub fn uncompressed_size(&self) -> u64 {
        self.buffer.len()
    }

    /// The SHA-1 digest recorded in the header.
    pub fn sha1(&self) -> [u8; 20] {
        self.header.sha1
    }

    /// Looks up the chunk with the given id and, if present, invokes `codec` with a
    /// [`ChunkStream`] positioned at its start.
    ///
    /// Returns `Ok(true)` if a matching chunk was found and `codec` was invoked; returns
    /// `Ok(false)` without invoking `codec` if no chunk with that id exists (a missing chunk is
    /// not an error — callers use this to treat chunk presence as optional). If more than one
    /// directory entry shares `id`, the first one in directory order is used.
    pub fn read_write_chunk<F>(&mut self, id: u32, codec: F) -> Result<bool>
    where
        F: FnOnce(&mut ChunkStream) -> Result<(), ContainerError>,
    {
        let Some(entry) = self.directory.iter().find(|e| e.id.get() == id) else {
            return Ok(false);
        };
        self.buffer.set_position(entry.offset.get());

        let mut stream = ChunkStream::new(Mode::Reading, &mut self.buffer);
        codec(&mut stream)?;
        debug_assert!(
            stream.frames_balanced(),
            "chunk codec returned with an array frame still open"
        );
        Ok(true)
    }
}
