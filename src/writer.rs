//! Writing a container stream (spec §4.2, construction and finalization in `WRITING` mode).

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use sha1::{Digest, Sha1};
use tracing::{debug, debug_span, warn};
use zerocopy::{IntoBytes, LE, U32, U64};

use crate::buffer::Buffer;
use crate::chunk_stream::{ChunkStream, Mode};
use crate::error::ContainerError;
use crate::header::{ChunkEntry, Compression, ContainerHeader};

/// Options controlling how a new container stream is written.
#[derive(Clone, Debug)]
pub struct WriteOptions {
    /// The caller-chosen magic stamped into the header.
    pub magic: [u8; 4],
    /// The writer's format version, stored in the header's `TargetVersion`.
    pub target_version: u32,
    /// The minimum reader version required to understand the payload, stored in the header's
    /// `MinVersion`.
    pub min_version: u32,
    /// Whether to deflate the payload on finalization. If the deflate pass fails, finalization
    /// silently falls back to storing the payload uncompressed rather than failing outright.
    pub compress: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            magic: *b"\0\0\0\0",
            target_version: 0,
            min_version: 0,
            compress: true,
        }
    }
}

/// A container stream being built in memory, ready to be finalized to an underlying [`Write`].
///
/// Chunks accumulate into an in-memory [`Buffer`]; nothing reaches the underlying stream until
/// [`Self::finish`] is called. If a [`ContainerWriter`] is dropped without calling `finish`, no
/// partial output is produced and the underlying stream is left untouched — finalization either
/// happens exactly once, by explicit consuming call, or not at all.
pub struct ContainerWriter<W = File> {
    options: WriteOptions,
    directory: Vec<ChunkEntry>,
    buffer: Buffer,
    out: W,
}

/// Summary of a finished container stream, returned by [`ContainerWriter::finish`].
#[non_exhaustive]
pub struct FinishSummary {
    /// Number of chunks written.
    pub num_chunks: u32,
    /// Length of the payload before compression.
    pub uncompressed_size: u64,
    /// Length of the payload as stored on the stream.
    pub compressed_size: u64,
    /// The compression algorithm actually used (may differ from what was requested if deflate
    /// failed and the writer fell back to storing the payload uncompressed).
    pub compression: Compression,
}

impl fmt::Display for FinishSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "chunks: {}", self.num_chunks)?;
        writeln!(f, "uncompressed size: {}", self.uncompressed_size)?;
        writeln!(f, "compressed size: {}", self.compressed_size)?;
        write!(f, "compression: {:?}", self.compression)
    }
}

impl ContainerWriter<File> {
    /// Creates a new container stream at `path`, truncating any existing file.
    pub fn create<P: AsRef<Path>>(path: P, options: WriteOptions) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("creating {}", path.as_ref().display()))?;
        Ok(Self::new(file, options))
    }
}

impl<W: Write> ContainerWriter<W> {
    /// Begins building a new container stream over any [`Write`] implementation. Nothing is
    /// written to `out` until [`Self::finish`] is called.
    pub fn new(out: W, options: WriteOptions) -> Self {
        Self {
            options,
            directory: Vec::new(),
            buffer: Buffer::new(),
            out,
        }
    }

    /// Appends a new chunk with the given id, invoking `codec` with a [`ChunkStream`] positioned
    /// at the end of the payload built so far.
    ///
    /// The chunk's length is computed from how far `codec` advanced the cursor. This always
    /// succeeds on the write path (returning `Ok(true)`); the boolean return exists to mirror the
    /// read path's `read_write_chunk`, which can return `false` for a missing chunk.
    pub fn read_write_chunk<F>(&mut self, id: u32, codec: F) -> Result<bool>
    where
        F: FnOnce(&mut ChunkStream) -> Result<(), ContainerError>,
    {
        let offset = self.buffer.position();
        let mut stream = ChunkStream::new(Mode::Writing, &mut self.buffer);
        codec(&mut stream)?;
        debug_assert!(
            stream.frames_balanced(),
            "chunk codec returned with an array frame still open"
        );
        let length = self.buffer.position() - offset;

        self.directory.push(ChunkEntry {
            id: U32::new(id),
            offset: U64::new(offset),
            length: U64::new(length),
        });
        Ok(true)
    }

    /// Finalizes the container: hashes and (optionally) compresses the accumulated payload, then
    /// writes the header, chunk directory, and payload to the underlying stream, in that order.
    ///
    /// Consumes `self`, returning the underlying stream and a [`FinishSummary`]. This is the only
    /// way to produce output; nothing is written to the underlying stream before this call.
    pub fn finish(mut self) -> Result<(FinishSummary, W)> {
        let _span = debug_span!("ContainerWriter::finish").entered();

        let uncompressed_size = self.buffer.len();
        let sha1: [u8; 20] = Sha1::digest(self.buffer.data()).into();

        let (compression, payload) = if self.options.compress {
            match deflate(self.buffer.data()) {
                Ok(compressed) => (Compression::Deflate, compressed),
                Err(e) => {
                    warn!(
                        error = %e,
                        "deflate failed during finalization, falling back to uncompressed storage"
                    );
                    (Compression::None, self.buffer.data().to_vec())
                }
            }
        } else {
            (Compression::None, self.buffer.data().to_vec())
        };

        let compressed_size = payload.len() as u64;
        debug!(
            uncompressed_size,
            compressed_size,
            num_chunks = self.directory.len(),
            ?compression,
            "writing container"
        );

        let header = ContainerHeader {
            magic: self.options.magic,
            target_version: U32::new(self.options.target_version),
            min_version: U32::new(self.options.min_version),
            num_chunks: U32::<LE>::new(self.directory.len() as u32),
            uncompressed_size: U64::new(uncompressed_size),
            compression: U32::new(compression.to_code()),
            compressed_size: U64::new(compressed_size),
            sha1,
            padding: [0u8; 8],
        };

        self.out
            .write_all(header.as_bytes())
            .map_err(ContainerError::FinalizationError)?;
        self.out
            .write_all(self.directory.as_bytes())
            .map_err(ContainerError::FinalizationError)?;
        self.out
            .write_all(&payload)
            .map_err(ContainerError::FinalizationError)?;

        let summary = FinishSummary {
            num_chunks: self.directory.len() as u32,
            uncompressed_size,
            compressed_size,
            compression,
        };
        Ok((summary, self.out))
    }
}

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
