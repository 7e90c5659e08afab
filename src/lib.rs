//! Reads and writes chunked, compressed binary containers.
//!
//! A container stream is a flat header, a directory of numbered chunks, and a payload holding
//! each chunk's bytes contiguously. The payload is built and stored as a single unit: it is
//! compressed as a whole (not chunk-by-chunk) and protected by a single whole-payload integrity
//! digest. Chunks are addressed by a small integer id, not by name or position, and a chunk that
//! was never written is simply absent from the directory rather than present-but-empty.
//!
//! The central idea is the bidirectional codec: instead of writing one function that serializes a
//! chunk's fields and a second, hand-synchronized function that deserializes them, a single
//! function walks the fields in a fixed order and calls into [`ChunkStream`]'s `read_write_*`
//! primitives, which dispatch on [`Mode`] internally. The two directions cannot drift apart
//! because there is only one function describing the layout.
//!
//! ```
//! use chunked_container::{ChunkStream, ContainerError, ContainerReader, ContainerWriter, WriteOptions};
//! use std::io::Cursor;
//!
//! fn codec(stream: &mut ChunkStream) -> Result<(), ContainerError> {
//!     let mut value = if stream.mode() == chunked_container::Mode::Writing { 42u32 } else { 0 };
//!     stream.read_write(&mut value)?;
//!     Ok(())
//! }
//!
//! let mut writer = ContainerWriter::new(Vec::new(), WriteOptions::default());
//! writer.read_write_chunk(1, codec).unwrap();
//! let (_summary, bytes) = writer.finish().unwrap();
//!
//! let mut reader = ContainerReader::from_reader(Cursor::new(bytes), Default::default()).unwrap();
//! assert!(reader.read_write_chunk(1, codec).unwrap());
//! assert!(!reader.read_write_chunk(2, codec).unwrap());
//! ```
//!
//! # References
//! This crate's on-disk layout and codec pattern are original to this project; they are not
//! derived from any external file format specification.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod chunk_stream;
mod error;
mod header;
mod reader;
mod writer;

#[cfg(test)]
mod tests;

pub use chunk_stream::{ChunkStream, Mode, WireValue};
pub use error::ContainerError;
pub use header::Compression;
pub use reader::{ContainerReader, ReadOptions};
pub use writer::{ContainerWriter, FinishSummary, WriteOptions};
