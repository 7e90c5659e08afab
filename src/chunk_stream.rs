//! The bidirectional chunk codec primitives (spec §4.3) and the array framing sub-protocol
//! (spec §4.4).
//!
//! The central idea, per the design notes in the original specification: a single user-written
//! function walks a chunk's fields in a fixed order, and that same function serves for both
//! reading and writing. [`ChunkStream`] carries a [`Mode`] tag; its `read_write_*` primitives
//! dispatch on that tag internally, so the function that calls them never branches on direction
//! itself. This guarantees the two directions cannot drift apart, because there is only one
//! function.

use zerocopy::{FromBytes, IntoBytes};

use crate::buffer::Buffer;
use crate::error::ContainerError;

/// Tags a [`ChunkStream`] with its direction.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Mode {
    /// The stream is being decoded; `read_write_*` calls fill their arguments from the buffer.
    Reading,
    /// The stream is being encoded; `read_write_*` calls serialize their arguments into the
    /// buffer.
    Writing,
}

/// Lets a field whose in-memory representation differs from its on-disk representation
/// participate in [`ChunkStream::read_write_as`].
///
/// `Mem` is the type the user's codec works with (for example, an `enum`); `Save` is the type
/// actually stored on disk (for example, a `u8` discriminant). The narrowing and widening
/// conversions are the implementer's responsibility; they must be total over every value that can
/// legitimately reach them.
pub trait WireValue<Save> {
    /// Narrows `self` to its on-disk representation.
    fn to_wire(&self) -> Save;
    /// Widens an on-disk value back to the in-memory representation.
    fn from_wire(wire: Save) -> Self;
}

/// One frame of in-progress array framing state (spec §4.4).
///
/// `start_pos` and `last_pos` are cursor positions into the chunk's buffer; `count` and
/// `element_size` mirror the on-disk `Count`/`ElementSize` fields being accumulated (while
/// writing) or having been read (while reading).
struct ArrayFrame {
    start_pos: u64,
    last_pos: u64,
    count: u32,
    element_size: u32,
}

/// A cursor into a single chunk's uncompressed bytes, exposing the bidirectional codec
/// primitives.
///
/// The array frame stack exists only for the duration of one chunk codec call: it is created
/// empty when the stream is constructed and must be empty again when the codec returns (an
/// unbalanced `begin`/`end` pair is a programming error in the codec, not a format error, so it is
/// asserted rather than surfaced as a [`ContainerError`]).
pub struct ChunkStream<'a> {
    mode: Mode,
    buffer: &'a mut Buffer,
    frames: Vec<ArrayFrame>,
}

impl<'a> ChunkStream<'a> {
    pub(crate) fn new(mode: Mode, buffer: &'a mut Buffer) -> Self {
        Self {
            mode,
            buffer,
            frames: Vec::new(),
        }
    }

    /// The direction this stream is operating in.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The current cursor position within the chunk's buffer.
    pub fn position(&self) -> u64 {
        self.buffer.position()
    }

    /// Returns `true` if no array frame is currently open. A well-behaved codec always returns
    /// with this `true`.
    pub(crate) fn frames_balanced(&self) -> bool {
        self.frames.is_empty()
    }

    /// Reads or writes `n` raw bytes in place, depending on [`Mode`].
    ///
    /// In [`Mode::Reading`], `bytes` is filled from the stream. In [`Mode::Writing`], `bytes`'s
    /// current contents are appended to the stream and left unchanged. This single signature is
    /// what lets the same call site serve both directions.
    pub fn read_write_bytes(&mut self, bytes: &mut [u8]) -> Result<(), ContainerError> {
        match self.mode {
            Mode::Reading => self.buffer.read(bytes),
            Mode::Writing => {
                self.buffer.write(bytes);
                Ok(())
            }
        }
    }

    /// Reads or writes a trivially-copyable, fixed-size value via its raw byte image.
    ///
    /// This assumes the writer and reader share endianness conventions on the wire: the canonical
    /// on-disk form is little-endian, so `T` should itself be endianness-aware (e.g. a
    /// [`zerocopy`] `U32<LE>`) if it is meant to be portable across host architectures.
    pub fn read_write<T>(&mut self, value: &mut T) -> Result<(), ContainerError>
    where
        T: IntoBytes + FromBytes,
    {
        self.read_write_bytes(value.as_mut_bytes())
    }

    /// Reads or writes a value whose in-memory type (`Mem`) differs from its on-disk type
    /// (`Save`), narrowing on write and widening on read.
    pub fn read_write_as<Mem, Save>(&mut self, value: &mut Mem) -> Result<(), ContainerError>
    where
        Mem: WireValue<Save>,
        Save: IntoBytes + FromBytes + Default,
    {
        match self.mode {
            Mode::Writing => {
                let mut wire = value.to_wire();
                self.read_write_bytes(wire.as_mut_bytes())
            }
            Mode::Reading => {
                let mut wire = Save::default();
                self.read_write_bytes(wire.as_mut_bytes())?;
                *value = Mem::from_wire(wire);
                Ok(())
            }
        }
    }

    /// Reads or writes a NUL-terminated string.
    ///
    /// On write, `s`'s bytes are emitted followed by one `\0`; an embedded NUL in `s` truncates
    /// the written string at that point (the byte after it, and the string's own trailing NUL,
    /// are never both written). On read, bytes up to but not including the first `\0` are
    /// decoded as UTF-8 (lossily, since the format is 8-bit-clean and does not guarantee valid
    /// UTF-8 on malformed input).
    pub fn read_write_string(&mut self, s: &mut String) -> Result<(), ContainerError> {
        match self.mode {
            Mode::Writing => {
                let bytes = s.as_bytes();
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                self.buffer.write(&bytes[..end]);
                self.buffer.write(&[0u8]);
                Ok(())
            }
            Mode::Reading => {
                let pos = self.buffer.position() as usize;
                let data = self.buffer.data();
                let Some(rest) = data.get(pos..) else {
                    return Err(ContainerError::UnexpectedEndOfStream);
                };
                let Some(nul_at) = rest.iter().position(|&b| b == 0) else {
                    return Err(ContainerError::UnexpectedEndOfStream);
                };
                *s = String::from_utf8_lossy(&rest[..nul_at]).into_owned();
                self.buffer.set_position((pos + nul_at + 1) as u64);
                Ok(())
            }
        }
    }

    /// Reads or writes a value that only has an effect while writing.
    ///
    /// While writing, `value` is serialized normally. While reading, a value of `T`'s size is
    /// still consumed from the stream (so the cursor stays aligned with what the writer produced)
    /// but the decoded bytes are discarded. This is the dual the original specification calls
    /// for: not a no-op, because the reader must still advance past the field.
    pub fn write_only<T>(&mut self, value: T) -> Result<(), ContainerError>
    where
        T: IntoBytes + FromBytes + Default,
    {
        match self.mode {
            Mode::Writing => {
                let mut value = value;
                self.read_write_bytes(value.as_mut_bytes())
            }
            Mode::Reading => {
                let mut discard = T::default();
                self.read_write_bytes(discard.as_mut_bytes())
            }
        }
    }

    /// Reads or writes a `Vec<T>` as a length/stride-prefixed array (spec §4.4).
    ///
    /// `element_codec` is invoked once per element, in both directions, with a fresh
    /// default-initialized `T` on read. It should call back into `self` the same way the
    /// enclosing chunk codec does; whether the stored elements turn out fixed- or
    /// variable-stride is entirely a function of whether every element serializes to the same
    /// number of bytes.
    pub fn read_write_vector<T, F>(
        &mut self,
        vec: &mut Vec<T>,
        mut element_codec: F,
    ) -> Result<(), ContainerError>
    where
        T: Default,
        F: FnMut(&mut ChunkStream, &mut T) -> Result<(), ContainerError>,
    {
        match self.mode {
            Mode::Writing => {
                self.begin_array_write();
                for item in vec.iter_mut() {
                    element_codec(self, item)?;
                    self.next_element_write();
                }
                self.end_array_write()
            }
            Mode::Reading => {
                let count = self.begin_array_read()?;
                vec.clear();
                vec.reserve(count as usize);
                for _ in 0..count {
                    let mut item = T::default();
                    element_codec(self, &mut item)?;
                    self.next_element_read();
                    vec.push(item);
                }
                self.end_array_read();
                Ok(())
            }
        }
    }

    /// Reads or writes a fixed-capacity array slot as a length/stride-prefixed array.
    ///
    /// Unlike [`Self::read_write_vector`], `element_codec` reports via its `Ok(bool)` return
    /// whether the element was actually written; only elements reported as written are counted
    /// into the frame's `Count`. This lets a writer leave some slots unpopulated (a sparse write)
    /// without the array's element count drifting out of sync with what was actually emitted.
    ///
    /// On read, if the stored count exceeds `N`, excess elements are consumed (skipped by stride
    /// when the frame is fixed-stride, or decoded into a throwaway value and discarded when it is
    /// variable-stride) but not stored. If the stored count is less than `N`, the remaining slots
    /// are reset to `T::default()`.
    pub fn read_write_array<T, F, const N: usize>(
        &mut self,
        array: &mut [T; N],
        mut element_codec: F,
    ) -> Result<(), ContainerError>
    where
        T: Default,
        F: FnMut(&mut ChunkStream, &mut T) -> Result<bool, ContainerError>,
    {
        match self.mode {
            Mode::Writing => {
                self.begin_array_write();
                for item in array.iter_mut() {
                    if element_codec(self, item)? {
                        self.next_element_write();
                    }
                }
                self.end_array_write()
            }
            Mode::Reading => {
                let count = self.begin_array_read()?;
                for i in 0..count {
                    if (i as usize) < N {
                        let _ = element_codec(self, &mut array[i as usize])?;
                        self.next_element_read();
                    } else if self.current_frame_element_size() > 0 {
                        self.skip_element_by_stride();
                    } else {
                        let mut throwaway = T::default();
                        let _ = element_codec(self, &mut throwaway)?;
                        self.next_element_read();
                    }
                }
                for slot in array.iter_mut().skip(count as usize) {
                    *slot = T::default();
                }
                self.end_array_read();
                Ok(())
            }
        }
    }

    fn current_frame_element_size(&self) -> u32 {
        self.frames.last().map(|f| f.element_size).unwrap_or(0)
    }

    fn begin_array_write(&mut self) {
        let start_pos = self.buffer.position();
        self.buffer.write(&0u32.to_le_bytes());
        self.buffer.write(&0u32.to_le_bytes());
        let last_pos = self.buffer.position();
        self.frames.push(ArrayFrame {
            start_pos,
            last_pos,
            count: 0,
            element_size: 0,
        });
    }

    fn begin_array_read(&mut self) -> Result<u32, ContainerError> {
        let mut count_bytes = [0u8; 4];
        self.buffer.read(&mut count_bytes)?;
        let count = u32::from_le_bytes(count_bytes);

        let mut element_size_bytes = [0u8; 4];
        self.buffer.read(&mut element_size_bytes)?;
        let element_size = u32::from_le_bytes(element_size_bytes);

        let last_pos = self.buffer.position();
        self.frames.push(ArrayFrame {
            start_pos: 0,
            last_pos,
            count,
            element_size,
        });
        Ok(count)
    }

    fn next_element_write(&mut self) {
        let cur = self.buffer.position();
        let frame = self.frames.last_mut().expect("array frame stack underflow");
        let el_size = (cur - frame.last_pos) as u32;
        if frame.count == 0 {
            frame.element_size = el_size;
        } else if frame.element_size != el_size {
            frame.element_size = 0;
        }
        frame.count += 1;
        frame.last_pos = cur;
    }

    fn next_element_read(&mut self) {
        let frame = self.frames.last_mut().expect("array frame stack underflow");
        if frame.element_size > 0 {
            frame.last_pos += frame.element_size as u64;
            self.buffer.set_position(frame.last_pos);
        } else {
            frame.last_pos = self.buffer.position();
        }
    }

    /// Advances past one element of a fixed-stride frame without invoking its codec, used to
    /// skip excess elements a fixed-size array slot has no room for.
    fn skip_element_by_stride(&mut self) {
        let frame = self.frames.last_mut().expect("array frame stack underflow");
        debug_assert!(frame.element_size > 0);
        frame.last_pos += frame.element_size as u64;
        self.buffer.set_position(frame.last_pos);
    }

    fn end_array_write(&mut self) -> Result<(), ContainerError> {
        let frame = self.frames.pop().expect("array frame stack underflow");
        let cur = self.buffer.position();
        if frame.count == 0 && cur != frame.last_pos {
            return Err(ContainerError::MalformedArray);
        }
        self.buffer.set_position(frame.start_pos);
        self.buffer.write(&frame.count.to_le_bytes());
        self.buffer.write(&frame.element_size.to_le_bytes());
        self.buffer.set_position(cur);
        Ok(())
    }

    fn end_array_read(&mut self) {
        self.frames.pop().expect("array frame stack underflow");
    }
}
