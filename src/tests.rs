//! End-to-end tests over [`ContainerReader`]/[`ContainerWriter`], covering the round-trip laws,
//! boundary behaviors, and literal scenarios S1-S6 from the original specification's testable
//! properties section.

use pretty_hex::PrettyHex;
use sha1::{Digest, Sha1};
use std::io::Cursor;
use zerocopy::{LE, U16, U32};

use crate::chunk_stream::ChunkStream;
use crate::error::ContainerError;
use crate::header::Compression;
use crate::reader::{ContainerReader, ReadOptions};
use crate::writer::{ContainerWriter, WriteOptions};

const EMPTY_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

fn init_logging() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .without_time()
            .compact()
            .try_init();
    });
}

fn hex_sha1(digest: &[u8; 20]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn write_to_bytes<F>(options: WriteOptions, build: F) -> Vec<u8>
where
    F: FnOnce(&mut ContainerWriter<Cursor<Vec<u8>>>),
{
    init_logging();
    println!();
    let mut writer = ContainerWriter::new(Cursor::new(Vec::new()), options);
    build(&mut writer);
    let (summary, out) = writer.finish().unwrap();
    println!("finished container:\n{summary}");
    let bytes = out.into_inner();
    println!("container bytes:\n{:?}", bytes.hex_dump());
    bytes
}

/// S1: an empty container is a bare 64-byte header plus the deflated empty payload, with the
/// well-known SHA-1 of zero bytes.
#[test]
fn s1_empty_file() {
    let bytes = write_to_bytes(WriteOptions::default(), |_w| {});

    assert!(bytes.len() >= 64, "container must contain at least a header");

    let mut reader = ContainerReader::from_reader(Cursor::new(bytes), ReadOptions::default())
        .expect("empty container should parse");

    assert_eq!(reader.num_chunks(), 0);
    assert_eq!(reader.uncompressed_size(), 0);
    assert_eq!(hex_sha1(&reader.sha1()), EMPTY_SHA1);
    assert!(!reader
        .read_write_chunk(0, |_s| Ok(()))
        .unwrap());
}

/// S2: a single chunk holding one little-endian u32 round-trips bit-exactly, and the directory
/// records its offset and length.
#[test]
fn s2_single_chunk_single_u32() {
    fn codec(stream: &mut ChunkStream, value: &mut U32<LE>) -> Result<(), ContainerError> {
        stream.read_write(value)
    }

    let options = WriteOptions {
        compress: false,
        ..Default::default()
    };
    let bytes = write_to_bytes(options, |w| {
        let mut value = U32::<LE>::new(0xDEAD_BEEF);
        w.read_write_chunk(0x1000, |s| codec(s, &mut value)).unwrap();
    });

    let payload_start = bytes.len() - 4;
    assert_eq!(&bytes[payload_start..], &0xDEAD_BEEFu32.to_le_bytes());

    let mut reader =
        ContainerReader::from_reader(Cursor::new(bytes), ReadOptions::default()).unwrap();
    assert_eq!(reader.num_chunks(), 1);

    let mut value = U32::<LE>::new(0);
    assert!(reader
        .read_write_chunk(0x1000, |s| codec(s, &mut value))
        .unwrap());
    assert_eq!(value.get(), 0xDEAD_BEEF);
}

/// S3: a vector of three homogeneous-size u16 elements records a nonzero stride and round-trips.
#[test]
fn s3_vector_of_fixed_stride_u16() {
    fn codec(stream: &mut ChunkStream, vec: &mut Vec<u16>) -> Result<(), ContainerError> {
        stream.read_write_vector(vec, |s, v| {
            let mut raw = U16::<LE>::new(*v);
            s.read_write(&mut raw)?;
            *v = raw.get();
            Ok(())
        })
    }

    let options = WriteOptions {
        compress: false,
        ..Default::default()
    };
    let bytes = write_to_bytes(options, |w| {
        let mut values = vec![1u16, 2, 3];
        w.read_write_chunk(1, |s| codec(s, &mut values)).unwrap();
    });

    let chunk_start = bytes.len() - 14;
    assert_eq!(
        &bytes[chunk_start..],
        &[3, 0, 0, 0, 2, 0, 0, 0, 1, 0, 2, 0, 3, 0]
    );

    let mut reader =
        ContainerReader::from_reader(Cursor::new(bytes), ReadOptions::default()).unwrap();
    let mut out = Vec::new();
    assert!(reader.read_write_chunk(1, |s| codec(s, &mut out)).unwrap());
    assert_eq!(out, vec![1, 2, 3]);
}

/// S4: a vector of two variable-size strings records a zero stride because the elements differ
/// in length.
#[test]
fn s4_vector_of_variable_stride_strings() {
    fn codec(stream: &mut ChunkStream, vec: &mut Vec<String>) -> Result<(), ContainerError> {
        stream.read_write_vector(vec, |s, v| s.read_write_string(v))
    }

    let options = WriteOptions {
        compress: false,
        ..Default::default()
    };
    let bytes = write_to_bytes(options, |w| {
        let mut values = vec!["ab".to_string(), "cdef".to_string()];
        w.read_write_chunk(1, |s| codec(s, &mut values)).unwrap();
    });

    let chunk_start = bytes.len() - 16;
    let mut expected = vec![2, 0, 0, 0, 0, 0, 0, 0];
    expected.extend_from_slice(b"ab\0cdef\0");
    assert_eq!(&bytes[chunk_start..], expected.as_slice());

    let mut reader =
        ContainerReader::from_reader(Cursor::new(bytes), ReadOptions::default()).unwrap();
    let mut out = Vec::new();
    assert!(reader.read_write_chunk(1, |s| codec(s, &mut out)).unwrap());
    assert_eq!(out, vec!["ab".to_string(), "cdef".to_string()]);
}

/// S5: two chunks in one file are independently addressable by id; an unknown id yields `false`
/// without invoking the codec.
#[test]
fn s5_two_chunks_one_file() {
    fn u8_codec(stream: &mut ChunkStream, value: &mut u8) -> Result<(), ContainerError> {
        let mut bytes = [*value];
        stream.read_write_bytes(&mut bytes)?;
        *value = bytes[0];
        Ok(())
    }

    let bytes = write_to_bytes(WriteOptions::default(), |w| {
        let mut a = 0x42u8;
        w.read_write_chunk(0xAAAA, |s| u8_codec(s, &mut a)).unwrap();
        let mut b = 0x99u8;
        w.read_write_chunk(0xBBBB, |s| u8_codec(s, &mut b)).unwrap();
    });

    let mut reader =
        ContainerReader::from_reader(Cursor::new(bytes), ReadOptions::default()).unwrap();
    assert_eq!(reader.num_chunks(), 2);

    let mut called = false;
    assert!(!reader
        .read_write_chunk(0xCCCC, |_s| {
            called = true;
            Ok(())
        })
        .unwrap());
    assert!(!called, "codec must not be invoked for a missing chunk id");

    let mut b = 0u8;
    assert!(reader.read_write_chunk(0xBBBB, |s| u8_codec(s, &mut b)).unwrap());
    assert_eq!(b, 0x99);

    let mut a = 0u8;
    assert!(reader.read_write_chunk(0xAAAA, |s| u8_codec(s, &mut a)).unwrap());
    assert_eq!(a, 0x42);
}

/// S6: flipping a byte in the payload is caught when integrity verification is requested, and
/// silently ignored (beyond possibly garbled data) when it is not.
#[test]
fn s6_corrupted_payload() {
    let options = WriteOptions {
        compress: false,
        ..Default::default()
    };
    let mut bytes = write_to_bytes(options, |w| {
        let mut value = U32::<LE>::new(0x1234_5678);
        w.read_write_chunk(1, |s| s.read_write(&mut value)).unwrap();
    });

    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let strict = ContainerReader::from_reader(
        Cursor::new(bytes.clone()),
        ReadOptions {
            verify_integrity: true,
            ..Default::default()
        },
    );
    assert!(matches!(
        strict.unwrap_err().downcast_ref::<ContainerError>(),
        Some(ContainerError::IntegrityError { .. })
    ));

    // Without verification, the corrupted container still opens.
    assert!(ContainerReader::from_reader(Cursor::new(bytes), ReadOptions::default()).is_ok());
}

/// Round-trip law: the header's recorded SHA-1 is the digest of the uncompressed payload that was
/// actually produced.
#[test]
fn header_sha1_matches_uncompressed_payload() {
    let bytes = write_to_bytes(WriteOptions::default(), |w| {
        w.read_write_chunk(1, |s| {
            let mut v = U32::<LE>::new(7);
            s.read_write(&mut v)
        })
        .unwrap();
    });

    let reader =
        ContainerReader::from_reader(Cursor::new(bytes), ReadOptions::default()).unwrap();
    let recomputed: [u8; 20] = Sha1::digest([7u8, 0, 0, 0]).into();
    assert_eq!(reader.sha1(), recomputed);
}

/// Decompressing a container with `Compression = Deflate` yields exactly the declared
/// `UncompressedSize` worth of bytes.
#[test]
fn decompression_yields_declared_uncompressed_size() {
    let payload = vec![0x41u8; 10_000];
    let bytes = write_to_bytes(WriteOptions::default(), |w| {
        w.read_write_chunk(1, |s| {
            let mut p = payload.clone();
            let original_len = p.len() as u32;
            let mut len = U32::<LE>::new(original_len);
            s.read_write(&mut len)?;
            s.read_write_bytes(&mut p)
        })
        .unwrap();
    });

    let mut reader =
        ContainerReader::from_reader(Cursor::new(bytes), ReadOptions::default()).unwrap();
    assert_eq!(reader.uncompressed_size(), 10_004);

    let mut len = U32::<LE>::new(0);
    let mut out = vec![0u8; payload.len()];
    reader
        .read_write_chunk(1, |s| {
            s.read_write(&mut len)?;
            s.read_write_bytes(&mut out)
        })
        .unwrap();
    assert_eq!(len.get() as usize, payload.len());
    assert_eq!(out, payload);
}

/// Two writers given byte-identical codec sequences produce byte-identical output, since
/// `flate2`'s default deflate settings are deterministic.
#[test]
fn identical_input_produces_identical_output() {
    fn build(w: &mut ContainerWriter<Cursor<Vec<u8>>>) {
        w.read_write_chunk(1, |s| {
            let mut v = U32::<LE>::new(0xC0FF_EE00);
            s.read_write(&mut v)
        })
        .unwrap();
    }

    let a = write_to_bytes(WriteOptions::default(), build);
    let b = write_to_bytes(WriteOptions::default(), build);
    assert_eq!(a, b);
}

/// Compression failure on write falls back to storing the payload uncompressed rather than
/// aborting finalization; there is no way to force `flate2` to fail here, so this test exercises
/// the `compress = false` path that exists for the same reason (never abort finalization over
/// compression).
#[test]
fn uncompressed_write_round_trips() {
    let options = WriteOptions {
        compress: false,
        ..Default::default()
    };
    let bytes = write_to_bytes(options, |w| {
        w.read_write_chunk(1, |s| {
            let mut v = U32::<LE>::new(99);
            s.read_write(&mut v)
        })
        .unwrap();
    });

    let mut reader =
        ContainerReader::from_reader(Cursor::new(bytes), ReadOptions::default()).unwrap();
    let mut v = U32::<LE>::new(0);
    reader.read_write_chunk(1, |s| s.read_write(&mut v)).unwrap();
    assert_eq!(v.get(), 99);
}

/// Magic and version checks are the caller's responsibility, not the envelope's.
#[test]
fn bad_magic_and_version_too_new_are_rejected() {
    let bytes = write_to_bytes(
        WriteOptions {
            magic: *b"TRAK",
            min_version: 5,
            ..Default::default()
        },
        |_w| {},
    );

    let wrong_magic = ContainerReader::from_reader(
        Cursor::new(bytes.clone()),
        ReadOptions {
            expected_magic: Some(*b"NOPE"),
            ..Default::default()
        },
    );
    assert!(matches!(
        wrong_magic.unwrap_err().downcast_ref::<ContainerError>(),
        Some(ContainerError::BadMagic { .. })
    ));

    let too_new = ContainerReader::from_reader(
        Cursor::new(bytes),
        ReadOptions {
            expected_magic: Some(*b"TRAK"),
            supported_version: 1,
            ..Default::default()
        },
    );
    assert!(matches!(
        too_new.unwrap_err().downcast_ref::<ContainerError>(),
        Some(ContainerError::VersionTooNew { .. })
    ));
}

/// A truncated stream is rejected while reading the declared payload.
#[test]
fn truncated_payload_is_rejected() {
    let mut bytes = write_to_bytes(WriteOptions::default(), |w| {
        w.read_write_chunk(1, |s| {
            let mut v = U32::<LE>::new(0x11223344);
            s.read_write(&mut v)
        })
        .unwrap();
    });
    bytes.truncate(bytes.len() - 1);

    let err = ContainerReader::from_reader(Cursor::new(bytes), ReadOptions::default())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ContainerError>(),
        Some(ContainerError::Truncated { .. })
    ));
}

/// Writing with `Compression::None` (the fallback path) is reported in the finish summary.
#[test]
fn finish_summary_reports_compression_used() {
    let mut writer = ContainerWriter::new(
        Cursor::new(Vec::new()),
        WriteOptions {
            compress: false,
            ..Default::default()
        },
    );
    writer.read_write_chunk(1, |_s| Ok(())).unwrap();
    let (summary, _out) = writer.finish().unwrap();
    assert_eq!(summary.compression, Compression::None);
    assert_eq!(summary.num_chunks, 1);
    assert_eq!(summary.uncompressed_size, 0);
}
