//! Integration test: WireBuffer / WireWriter
//!
//! Exercises sequential decoding of request payloads: primitives, strings,
//! by-view structures and trailing arrays, plus the malformed-input paths.

use vcuda_protocol::abi::{Dim3, TextureReference, Uint3};
use vcuda_protocol::{WireBuffer, WireError, WireWriter};

#[test]
fn test_reads_fields_in_order() {
    let mut writer = WireWriter::new();
    writer
        .write_string("M1")
        .write(&256i32)
        .write(&Uint3 { x: 1, y: 2, z: 3 })
        .write(&7u64);
    let payload = writer.into_inner();

    let mut input = WireBuffer::new(&payload);
    assert_eq!(input.read_string().unwrap(), "M1");
    assert_eq!(input.position(), 3);
    assert_eq!(input.read::<i32>().unwrap(), 256);
    assert_eq!(input.read::<Uint3>().unwrap(), Uint3 { x: 1, y: 2, z: 3 });
    assert_eq!(input.read::<u64>().unwrap(), 7);
    assert!(input.is_empty());
    input.finish().unwrap();
}

#[test]
fn test_integers_are_little_endian() {
    let payload = [0x00, 0x01, 0x00, 0x00];
    let mut input = WireBuffer::new(&payload);
    assert_eq!(input.read::<u32>().unwrap(), 256);
}

#[test]
fn test_underrun_reports_offset() {
    let payload = [1u8, 2, 3];
    let mut input = WireBuffer::new(&payload);
    input.read::<u8>().unwrap();
    let err = input.read::<u32>().unwrap_err();
    assert_eq!(
        err,
        WireError::Underrun {
            offset: 1,
            needed: 4,
            remaining: 2
        }
    );
    // A failed read does not consume anything.
    assert_eq!(input.remaining(), 2);
}

#[test]
fn test_unterminated_string_is_malformed() {
    let payload = b"hostFn";
    let mut input = WireBuffer::new(payload);
    assert_eq!(
        input.read_string().unwrap_err(),
        WireError::UnterminatedString(0)
    );
}

#[test]
fn test_invalid_utf8_string_is_malformed() {
    let payload = [0x66, 0xff, 0x00];
    let mut input = WireBuffer::new(&payload);
    assert_eq!(input.read_string().unwrap_err(), WireError::InvalidUtf8(0));
}

#[test]
fn test_cstr_view_keeps_raw_bytes() {
    let payload = [0x66, 0xff, 0x00, 0x2a];
    let mut input = WireBuffer::new(&payload);
    let s = input.read_cstr().unwrap();
    assert_eq!(s.to_bytes(), &[0x66, 0xff]);
    assert_eq!(input.read::<u8>().unwrap(), 0x2a);
}

#[test]
fn test_empty_string() {
    let payload = [0u8, 5];
    let mut input = WireBuffer::new(&payload);
    assert_eq!(input.read_string().unwrap(), "");
    assert_eq!(input.read::<u8>().unwrap(), 5);
}

#[test]
fn test_read_struct_by_view() {
    let descriptor = TextureReference {
        normalized: 1,
        filter_mode: 1,
        max_anisotropy: 4,
        ..TextureReference::default()
    };
    let mut writer = WireWriter::new();
    writer.write(&descriptor);
    let payload = writer.into_inner();

    let mut input = WireBuffer::new(&payload);
    let decoded = input.read_struct::<TextureReference>().unwrap();
    assert_eq!(*decoded, descriptor);
    input.finish().unwrap();
}

#[test]
fn test_read_struct_unaligned_copies() {
    // One leading byte forces the Dim3 view off its natural alignment.
    let mut writer = WireWriter::new();
    writer.write(&9u8).write(&Dim3 { x: 4, y: 5, z: 6 });
    let payload = writer.into_inner();

    let mut input = WireBuffer::new(&payload);
    input.read::<u8>().unwrap();
    let dim = input.read_struct::<Dim3>().unwrap();
    assert_eq!(*dim, Dim3 { x: 4, y: 5, z: 6 });
}

#[test]
fn test_trailing_consumes_remainder() {
    let mut writer = WireWriter::new();
    writer.write_string("M1").write_trailing(&[0xde_u8, 0xad, 0xbe, 0xef]);
    let payload = writer.into_inner();

    let mut input = WireBuffer::new(&payload);
    input.read_string().unwrap();
    assert_eq!(input.read_trailing::<u8>().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    assert!(input.is_empty());
}

#[test]
fn test_trailing_may_be_empty() {
    let payload = b"M1\0";
    let mut input = WireBuffer::new(payload);
    input.read_string().unwrap();
    assert!(input.read_trailing::<u8>().unwrap().is_empty());
}

#[test]
fn test_trailing_rejects_partial_element() {
    let payload = [1u8, 0, 0, 0, 2, 0];
    let mut input = WireBuffer::new(&payload);
    assert_eq!(
        input.read_trailing::<u32>().unwrap_err(),
        WireError::RaggedTrailing {
            len: 6,
            elem_size: 4
        }
    );
}

#[test]
fn test_counted_array() {
    let mut writer = WireWriter::new();
    writer.write_counted(&[10u16, 20, 30]).write(&1i32);
    let payload = writer.into_inner();
    assert_eq!(payload.len(), 8 + 6 + 4);

    let mut input = WireBuffer::new(&payload);
    assert_eq!(input.read_counted::<u16>().unwrap(), vec![10, 20, 30]);
    assert_eq!(input.read::<i32>().unwrap(), 1);
    input.finish().unwrap();
}

#[test]
fn test_counted_array_longer_than_payload() {
    let mut writer = WireWriter::new();
    writer.write(&100u64).write_bytes(&[1, 2, 3]);
    let payload = writer.into_inner();

    let mut input = WireBuffer::new(&payload);
    assert!(matches!(
        input.read_counted::<u8>().unwrap_err(),
        WireError::Underrun { needed: 100, .. }
    ));
}

#[test]
fn test_counted_array_overflowing_count() {
    let mut writer = WireWriter::new();
    writer.write(&u64::MAX);
    let payload = writer.into_inner();

    let mut input = WireBuffer::new(&payload);
    assert_eq!(
        input.read_counted::<u32>().unwrap_err(),
        WireError::CountOverflow(u64::MAX)
    );
}

#[test]
fn test_finish_rejects_leftover_bytes() {
    let payload = [1u8, 2, 3, 4, 5];
    let mut input = WireBuffer::new(&payload);
    input.read::<u32>().unwrap();
    assert_eq!(
        input.finish().unwrap_err(),
        WireError::UnexpectedTrailing {
            offset: 4,
            remaining: 1
        }
    );
}
