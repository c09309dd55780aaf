//! Integration test: request/response framing
//!
//! Covers header validation, the response flag and lz4 compression of
//! large payloads.

use vcuda_protocol::wire::{self, FrameError, FrameFlags, HEADER_SIZE, MAGIC, MAX_FRAME_SIZE};
use vcuda_protocol::{CudaStatus, Reply, RoutineId};

fn split(frame: &[u8]) -> ([u8; HEADER_SIZE], Vec<u8>) {
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&frame[..HEADER_SIZE]);
    (header, frame[HEADER_SIZE..].to_vec())
}

#[test]
fn test_request_frame_layout() {
    let frame = wire::encode_request(RoutineId::RegisterShared.as_u32(), b"M1\0").unwrap();
    assert_eq!(frame.len(), HEADER_SIZE + 3);
    assert_eq!(&frame[..2], &MAGIC);

    let (header, payload) = split(&frame);
    let header = wire::decode_header(&header).unwrap();
    assert!(!header.is_response());
    assert_eq!(header.code, 6);
    assert_eq!(header.length, 3);
    assert_eq!(wire::decode_payload(payload, header.flags).unwrap(), b"M1\0");
}

#[test]
fn test_response_carries_status() {
    let frame = wire::encode_response(&Reply::failure(CudaStatus::INVALID_RESOURCE_HANDLE)).unwrap();
    let (header, payload) = split(&frame);
    let header = wire::decode_header(&header).unwrap();
    assert!(header.is_response());
    assert_eq!(header.status(), CudaStatus::INVALID_RESOURCE_HANDLE);
    assert_eq!(header.length, 0);
    assert!(payload.is_empty());
}

#[test]
fn test_large_payload_is_compressed() {
    let bundle = vec![0xABu8; 64 * 1024];
    let frame = wire::encode_request(RoutineId::RegisterModule.as_u32(), &bundle).unwrap();
    assert!(frame.len() < bundle.len());

    let (header, payload) = split(&frame);
    let header = wire::decode_header(&header).unwrap();
    assert!(header.flags.contains(FrameFlags::COMPRESSED));
    assert_eq!(wire::decode_payload(payload, header.flags).unwrap(), bundle);
}

#[test]
fn test_failure_never_reports_success() {
    let reply = Reply::failure(CudaStatus::SUCCESS);
    assert_eq!(reply.status(), CudaStatus::UNKNOWN);
    assert!(reply.payload().is_empty());
}

#[test]
fn test_small_payload_is_not_compressed() {
    let frame = wire::encode_response(&Reply::success(vec![0u8; 64])).unwrap();
    let (header, _) = split(&frame);
    let header = wire::decode_header(&header).unwrap();
    assert!(!header.flags.contains(FrameFlags::COMPRESSED));
    assert_eq!(header.status(), CudaStatus::SUCCESS);
}

#[test]
fn test_bad_magic_rejected() {
    let mut header = [0u8; HEADER_SIZE];
    header[0] = b'R';
    header[1] = b'G';
    assert!(matches!(
        wire::decode_header(&header),
        Err(FrameError::InvalidMagic)
    ));
}

#[test]
fn test_unknown_flags_rejected() {
    let frame = wire::encode_request(1, b"").unwrap();
    let (mut header, _) = split(&frame);
    header[2] = 0x80;
    assert!(matches!(
        wire::decode_header(&header),
        Err(FrameError::UnknownFlags(0x80))
    ));
}

#[test]
fn test_oversized_length_rejected() {
    let frame = wire::encode_request(1, b"").unwrap();
    let (mut header, _) = split(&frame);
    header[7..11].copy_from_slice(&(MAX_FRAME_SIZE + 1).to_le_bytes());
    assert!(matches!(
        wire::decode_header(&header),
        Err(FrameError::FrameTooLarge(_))
    ));
}

#[test]
fn test_corrupt_compressed_payload() {
    let result = wire::decode_payload(vec![1, 2], FrameFlags::COMPRESSED);
    assert!(matches!(result, Err(FrameError::Decompression(_))));
}

#[test]
fn test_routine_ids() {
    assert_eq!(RoutineId::try_from(1u32), Ok(RoutineId::RegisterModule));
    assert_eq!(RoutineId::try_from(7u32), Ok(RoutineId::RegisterTexture));
    assert_eq!(RoutineId::try_from(0u32), Err(0));
    assert_eq!(RoutineId::try_from(8u32), Err(8));
    for (i, routine) in RoutineId::ALL.iter().enumerate() {
        assert_eq!(routine.as_u32(), i as u32 + 1);
    }
}
