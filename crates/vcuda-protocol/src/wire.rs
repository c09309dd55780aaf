//! Request/response framing used by the backend transport.

use std::borrow::Cow;

use crate::status::{CudaStatus, Reply};

/// Wire protocol magic bytes: "VC"
pub const MAGIC: [u8; 2] = [0x56, 0x43];

/// Maximum frame payload size: 256 MB
pub const MAX_FRAME_SIZE: u32 = 256 * 1024 * 1024;

/// Frame header size in bytes: magic(2) + flags(1) + code(4) + length(4) = 11
pub const HEADER_SIZE: usize = 11;

/// Minimum payload size to attempt LZ4 compression (bytes).
/// Payloads smaller than this are sent uncompressed to avoid overhead.
const COMPRESSION_THRESHOLD: usize = 512;

bitflags::bitflags! {
    /// Frame flags byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u8 {
        const COMPRESSED = 0b0000_0001;
        const RESPONSE   = 0b0000_0100;
    }
}

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: FrameFlags,
    /// Routine id on requests, status code on responses.
    pub code: u32,
    pub length: u32,
}

impl FrameHeader {
    pub fn is_response(&self) -> bool {
        self.flags.contains(FrameFlags::RESPONSE)
    }

    /// The status carried by a response header.
    pub fn status(&self) -> CudaStatus {
        CudaStatus(self.code as i32)
    }
}

/// Encode a request frame for `routine` carrying `payload`.
pub fn encode_request(routine: u32, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    encode_frame(FrameFlags::empty(), routine, payload)
}

/// Encode the response frame for a routine reply.
pub fn encode_response(reply: &Reply) -> Result<Vec<u8>, FrameError> {
    encode_frame(
        FrameFlags::RESPONSE,
        reply.status().code() as u32,
        reply.payload(),
    )
}

fn encode_frame(flags: FrameFlags, code: u32, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    // Attempt LZ4 compression for payloads above threshold
    let (final_payload, compression_flag) = if payload.len() > COMPRESSION_THRESHOLD {
        let compressed = lz4_flex::compress_prepend_size(payload);
        if compressed.len() < payload.len() {
            (Cow::Owned(compressed), FrameFlags::COMPRESSED)
        } else {
            (Cow::Borrowed(payload), FrameFlags::empty())
        }
    } else {
        (Cow::Borrowed(payload), FrameFlags::empty())
    };

    let payload_len = u32::try_from(final_payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .ok_or(FrameError::FrameTooLarge(final_payload.len() as u64))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + final_payload.len());
    frame.extend_from_slice(&MAGIC);
    frame.push((flags | compression_flag).bits());
    frame.extend_from_slice(&code.to_le_bytes());
    frame.extend_from_slice(&payload_len.to_le_bytes());
    frame.extend_from_slice(&final_payload);

    Ok(frame)
}

/// Decode a frame header.
pub fn decode_header(header: &[u8; HEADER_SIZE]) -> Result<FrameHeader, FrameError> {
    if header[0] != MAGIC[0] || header[1] != MAGIC[1] {
        return Err(FrameError::InvalidMagic);
    }

    let flags = FrameFlags::from_bits(header[2]).ok_or(FrameError::UnknownFlags(header[2]))?;
    let code = u32::from_le_bytes([header[3], header[4], header[5], header[6]]);
    let length = u32::from_le_bytes([header[7], header[8], header[9], header[10]]);

    if length > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge(length as u64));
    }

    Ok(FrameHeader {
        flags,
        code,
        length,
    })
}

/// Recover the routine payload, decompressing if the COMPRESSED flag is set.
pub fn decode_payload(payload: Vec<u8>, flags: FrameFlags) -> Result<Vec<u8>, FrameError> {
    if !flags.contains(FrameFlags::COMPRESSED) {
        return Ok(payload);
    }
    let declared = payload
        .get(..4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| FrameError::Decompression("missing size prefix".to_string()))?;
    if declared > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge(declared as u64));
    }
    lz4_flex::decompress_size_prepended(&payload)
        .map_err(|e| FrameError::Decompression(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid magic bytes")]
    InvalidMagic,
    #[error("unknown frame flags: {0:#04x}")]
    UnknownFlags(u8),
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u64),
    #[error("decompression error: {0}")]
    Decompression(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
