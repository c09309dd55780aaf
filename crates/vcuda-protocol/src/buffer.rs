//! Cursor-based reader and writer for routine payloads.
//!
//! A payload is a flat byte sequence written by the guest stub in a fixed
//! field order. [`WireBuffer`] walks it forward once; [`WireWriter`] produces
//! response payloads in the same encoding.

use std::borrow::Cow;
use std::ffi::CStr;
use std::mem::size_of;

use bytemuck::Pod;

use crate::error::WireError;

/// Forward-only decoder over a borrowed payload.
///
/// Everything handed out by reference borrows the payload, not the cursor, so
/// views stay valid for as long as the caller keeps the payload around.
#[derive(Debug, Clone)]
pub struct WireBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current cursor offset from the start of the payload.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Check that every byte has been consumed.
    pub fn finish(&self) -> Result<(), WireError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(WireError::UnexpectedTrailing {
                offset: self.pos,
                remaining: self.remaining(),
            })
        }
    }

    /// Take the next `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if len > self.remaining() {
            return Err(WireError::Underrun {
                offset: self.pos,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Decode a fixed-size value (integer or small ABI struct) by copy.
    pub fn read<T: Pod>(&mut self) -> Result<T, WireError> {
        let bytes = self.read_bytes(size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Decode a fixed-size structure in place.
    ///
    /// Borrows straight out of the payload when the bytes are suitably aligned
    /// for `T`; otherwise falls back to a copy.
    pub fn read_struct<T: Pod>(&mut self) -> Result<Cow<'a, T>, WireError> {
        let bytes = self.read_bytes(size_of::<T>())?;
        Ok(match bytemuck::try_from_bytes::<T>(bytes) {
            Ok(view) => Cow::Borrowed(view),
            Err(_) => Cow::Owned(bytemuck::pod_read_unaligned(bytes)),
        })
    }

    /// Decode a NUL-terminated string without copying it.
    pub fn read_cstr(&mut self) -> Result<&'a CStr, WireError> {
        let start = self.pos;
        let rest = &self.data[start..];
        let s = CStr::from_bytes_until_nul(rest)
            .map_err(|_| WireError::UnterminatedString(start))?;
        self.pos += s.to_bytes_with_nul().len();
        Ok(s)
    }

    /// Decode a NUL-terminated UTF-8 string into an owned `String`.
    pub fn read_string(&mut self) -> Result<String, WireError> {
        let start = self.pos;
        let s = self.read_cstr()?;
        s.to_str()
            .map(str::to_owned)
            .map_err(|_| WireError::InvalidUtf8(start))
    }

    /// Decode every remaining byte as an array of `T`.
    ///
    /// The array length is implied by the payload length. An empty remainder
    /// yields an empty vector.
    pub fn read_trailing<T: Pod>(&mut self) -> Result<Vec<T>, WireError> {
        let elem_size = size_of::<T>();
        let len = self.remaining();
        if elem_size == 0 || len % elem_size != 0 {
            return Err(WireError::RaggedTrailing { len, elem_size });
        }
        let bytes = self.read_bytes(len)?;
        Ok(decode_elements(bytes, elem_size))
    }

    /// Decode a `u64` element count followed by that many `T`s.
    pub fn read_counted<T: Pod>(&mut self) -> Result<Vec<T>, WireError> {
        let count = self.read::<u64>()?;
        let len = usize::try_from(count)
            .ok()
            .and_then(|n| n.checked_mul(size_of::<T>()))
            .ok_or(WireError::CountOverflow(count))?;
        let bytes = self.read_bytes(len)?;
        Ok(decode_elements(bytes, size_of::<T>()))
    }
}

fn decode_elements<T: Pod>(bytes: &[u8], elem_size: usize) -> Vec<T> {
    if elem_size == 0 {
        return Vec::new();
    }
    bytes
        .chunks_exact(elem_size)
        .map(|chunk| bytemuck::pod_read_unaligned::<T>(chunk))
        .collect()
}

/// Append-only encoder mirroring [`WireBuffer`].
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    data: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write<T: Pod>(&mut self, value: &T) -> &mut Self {
        self.data.extend_from_slice(bytemuck::bytes_of(value));
        self
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Append `s` followed by a NUL terminator.
    ///
    /// Interior NULs are not rejected; the reader will stop at the first one.
    pub fn write_string(&mut self, s: &str) -> &mut Self {
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        self
    }

    /// Append elements with no length prefix. Only valid as the last field.
    pub fn write_trailing<T: Pod>(&mut self, items: &[T]) -> &mut Self {
        self.data.extend_from_slice(bytemuck::cast_slice(items));
        self
    }

    pub fn write_counted<T: Pod>(&mut self, items: &[T]) -> &mut Self {
        self.write(&(items.len() as u64));
        self.write_trailing(items)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}
