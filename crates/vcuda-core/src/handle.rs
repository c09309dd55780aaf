use std::fmt;

/// A real runtime resource handle, such as the `void **` returned when a
/// fat binary is registered.
///
/// The value is opaque: it supports equality and hashing only. Converting to
/// and from the raw pointer value is reserved for the runtime adapter.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(u64);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(0);

    /// Wrap a raw pointer value obtained from the runtime.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw pointer value, for passing back into the runtime.
    pub const fn into_raw(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:#x})", self.0)
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
