use std::fmt;

/// A CUDA runtime status (`cudaError_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CudaStatus(pub i32);

impl CudaStatus {
    pub const SUCCESS: CudaStatus = CudaStatus(0);
    pub const INVALID_VALUE: CudaStatus = CudaStatus(1);
    pub const INITIALIZATION_ERROR: CudaStatus = CudaStatus(3);
    pub const INVALID_KERNEL_IMAGE: CudaStatus = CudaStatus(200);
    pub const INVALID_RESOURCE_HANDLE: CudaStatus = CudaStatus(400);
    pub const NOT_SUPPORTED: CudaStatus = CudaStatus(801);
    pub const UNKNOWN: CudaStatus = CudaStatus(999);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "cudaSuccess",
            1 => "cudaErrorInvalidValue",
            2 => "cudaErrorMemoryAllocation",
            3 => "cudaErrorInitializationError",
            13 => "cudaErrorInvalidSymbol",
            18 => "cudaErrorInvalidTexture",
            98 => "cudaErrorInvalidDeviceFunction",
            100 => "cudaErrorNoDevice",
            200 => "cudaErrorInvalidKernelImage",
            209 => "cudaErrorNoKernelImageForDevice",
            400 => "cudaErrorInvalidResourceHandle",
            500 => "cudaErrorSymbolNotFound",
            801 => "cudaErrorNotSupported",
            _ => "cudaErrorUnknown",
        }
    }
}

impl fmt::Display for CudaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// Outcome of one routine: a status and, on success only, a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    status: CudaStatus,
    payload: Vec<u8>,
}

impl Reply {
    pub fn success(payload: Vec<u8>) -> Self {
        Self {
            status: CudaStatus::SUCCESS,
            payload,
        }
    }

    /// A failed reply never carries a payload. A success code is reported
    /// as `cudaErrorUnknown`, since the caller would otherwise expect output.
    pub fn failure(status: CudaStatus) -> Self {
        let status = if status.is_success() {
            CudaStatus::UNKNOWN
        } else {
            status
        };
        Self {
            status,
            payload: Vec::new(),
        }
    }

    pub fn status(&self) -> CudaStatus {
        self.status
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_parts(self) -> (CudaStatus, Vec<u8>) {
        (self.status, self.payload)
    }
}
