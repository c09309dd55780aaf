use vcuda_core::CoreError;
use vcuda_protocol::{CudaStatus, RoutineId, WireError};

/// Failure of a single routine handler.
#[derive(Debug, thiserror::Error)]
pub enum RoutineError {
    #[error("malformed input: {0}")]
    Malformed(#[from] WireError),

    #[error("unknown handle: {0}")]
    UnknownHandle(String),

    #[error("duplicate handle: {0}")]
    DuplicateHandle(String),

    #[error("runtime returned {0}")]
    Native(CudaStatus),
}

impl RoutineError {
    /// Status reported to the caller for recoverable failures.
    /// `None` for protocol-level failures that end the session.
    pub fn status(&self) -> Option<CudaStatus> {
        match self {
            RoutineError::Malformed(_) => None,
            RoutineError::UnknownHandle(_) => Some(CudaStatus::INVALID_RESOURCE_HANDLE),
            RoutineError::DuplicateHandle(_) => Some(CudaStatus::INVALID_VALUE),
            RoutineError::Native(status) if status.is_success() => Some(CudaStatus::UNKNOWN),
            RoutineError::Native(status) => Some(*status),
        }
    }
}

impl From<CoreError> for RoutineError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnknownHandle(h) => RoutineError::UnknownHandle(h),
            CoreError::DuplicateHandle(h) => RoutineError::DuplicateHandle(h),
            CoreError::ConfigError(_) | CoreError::Io(_) => RoutineError::Native(CudaStatus::UNKNOWN),
        }
    }
}

impl From<CudaStatus> for RoutineError {
    fn from(status: CudaStatus) -> Self {
        RoutineError::Native(status)
    }
}

/// Protocol-level failures. The session cannot continue after one of these.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown routine id {0}")]
    UnknownRoutine(u32),

    #[error("malformed {routine} request: {source}")]
    Malformed {
        routine: RoutineId,
        #[source]
        source: WireError,
    },
}

impl DispatchError {
    /// Best-effort status to send before closing the session.
    pub fn status(&self) -> CudaStatus {
        match self {
            DispatchError::UnknownRoutine(_) => CudaStatus::NOT_SUPPORTED,
            DispatchError::Malformed { .. } => CudaStatus::INVALID_VALUE,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeLoadError {
    #[error("failed to load CUDA runtime library: {0}")]
    LibraryNotFound(String),

    #[error("failed to load {0}")]
    MissingSymbol(String),
}
