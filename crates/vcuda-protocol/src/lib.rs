pub mod abi;
pub mod buffer;
pub mod error;
pub mod routine;
pub mod status;
pub mod wire;

pub use buffer::{WireBuffer, WireWriter};
pub use error::WireError;
pub use routine::RoutineId;
pub use status::{CudaStatus, Reply};
