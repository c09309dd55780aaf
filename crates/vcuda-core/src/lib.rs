pub mod config;
pub mod error;
pub mod handle;
pub mod registry;

pub use error::CoreError;
pub use handle::NativeHandle;
pub use registry::Registry;
