pub mod cudart;
pub mod dispatch;
pub mod error;
pub mod routines;
pub mod runtime;
pub mod server;
pub mod session;

pub use dispatch::Dispatcher;
pub use runtime::NativeRuntime;
pub use server::VcudaServer;
pub use session::Session;
