//! Boundary to the real CUDA runtime's registration primitives.

use vcuda_core::registry::{FunctionBinding, SharedLayout, TextureBinding, VariableBinding};
use vcuda_core::NativeHandle;
use vcuda_protocol::CudaStatus;

/// The registration entry points routine handlers call.
///
/// Implementations are authoritative: a non-success status is passed back to
/// the caller unchanged. Handlers only call in with a module handle that the
/// same runtime returned from [`NativeRuntime::register_module`].
pub trait NativeRuntime: Send + Sync {
    /// Bind a device-code bundle and return the runtime's module handle.
    fn register_module(&self, bundle: &[u8]) -> Result<NativeHandle, CudaStatus>;

    /// Release a module and everything the runtime registered under it.
    fn unregister_module(&self, module: NativeHandle) -> Result<(), CudaStatus>;

    /// Bind a device function. The runtime may adjust `function.launch` in place.
    fn register_function(
        &self,
        module: NativeHandle,
        function: &mut FunctionBinding,
    ) -> Result<(), CudaStatus>;

    fn register_variable(
        &self,
        module: NativeHandle,
        variable: &VariableBinding,
    ) -> Result<(), CudaStatus>;

    fn register_shared_variable(
        &self,
        module: NativeHandle,
        device_pointer: &str,
        layout: &SharedLayout,
    ) -> Result<(), CudaStatus>;

    fn register_shared(&self, module: NativeHandle, device_pointer: &str)
        -> Result<(), CudaStatus>;

    fn register_texture(
        &self,
        module: NativeHandle,
        texture: &TextureBinding,
    ) -> Result<(), CudaStatus>;
}

/// Stand-in used when no CUDA runtime could be loaded. Every call reports
/// `cudaErrorInitializationError`, so clients see the same failure they
/// would on a machine without a GPU.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableRuntime;

impl NativeRuntime for UnavailableRuntime {
    fn register_module(&self, _bundle: &[u8]) -> Result<NativeHandle, CudaStatus> {
        Err(CudaStatus::INITIALIZATION_ERROR)
    }

    fn unregister_module(&self, _module: NativeHandle) -> Result<(), CudaStatus> {
        Err(CudaStatus::INITIALIZATION_ERROR)
    }

    fn register_function(
        &self,
        _module: NativeHandle,
        _function: &mut FunctionBinding,
    ) -> Result<(), CudaStatus> {
        Err(CudaStatus::INITIALIZATION_ERROR)
    }

    fn register_variable(
        &self,
        _module: NativeHandle,
        _variable: &VariableBinding,
    ) -> Result<(), CudaStatus> {
        Err(CudaStatus::INITIALIZATION_ERROR)
    }

    fn register_shared_variable(
        &self,
        _module: NativeHandle,
        _device_pointer: &str,
        _layout: &SharedLayout,
    ) -> Result<(), CudaStatus> {
        Err(CudaStatus::INITIALIZATION_ERROR)
    }

    fn register_shared(
        &self,
        _module: NativeHandle,
        _device_pointer: &str,
    ) -> Result<(), CudaStatus> {
        Err(CudaStatus::INITIALIZATION_ERROR)
    }

    fn register_texture(
        &self,
        _module: NativeHandle,
        _texture: &TextureBinding,
    ) -> Result<(), CudaStatus> {
        Err(CudaStatus::INITIALIZATION_ERROR)
    }
}
