//! Dynamic loading of the real CUDA runtime's registration entry points.
//!
//! Uses `libloading` to load `libcudart` and resolves the hidden
//! `__cudaRegister*` functions that compiler-generated module constructors
//! normally call. The runtime keeps the pointers it is given, so every string,
//! image and descriptor handed over is pinned until its module is unregistered.

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CString};
use std::sync::Arc;

use libloading::{Library, Symbol};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use vcuda_core::registry::{FunctionBinding, SharedLayout, TextureBinding, VariableBinding};
use vcuda_core::NativeHandle;
use vcuda_protocol::abi::{Dim3, TextureReference, Uint3};
use vcuda_protocol::CudaStatus;

use crate::error::RuntimeLoadError;
use crate::runtime::NativeRuntime;

/// `void **` returned by `__cudaRegisterFatBinary`.
type FatCubinHandle = *mut *mut c_void;

type FnRegisterFatBinary = unsafe extern "C" fn(fat_cubin: *mut c_void) -> FatCubinHandle;
type FnUnregisterFatBinary = unsafe extern "C" fn(handle: FatCubinHandle);
type FnRegisterFunction = unsafe extern "C" fn(
    handle: FatCubinHandle,
    host_fun: *const c_char,
    device_fun: *mut c_char,
    device_name: *const c_char,
    thread_limit: c_int,
    tid: *mut Uint3,
    bid: *mut Uint3,
    b_dim: *mut Dim3,
    g_dim: *mut Dim3,
    w_size: *mut c_int,
);
type FnRegisterVar = unsafe extern "C" fn(
    handle: FatCubinHandle,
    host_var: *mut c_char,
    device_address: *mut c_char,
    device_name: *const c_char,
    ext: c_int,
    size: usize,
    constant: c_int,
    global: c_int,
);
type FnRegisterSharedVar = unsafe extern "C" fn(
    handle: FatCubinHandle,
    device_ptr: *mut *mut c_void,
    size: usize,
    alignment: usize,
    storage: c_int,
);
type FnRegisterShared = unsafe extern "C" fn(handle: FatCubinHandle, device_ptr: *mut *mut c_void);
type FnRegisterTexture = unsafe extern "C" fn(
    handle: FatCubinHandle,
    host_var: *const TextureReference,
    device_address: *mut *const c_void,
    device_name: *const c_char,
    dim: c_int,
    norm: c_int,
    ext: c_int,
);

const FATBINC_MAGIC: c_int = 0x466243b1;
const FATBINC_VERSION: c_int = 1;

/// `__fatBinC_Wrapper_t`
#[repr(C)]
#[allow(dead_code)]
struct FatBinaryWrapper {
    magic: c_int,
    version: c_int,
    data: *const u64,
    filename_or_fatbins: *mut c_void,
}

/// Memory the runtime holds pointers into while a module is registered.
/// Fields are never read back; they only keep the allocations alive.
#[derive(Default)]
#[allow(dead_code)]
struct PinnedModule {
    wrapper: Option<Box<FatBinaryWrapper>>,
    /// Bundle bytes, 8-byte aligned as the fat binary header requires.
    image: Vec<u64>,
    strings: Vec<CString>,
    textures: Vec<Box<TextureReference>>,
    addresses: Vec<Box<[u8]>>,
}

// SAFETY: the raw pointers only point into allocations owned by this struct.
// Mutation goes through the runtime's module mutex; the runtime itself only
// reads the pinned memory.
unsafe impl Send for PinnedModule {}

impl PinnedModule {
    fn pin_str(&mut self, s: &str) -> Result<*const c_char, CudaStatus> {
        let c_str = CString::new(s).map_err(|_| CudaStatus::INVALID_VALUE)?;
        let ptr = c_str.as_ptr();
        self.strings.push(c_str);
        Ok(ptr)
    }
}

/// Dynamically loaded CUDA runtime with the registration entry points.
pub struct CudartRuntime {
    _lib: Library,
    register_fat_binary: FnRegisterFatBinary,
    unregister_fat_binary: FnUnregisterFatBinary,
    register_function: FnRegisterFunction,
    register_var: Option<FnRegisterVar>,
    register_shared_var: Option<FnRegisterSharedVar>,
    register_shared: Option<FnRegisterShared>,
    register_texture: Option<FnRegisterTexture>,
    modules: Mutex<HashMap<NativeHandle, PinnedModule>>,
}

impl CudartRuntime {
    /// Load the CUDA runtime, from `library_path` if given, otherwise from
    /// the platform's default library names.
    pub fn load(library_path: Option<&str>) -> Result<Arc<Self>, RuntimeLoadError> {
        let lib = Self::load_library(library_path)?;

        unsafe {
            let runtime = Self {
                register_fat_binary: Self::load_fn(&lib, "__cudaRegisterFatBinary")?,
                unregister_fat_binary: Self::load_fn(&lib, "__cudaUnregisterFatBinary")?,
                register_function: Self::load_fn(&lib, "__cudaRegisterFunction")?,
                register_var: Self::load_fn_opt(&lib, "__cudaRegisterVar"),
                register_shared_var: Self::load_fn_opt(&lib, "__cudaRegisterSharedVar"),
                register_shared: Self::load_fn_opt(&lib, "__cudaRegisterShared"),
                // Removed from the runtime in CUDA 12.
                register_texture: Self::load_fn_opt(&lib, "__cudaRegisterTexture"),
                modules: Mutex::new(HashMap::new()),
                _lib: lib,
            };
            if runtime.register_texture.is_none() {
                warn!("__cudaRegisterTexture not exported, RegisterTexture will report cudaErrorNotSupported");
            }
            Ok(Arc::new(runtime))
        }
    }

    fn load_library(library_path: Option<&str>) -> Result<Library, RuntimeLoadError> {
        let defaults = vcuda_common::platform::runtime_library_names();
        let candidates: Vec<&str> = match library_path {
            Some(path) => vec![path],
            None => defaults.to_vec(),
        };

        let mut last_err = String::from("no candidate library names for this platform");
        for name in candidates {
            match unsafe { Library::new(name) } {
                Ok(lib) => {
                    info!("loaded CUDA runtime from: {}", name);
                    return Ok(lib);
                }
                Err(e) => {
                    last_err = format!("{}: {}", name, e);
                    debug!("failed to load {}: {}", name, e);
                }
            }
        }

        Err(RuntimeLoadError::LibraryNotFound(last_err))
    }

    unsafe fn load_fn<F: Copy>(lib: &Library, name: &str) -> Result<F, RuntimeLoadError> {
        let sym: Symbol<F> = unsafe { lib.get(name.as_bytes()) }
            .map_err(|e| RuntimeLoadError::MissingSymbol(format!("{}: {}", name, e)))?;
        Ok(*sym)
    }

    unsafe fn load_fn_opt<F: Copy>(lib: &Library, name: &str) -> Option<F> {
        unsafe { lib.get(name.as_bytes()) }.ok().map(|s: Symbol<F>| *s)
    }

    fn fat_handle(module: NativeHandle) -> FatCubinHandle {
        module.into_raw() as usize as FatCubinHandle
    }

    /// Pin whatever `f` hands the runtime into the module's keep-alive set.
    ///
    /// The module table is locked only while pinning; callers make the native
    /// call after this returns. Pinned allocations never move and are only
    /// freed by `unregister_module`, which the owning session serialises with
    /// its own registrations.
    fn pin<R>(
        &self,
        module: NativeHandle,
        f: impl FnOnce(&mut PinnedModule) -> Result<R, CudaStatus>,
    ) -> Result<R, CudaStatus> {
        let mut modules = self.modules.lock();
        let pinned = modules
            .get_mut(&module)
            .ok_or(CudaStatus::INVALID_RESOURCE_HANDLE)?;
        f(pinned)
    }
}

impl NativeRuntime for CudartRuntime {
    fn register_module(&self, bundle: &[u8]) -> Result<NativeHandle, CudaStatus> {
        if bundle.is_empty() {
            return Err(CudaStatus::INVALID_KERNEL_IMAGE);
        }

        let mut image = vec![0u64; bundle.len().div_ceil(8)];
        bytemuck::cast_slice_mut::<u64, u8>(&mut image)[..bundle.len()].copy_from_slice(bundle);

        let mut pinned = PinnedModule {
            image,
            ..PinnedModule::default()
        };
        let mut wrapper = Box::new(FatBinaryWrapper {
            magic: FATBINC_MAGIC,
            version: FATBINC_VERSION,
            data: pinned.image.as_ptr(),
            filename_or_fatbins: std::ptr::null_mut(),
        });

        let handle = unsafe {
            (self.register_fat_binary)(&mut *wrapper as *mut FatBinaryWrapper as *mut c_void)
        };
        pinned.wrapper = Some(wrapper);

        if handle.is_null() {
            return Err(CudaStatus::INVALID_KERNEL_IMAGE);
        }
        let native = NativeHandle::from_raw(handle as usize as u64);
        self.modules.lock().insert(native, pinned);
        Ok(native)
    }

    fn unregister_module(&self, module: NativeHandle) -> Result<(), CudaStatus> {
        if !self.modules.lock().contains_key(&module) {
            return Err(CudaStatus::INVALID_RESOURCE_HANDLE);
        }
        unsafe { (self.unregister_fat_binary)(Self::fat_handle(module)) };
        // Only drop pinned memory once the runtime has let go of it.
        self.modules.lock().remove(&module);
        Ok(())
    }

    fn register_function(
        &self,
        module: NativeHandle,
        function: &mut FunctionBinding,
    ) -> Result<(), CudaStatus> {
        let (host_fun, device_fun, device_name) = self.pin(module, |pinned| {
            Ok((
                pinned.pin_str(&function.host_symbol)?,
                pinned.pin_str(&function.device_function)?,
                pinned.pin_str(&function.device_name)?,
            ))
        })?;
        let launch = &mut function.launch;
        unsafe {
            (self.register_function)(
                Self::fat_handle(module),
                host_fun,
                device_fun as *mut c_char,
                device_name,
                launch.thread_limit,
                &mut launch.tid,
                &mut launch.bid,
                &mut launch.block_dim,
                &mut launch.grid_dim,
                &mut launch.word_size,
            )
        };
        Ok(())
    }

    fn register_variable(
        &self,
        module: NativeHandle,
        variable: &VariableBinding,
    ) -> Result<(), CudaStatus> {
        let func = self.register_var.ok_or(CudaStatus::NOT_SUPPORTED)?;
        let size = usize::try_from(variable.size).map_err(|_| CudaStatus::INVALID_VALUE)?;
        let (host_var, device_address, device_name) = self.pin(module, |pinned| {
            Ok((
                pinned.pin_str(&variable.host_variable)?,
                pinned.pin_str(&variable.device_address)?,
                pinned.pin_str(&variable.device_name)?,
            ))
        })?;
        unsafe {
            func(
                Self::fat_handle(module),
                host_var as *mut c_char,
                device_address as *mut c_char,
                device_name,
                variable.is_extern as c_int,
                size,
                variable.is_constant as c_int,
                variable.is_global as c_int,
            )
        };
        Ok(())
    }

    fn register_shared_variable(
        &self,
        module: NativeHandle,
        device_pointer: &str,
        layout: &SharedLayout,
    ) -> Result<(), CudaStatus> {
        let func = self.register_shared_var.ok_or(CudaStatus::NOT_SUPPORTED)?;
        let size = usize::try_from(layout.size).map_err(|_| CudaStatus::INVALID_VALUE)?;
        let alignment = usize::try_from(layout.alignment).map_err(|_| CudaStatus::INVALID_VALUE)?;
        let ptr = self.pin(module, |pinned| pinned.pin_str(device_pointer))?;
        unsafe {
            func(
                Self::fat_handle(module),
                ptr as *mut *mut c_void,
                size,
                alignment,
                layout.storage,
            )
        };
        Ok(())
    }

    fn register_shared(&self, module: NativeHandle, device_pointer: &str) -> Result<(), CudaStatus> {
        let func = self.register_shared.ok_or(CudaStatus::NOT_SUPPORTED)?;
        let ptr = self.pin(module, |pinned| pinned.pin_str(device_pointer))?;
        unsafe { func(Self::fat_handle(module), ptr as *mut *mut c_void) };
        Ok(())
    }

    fn register_texture(
        &self,
        module: NativeHandle,
        texture: &TextureBinding,
    ) -> Result<(), CudaStatus> {
        let func = self.register_texture.ok_or(CudaStatus::NOT_SUPPORTED)?;
        let (descriptor_ptr, address_ptr, device_name) = self.pin(module, |pinned| {
            let descriptor = Box::new(texture.descriptor);
            let descriptor_ptr: *const TextureReference = &*descriptor;
            pinned.textures.push(descriptor);

            let address: Box<[u8]> = texture.device_address.clone().into_boxed_slice();
            let address_ptr = if address.is_empty() {
                std::ptr::null_mut()
            } else {
                address.as_ptr() as *mut *const c_void
            };
            pinned.addresses.push(address);

            Ok((descriptor_ptr, address_ptr, pinned.pin_str(&texture.device_name)?))
        })?;
        unsafe {
            func(
                Self::fat_handle(module),
                descriptor_ptr,
                address_ptr,
                device_name,
                texture.dim,
                texture.norm,
                texture.ext,
            )
        };
        Ok(())
    }
}
