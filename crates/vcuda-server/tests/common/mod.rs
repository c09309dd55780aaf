//! Shared fixtures for the server integration tests: a recording fake of the
//! native runtime and builders for request payloads.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use vcuda_core::registry::{FunctionBinding, SharedLayout, TextureBinding, VariableBinding};
use vcuda_core::NativeHandle;
use vcuda_protocol::abi::{Dim3, TextureReference, Uint3};
use vcuda_protocol::{CudaStatus, WireWriter};
use vcuda_server::NativeRuntime;

/// First handle the fake hands out; later modules step by 0x1000.
pub const FIRST_HANDLE: u64 = 0xA000;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    RegisterModule(Vec<u8>),
    UnregisterModule(NativeHandle),
    RegisterFunction(NativeHandle, String),
    RegisterVariable(NativeHandle, String),
    RegisterSharedVariable(NativeHandle, String, SharedLayout),
    RegisterShared(NativeHandle, String),
    RegisterTexture(NativeHandle, String),
}

/// In-memory runtime that records every call it receives.
pub struct FakeRuntime {
    next_handle: AtomicU64,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<&'static str, CudaStatus>>,
    normalize_dims: bool,
    /// When nonzero, `register_module` waits until this many calls are in
    /// flight at once, failing with `cudaErrorUnknown` after 2s.
    rendezvous: usize,
    arrivals: Mutex<usize>,
    arrived: Condvar,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(FIRST_HANDLE),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            normalize_dims: false,
            rendezvous: 0,
            arrivals: Mutex::new(0),
            arrived: Condvar::new(),
        }
    }

    /// A runtime whose `register_module` only returns once `parties` calls
    /// are inside it together.
    pub fn rendezvous(parties: usize) -> Self {
        Self {
            rendezvous: parties,
            ..Self::new()
        }
    }

    /// A runtime that rewrites zero launch dimensions to 1, as a real one may.
    pub fn normalizing() -> Self {
        Self {
            normalize_dims: true,
            ..Self::new()
        }
    }

    /// Make every later call to `entry` fail with `status`.
    pub fn fail(&self, entry: &'static str, status: CudaStatus) {
        self.failures.lock().insert(entry, status);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn check(&self, entry: &'static str) -> Result<(), CudaStatus> {
        match self.failures.lock().get(entry) {
            Some(status) => Err(*status),
            None => Ok(()),
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn meet(&self) -> Result<(), CudaStatus> {
        if self.rendezvous == 0 {
            return Ok(());
        }
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut arrivals = self.arrivals.lock();
        *arrivals += 1;
        self.arrived.notify_all();
        while *arrivals < self.rendezvous {
            if self.arrived.wait_until(&mut arrivals, deadline).timed_out() {
                return Err(CudaStatus::UNKNOWN);
            }
        }
        Ok(())
    }
}

fn normalize(dim: &mut Dim3) {
    for component in [&mut dim.x, &mut dim.y, &mut dim.z] {
        if *component == 0 {
            *component = 1;
        }
    }
}

impl NativeRuntime for FakeRuntime {
    fn register_module(&self, bundle: &[u8]) -> Result<NativeHandle, CudaStatus> {
        self.record(Call::RegisterModule(bundle.to_vec()));
        self.check("register_module")?;
        self.meet()?;
        let raw = self.next_handle.fetch_add(0x1000, Ordering::Relaxed);
        Ok(NativeHandle::from_raw(raw))
    }

    fn unregister_module(&self, module: NativeHandle) -> Result<(), CudaStatus> {
        self.record(Call::UnregisterModule(module));
        self.check("unregister_module")
    }

    fn register_function(
        &self,
        module: NativeHandle,
        function: &mut FunctionBinding,
    ) -> Result<(), CudaStatus> {
        self.record(Call::RegisterFunction(module, function.host_symbol.clone()));
        self.check("register_function")?;
        if self.normalize_dims {
            normalize(&mut function.launch.block_dim);
            normalize(&mut function.launch.grid_dim);
        }
        Ok(())
    }

    fn register_variable(
        &self,
        module: NativeHandle,
        variable: &VariableBinding,
    ) -> Result<(), CudaStatus> {
        self.record(Call::RegisterVariable(module, variable.host_variable.clone()));
        self.check("register_variable")
    }

    fn register_shared_variable(
        &self,
        module: NativeHandle,
        device_pointer: &str,
        layout: &SharedLayout,
    ) -> Result<(), CudaStatus> {
        self.record(Call::RegisterSharedVariable(
            module,
            device_pointer.to_string(),
            *layout,
        ));
        self.check("register_shared_variable")
    }

    fn register_shared(&self, module: NativeHandle, device_pointer: &str) -> Result<(), CudaStatus> {
        self.record(Call::RegisterShared(module, device_pointer.to_string()));
        self.check("register_shared")
    }

    fn register_texture(
        &self,
        module: NativeHandle,
        texture: &TextureBinding,
    ) -> Result<(), CudaStatus> {
        self.record(Call::RegisterTexture(module, texture.texture.clone()));
        self.check("register_texture")
    }
}

// ── Request builders ──────────────────────────────────────────────

pub fn register_module(handle: &str, bundle: &[u8]) -> Vec<u8> {
    let mut w = WireWriter::new();
    w.write_string(handle).write_trailing(bundle);
    w.into_inner()
}

pub fn unregister_module(handle: &str) -> Vec<u8> {
    let mut w = WireWriter::new();
    w.write_string(handle);
    w.into_inner()
}

pub struct FunctionRequest<'a> {
    pub module: &'a str,
    pub host: &'a str,
    pub device: &'a str,
    pub thread_limit: i32,
    pub block_dim: Dim3,
    pub grid_dim: Dim3,
}

impl<'a> FunctionRequest<'a> {
    pub fn new(module: &'a str, host: &'a str, device: &'a str) -> Self {
        Self {
            module,
            host,
            device,
            thread_limit: 256,
            block_dim: Dim3::new(1, 1, 1),
            grid_dim: Dim3::new(1, 1, 1),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.write_string(self.module)
            .write_string(self.host)
            .write_string(self.device)
            .write_string(self.device)
            .write(&self.thread_limit)
            .write(&Uint3::new(0, 0, 0))
            .write(&Uint3::new(0, 0, 0))
            .write(&self.block_dim)
            .write(&self.grid_dim)
            .write(&4i32);
        w.into_inner()
    }
}

pub fn register_variable(module: &str, host: &str, size: i32) -> Vec<u8> {
    let mut w = WireWriter::new();
    w.write_string(module)
        .write_string(host)
        .write_string(host)
        .write_string(host)
        .write(&0i32)
        .write(&size)
        .write(&1i32)
        .write(&0i32);
    w.into_inner()
}

pub fn register_shared_variable(module: &str, pointer: &str, size: u64, alignment: u64) -> Vec<u8> {
    let mut w = WireWriter::new();
    w.write_string(module)
        .write_string(pointer)
        .write(&size)
        .write(&alignment)
        .write(&0i32);
    w.into_inner()
}

pub fn register_shared(module: &str, pointer: &str) -> Vec<u8> {
    let mut w = WireWriter::new();
    w.write_string(module).write_string(pointer);
    w.into_inner()
}

pub fn register_texture(module: &str, texture: &str, device_address: &[u8]) -> Vec<u8> {
    let mut w = WireWriter::new();
    w.write_string(module)
        .write_string(texture)
        .write(&TextureReference::default())
        .write_counted(device_address)
        .write_string(texture)
        .write(&2i32)
        .write(&0i32)
        .write(&0i32);
    w.into_inner()
}
