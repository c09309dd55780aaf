//! Routine handlers: one decoder/executor per virtualized registration call.
//!
//! Every handler decodes its fields in wire order, resolves the module handle
//! through the session registry before touching the runtime, calls the
//! runtime, then records the new binding.

use tracing::{debug, info};

use vcuda_core::registry::{
    FunctionBinding, LaunchBounds, SharedBinding, SharedLayout, TextureBinding, VariableBinding,
};
use vcuda_core::Registry;
use vcuda_protocol::abi::{Dim3, TextureReference, Uint3};
use vcuda_protocol::{WireBuffer, WireWriter};

use crate::error::RoutineError;
use crate::runtime::NativeRuntime;

/// What a handler gets to work with for one request.
pub struct RoutineContext<'a> {
    pub session_id: u32,
    pub registry: &'a mut Registry,
    pub runtime: &'a dyn NativeRuntime,
}

/// Handler signature. `Ok` carries the response payload.
pub type RoutineFn =
    fn(&mut RoutineContext<'_>, &mut WireBuffer<'_>) -> Result<Vec<u8>, RoutineError>;

pub fn register_module(
    ctx: &mut RoutineContext<'_>,
    input: &mut WireBuffer<'_>,
) -> Result<Vec<u8>, RoutineError> {
    let handle = input.read_string()?;
    let bundle = input.read_trailing::<u8>()?;

    if ctx.registry.contains_module(&handle) {
        return Err(RoutineError::DuplicateHandle(handle));
    }

    let native = ctx.runtime.register_module(&bundle)?;
    ctx.registry.register_module(handle.clone(), native)?;

    info!(
        session_id = ctx.session_id,
        module = %handle,
        %native,
        bundle_len = bundle.len(),
        "RegisterModule"
    );
    Ok(Vec::new())
}

pub fn unregister_module(
    ctx: &mut RoutineContext<'_>,
    input: &mut WireBuffer<'_>,
) -> Result<Vec<u8>, RoutineError> {
    let handle = input.read_string()?;
    input.finish()?;

    release_module(ctx, &handle)?;
    Ok(Vec::new())
}

/// Unbind a module in the runtime, then drop it and its dependents from the
/// registry. If the runtime refuses, the registry entry is kept so the caller
/// can retry.
pub fn release_module(ctx: &mut RoutineContext<'_>, handle: &str) -> Result<(), RoutineError> {
    let native = ctx.registry.lookup_module(handle)?;
    ctx.runtime.unregister_module(native)?;
    let removed = ctx.registry.unregister_module(handle)?;

    info!(
        session_id = ctx.session_id,
        module = %handle,
        %native,
        cascaded = removed.dependents().total(),
        "UnregisterModule"
    );
    Ok(())
}

pub fn register_function(
    ctx: &mut RoutineContext<'_>,
    input: &mut WireBuffer<'_>,
) -> Result<Vec<u8>, RoutineError> {
    let module = input.read_string()?;
    let host_symbol = input.read_string()?;
    let device_function = input.read_string()?;
    let device_name = input.read_string()?;
    let thread_limit = input.read::<i32>()?;
    let tid = input.read::<Uint3>()?;
    let bid = input.read::<Uint3>()?;
    let block_dim = input.read::<Dim3>()?;
    let grid_dim = input.read::<Dim3>()?;
    let word_size = input.read::<i32>()?;
    input.finish()?;

    let native = ctx.registry.lookup_module(&module)?;
    let mut binding = FunctionBinding {
        module,
        host_symbol,
        device_function,
        device_name,
        launch: LaunchBounds {
            thread_limit,
            tid,
            bid,
            block_dim,
            grid_dim,
            word_size,
        },
    };
    ctx.runtime.register_function(native, &mut binding)?;

    // Echo what the runtime left in the launch structures.
    let launch = &binding.launch;
    let mut out = WireWriter::new();
    out.write_string(&binding.device_function)
        .write(&launch.tid)
        .write(&launch.bid)
        .write(&launch.block_dim)
        .write(&launch.grid_dim)
        .write(&launch.word_size);

    debug!(
        session_id = ctx.session_id,
        module = %binding.module,
        host = %binding.host_symbol,
        device = %binding.device_function,
        "RegisterFunction"
    );
    if let Some(prev) = ctx.registry.register_function(binding)? {
        debug!(
            session_id = ctx.session_id,
            host = %prev.host_symbol,
            previous = %prev.device_function,
            "host symbol re-registered"
        );
    }
    Ok(out.into_inner())
}

pub fn register_variable(
    ctx: &mut RoutineContext<'_>,
    input: &mut WireBuffer<'_>,
) -> Result<Vec<u8>, RoutineError> {
    let module = input.read_string()?;
    let host_variable = input.read_string()?;
    let device_address = input.read_string()?;
    let device_name = input.read_string()?;
    let ext = input.read::<i32>()?;
    let size = input.read::<i32>()?;
    let constant = input.read::<i32>()?;
    let global = input.read::<i32>()?;
    input.finish()?;

    let native = ctx.registry.lookup_module(&module)?;
    let binding = VariableBinding {
        module,
        host_variable,
        device_address,
        device_name,
        size,
        is_extern: ext != 0,
        is_constant: constant != 0,
        is_global: global != 0,
    };
    ctx.runtime.register_variable(native, &binding)?;

    debug!(
        session_id = ctx.session_id,
        host = %binding.host_variable,
        device = %binding.device_address,
        size,
        "RegisterVariable"
    );
    ctx.registry.register_variable(binding)?;
    Ok(Vec::new())
}

pub fn register_shared_variable(
    ctx: &mut RoutineContext<'_>,
    input: &mut WireBuffer<'_>,
) -> Result<Vec<u8>, RoutineError> {
    let module = input.read_string()?;
    let device_pointer = input.read_string()?;
    let size = input.read::<u64>()?;
    let alignment = input.read::<u64>()?;
    let storage = input.read::<i32>()?;
    input.finish()?;

    let native = ctx.registry.lookup_module(&module)?;
    let layout = SharedLayout {
        size,
        alignment,
        storage,
    };
    ctx.runtime
        .register_shared_variable(native, &device_pointer, &layout)?;

    debug!(
        session_id = ctx.session_id,
        pointer = %device_pointer,
        size,
        alignment,
        "RegisterSharedVariable"
    );
    ctx.registry.register_shared(SharedBinding {
        module,
        device_pointer,
        layout: Some(layout),
    })?;
    Ok(Vec::new())
}

pub fn register_shared(
    ctx: &mut RoutineContext<'_>,
    input: &mut WireBuffer<'_>,
) -> Result<Vec<u8>, RoutineError> {
    let module = input.read_string()?;
    let device_pointer = input.read_string()?;
    input.finish()?;

    let native = ctx.registry.lookup_module(&module)?;
    ctx.runtime.register_shared(native, &device_pointer)?;

    debug!(session_id = ctx.session_id, pointer = %device_pointer, "RegisterShared");
    ctx.registry.register_shared(SharedBinding {
        module,
        device_pointer,
        layout: None,
    })?;
    Ok(Vec::new())
}

pub fn register_texture(
    ctx: &mut RoutineContext<'_>,
    input: &mut WireBuffer<'_>,
) -> Result<Vec<u8>, RoutineError> {
    let module = input.read_string()?;
    let texture = input.read_string()?;
    let descriptor = input.read_struct::<TextureReference>()?.into_owned();
    let device_address = input.read_counted::<u8>()?;
    let device_name = input.read_string()?;
    let dim = input.read::<i32>()?;
    let norm = input.read::<i32>()?;
    let ext = input.read::<i32>()?;
    input.finish()?;

    let native = ctx.registry.lookup_module(&module)?;
    let binding = TextureBinding {
        module,
        texture,
        descriptor,
        device_address,
        device_name,
        dim,
        norm,
        ext,
    };
    ctx.runtime.register_texture(native, &binding)?;

    debug!(
        session_id = ctx.session_id,
        texture = %binding.texture,
        device = %binding.device_name,
        dim,
        "RegisterTexture"
    );
    ctx.registry.register_texture(binding)?;
    Ok(Vec::new())
}
