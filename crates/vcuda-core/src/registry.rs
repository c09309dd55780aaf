//! Per-session translation tables from caller handles to native resources.
//!
//! Every non-module binding is scoped to the module it was registered under.
//! A [`ModuleBinding`] records the keys of its dependents so that
//! unregistering the module removes exactly those bindings.

use std::collections::{HashMap, HashSet};

use tracing::debug;
use vcuda_protocol::abi::{Dim3, TextureReference, Uint3};

use crate::error::CoreError;
use crate::handle::NativeHandle;

/// Kinds of binding that live under a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Function,
    Variable,
    SharedVariable,
    Texture,
}

/// Keys of the bindings registered under one module, per kind.
#[derive(Debug, Default, Clone)]
pub struct Dependents {
    pub functions: HashSet<String>,
    pub variables: HashSet<String>,
    pub shared_variables: HashSet<String>,
    pub textures: HashSet<String>,
}

impl Dependents {
    fn set_mut(&mut self, kind: BindingKind) -> &mut HashSet<String> {
        match kind {
            BindingKind::Function => &mut self.functions,
            BindingKind::Variable => &mut self.variables,
            BindingKind::SharedVariable => &mut self.shared_variables,
            BindingKind::Texture => &mut self.textures,
        }
    }

    pub fn total(&self) -> usize {
        self.functions.len()
            + self.variables.len()
            + self.shared_variables.len()
            + self.textures.len()
    }
}

/// A registered device-code bundle.
#[derive(Debug, Clone)]
pub struct ModuleBinding {
    native: NativeHandle,
    dependents: Dependents,
}

impl ModuleBinding {
    pub fn native(&self) -> NativeHandle {
        self.native
    }

    pub fn dependents(&self) -> &Dependents {
        &self.dependents
    }
}

/// Launch bounds recorded with a device function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchBounds {
    pub thread_limit: i32,
    pub tid: Uint3,
    pub bid: Uint3,
    pub block_dim: Dim3,
    pub grid_dim: Dim3,
    pub word_size: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBinding {
    pub module: String,
    pub host_symbol: String,
    pub device_function: String,
    pub device_name: String,
    pub launch: LaunchBounds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableBinding {
    pub module: String,
    pub host_variable: String,
    pub device_address: String,
    pub device_name: String,
    pub size: i32,
    pub is_extern: bool,
    pub is_constant: bool,
    pub is_global: bool,
}

/// Size/alignment/storage metadata of a declared shared region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedLayout {
    pub size: u64,
    pub alignment: u64,
    pub storage: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedBinding {
    pub module: String,
    pub device_pointer: String,
    /// `None` for regions registered by pointer only.
    pub layout: Option<SharedLayout>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureBinding {
    pub module: String,
    pub texture: String,
    pub descriptor: TextureReference,
    pub device_address: Vec<u8>,
    pub device_name: String,
    pub dim: i32,
    pub norm: i32,
    pub ext: i32,
}

trait Scoped {
    const KIND: BindingKind;
    fn module(&self) -> &str;
    fn key(&self) -> &str;
}

impl Scoped for FunctionBinding {
    const KIND: BindingKind = BindingKind::Function;
    fn module(&self) -> &str {
        &self.module
    }
    fn key(&self) -> &str {
        &self.host_symbol
    }
}

impl Scoped for VariableBinding {
    const KIND: BindingKind = BindingKind::Variable;
    fn module(&self) -> &str {
        &self.module
    }
    fn key(&self) -> &str {
        &self.host_variable
    }
}

impl Scoped for SharedBinding {
    const KIND: BindingKind = BindingKind::SharedVariable;
    fn module(&self) -> &str {
        &self.module
    }
    fn key(&self) -> &str {
        &self.device_pointer
    }
}

impl Scoped for TextureBinding {
    const KIND: BindingKind = BindingKind::Texture;
    fn module(&self) -> &str {
        &self.module
    }
    fn key(&self) -> &str {
        &self.texture
    }
}

/// Translation tables for one session.
///
/// Not synchronised: the owning session serialises access.
#[derive(Debug, Default)]
pub struct Registry {
    modules: HashMap<String, ModuleBinding>,
    functions: HashMap<String, FunctionBinding>,
    variables: HashMap<String, VariableBinding>,
    shared_variables: HashMap<String, SharedBinding>,
    textures: HashMap<String, TextureBinding>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Modules ───────────────────────────────────────────────────

    pub fn register_module(
        &mut self,
        handle: impl Into<String>,
        native: NativeHandle,
    ) -> Result<(), CoreError> {
        let handle = handle.into();
        if self.modules.contains_key(&handle) {
            return Err(CoreError::DuplicateHandle(handle));
        }
        debug!(module = %handle, %native, "module registered");
        self.modules.insert(
            handle,
            ModuleBinding {
                native,
                dependents: Dependents::default(),
            },
        );
        Ok(())
    }

    pub fn contains_module(&self, handle: &str) -> bool {
        self.modules.contains_key(handle)
    }

    pub fn lookup_module(&self, handle: &str) -> Result<NativeHandle, CoreError> {
        self.module(handle).map(ModuleBinding::native)
    }

    pub fn module(&self, handle: &str) -> Result<&ModuleBinding, CoreError> {
        self.modules
            .get(handle)
            .ok_or_else(|| CoreError::UnknownHandle(handle.to_string()))
    }

    /// Remove a module and every binding registered under it. Returns the
    /// removed binding so the caller can see what was cascaded.
    pub fn unregister_module(&mut self, handle: &str) -> Result<ModuleBinding, CoreError> {
        let binding = self
            .modules
            .remove(handle)
            .ok_or_else(|| CoreError::UnknownHandle(handle.to_string()))?;

        let deps = &binding.dependents;
        for key in &deps.functions {
            self.functions.remove(key);
        }
        for key in &deps.variables {
            self.variables.remove(key);
        }
        for key in &deps.shared_variables {
            self.shared_variables.remove(key);
        }
        for key in &deps.textures {
            self.textures.remove(key);
        }

        debug!(
            module = %handle,
            native = %binding.native,
            cascaded = deps.total(),
            "module unregistered"
        );
        Ok(binding)
    }

    /// Caller handles of all live modules, in no particular order.
    pub fn module_handles(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    // ── Scoped bindings ───────────────────────────────────────────

    /// Insert or overwrite the function bound to `binding.host_symbol`.
    /// Returns the binding it replaced, if any.
    pub fn register_function(
        &mut self,
        binding: FunctionBinding,
    ) -> Result<Option<FunctionBinding>, CoreError> {
        upsert(&mut self.modules, &mut self.functions, binding)
    }

    pub fn function(&self, host_symbol: &str) -> Result<&FunctionBinding, CoreError> {
        lookup(&self.functions, host_symbol)
    }

    pub fn register_variable(
        &mut self,
        binding: VariableBinding,
    ) -> Result<Option<VariableBinding>, CoreError> {
        upsert(&mut self.modules, &mut self.variables, binding)
    }

    pub fn variable(&self, host_variable: &str) -> Result<&VariableBinding, CoreError> {
        lookup(&self.variables, host_variable)
    }

    pub fn register_shared(
        &mut self,
        binding: SharedBinding,
    ) -> Result<Option<SharedBinding>, CoreError> {
        upsert(&mut self.modules, &mut self.shared_variables, binding)
    }

    pub fn shared(&self, device_pointer: &str) -> Result<&SharedBinding, CoreError> {
        lookup(&self.shared_variables, device_pointer)
    }

    pub fn register_texture(
        &mut self,
        binding: TextureBinding,
    ) -> Result<Option<TextureBinding>, CoreError> {
        upsert(&mut self.modules, &mut self.textures, binding)
    }

    pub fn texture(&self, texture: &str) -> Result<&TextureBinding, CoreError> {
        lookup(&self.textures, texture)
    }

    // ── Counts ────────────────────────────────────────────────────

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn binding_count(&self, kind: BindingKind) -> usize {
        match kind {
            BindingKind::Function => self.functions.len(),
            BindingKind::Variable => self.variables.len(),
            BindingKind::SharedVariable => self.shared_variables.len(),
            BindingKind::Texture => self.textures.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn lookup<'a, B>(table: &'a HashMap<String, B>, key: &str) -> Result<&'a B, CoreError> {
    table
        .get(key)
        .ok_or_else(|| CoreError::UnknownHandle(key.to_string()))
}

fn upsert<B: Scoped>(
    modules: &mut HashMap<String, ModuleBinding>,
    table: &mut HashMap<String, B>,
    binding: B,
) -> Result<Option<B>, CoreError> {
    let module = binding.module().to_string();
    let key = binding.key().to_string();
    if !modules.contains_key(&module) {
        return Err(CoreError::UnknownHandle(module));
    }

    let prior = table.insert(key.clone(), binding);

    // A reloaded module may re-register a symbol first seen under another module.
    if let Some(prev) = &prior {
        if prev.module() != module {
            if let Some(owner) = modules.get_mut(prev.module()) {
                owner.dependents.set_mut(B::KIND).remove(&key);
            }
        }
    }
    if let Some(owner) = modules.get_mut(&module) {
        owner.dependents.set_mut(B::KIND).insert(key);
    }

    Ok(prior)
}
