//! Fixed runtime ABI structures carried verbatim on the wire.
//!
//! Layouts follow the CUDA runtime headers exactly. All fields are 4 bytes
//! wide so none of these types carry padding.

use bytemuck::{Pod, Zeroable};

/// `uint3`: thread/block index triple.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Uint3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Uint3 {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// `dim3`: launch dimension triple. Unset components are 1 in CUDA source,
/// but the wire carries whatever the stub saw.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }
}

/// `cudaChannelFormatDesc`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ChannelFormatDesc {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub w: i32,
    /// `cudaChannelFormatKind`
    pub f: i32,
}

/// `textureReference` (124 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TextureReference {
    pub normalized: i32,
    /// `cudaTextureFilterMode`
    pub filter_mode: i32,
    /// `cudaTextureAddressMode` per dimension
    pub address_mode: [i32; 3],
    pub channel_desc: ChannelFormatDesc,
    pub srgb: i32,
    pub max_anisotropy: u32,
    pub mipmap_filter_mode: i32,
    pub mipmap_level_bias: f32,
    pub min_mipmap_level_clamp: f32,
    pub max_mipmap_level_clamp: f32,
    pub disable_trilinear_optimization: i32,
    pub reserved: [i32; 14],
}

impl Default for TextureReference {
    fn default() -> Self {
        Zeroable::zeroed()
    }
}

pub const TEXTURE_REFERENCE_SIZE: usize = 124;

const _: () = assert!(std::mem::size_of::<TextureReference>() == TEXTURE_REFERENCE_SIZE);
const _: () = assert!(std::mem::size_of::<Uint3>() == 12);
const _: () = assert!(std::mem::size_of::<Dim3>() == 12);
