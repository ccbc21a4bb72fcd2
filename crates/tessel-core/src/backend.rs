//! Render backend boundary.
//!
//! The engine never talks to a graphics API directly. Everything it needs
//! from the GPU side goes through [`RenderBackend`]: target creation and
//! destruction, drawing a program into a target, blits, and pixel transfer.
//! [`SoftwareBackend`](crate::software::SoftwareBackend) is the in-tree
//! reference implementation.

use std::fmt;
use std::sync::Arc;

use crate::catalog::ShaderProgram;
use crate::context::EvaluationInfo;
use crate::error::BackendError;
use crate::param::ParamView;
use crate::stage::{BlendState, MAX_INPUTS, Sampler};

/// Backend-owned texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u32);

impl fmt::Display for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex{}", self.0)
    }
}

/// Texel storage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 8 bits per channel.
    #[default]
    Rgba8,
    /// 16-bit float per channel.
    Rgba16F,
    /// 32-bit float per channel.
    Rgba32F,
}

/// Everything that identifies a render target for reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetDesc {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Storage format.
    pub format: PixelFormat,
    /// Six faces instead of one.
    pub cubemap: bool,
    /// Mip levels, at least 1.
    pub mip_count: u32,
    /// Attach a depth buffer.
    pub depth: bool,
}

impl TargetDesc {
    /// Single-face RGBA8 target without mips or depth.
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            cubemap: false,
            mip_count: 1,
            depth: false,
        }
    }

    /// Sets the depth flag.
    pub const fn with_depth(mut self, depth: bool) -> Self {
        self.depth = depth;
        self
    }

    /// Sets the cubemap flag.
    pub const fn with_cubemap(mut self, cubemap: bool) -> Self {
        self.cubemap = cubemap;
        self
    }

    /// Sets the storage format.
    pub const fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// 6 for cubemaps, else 1.
    pub const fn faces(&self) -> u32 {
        if self.cubemap { 6 } else { 1 }
    }

    /// Texels over all faces of the base level.
    pub const fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize * self.faces() as usize
    }
}

/// Raw RGBA pixels moved across the backend and codec boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Number of faces stored back to back.
    pub faces: u32,
    /// Row-major texels, face after face.
    pub data: Vec<[f32; 4]>,
}

impl PixelBuffer {
    /// Transparent black buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0.0; 4])
    }

    /// Buffer filled with `color`.
    pub fn filled(width: u32, height: u32, color: [f32; 4]) -> Self {
        Self {
            width,
            height,
            faces: 1,
            data: vec![color; width as usize * height as usize],
        }
    }

    /// Texel at `(x, y)` of face 0.
    pub fn get(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Writes the texel at `(x, y)` of face 0.
    pub fn set(&mut self, x: u32, y: u32, color: [f32; 4]) {
        if x < self.width && y < self.height {
            let i = y as usize * self.width as usize + x as usize;
            self.data[i] = color;
        }
    }

    /// Quantizes to 8-bit RGBA.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.data
            .iter()
            .flat_map(|px| px.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect()
    }

    /// Builds a buffer from 8-bit RGBA bytes. Trailing partial texels are ignored.
    pub fn from_rgba8(width: u32, height: u32, bytes: &[u8]) -> Self {
        let data = bytes
            .chunks_exact(4)
            .map(|c| {
                [
                    f32::from(c[0]) / 255.0,
                    f32::from(c[1]) / 255.0,
                    f32::from(c[2]) / 255.0,
                    f32::from(c[3]) / 255.0,
                ]
            })
            .collect();
        Self {
            width,
            height,
            faces: 1,
            data,
        }
    }
}

/// Destination rectangle in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

/// Texture bound to an input slot for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundInput {
    /// Upstream target.
    pub texture: TextureHandle,
    /// Sampling state of the slot.
    pub sampler: Sampler,
}

/// One program invocation covering a whole target.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    /// Program to run.
    pub program: &'a ShaderProgram,
    /// Uniforms, taken from the stage's parameter block.
    pub params: ParamView<'a>,
    /// Textures bound to each input slot.
    pub inputs: [Option<BoundInput>; MAX_INPUTS],
    /// Target written by the draw.
    pub target: TextureHandle,
    /// Blend against existing contents.
    pub blend: BlendState,
    /// Clear the target first.
    pub clear: bool,
    /// Per-pass evaluation info.
    pub info: &'a EvaluationInfo,
}

/// Opaque rendering contract used by the evaluation context.
pub trait RenderBackend {
    /// Allocates a target.
    fn create_target(&mut self, desc: &TargetDesc) -> Result<TextureHandle, BackendError>;

    /// Frees a target. Unknown handles are ignored.
    fn destroy_target(&mut self, handle: TextureHandle);

    /// Runs `call.program` over every texel of `call.target`.
    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError>;

    /// Copies `src`, scaled, into `dst_rect` of `dst`.
    fn blit(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        dst_rect: Rect,
    ) -> Result<(), BackendError>;

    /// Reads a target back to the CPU.
    fn read_pixels(&mut self, handle: TextureHandle) -> Result<PixelBuffer, BackendError>;

    /// Replaces a target's contents.
    fn upload_pixels(
        &mut self,
        handle: TextureHandle,
        pixels: &PixelBuffer,
    ) -> Result<(), BackendError>;
}

/// Creates fresh backend instances, one per context.
pub type BackendFactory = Arc<dyn Fn() -> Box<dyn RenderBackend + Send> + Send + Sync>;
