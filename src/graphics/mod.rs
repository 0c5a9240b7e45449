//! GPU resource abstraction for frame textures
//!
//! The host owns the graphics context; this module describes the small
//! surface the frame pipeline needs from it: texture create/update/destroy,
//! sprite drawing with a blend state, and explicit context entry/exit.
//!
//! Texture mutation goes through [`GraphicsScope`], which enters the context
//! on construction and leaves it when dropped.

mod gpu_context;
mod scope;
mod sprite;
mod wgpu_device;

#[cfg(test)]
pub(crate) mod recording;

pub use gpu_context::{GpuContext, GpuError};
pub use scope::GraphicsScope;
pub use sprite::{SpriteParams, SpriteRenderer};
pub use wgpu_device::{RenderTarget, WgpuGraphics, WgpuTexture};

use thiserror::Error;

/// Pixel layout of a texture or CPU pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorFormat {
    /// 8-bit blue, green, red, alpha
    #[default]
    Bgra,
    /// 8-bit red, green, blue, alpha
    Rgba,
}

impl ColorFormat {
    /// Bytes occupied by one pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ColorFormat::Bgra | ColorFormat::Rgba => 4,
        }
    }

    /// Bytes in one tightly packed row of `width` pixels.
    pub fn row_stride(&self, width: u32) -> u32 {
        width * self.bytes_per_pixel() as u32
    }
}

/// Color space the pixel values are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorSpace {
    /// 8-bit sRGB
    #[default]
    Srgb,
    /// Half-float sRGB
    Srgb16F,
    /// Rec. 709 with extended range
    Rec709Extended,
    /// Rec. 709 scRGB
    Rec709ScRgb,
}

/// How alpha relates to the color channels of incoming pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    /// Color channels were multiplied by alpha in gamma (sRGB-encoded) space
    #[default]
    Premultiply,
    /// Color channels were multiplied by alpha in linear space
    PremultiplySrgb,
}

/// Blend factors used when compositing a sprite over the framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    InvSrcAlpha,
}

/// Source and destination factors applied to both color and alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendFunction {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl Default for BlendFunction {
    fn default() -> Self {
        Self {
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::InvSrcAlpha,
        }
    }
}

/// Parameters for creating a 2D texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: ColorFormat,
    pub mip_levels: u32,
}

impl TextureDesc {
    /// Single-mip texture that is updated in place every frame.
    pub fn dynamic(width: u32, height: u32, format: ColorFormat) -> Self {
        Self {
            width,
            height,
            format,
            mip_levels: 1,
        }
    }

    /// Number of bytes needed to fill the base level.
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Errors from creating GPU textures
#[derive(Debug, Clone, Error)]
pub enum TextureError {
    /// Width or height is zero or beyond what the device supports
    #[error("invalid texture size {width}x{height} (device limit {limit})")]
    InvalidSize { width: u32, height: u32, limit: u32 },
    /// Initial data does not cover the texture
    #[error("texture data is {actual} bytes, expected at least {expected}")]
    DataSize { expected: usize, actual: usize },
    /// The device rejected the allocation
    #[error("texture creation failed: {0}")]
    Device(String),
}

/// The host's GPU resource manager.
///
/// Implementations must tolerate `enter`/`leave` nesting; every `enter` is
/// matched by exactly one `leave`.
pub trait GraphicsDevice {
    /// Owned handle to a created texture
    type Texture;
    /// Host-provided draw context passed through to [`Self::draw_sprite`]
    type Effect;

    /// Acquire the graphics context for the calling thread.
    fn enter(&mut self);
    /// Release the graphics context acquired by [`Self::enter`].
    fn leave(&mut self);

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: &[u8],
    ) -> Result<Self::Texture, TextureError>;
    fn destroy_texture(&mut self, texture: Self::Texture);
    /// Replace the base level of `texture` with `data`, rows `row_stride` bytes apart.
    fn update_texture(&mut self, texture: &Self::Texture, data: &[u8], row_stride: u32);

    fn framebuffer_srgb_enabled(&self) -> bool;
    fn set_framebuffer_srgb(&mut self, enabled: bool);

    fn push_blend_state(&mut self);
    fn pop_blend_state(&mut self);
    fn set_blend_function(&mut self, function: BlendFunction);

    /// Draw `texture` as a `width` x `height` sprite at the origin.
    fn draw_sprite(
        &mut self,
        effect: &Self::Effect,
        texture: &Self::Texture,
        width: u32,
        height: u32,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(ColorFormat::Bgra.bytes_per_pixel(), 4);
        assert_eq!(ColorFormat::Rgba.row_stride(1920), 1920 * 4);
    }

    #[test]
    fn test_dynamic_desc() {
        let desc = TextureDesc::dynamic(4, 2, ColorFormat::Bgra);
        assert_eq!(desc.mip_levels, 1);
        assert_eq!(desc.byte_len(), 32);
    }

    #[test]
    fn test_texture_error_display() {
        let err = TextureError::Device("out of memory".to_string());
        assert!(err.to_string().contains("out of memory"));
    }
}
