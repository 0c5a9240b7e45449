//! CPU-side frame storage paired with its GPU texture
//!
//! An [`ImageBuffer`] holds the latest frame either as decoded pixels in an
//! owned scratch buffer or as a shared view of a received raw buffer, and
//! decides whether the next texture sync must rebuild the texture or can
//! upload in place.
//!
//! Loading never touches the GPU. Texture work happens in
//! [`ImageBuffer::sync_texture`] and [`ImageBuffer::release`], both of which
//! require a [`GraphicsScope`].

use std::mem;

use bytes::Bytes;
use thiserror::Error;

use super::{AllocationCounter, DecodeError, ImageCodec, ImageCrateCodec, PixelDecoder, ScratchBuffer};
use crate::graphics::{
    AlphaMode, ColorFormat, ColorSpace, GraphicsDevice, GraphicsScope, TextureDesc, TextureError,
};

/// Errors from loading a frame into an [`ImageBuffer`]
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Raw pixels don't describe a usable frame. `expected` is `None` when
    /// the dimensions overflow the address space.
    #[error("invalid raw frame {width}x{height}: {len} bytes")]
    InvalidRaw {
        width: u32,
        height: u32,
        len: usize,
        expected: Option<usize>,
    },
}

/// Where the current frame's pixels live.
#[derive(Debug, Default)]
enum PixelStore {
    #[default]
    Empty,
    /// Decoded into storage this buffer owns
    Scratch(ScratchBuffer),
    /// Shared view of a buffer supplied by the caller
    Borrowed(Bytes),
}

impl PixelStore {
    fn pixels(&self) -> &[u8] {
        match self {
            PixelStore::Empty => &[],
            PixelStore::Scratch(scratch) => scratch.pixels(),
            PixelStore::Borrowed(bytes) => bytes,
        }
    }
}

/// Latest frame plus the texture built from it.
///
/// `T` is the texture handle of the [`GraphicsDevice`] in use.
pub struct ImageBuffer<T, C = ImageCrateCodec> {
    texture: Option<T>,
    /// Textures orphaned by a failed load, destroyed at the next scoped call
    retired: Vec<T>,
    pixels: PixelStore,
    decoder: PixelDecoder<C>,
    allocations: AllocationCounter,
    width: u32,
    height: u32,
    color_format: ColorFormat,
    color_space: ColorSpace,
    alpha_mode: AlphaMode,
    loaded: bool,
    needs_texture_recreate: bool,
    memory_usage: u64,
}

impl<T> ImageBuffer<T, ImageCrateCodec> {
    /// Create an empty buffer using the default codec.
    pub fn new() -> Self {
        Self::with_decoder(PixelDecoder::default())
    }
}

impl<T> Default for ImageBuffer<T, ImageCrateCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C: ImageCodec> ImageBuffer<T, C> {
    /// Create an empty buffer decoding through `decoder`.
    pub fn with_decoder(decoder: PixelDecoder<C>) -> Self {
        Self {
            texture: None,
            retired: Vec::new(),
            pixels: PixelStore::Empty,
            decoder,
            allocations: AllocationCounter::new(),
            width: 0,
            height: 0,
            color_format: ColorFormat::Bgra,
            color_space: ColorSpace::Srgb,
            alpha_mode: AlphaMode::Premultiply,
            loaded: false,
            needs_texture_recreate: false,
            memory_usage: 0,
        }
    }

    /// Count scratch allocations with `counter` instead of a private one.
    pub fn with_allocation_counter(mut self, counter: AllocationCounter) -> Self {
        self.allocations = counter;
        self
    }

    /// Decode an encoded image (PNG, JPEG, ...) as the new frame.
    ///
    /// On failure the buffer ends up empty and its texture is retired.
    pub fn load(&mut self, encoded: &[u8], alpha_mode: AlphaMode) -> Result<(), LoadError> {
        tracing::debug!("Loading image from encoded buffer");
        let previous = self.current_shape();

        let mut scratch = match mem::take(&mut self.pixels) {
            PixelStore::Scratch(scratch) => scratch,
            _ => ScratchBuffer::new(self.allocations.clone()),
        };

        match self.decoder.decode(encoded, &mut scratch) {
            Ok(decoded) => {
                self.pixels = PixelStore::Scratch(scratch);
                self.apply_frame(
                    decoded.width,
                    decoded.height,
                    decoded.format,
                    decoded.color_space,
                    alpha_mode,
                    previous,
                );
                Ok(())
            }
            Err(e) => {
                self.clear();
                Err(e.into())
            }
        }
    }

    /// Use caller-supplied pixels as the new frame without copying them.
    ///
    /// `data` must hold at least `width * height` pixels of `color_format`.
    pub fn load_raw(
        &mut self,
        data: Bytes,
        width: u32,
        height: u32,
        color_format: ColorFormat,
        alpha_mode: AlphaMode,
        color_space: ColorSpace,
    ) -> Result<(), LoadError> {
        tracing::debug!("Loading image using raw pixel data");
        let expected = frame_len(width, height, color_format);
        let usable = matches!(expected, Some(len) if len > 0 && data.len() >= len);
        if !usable {
            self.clear();
            return Err(LoadError::InvalidRaw {
                width,
                height,
                len: data.len(),
                expected,
            });
        }

        let previous = self.current_shape();
        self.pixels = PixelStore::Borrowed(data);
        self.apply_frame(width, height, color_format, color_space, alpha_mode, previous);
        Ok(())
    }

    /// Bring the texture in line with the current frame.
    ///
    /// Rebuilds the texture when the frame's size or format changed (or no
    /// texture exists), otherwise uploads the pixels in place.
    pub fn sync_texture<G>(&mut self, scope: &mut GraphicsScope<'_, G>) -> Result<(), TextureError>
    where
        G: GraphicsDevice<Texture = T>,
    {
        self.destroy_retired(scope);

        if !self.loaded {
            return Ok(());
        }

        let data = self.pixels.pixels();

        if self.needs_texture_recreate || self.texture.is_none() {
            if let Some(old) = self.texture.take() {
                tracing::debug!("Destroying texture");
                scope.destroy_texture(old);
            }

            tracing::debug!("Creating {}x{} texture", self.width, self.height);
            let desc = TextureDesc::dynamic(self.width, self.height, self.color_format);
            self.needs_texture_recreate = false;
            self.texture = Some(scope.create_texture(&desc, data)?);
            Ok(())
        } else {
            if let Some(texture) = &self.texture {
                scope.update_texture(texture, data, self.color_format.row_stride(self.width));
            }
            Ok(())
        }
    }

    /// Destroy the texture, free owned pixels and return to the empty state.
    pub fn release<G>(&mut self, scope: &mut GraphicsScope<'_, G>)
    where
        G: GraphicsDevice<Texture = T>,
    {
        tracing::debug!("Freeing image buffer");
        self.destroy_retired(scope);
        if let Some(texture) = self.texture.take() {
            scope.destroy_texture(texture);
        }
        self.pixels = PixelStore::Empty;
        self.reset_fields();
    }

    /// Nothing loaded and no GPU resources held.
    pub fn is_empty(&self) -> bool {
        !self.loaded && self.texture.is_none() && self.retired.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn needs_texture_recreate(&self) -> bool {
        self.needs_texture_recreate
    }

    pub fn texture(&self) -> Option<&T> {
        self.texture.as_ref()
    }

    /// The current frame's pixels, if any.
    pub fn pixel_data(&self) -> Option<&[u8]> {
        self.loaded.then(|| self.pixels.pixels())
    }

    /// Whether the pixels live in storage this buffer allocated.
    pub fn owns_pixels(&self) -> bool {
        matches!(self.pixels, PixelStore::Scratch(_))
    }

    pub fn scratch_capacity(&self) -> usize {
        match &self.pixels {
            PixelStore::Scratch(scratch) => scratch.capacity(),
            _ => 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color_format(&self) -> ColorFormat {
        self.color_format
    }

    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    pub fn alpha_mode(&self) -> AlphaMode {
        self.alpha_mode
    }

    /// Bytes the current frame occupies.
    pub fn memory_usage(&self) -> u64 {
        self.memory_usage
    }

    fn current_shape(&self) -> Option<(u32, u32, ColorFormat)> {
        self.loaded
            .then_some((self.width, self.height, self.color_format))
    }

    fn apply_frame(
        &mut self,
        width: u32,
        height: u32,
        color_format: ColorFormat,
        color_space: ColorSpace,
        alpha_mode: AlphaMode,
        previous: Option<(u32, u32, ColorFormat)>,
    ) {
        self.width = width;
        self.height = height;
        self.color_format = color_format;
        self.color_space = color_space;
        self.alpha_mode = alpha_mode;
        self.memory_usage =
            frame_len(width, height, color_format).map_or(u64::MAX, |len| len as u64);
        self.needs_texture_recreate = previous != Some((width, height, color_format))
            || self.texture.is_none();
        self.loaded = true;
    }

    /// Drop the frame after a failed load. The texture can only be destroyed
    /// inside a graphics scope, so it is parked until the next scoped call.
    fn clear(&mut self) {
        if let Some(texture) = self.texture.take() {
            self.retired.push(texture);
        }
        self.pixels = PixelStore::Empty;
        self.reset_fields();
    }

    fn reset_fields(&mut self) {
        self.width = 0;
        self.height = 0;
        self.color_format = ColorFormat::Bgra;
        self.color_space = ColorSpace::Srgb;
        self.alpha_mode = AlphaMode::Premultiply;
        self.loaded = false;
        self.needs_texture_recreate = false;
        self.memory_usage = 0;
    }

    fn destroy_retired<G>(&mut self, scope: &mut GraphicsScope<'_, G>)
    where
        G: GraphicsDevice<Texture = T>,
    {
        for texture in self.retired.drain(..) {
            tracing::debug!("Destroying retired texture");
            scope.destroy_texture(texture);
        }
    }
}

/// Bytes in a tightly packed frame, `None` if that overflows `usize`.
fn frame_len(width: u32, height: u32, color_format: ColorFormat) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(color_format.bytes_per_pixel())
}
