//! [`GraphicsDevice`] implementation on top of wgpu

use std::sync::Arc;

use super::{
    BlendFunction, ColorFormat, GpuContext, GraphicsDevice, SpriteParams, SpriteRenderer,
    TextureDesc, TextureError,
};

fn wgpu_format(format: ColorFormat) -> wgpu::TextureFormat {
    match format {
        ColorFormat::Bgra => wgpu::TextureFormat::Bgra8Unorm,
        ColorFormat::Rgba => wgpu::TextureFormat::Rgba8Unorm,
    }
}

/// A frame texture with a raw view and an sRGB-decoding view.
pub struct WgpuTexture {
    texture: wgpu::Texture,
    linear_view: wgpu::TextureView,
    srgb_view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl WgpuTexture {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// View that samples the stored values without gamma decoding.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.linear_view
    }
}

/// Where sprites are drawn.
///
/// sRGB framebuffer writes only apply when the target was created with its
/// sRGB counterpart in `view_formats` (or is itself an sRGB format).
pub struct RenderTarget {
    texture: wgpu::Texture,
    srgb_view_allowed: bool,
}

impl RenderTarget {
    /// Wrap a host texture. `srgb_view_allowed` states whether the texture
    /// lists its sRGB format in `view_formats`.
    pub fn new(texture: wgpu::Texture, srgb_view_allowed: bool) -> Self {
        Self {
            texture,
            srgb_view_allowed,
        }
    }

    /// Create an offscreen BGRA target that supports sRGB writes.
    pub fn offscreen(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Pipe Render Target"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Bgra8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[wgpu::TextureFormat::Bgra8UnormSrgb],
        });
        Self::new(texture, true)
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    fn view_format(&self, srgb: bool) -> wgpu::TextureFormat {
        let format = self.texture.format();
        if srgb && (format.is_srgb() || self.srgb_view_allowed) {
            format.add_srgb_suffix()
        } else {
            format
        }
    }
}

/// Frame texture manager backed by a shared wgpu device.
///
/// `enter`/`leave` only track nesting: wgpu devices are usable from any
/// thread, so there is no context to bind.
pub struct WgpuGraphics {
    gpu: Arc<GpuContext>,
    sprites: SpriteRenderer,
    scope_depth: u32,
    srgb_enabled: bool,
    blend: BlendFunction,
    blend_stack: Vec<BlendFunction>,
}

impl WgpuGraphics {
    pub fn new(gpu: Arc<GpuContext>) -> Self {
        let sprites = SpriteRenderer::new(&gpu.device);
        Self {
            gpu,
            sprites,
            scope_depth: 0,
            srgb_enabled: false,
            blend: BlendFunction::default(),
            blend_stack: Vec::new(),
        }
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    fn write_base_level(&self, texture: &wgpu::Texture, data: &[u8], row_stride: u32) {
        let width = texture.width();
        let height = texture.height();
        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(row_stride),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

impl GraphicsDevice for WgpuGraphics {
    type Texture = WgpuTexture;
    type Effect = RenderTarget;

    fn enter(&mut self) {
        self.scope_depth += 1;
    }

    fn leave(&mut self) {
        if self.scope_depth == 0 {
            tracing::warn!("Graphics scope left without being entered");
            return;
        }
        self.scope_depth -= 1;
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: &[u8],
    ) -> Result<WgpuTexture, TextureError> {
        let limit = self.gpu.max_texture_dimension();
        if desc.width == 0 || desc.height == 0 || desc.width > limit || desc.height > limit {
            return Err(TextureError::InvalidSize {
                width: desc.width,
                height: desc.height,
                limit,
            });
        }
        if data.len() < desc.byte_len() {
            return Err(TextureError::DataSize {
                expected: desc.byte_len(),
                actual: data.len(),
            });
        }

        let format = wgpu_format(desc.format);
        let srgb_format = format.add_srgb_suffix();

        self.gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Pipe Frame Texture"),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: desc.mip_levels.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            // Initial data goes through the queue, so COPY_DST is needed either way
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[srgb_format],
        });
        let validation = pollster::block_on(self.gpu.device.pop_error_scope());
        let oom = pollster::block_on(self.gpu.device.pop_error_scope());
        if let Some(err) = validation.or(oom) {
            texture.destroy();
            return Err(TextureError::Device(err.to_string()));
        }

        let stride = desc.format.row_stride(desc.width);
        self.write_base_level(&texture, &data[..desc.byte_len()], stride);

        let linear_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let srgb_view = texture.create_view(&wgpu::TextureViewDescriptor {
            format: Some(srgb_format),
            ..Default::default()
        });

        tracing::debug!("Created {}x{} {:?} frame texture", desc.width, desc.height, format);

        Ok(WgpuTexture {
            texture,
            linear_view,
            srgb_view,
            width: desc.width,
            height: desc.height,
        })
    }

    fn destroy_texture(&mut self, texture: WgpuTexture) {
        tracing::debug!("Destroying {}x{} frame texture", texture.width, texture.height);
        texture.texture.destroy();
    }

    fn update_texture(&mut self, texture: &WgpuTexture, data: &[u8], row_stride: u32) {
        let needed = row_stride as usize * texture.height as usize;
        if data.len() < needed {
            tracing::warn!(
                "Skipping texture update: {} bytes for {} rows of {} bytes",
                data.len(),
                texture.height,
                row_stride
            );
            return;
        }
        self.write_base_level(&texture.texture, &data[..needed], row_stride);
    }

    fn framebuffer_srgb_enabled(&self) -> bool {
        self.srgb_enabled
    }

    fn set_framebuffer_srgb(&mut self, enabled: bool) {
        self.srgb_enabled = enabled;
    }

    fn push_blend_state(&mut self) {
        self.blend_stack.push(self.blend);
    }

    fn pop_blend_state(&mut self) {
        match self.blend_stack.pop() {
            Some(blend) => self.blend = blend,
            None => tracing::warn!("Blend state popped without a matching push"),
        }
    }

    fn set_blend_function(&mut self, function: BlendFunction) {
        self.blend = function;
    }

    fn draw_sprite(
        &mut self,
        effect: &RenderTarget,
        texture: &WgpuTexture,
        width: u32,
        height: u32,
    ) {
        let target_format = effect.view_format(self.srgb_enabled);
        let target_view = effect.texture.create_view(&wgpu::TextureViewDescriptor {
            format: Some(target_format),
            ..Default::default()
        });
        // sRGB framebuffer writes imply sRGB-decoding reads so blending happens in linear light
        let texture_view = if self.srgb_enabled {
            &texture.srgb_view
        } else {
            &texture.linear_view
        };
        let params = SpriteParams::at_origin(width, height, effect.width(), effect.height());

        self.sprites.draw(
            &self.gpu.device,
            &self.gpu.queue,
            texture_view,
            &target_view,
            target_format,
            self.blend,
            params,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mapping() {
        assert_eq!(wgpu_format(ColorFormat::Bgra), wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!(wgpu_format(ColorFormat::Rgba), wgpu::TextureFormat::Rgba8Unorm);
    }

    #[test]
    fn test_srgb_suffix() {
        assert_eq!(
            wgpu_format(ColorFormat::Bgra).add_srgb_suffix(),
            wgpu::TextureFormat::Bgra8UnormSrgb
        );
    }
}
