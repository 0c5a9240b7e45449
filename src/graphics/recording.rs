//! In-memory graphics device that records every call, for tests.

use super::{BlendFunction, GraphicsDevice, TextureDesc, TextureError};

/// Call log kept by [`RecordingGraphics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GfxCall {
    Create { id: u32, width: u32, height: u32 },
    Destroy { id: u32 },
    Update { id: u32, row_stride: u32, len: usize },
    SetSrgb(bool),
    PushBlend,
    PopBlend,
    Blend(BlendFunction),
    Draw { id: u32, width: u32, height: u32 },
}

/// Hands out texture ids and records calls instead of touching a GPU.
#[derive(Debug, Default)]
pub(crate) struct RecordingGraphics {
    pub calls: Vec<GfxCall>,
    pub enters: u32,
    pub leaves: u32,
    pub depth: u32,
    pub max_depth: u32,
    /// Texture calls made while the context was not entered
    pub unscoped_mutations: u32,
    pub fail_create: bool,
    pub srgb: bool,
    next_id: u32,
}

impl RecordingGraphics {
    pub fn creates(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, GfxCall::Create { .. }))
            .count()
    }

    pub fn updates(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, GfxCall::Update { .. }))
            .count()
    }

    pub fn destroys(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, GfxCall::Destroy { .. }))
            .count()
    }

    pub fn draws(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, GfxCall::Draw { .. }))
            .count()
    }

    fn check_scoped(&mut self) {
        if self.depth == 0 {
            self.unscoped_mutations += 1;
        }
    }
}

impl GraphicsDevice for RecordingGraphics {
    type Texture = u32;
    type Effect = ();

    fn enter(&mut self) {
        self.enters += 1;
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth);
    }

    fn leave(&mut self) {
        self.leaves += 1;
        self.depth -= 1;
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: &[u8]) -> Result<u32, TextureError> {
        self.check_scoped();
        if self.fail_create {
            return Err(TextureError::Device("scripted failure".to_string()));
        }
        if data.len() < desc.byte_len() {
            return Err(TextureError::DataSize {
                expected: desc.byte_len(),
                actual: data.len(),
            });
        }
        self.next_id += 1;
        self.calls.push(GfxCall::Create {
            id: self.next_id,
            width: desc.width,
            height: desc.height,
        });
        Ok(self.next_id)
    }

    fn destroy_texture(&mut self, texture: u32) {
        self.check_scoped();
        self.calls.push(GfxCall::Destroy { id: texture });
    }

    fn update_texture(&mut self, texture: &u32, data: &[u8], row_stride: u32) {
        self.check_scoped();
        self.calls.push(GfxCall::Update {
            id: *texture,
            row_stride,
            len: data.len(),
        });
    }

    fn framebuffer_srgb_enabled(&self) -> bool {
        self.srgb
    }

    fn set_framebuffer_srgb(&mut self, enabled: bool) {
        self.srgb = enabled;
        self.calls.push(GfxCall::SetSrgb(enabled));
    }

    fn push_blend_state(&mut self) {
        self.calls.push(GfxCall::PushBlend);
    }

    fn pop_blend_state(&mut self) {
        self.calls.push(GfxCall::PopBlend);
    }

    fn set_blend_function(&mut self, function: BlendFunction) {
        self.calls.push(GfxCall::Blend(function));
    }

    fn draw_sprite(&mut self, _effect: &(), texture: &u32, width: u32, height: u32) {
        self.calls.push(GfxCall::Draw {
            id: *texture,
            width,
            height,
        });
    }
}
