//! Scoped graphics context acquisition

use super::{GraphicsDevice, TextureDesc, TextureError};

/// Holds the graphics context for as long as it lives.
///
/// `enter()` is called on construction and `leave()` on drop, so the context
/// is released on every exit path, including early returns and errors.
/// Texture mutation is only exposed through this guard.
pub struct GraphicsScope<'a, G: GraphicsDevice> {
    device: &'a mut G,
}

impl<'a, G: GraphicsDevice> GraphicsScope<'a, G> {
    /// Enter the graphics context of `device`.
    pub fn enter(device: &'a mut G) -> Self {
        device.enter();
        Self { device }
    }

    pub fn create_texture(
        &mut self,
        desc: &TextureDesc,
        data: &[u8],
    ) -> Result<G::Texture, TextureError> {
        self.device.create_texture(desc, data)
    }

    pub fn destroy_texture(&mut self, texture: G::Texture) {
        self.device.destroy_texture(texture);
    }

    pub fn update_texture(&mut self, texture: &G::Texture, data: &[u8], row_stride: u32) {
        self.device.update_texture(texture, data, row_stride);
    }
}

impl<G: GraphicsDevice> Drop for GraphicsScope<'_, G> {
    fn drop(&mut self) {
        self.device.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::recording::RecordingGraphics;
    use crate::graphics::ColorFormat;

    #[test]
    fn test_scope_pairs_enter_and_leave() {
        let mut gfx = RecordingGraphics::default();
        {
            let _scope = GraphicsScope::enter(&mut gfx);
        }
        assert_eq!(gfx.enters, 1);
        assert_eq!(gfx.leaves, 1);
        assert_eq!(gfx.depth, 0);
    }

    #[test]
    fn test_scope_released_on_error_path() {
        fn create(gfx: &mut RecordingGraphics) -> Result<u32, TextureError> {
            let mut scope = GraphicsScope::enter(gfx);
            let texture = scope.create_texture(&TextureDesc::dynamic(2, 2, ColorFormat::Bgra), &[0; 16])?;
            Ok(texture)
        }

        let mut gfx = RecordingGraphics::default();
        gfx.fail_create = true;
        assert!(create(&mut gfx).is_err());
        assert_eq!(gfx.enters, 1);
        assert_eq!(gfx.leaves, 1);
    }

    #[test]
    fn test_nested_scopes() {
        let mut gfx = RecordingGraphics::default();
        {
            let mut outer = GraphicsScope::enter(&mut gfx);
            outer.device.enter();
            outer.device.leave();
        }
        assert_eq!(gfx.enters, 2);
        assert_eq!(gfx.leaves, 2);
        assert_eq!(gfx.max_depth, 2);
    }
}
