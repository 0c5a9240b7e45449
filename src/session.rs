//! Per-source frame pipeline
//!
//! A [`FrameSourceSession`] polls its subscriber for the newest frame, loads
//! it into an [`ImageBuffer`] and keeps the buffer's texture in sync. It is
//! driven entirely by host callbacks on the render thread and never blocks.

use std::time::Instant;

use crate::graphics::{
    AlphaMode, BlendFactor, BlendFunction, ColorFormat, ColorSpace, GraphicsDevice, GraphicsScope,
};
use crate::network::{FrameEncoding, FrameSubscriber};
use crate::video::{ImageBuffer, ImageCodec, ImageCrateCodec};

/// Blend used to composite premultiplied frames.
const PREMULTIPLIED_BLEND: BlendFunction = BlendFunction {
    src: BlendFactor::One,
    dst: BlendFactor::InvSrcAlpha,
};

/// State of one source instance.
pub struct FrameSourceSession<S, G, C = ImageCrateCodec>
where
    S: FrameSubscriber,
    G: GraphicsDevice,
    C: ImageCodec,
{
    subscriber: S,
    graphics: G,
    image: ImageBuffer<G::Texture, C>,
    channel_name: String,
    /// Keep receiving while hidden
    persistent: bool,
    linear_alpha: bool,
    showing: bool,
    /// A frame from the current channel has been loaded
    frame_loaded: bool,
    last_frame_id: i64,
    last_seen: Option<Instant>,
}

impl<S, G> FrameSourceSession<S, G, ImageCrateCodec>
where
    S: FrameSubscriber,
    G: GraphicsDevice,
{
    pub fn new(subscriber: S, graphics: G) -> Self {
        Self::with_image_buffer(subscriber, graphics, ImageBuffer::new())
    }
}

impl<S, G, C> FrameSourceSession<S, G, C>
where
    S: FrameSubscriber,
    G: GraphicsDevice,
    C: ImageCodec,
{
    pub fn with_image_buffer(subscriber: S, graphics: G, image: ImageBuffer<G::Texture, C>) -> Self {
        Self {
            subscriber,
            graphics,
            image,
            channel_name: String::new(),
            persistent: true,
            linear_alpha: false,
            showing: false,
            frame_loaded: false,
            last_frame_id: -1,
            last_seen: None,
        }
    }

    /// Apply new settings and rebind to `channel_name`.
    ///
    /// The texture is kept; it is rebuilt only if the next frame's size or
    /// format differs from the last one.
    pub fn configure(&mut self, channel_name: &str, persistent: bool, linear_alpha: bool) {
        tracing::info!(
            "Configuring source: channel '{}', persistent {}, linear alpha {}",
            channel_name,
            persistent,
            linear_alpha
        );

        self.subscriber.unbind();
        if !channel_name.is_empty() {
            if let Err(e) = self.subscriber.bind(channel_name) {
                tracing::error!("Failed to bind channel '{}': {}", channel_name, e);
            }
        }

        self.channel_name = channel_name.to_string();
        self.persistent = persistent;
        self.linear_alpha = linear_alpha;
        self.last_frame_id = -1;
        self.last_seen = None;
        self.frame_loaded = false;
    }

    /// Load the newest pending frame, if any, and sync the texture.
    pub fn pump(&mut self) {
        if !self.subscriber.is_bound() {
            return;
        }
        let Some(frame) = self.subscriber.receive() else {
            return;
        };

        let alpha_mode = self.alpha_mode();
        let result = match frame.encoding {
            FrameEncoding::RawBgra => self.image.load_raw(
                frame.data,
                frame.width,
                frame.height,
                ColorFormat::Bgra,
                alpha_mode,
                ColorSpace::Srgb,
            ),
            FrameEncoding::Encoded => self.image.load(&frame.data, alpha_mode),
        };

        self.last_frame_id = frame.id;
        self.last_seen = Some(frame.received_at);

        match result {
            Ok(()) => self.frame_loaded = true,
            Err(e) => {
                tracing::warn!("Dropping frame {} from '{}': {}", frame.id, self.channel_name, e);
                self.frame_loaded = false;
            }
        }

        let mut scope = GraphicsScope::enter(&mut self.graphics);
        if let Err(e) = self.image.sync_texture(&mut scope) {
            tracing::warn!("Frame {} will not be shown: {}", frame.id, e);
        }
    }

    pub fn show(&mut self) {
        self.showing = true;
        if !self.persistent {
            self.pump();
        }
    }

    pub fn hide(&mut self) {
        self.showing = false;
        if !self.persistent {
            self.release();
        }
    }

    /// Per-frame update from the host.
    pub fn tick(&mut self, _seconds: f32) {
        if self.persistent || self.showing {
            self.pump();
        } else {
            self.release();
        }
    }

    /// Draw the current texture at full size. Draws nothing without a texture.
    pub fn render(&mut self, effect: &G::Effect) {
        let Some(texture) = self.image.texture() else {
            return;
        };

        let previous_srgb = self.graphics.framebuffer_srgb_enabled();
        self.graphics.set_framebuffer_srgb(true);
        self.graphics.push_blend_state();
        self.graphics.set_blend_function(PREMULTIPLIED_BLEND);

        self.graphics
            .draw_sprite(effect, texture, self.image.width(), self.image.height());

        self.graphics.pop_blend_state();
        self.graphics.set_framebuffer_srgb(previous_srgb);
    }

    /// Color space of the current texture, sRGB when there is none.
    ///
    /// The host's preference list does not change the answer.
    pub fn color_space(&self, _preferred: &[ColorSpace]) -> ColorSpace {
        if self.image.texture().is_some() {
            self.image.color_space()
        } else {
            ColorSpace::Srgb
        }
    }

    /// Free the texture and pixels.
    pub fn release(&mut self) {
        self.frame_loaded = false;
        if self.image.is_empty() {
            return;
        }
        let mut scope = GraphicsScope::enter(&mut self.graphics);
        self.image.release(&mut scope);
    }

    /// Unbind and free everything.
    pub fn teardown(&mut self) {
        self.subscriber.unbind();
        self.release();
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn linear_alpha(&self) -> bool {
        self.linear_alpha
    }

    pub fn is_showing(&self) -> bool {
        self.showing
    }

    /// Whether a frame from the current channel is loaded.
    pub fn has_frame(&self) -> bool {
        self.frame_loaded
    }

    /// Id of the last received frame, -1 before the first one.
    pub fn last_frame_id(&self) -> i64 {
        self.last_frame_id
    }

    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }

    pub fn image(&self) -> &ImageBuffer<G::Texture, C> {
        &self.image
    }

    pub fn subscriber(&self) -> &S {
        &self.subscriber
    }

    pub fn subscriber_mut(&mut self) -> &mut S {
        &mut self.subscriber
    }

    pub fn graphics(&self) -> &G {
        &self.graphics
    }

    pub fn graphics_mut(&mut self) -> &mut G {
        &mut self.graphics
    }

    fn alpha_mode(&self) -> AlphaMode {
        if self.linear_alpha {
            AlphaMode::PremultiplySrgb
        } else {
            AlphaMode::Premultiply
        }
    }
}

impl<S, G, C> Drop for FrameSourceSession<S, G, C>
where
    S: FrameSubscriber,
    G: GraphicsDevice,
    C: ImageCodec,
{
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::recording::{GfxCall, RecordingGraphics};
    use crate::network::scripted::ScriptedSubscriber;
    use crate::network::PipeFrame;
    use crate::video::decoder::tests::encode_png;
    use bytes::Bytes;

    type TestSession = FrameSourceSession<ScriptedSubscriber, RecordingGraphics>;

    fn raw_frame(id: i64, width: u32, height: u32) -> PipeFrame {
        PipeFrame::raw(
            id,
            width,
            height,
            Bytes::from(vec![0x40; width as usize * height as usize * 4]),
        )
    }

    fn session(channel: &str, persistent: bool) -> TestSession {
        let mut session = TestSession::new(ScriptedSubscriber::default(), RecordingGraphics::default());
        session.configure(channel, persistent, false);
        session
    }

    fn assert_scopes_balanced(session: &TestSession) {
        let gfx = session.graphics();
        assert_eq!(gfx.enters, gfx.leaves);
        assert_eq!(gfx.depth, 0);
        assert_eq!(gfx.unscoped_mutations, 0);
    }

    #[test]
    fn test_persistent_pump_sequence() {
        let mut session = session("test", true);
        assert!(session.subscriber().is_bound());

        // Nothing pending
        session.pump();
        assert!(session.image().is_empty());
        assert_eq!(session.last_frame_id(), -1);
        assert!(session.graphics().calls.is_empty());

        session.subscriber_mut().push(raw_frame(1, 4, 4));
        session.pump();
        assert_eq!((session.width(), session.height()), (4, 4));
        assert_eq!(session.last_frame_id(), 1);
        assert!(session.image().texture().is_some());
        assert!(!session.image().needs_texture_recreate());
        assert_eq!(session.graphics().creates(), 1);

        session.subscriber_mut().push(raw_frame(2, 4, 4));
        session.pump();
        assert!(!session.image().needs_texture_recreate());
        assert_eq!(session.last_frame_id(), 2);
        assert_eq!(session.graphics().creates(), 1);
        assert_eq!(session.graphics().updates(), 1);
        assert!(session.last_seen().is_some());
        assert_scopes_balanced(&session);
    }

    #[test]
    fn test_hide_releases_when_not_persistent() {
        let mut session = session("test", false);
        session.subscriber_mut().push(raw_frame(1, 4, 4));
        session.show();
        assert!(session.image().is_loaded());

        session.hide();
        assert!(!session.image().is_loaded());
        assert!(session.image().texture().is_none());
        assert_eq!(session.graphics().destroys(), 1);

        session.graphics_mut().calls.clear();
        session.render(&());
        assert!(session.graphics().calls.is_empty());
        assert_scopes_balanced(&session);
    }

    #[test]
    fn test_release_then_render_makes_no_gpu_calls() {
        let mut session = session("test", true);
        session.subscriber_mut().push(raw_frame(1, 2, 2));
        session.pump();
        session.release();

        let enters = session.graphics().enters;
        session.graphics_mut().calls.clear();
        session.render(&());
        session.release();

        assert!(session.graphics().calls.is_empty());
        assert_eq!(session.graphics().enters, enters);
    }

    #[test]
    fn test_render_draws_with_premultiplied_blend() {
        let mut session = session("test", true);
        session.subscriber_mut().push(raw_frame(1, 8, 6));
        session.pump();
        session.graphics_mut().calls.clear();

        session.render(&());

        assert_eq!(
            session.graphics().calls,
            vec![
                GfxCall::SetSrgb(true),
                GfxCall::PushBlend,
                GfxCall::Blend(PREMULTIPLIED_BLEND),
                GfxCall::Draw { id: 1, width: 8, height: 6 },
                GfxCall::PopBlend,
                GfxCall::SetSrgb(false),
            ]
        );
    }

    #[test]
    fn test_render_restores_enabled_srgb() {
        let mut session = session("test", true);
        session.subscriber_mut().push(raw_frame(1, 2, 2));
        session.pump();
        session.graphics_mut().srgb = true;

        session.render(&());
        assert!(session.graphics().srgb);
        assert_eq!(session.graphics().calls.last(), Some(&GfxCall::SetSrgb(true)));
    }

    #[test]
    fn test_configure_rebinds() {
        let mut session = session("first", true);
        session.configure("second", true, false);

        assert_eq!(session.subscriber().binds, vec!["first", "second"]);
        assert_eq!(session.subscriber().unbinds, 1);
        assert_eq!(session.subscriber().bound.as_deref(), Some("second"));

        session.configure("", true, false);
        assert!(!session.subscriber().is_bound());
        assert_eq!(session.subscriber().unbinds, 2);
    }

    #[test]
    fn test_configure_keeps_texture() {
        let mut session = session("test", true);
        session.subscriber_mut().push(raw_frame(5, 4, 4));
        session.pump();

        session.configure("test", true, true);
        assert_eq!(session.last_frame_id(), -1);
        assert!(!session.has_frame());
        assert!(session.last_seen().is_none());
        assert!(session.image().texture().is_some());
        assert_eq!(session.graphics().destroys(), 0);

        // Same size after reconfigure: upload in place
        session.subscriber_mut().push(raw_frame(6, 4, 4));
        session.pump();
        assert_eq!(session.graphics().creates(), 1);
        assert_eq!(session.graphics().updates(), 1);
        assert_eq!(session.image().alpha_mode(), AlphaMode::PremultiplySrgb);

        // New size: rebuild
        session.subscriber_mut().push(raw_frame(7, 8, 4));
        session.pump();
        assert_eq!(session.graphics().creates(), 2);
        assert_eq!(session.graphics().destroys(), 1);
    }

    #[test]
    fn test_alpha_mode_follows_linear_alpha() {
        let mut session = session("test", true);
        session.subscriber_mut().push(raw_frame(1, 2, 2));
        session.pump();
        assert_eq!(session.image().alpha_mode(), AlphaMode::Premultiply);

        session.configure("test", true, true);
        assert!(session.linear_alpha());
        session.subscriber_mut().push(raw_frame(2, 2, 2));
        session.pump();
        assert_eq!(session.image().alpha_mode(), AlphaMode::PremultiplySrgb);
    }

    #[test]
    fn test_encoded_frame() {
        let mut session = session("test", true);
        let png = encode_png(3, 5, [0, 128, 255, 255]);
        session.subscriber_mut().push(PipeFrame::encoded(9, Bytes::from(png)));
        session.pump();

        assert_eq!((session.width(), session.height()), (3, 5));
        assert_eq!(session.last_frame_id(), 9);
        assert!(session.has_frame());
        assert!(session.image().owns_pixels());
        assert_eq!(session.graphics().creates(), 1);
    }

    #[test]
    fn test_bad_frame_clears_display() {
        let mut session = session("test", true);
        session.subscriber_mut().push(raw_frame(1, 4, 4));
        session.pump();

        session
            .subscriber_mut()
            .push(PipeFrame::encoded(2, Bytes::from_static(b"garbage")));
        session.pump();

        assert!(!session.has_frame());
        assert!(session.image().is_empty());
        assert_eq!(session.graphics().destroys(), 1);
        assert_eq!(session.last_frame_id(), 2);

        session.graphics_mut().calls.clear();
        session.render(&());
        assert!(session.graphics().calls.is_empty());
        assert_scopes_balanced(&session);
    }

    #[test]
    fn test_texture_failure_renders_nothing() {
        let mut session = session("test", true);
        session.graphics_mut().fail_create = true;
        session.subscriber_mut().push(raw_frame(1, 4, 4));
        session.pump();

        assert!(session.image().texture().is_none());
        assert_eq!(session.color_space(&[ColorSpace::Rec709Extended]), ColorSpace::Srgb);
        session.render(&());
        assert_eq!(session.graphics().draws(), 0);
        assert_scopes_balanced(&session);

        // Recovers on the next frame
        session.graphics_mut().fail_create = false;
        session.subscriber_mut().push(raw_frame(2, 4, 4));
        session.pump();
        assert!(session.image().texture().is_some());
    }

    #[test]
    fn test_tick() {
        let mut session = session("test", false);
        session.subscriber_mut().push(raw_frame(1, 2, 2));

        // Hidden and not persistent: nothing is received
        session.tick(0.016);
        assert_eq!(session.subscriber().frames.len(), 1);
        assert!(session.image().is_empty());

        session.show();
        session.subscriber_mut().push(raw_frame(2, 2, 2));
        session.tick(0.016);
        assert_eq!(session.last_frame_id(), 2);

        session.showing = false;
        session.tick(0.016);
        assert!(session.image().is_empty());
        assert_scopes_balanced(&session);
    }

    #[test]
    fn test_unbound_session_ignores_frames() {
        let mut session = session("", true);
        session.subscriber_mut().push(raw_frame(1, 2, 2));
        session.tick(0.016);
        assert_eq!(session.subscriber().receives, 0);
        assert!(session.image().is_empty());
    }

    #[test]
    fn test_teardown() {
        let mut session = session("test", true);
        session.subscriber_mut().push(raw_frame(1, 2, 2));
        session.pump();

        session.teardown();
        assert!(!session.subscriber().is_bound());
        assert!(session.image().is_empty());
        assert_eq!(session.graphics().destroys(), 1);
        assert_scopes_balanced(&session);
    }

    #[test]
    fn test_overflowing_raw_frame_is_dropped() {
        let mut session = session("test", true);
        session.subscriber_mut().push(raw_frame(1, 4, 4));
        session.pump();

        session
            .subscriber_mut()
            .push(PipeFrame::raw(2, 1 << 31, 1 << 31, Bytes::new()));
        session.pump();

        assert!(!session.has_frame());
        assert!(session.image().is_empty());
        assert_eq!((session.width(), session.height()), (0, 0));
        assert_eq!(session.last_frame_id(), 2);
        assert_eq!(session.graphics().destroys(), 1);
        assert_scopes_balanced(&session);
    }

    mod logging {
        use super::*;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tracing::{Event, Level, Subscriber};
        use tracing_subscriber::layer::{Context, SubscriberExt};
        use tracing_subscriber::Layer;

        /// Counts warnings and errors.
        #[derive(Clone, Default)]
        struct ProblemCounter(Arc<AtomicUsize>);

        impl<S: Subscriber> Layer<S> for ProblemCounter {
            fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
                if *event.metadata().level() <= Level::WARN {
                    self.0.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        fn problems_during(f: impl FnOnce()) -> usize {
            let counter = ProblemCounter::default();
            let subscriber = tracing_subscriber::registry().with(counter.clone());
            tracing::subscriber::with_default(subscriber, f);
            counter.0.load(Ordering::SeqCst)
        }

        #[test]
        fn test_decode_failure_logged_once() {
            let mut session = session("test", true);
            session
                .subscriber_mut()
                .push(PipeFrame::encoded(1, Bytes::from_static(b"garbage")));

            assert_eq!(problems_during(|| session.pump()), 1);
        }

        #[test]
        fn test_invalid_raw_logged_once() {
            let mut session = session("test", true);
            session
                .subscriber_mut()
                .push(PipeFrame::raw(1, 4, 4, Bytes::from_static(b"short")));

            assert_eq!(problems_during(|| session.pump()), 1);
        }

        #[test]
        fn test_texture_failure_logged_once() {
            let mut session = session("test", true);
            session.graphics_mut().fail_create = true;
            session.subscriber_mut().push(raw_frame(1, 4, 4));

            assert_eq!(problems_during(|| session.pump()), 1);
        }
    }
}
