//! Host lifecycle surface for pipe sources

use crate::graphics::{ColorSpace, GraphicsDevice};
use crate::network::FrameSubscriber;
use crate::session::FrameSourceSession;
use crate::settings::{PropertyDesc, SourceSettings};
use crate::video::{ImageBuffer, ImageCodec, ImageCrateCodec};

/// Lifecycle callbacks a host drives on a video source.
///
/// Construction plays the role of "create" and dropping the value the role of
/// "destroy". All methods run on the host's render thread.
pub trait VideoSource {
    /// Host-provided draw context
    type Effect;

    fn update(&mut self, settings: &SourceSettings);
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn activate(&mut self) {}
    fn deactivate(&mut self) {}
    fn show(&mut self);
    fn hide(&mut self);
    fn video_tick(&mut self, seconds: f32);
    fn video_render(&mut self, effect: &Self::Effect);
    fn color_space(&self, preferred: &[ColorSpace]) -> ColorSpace;
}

/// What a source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFlags {
    pub video: bool,
    pub srgb: bool,
}

pub type SourceFactory<E> = Box<dyn Fn(&SourceSettings) -> Box<dyn VideoSource<Effect = E>>>;

/// Registration record for a source type.
pub struct SourceInfo<E> {
    pub id: &'static str,
    pub display_name: &'static str,
    pub output_flags: OutputFlags,
    factory: SourceFactory<E>,
}

impl<E> SourceInfo<E> {
    pub fn new(
        id: &'static str,
        display_name: &'static str,
        output_flags: OutputFlags,
        factory: SourceFactory<E>,
    ) -> Self {
        Self {
            id,
            display_name,
            output_flags,
            factory,
        }
    }

    pub fn properties(&self) -> Vec<PropertyDesc> {
        SourceSettings::properties()
    }

    pub fn defaults(&self) -> SourceSettings {
        SourceSettings::default()
    }

    pub fn create(&self, settings: &SourceSettings) -> Box<dyn VideoSource<Effect = E>> {
        (self.factory)(settings)
    }
}

pub const PIPE_SOURCE_ID: &str = "pipe_source";

/// Registration record for [`PipeSource`], building each instance's
/// subscriber and graphics device with the given constructors.
pub fn pipe_source_info<S, G, MS, MG>(make_subscriber: MS, make_graphics: MG) -> SourceInfo<G::Effect>
where
    S: FrameSubscriber + 'static,
    G: GraphicsDevice + 'static,
    MS: Fn() -> S + 'static,
    MG: Fn() -> G + 'static,
{
    SourceInfo::new(
        PIPE_SOURCE_ID,
        "Pipe Source",
        OutputFlags {
            video: true,
            srgb: true,
        },
        Box::new(move |settings: &SourceSettings| {
            Box::new(PipeSource::new(settings, make_subscriber(), make_graphics()))
                as Box<dyn VideoSource<Effect = G::Effect>>
        }),
    )
}

/// Video source showing frames received from a pipe channel.
pub struct PipeSource<S, G, C = ImageCrateCodec>
where
    S: FrameSubscriber,
    G: GraphicsDevice,
    C: ImageCodec,
{
    session: FrameSourceSession<S, G, C>,
}

impl<S, G> PipeSource<S, G, ImageCrateCodec>
where
    S: FrameSubscriber,
    G: GraphicsDevice,
{
    pub fn new(settings: &SourceSettings, subscriber: S, graphics: G) -> Self {
        Self::with_image_buffer(settings, subscriber, graphics, ImageBuffer::new())
    }
}

impl<S, G, C> PipeSource<S, G, C>
where
    S: FrameSubscriber,
    G: GraphicsDevice,
    C: ImageCodec,
{
    pub fn with_image_buffer(
        settings: &SourceSettings,
        subscriber: S,
        graphics: G,
        image: ImageBuffer<G::Texture, C>,
    ) -> Self {
        tracing::info!("Creating pipe source");
        let mut session = FrameSourceSession::with_image_buffer(subscriber, graphics, image);
        session.configure(&settings.channel_name, settings.persistent(), settings.linear_alpha);
        Self { session }
    }

    pub fn session(&self) -> &FrameSourceSession<S, G, C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut FrameSourceSession<S, G, C> {
        &mut self.session
    }
}

impl<S, G, C> VideoSource for PipeSource<S, G, C>
where
    S: FrameSubscriber,
    G: GraphicsDevice,
    C: ImageCodec,
{
    type Effect = G::Effect;

    fn update(&mut self, settings: &SourceSettings) {
        self.session
            .configure(&settings.channel_name, settings.persistent(), settings.linear_alpha);
    }

    fn width(&self) -> u32 {
        self.session.width()
    }

    fn height(&self) -> u32 {
        self.session.height()
    }

    fn activate(&mut self) {
        tracing::debug!("Pipe source '{}' activated", self.session.channel_name());
    }

    fn deactivate(&mut self) {
        tracing::debug!("Pipe source '{}' deactivated", self.session.channel_name());
    }

    fn show(&mut self) {
        self.session.show();
    }

    fn hide(&mut self) {
        self.session.hide();
    }

    fn video_tick(&mut self, seconds: f32) {
        self.session.tick(seconds);
    }

    fn video_render(&mut self, effect: &G::Effect) {
        self.session.render(effect);
    }

    fn color_space(&self, preferred: &[ColorSpace]) -> ColorSpace {
        self.session.color_space(preferred)
    }
}

impl<S, G, C> Drop for PipeSource<S, G, C>
where
    S: FrameSubscriber,
    G: GraphicsDevice,
    C: ImageCodec,
{
    fn drop(&mut self) {
        tracing::info!("Destroying pipe source '{}'", self.session.channel_name());
    }
}
