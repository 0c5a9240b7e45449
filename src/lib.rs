//! Pipe Source
//!
//! A video source that shows frames published on a local pipe channel as a
//! live GPU texture. Frames arrive either as raw BGRA pixels or as encoded
//! images, are held in a CPU-side image buffer, and are uploaded to a texture
//! that the host draws as a full-size sprite.
//!
//! # Architecture
//!
//! ```text
//! subscriber ──► PipeFrame ──► ImageBuffer ──► texture ──► sprite draw
//!                   │              ▲
//!                   └─ encoded ────┘ PixelDecoder
//! ```

pub mod graphics;
pub mod module;
pub mod network;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod source;
pub mod telemetry;
pub mod video;

pub use graphics::{GraphicsDevice, GraphicsScope};
pub use module::PluginModule;
pub use network::{FrameSubscriber, PipeFrame, TcpSubscriber};
pub use session::FrameSourceSession;
pub use settings::{ModuleConfig, SourceSettings};
pub use source::{pipe_source_info, PipeSource, VideoSource, PIPE_SOURCE_ID};
pub use video::{ImageBuffer, PixelDecoder};
