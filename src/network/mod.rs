//! Frame transport from publishers to sources
//!
//! Frames arrive over a local channel as either raw BGRA pixels or an encoded
//! image. A [`FrameSubscriber`] hands the newest frame to the render thread.

mod channel;
mod frame;
mod subscriber;
pub mod transport;
pub mod wire;

#[cfg(test)]
pub(crate) mod scripted;

pub use channel::{ChannelDirectory, ChannelEntry};
pub use frame::{FrameEncoding, PipeFrame};
pub use subscriber::{BindError, FrameSubscriber, TcpSubscriber};
pub use wire::WireError;
