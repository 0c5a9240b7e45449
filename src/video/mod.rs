//! Frame decoding and CPU-side frame storage
//!
//! Received frames end up in an [`ImageBuffer`], either decoded from an
//! encoded image through [`PixelDecoder`] or referenced as raw BGRA pixels.

pub mod decoder;
mod image_buffer;
mod scratch;

pub use decoder::{CodecLimits, DecodeError, DecodedImage, ImageCodec, ImageCrateCodec, PixelDecoder};
pub use image_buffer::{ImageBuffer, LoadError};
pub use scratch::{AllocationCounter, ScratchBuffer};
