//! Encoded image decoding into BGRA pixels
//!
//! Decoding goes through an [`ImageCodec`]; the default one is backed by the
//! `image` crate. [`PixelDecoder`] turns the codec's output into tightly
//! packed BGRA rows written into a caller-owned [`ScratchBuffer`].

use std::io::Cursor;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ScratchBuffer;
use crate::graphics::{ColorFormat, ColorSpace};
use crate::runtime::{InitOutcome, RuntimeFlag, ShutdownOutcome};

/// Errors that can occur while decoding an encoded frame
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// Nothing to decode
    #[error("no encoded data to decode")]
    EmptyInput,
    /// The codec could not parse the data
    #[error("failed to read image from buffer: {0}")]
    Read(String),
    /// The image parsed but its pixels could not be exported
    #[error("failed to export pixel data: {0}")]
    Export(String),
}

/// Upper bounds applied to every decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecLimits {
    /// Largest accepted width or height in pixels
    #[serde(rename = "maxDimension")]
    pub max_dimension: u32,
    /// Largest allocation the codec may make, in bytes
    #[serde(rename = "maxAllocBytes")]
    pub max_alloc_bytes: u64,
}

impl CodecLimits {
    pub const DEFAULT: Self = Self {
        max_dimension: 16384,
        max_alloc_bytes: 1024 * 1024 * 1024,
    };
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

static CODEC_RUNTIME: RuntimeFlag = RuntimeFlag::new("image codec");
static CODEC_LIMITS: RwLock<CodecLimits> = RwLock::new(CodecLimits::DEFAULT);

/// Set up the codec runtime for the process.
pub fn initialize(limits: CodecLimits) -> InitOutcome {
    let outcome = CODEC_RUNTIME.initialize();
    if outcome == InitOutcome::Initialized {
        if let Ok(mut current) = CODEC_LIMITS.write() {
            *current = limits;
        }
        tracing::info!(
            "Image codec limits: {}px max side, {} bytes max allocation",
            limits.max_dimension,
            limits.max_alloc_bytes
        );
    }
    outcome
}

/// Tear down the codec runtime, restoring default limits.
pub fn shutdown() -> ShutdownOutcome {
    let outcome = CODEC_RUNTIME.shutdown();
    if outcome == ShutdownOutcome::ShutDown {
        if let Ok(mut current) = CODEC_LIMITS.write() {
            *current = CodecLimits::DEFAULT;
        }
    }
    outcome
}

/// Limits currently in effect.
pub fn current_limits() -> CodecLimits {
    CODEC_LIMITS
        .read()
        .map(|limits| *limits)
        .unwrap_or(CodecLimits::DEFAULT)
}

/// Parses encoded image bytes into RGBA pixels.
pub trait ImageCodec {
    fn read(&self, encoded: &[u8]) -> Result<image::RgbaImage, DecodeError>;
}

/// [`ImageCodec`] backed by the `image` crate, guessing the format from content.
#[derive(Debug, Clone, Default)]
pub struct ImageCrateCodec {
    /// Overrides the runtime limits when set
    limits: Option<CodecLimits>,
}

impl ImageCrateCodec {
    pub fn with_limits(limits: CodecLimits) -> Self {
        Self {
            limits: Some(limits),
        }
    }
}

impl ImageCodec for ImageCrateCodec {
    fn read(&self, encoded: &[u8]) -> Result<image::RgbaImage, DecodeError> {
        let configured = self.limits.unwrap_or_else(current_limits);
        let mut limits = image::Limits::default();
        limits.max_image_width = Some(configured.max_dimension);
        limits.max_image_height = Some(configured.max_dimension);
        limits.max_alloc = Some(configured.max_alloc_bytes);

        let mut reader = image::ImageReader::new(Cursor::new(encoded))
            .with_guessed_format()
            .map_err(|e| DecodeError::Read(e.to_string()))?;
        reader.limits(limits);

        let decoded = reader
            .decode()
            .map_err(|e| DecodeError::Read(e.to_string()))?;
        Ok(decoded.to_rgba8())
    }
}

/// Description of the frame left in the scratch buffer by a successful decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: ColorFormat,
    pub color_space: ColorSpace,
}

/// Decodes encoded frames into BGRA scratch storage.
#[derive(Debug, Clone, Default)]
pub struct PixelDecoder<C = ImageCrateCodec> {
    codec: C,
}

impl<C: ImageCodec> PixelDecoder<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }

    /// Decode `encoded` into `scratch` as BGRA.
    ///
    /// The scratch allocation is reused when it can hold `width * height * 4`
    /// bytes. On error the scratch holds no frame.
    pub fn decode(
        &self,
        encoded: &[u8],
        scratch: &mut ScratchBuffer,
    ) -> Result<DecodedImage, DecodeError> {
        scratch.invalidate();
        if encoded.is_empty() {
            return Err(DecodeError::EmptyInput);
        }

        tracing::debug!("Decoding {} byte encoded frame", encoded.len());
        let rgba = self.codec.read(encoded)?;

        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::Export(format!("image has no pixels ({}x{})", width, height)));
        }

        let required = width as usize * height as usize * ColorFormat::Bgra.bytes_per_pixel();
        let source = rgba.as_raw();
        if source.len() != required {
            return Err(DecodeError::Export(format!(
                "codec produced {} bytes for {}x{}, expected {}",
                source.len(),
                width,
                height,
                required
            )));
        }

        let out = scratch.prepare(required);
        for (dst, src) in out.chunks_exact_mut(4).zip(source.chunks_exact(4)) {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
            dst[3] = src[3];
        }

        Ok(DecodedImage {
            width,
            height,
            format: ColorFormat::Bgra,
            color_space: ColorSpace::Srgb,
        })
    }
}
