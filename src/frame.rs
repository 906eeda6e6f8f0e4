//! Decoded video frames.
//!
//! - `PixelFormat`: native channel layout delivered by the frame source.
//! - `Frame`: owned pixel buffer plus dimensions and format.
//!
//! Frames are created by frame sources without validation so that a
//! truncated or zero-sized buffer reaches the encoder, which rejects it with
//! an `EncodingError`. Every consumer converts through `Frame::to_rgb_image`.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::error::EncodingError;

/// Native pixel layout of a decoded frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Rgba32,
    Bgra32,
    /// Y plane followed by interleaved UV at quarter resolution.
    Nv12,
}

impl PixelFormat {
    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "RGB24",
            PixelFormat::Bgr24 => "BGR24",
            PixelFormat::Rgba32 => "RGBA32",
            PixelFormat::Bgra32 => "BGRA32",
            PixelFormat::Nv12 => "NV12",
        }
    }

    /// Byte length of a `width x height` frame in this format.
    pub fn frame_len(self, width: u32, height: u32) -> Result<usize, EncodingError> {
        let overflow = || EncodingError::DimensionOverflow { width, height };
        let pixels = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(overflow)?;
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => pixels.checked_mul(3).ok_or_else(overflow),
            PixelFormat::Rgba32 | PixelFormat::Bgra32 => {
                pixels.checked_mul(4).ok_or_else(overflow)
            }
            PixelFormat::Nv12 => pixels.checked_add(pixels / 2).ok_or_else(overflow),
        }
    }
}

/// A decoded frame as handed over by a frame source.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    format: PixelFormat,
    capture_instant: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
            capture_instant: Instant::now(),
        }
    }

    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, PixelFormat::Rgb24)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Time since the source produced this frame.
    pub fn age(&self) -> Duration {
        self.capture_instant.elapsed()
    }

    /// Checks dimensions and buffer length against the pixel format.
    pub fn validate(&self) -> Result<(), EncodingError> {
        if self.width == 0 || self.height == 0 {
            return Err(EncodingError::ZeroSized {
                width: self.width,
                height: self.height,
            });
        }
        if self.format == PixelFormat::Nv12 && (self.width % 2 != 0 || self.height % 2 != 0) {
            return Err(EncodingError::OddNv12Dimensions {
                width: self.width,
                height: self.height,
            });
        }
        let expected = self.format.frame_len(self.width, self.height)?;
        if self.data.len() != expected {
            return Err(EncodingError::LengthMismatch {
                format: self.format.name(),
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    /// Converts to an RGB image, reordering channels as needed.
    pub fn to_rgb_image(&self) -> Result<RgbImage, EncodingError> {
        self.validate()?;
        let rgb = match self.format {
            PixelFormat::Rgb24 => self.data.clone(),
            PixelFormat::Bgr24 => reorder(&self.data, 3, [2, 1, 0]),
            PixelFormat::Rgba32 => reorder(&self.data, 4, [0, 1, 2]),
            PixelFormat::Bgra32 => reorder(&self.data, 4, [2, 1, 0]),
            PixelFormat::Nv12 => nv12_to_rgb(&self.data, self.width, self.height),
        };
        let expected = rgb.len();
        RgbImage::from_raw(self.width, self.height, rgb).ok_or(EncodingError::LengthMismatch {
            format: "RGB24",
            expected: self.width as usize * self.height as usize * 3,
            actual: expected,
        })
    }
}

fn reorder(pixels: &[u8], stride: usize, take: [usize; 3]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixels.len() / stride * 3);
    for px in pixels.chunks_exact(stride) {
        rgb.extend_from_slice(&[px[take[0]], px[take[1]], px[take[2]]]);
    }
    rgb
}

// BT.601 full range. Callers validate length and even dimensions first.
fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w * h;

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }

    rgb
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
