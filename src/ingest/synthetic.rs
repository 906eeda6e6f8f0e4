//! Synthetic `stub://` frame source.
//!
//! Produces a deterministic scene: a slowly shifting gradient background
//! with a bright block that moves one step per frame. Frame `n` is the same
//! on every run.

use anyhow::{anyhow, Result};

use super::{FrameSource, SourceStats};
use crate::frame::{Frame, PixelFormat};

pub(crate) const SCHEME: &str = "stub://";

const BLOCK_SIZE: u32 = 32;
const BLOCK_STEP: u32 = 4;
/// Largest side accepted in a `stub://WxH` url.
pub const MAX_SIDE: u32 = 8192;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: SCHEME.to_string(),
            width: 640,
            height: 480,
        }
    }
}

impl SyntheticConfig {
    /// Parses `stub://` or `stub://WxH`.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(SCHEME)
            .ok_or_else(|| anyhow!("not a stub:// url: {}", url))?;
        let mut config = Self {
            url: url.to_string(),
            ..Self::default()
        };
        if rest.is_empty() {
            return Ok(config);
        }

        let (w, h) = rest
            .split_once('x')
            .ok_or_else(|| anyhow!("expected stub://WIDTHxHEIGHT, got {}", url))?;
        config.width = w
            .parse()
            .map_err(|_| anyhow!("invalid width in {}", url))?;
        config.height = h
            .parse()
            .map_err(|_| anyhow!("invalid height in {}", url))?;
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("stub source needs a non-zero size, got {}", url));
        }
        if config.width > MAX_SIDE || config.height > MAX_SIDE {
            return Err(anyhow!(
                "stub source sides are limited to {}, got {}",
                MAX_SIDE,
                url
            ));
        }
        PixelFormat::Rgb24.frame_len(config.width, config.height)?;
        Ok(config)
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn generate_pixels(&mut self, len: usize) -> Vec<u8> {
        let (width, height) = (self.config.width, self.config.height);
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; len];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 / 3 + self.frame_count + self.scene_state as u64) % 128) as u8;
        }

        let travel = width.saturating_sub(BLOCK_SIZE).max(1);
        let block_x = (self.frame_count as u32).wrapping_mul(BLOCK_STEP) % travel;
        let block_y = height.saturating_sub(BLOCK_SIZE) / 2;
        for y in block_y..(block_y + BLOCK_SIZE).min(height) {
            for x in block_x..(block_x + BLOCK_SIZE).min(width) {
                let offset = (y as usize * width as usize + x as usize) * 3;
                pixels[offset..offset + 3].copy_from_slice(&[250, 250, 250]);
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.url,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let len = PixelFormat::Rgb24.frame_len(self.config.width, self.config.height)?;
        self.frame_count += 1;
        let pixels = self.generate_pixels(len);
        Ok(Some(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            PixelFormat::Rgb24,
        )))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
