//! Frame sources.
//!
//! - `stub://` synthetic scenes (tests, demos)
//! - directories of still images (JPEG/PNG), played back in name order
//!
//! Sources only decode and hand over frames. They never touch the detector
//! and keep no frame after handing it over.

pub mod image_dir;
pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use image_dir::{ImageDirConfig, ImageDirSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// A producer of decoded frames.
pub trait FrameSource {
    /// Prepare the source. Called once before the first frame.
    fn connect(&mut self) -> Result<()>;

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

/// Counters reported by a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// Opens the source named by `url`.
///
/// `stub://[WxH]` gives a synthetic scene; anything without a scheme is a
/// local image directory. Other schemes are rejected.
pub fn open_source(url: &str, loop_playback: bool) -> Result<Box<dyn FrameSource>> {
    let url = url.trim();
    if url.is_empty() {
        return Err(anyhow!("source url is empty"));
    }
    if url.starts_with(synthetic::SCHEME) {
        let config = SyntheticConfig::from_url(url)?;
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    if url.contains("://") {
        return Err(anyhow!(
            "unsupported source url {}: only stub:// and local image directories are supported",
            url
        ));
    }
    Ok(Box::new(ImageDirSource::new(ImageDirConfig {
        path: url.into(),
        loop_playback,
    })))
}
