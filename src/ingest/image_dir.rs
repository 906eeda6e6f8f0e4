//! Still-image directory source.
//!
//! Plays back the JPEG and PNG files of a local directory in file name
//! order, optionally looping. A file that fails to decode is reported as an
//! error for that frame and skipped on the next call.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Clone, Debug)]
pub struct ImageDirConfig {
    pub path: PathBuf,
    /// Start over after the last image instead of ending.
    pub loop_playback: bool,
}

pub struct ImageDirSource {
    config: ImageDirConfig,
    files: Vec<PathBuf>,
    cursor: usize,
    frames_captured: u64,
}

impl ImageDirSource {
    pub fn new(config: ImageDirConfig) -> Self {
        Self {
            config,
            files: Vec::new(),
            cursor: 0,
            frames_captured: 0,
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Reads one image file into an RGB frame.
pub fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode image {}", path.display()))?;
    Ok(Frame::from_rgb_image(image.to_rgb8()))
}

impl FrameSource for ImageDirSource {
    fn connect(&mut self) -> Result<()> {
        let dir = &self.config.path;
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read image directory {}", dir.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();
        if files.is_empty() {
            return Err(anyhow!("no JPEG or PNG images in {}", dir.display()));
        }

        log::info!(
            "ImageDirSource: {} images in {}{}",
            files.len(),
            dir.display(),
            if self.config.loop_playback { " (looping)" } else { "" }
        );
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.files.is_empty() {
            return Err(anyhow!("image directory source not connected"));
        }
        if self.cursor >= self.files.len() {
            if !self.config.loop_playback {
                return Ok(None);
            }
            self.cursor = 0;
        }

        let path = &self.files[self.cursor];
        self.cursor += 1;
        let frame = load_frame(path)?;
        self.frames_captured += 1;
        Ok(Some(frame))
    }

    fn is_healthy(&self) -> bool {
        !self.files.is_empty()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            url: self.config.path.display().to_string(),
        }
    }
}
