use std::path::{Path, PathBuf};

use image::GrayImage;
use log::debug;

use crate::errors::{CliError, Result};

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Image files of a recorded sequence, ordered by file name.
#[derive(Debug, Clone)]
pub struct ImageSequence {
    frames: Vec<PathBuf>,
    frame_rate: f64,
}

impl ImageSequence {
    pub fn open<P: AsRef<Path>>(dir: P, frame_rate: f64) -> Result<Self> {
        let dir = dir.as_ref();
        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if path.is_file() && is_image {
                frames.push(path);
            }
        }
        if frames.is_empty() {
            return Err(CliError::EmptySequence(dir.display().to_string()));
        }
        frames.sort();
        debug!("Found {} frames in {}", frames.len(), dir.display());
        Ok(Self { frames, frame_rate })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn truncate(&mut self, max: usize) {
        self.frames.truncate(max);
    }

    /// Timestamp of frame `index`, in seconds.
    pub fn timestamp(&self, index: usize) -> f64 {
        index as f64 / self.frame_rate
    }

    pub fn load(&self, index: usize) -> Result<GrayImage> {
        Ok(image::open(&self.frames[index])?.to_luma8())
    }
}
