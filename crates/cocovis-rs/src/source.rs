//! Where images referenced by annotations are read from.

use std::path::{Path, PathBuf};

use image::RgbImage;
use log::debug;

use crate::error::{Error, Result};

/// Resolves an image's `file_name` to RGB pixels.
pub trait ImageSource {
    fn load_image(&self, file_name: &str) -> Result<RgbImage>;
}

/// Reads images from disk, relative to `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct FsImageSource {
    root: Option<PathBuf>,
}

impl FsImageSource {
    pub fn new(root: Option<PathBuf>) -> Self {
        FsImageSource { root }
    }

    pub fn resolve(&self, file_name: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(file_name),
            None => Path::new(file_name).to_path_buf(),
        }
    }
}

impl ImageSource for FsImageSource {
    fn load_image(&self, file_name: &str) -> Result<RgbImage> {
        let path = self.resolve(file_name);
        debug!("loading image {}", path.display());
        let img = image::open(&path).map_err(|source| Error::Image {
            path: path.clone(),
            source,
        })?;
        Ok(img.to_rgb8())
    }
}
