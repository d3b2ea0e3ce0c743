/// Texture decoding with the `image` crate
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use penumbra_core::{TextureError, TextureImage, TextureLoader};

/// Decodes image files to RGBA8. Each path is decoded once; later requests
/// for the same file reuse the decoded image.
#[derive(Debug, Default)]
pub struct ImageTextureLoader {
    cache: HashMap<PathBuf, TextureImage>,
}

impl ImageTextureLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl TextureLoader for ImageTextureLoader {
    fn load(&mut self, path: &Path) -> Result<TextureImage, TextureError> {
        if let Some(image) = self.cache.get(path) {
            return Ok(image.clone());
        }

        let rgba = image::open(path)
            .map_err(|error| match error {
                image::ImageError::IoError(source) => TextureError::Read {
                    path: path.display().to_string(),
                    reason: source.to_string(),
                },
                other => TextureError::Decode {
                    path: path.display().to_string(),
                    reason: other.to_string(),
                },
            })?
            .to_rgba8();

        let (width, height) = rgba.dimensions();
        let image = TextureImage::new(width, height, rgba.into_raw())?;
        log::debug!("decoded {} ({}x{})", path.display(), width, height);

        self.cache.insert(path.to_path_buf(), image.clone());
        Ok(image)
    }
}
