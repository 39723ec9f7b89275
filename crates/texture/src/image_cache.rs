use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::raster::{Raster, TextureError};

/// Decoded static images (masks, gradients, base art) keyed by file name.
///
/// Owned by the appearance subsystem and passed by reference to compositing.
/// Names that failed to load are remembered and not retried until
/// [`clear_failures`](Self::clear_failures).
#[derive(Debug, Default)]
pub struct ImageCache {
    root: Option<PathBuf>,
    images: BTreeMap<String, Raster>,
    failed: BTreeSet<String>,
}

impl ImageCache {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    pub fn root(&self) -> Option<&PathBuf> {
        self.root.as_ref()
    }

    /// Register an already decoded image, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, raster: Raster) {
        let name = name.into();
        self.failed.remove(&name);
        self.images.insert(name, raster);
    }

    pub fn get(&self, name: &str) -> Option<&Raster> {
        self.images.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Return a cached image, decoding it from the image root on first use.
    pub fn load(&mut self, name: &str) -> Result<&Raster, TextureError> {
        if self.images.contains_key(name) {
            return Ok(&self.images[name]);
        }
        if self.failed.contains(name) {
            return Err(TextureError::ImageNotFound(name.to_string()));
        }
        let Some(root) = &self.root else {
            self.failed.insert(name.to_string());
            return Err(TextureError::ImageNotFound(name.to_string()));
        };
        let path = root.join(name);
        if !path.is_file() {
            self.failed.insert(name.to_string());
            return Err(TextureError::ImageNotFound(name.to_string()));
        }
        match Raster::load(&path) {
            Ok(raster) => {
                tracing::debug!(image = name, width = raster.width(), height = raster.height(), "static image loaded");
                Ok(self.images.entry(name.to_string()).or_insert(raster))
            }
            Err(e) => {
                self.failed.insert(name.to_string());
                Err(e)
            }
        }
    }

    /// Load every name, returning the failures. Failures are logged, not fatal.
    pub fn preload<'a>(
        &mut self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Vec<(String, TextureError)> {
        let mut errors = Vec::new();
        for name in names {
            if let Err(e) = self.load(name) {
                tracing::warn!(image = name, error = %e, "static image unavailable");
                errors.push((name.to_string(), e));
            }
        }
        errors
    }

    pub fn clear_failures(&mut self) {
        self.failed.clear();
    }
}
