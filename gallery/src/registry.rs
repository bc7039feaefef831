//! Process-wide gallery registry: one [`IdentityStore`] per model name.
//!
//! Construct one [`GalleryRegistry`] at startup and share it by `Arc`.
//! Tests build their own isolated registries.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::GalleryConfig;
use crate::store::IdentityStore;
use crate::GalleryError;

pub struct GalleryRegistry {
    config: GalleryConfig,
    galleries: Mutex<HashMap<String, Arc<IdentityStore>>>,
}

impl GalleryRegistry {
    pub fn new(config: GalleryConfig) -> Self {
        Self {
            config,
            galleries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    /// Returns the gallery for `model`, opening it on first use.
    ///
    /// `dim` is the embedding length the model produces. Fails with
    /// [`GalleryError::Configuration`] when `model` has no metric configured,
    /// and with [`GalleryError::DimensionMismatch`] when `dim` disagrees with
    /// the configured or already-open gallery.
    pub fn get_or_create(
        &self,
        model: &str,
        dim: usize,
    ) -> Result<Arc<IdentityStore>, GalleryError> {
        let mut galleries = self.galleries.lock();
        if let Some(store) = galleries.get(model) {
            if store.dim() != dim {
                return Err(GalleryError::DimensionMismatch {
                    expected: store.dim(),
                    got: dim,
                });
            }
            return Ok(Arc::clone(store));
        }

        let metric = self.config.metric_for(model)?;
        if let Some(expected) = self.config.model(model).and_then(|m| m.dim) {
            if expected != dim {
                return Err(GalleryError::DimensionMismatch { expected, got: dim });
            }
        }

        let store = match &self.config.data_dir {
            Some(dir) => IdentityStore::open(dir, model, dim, metric)?,
            None => IdentityStore::in_memory(model, dim, metric)?,
        };
        debug!(
            gallery = model,
            dim,
            metric = %metric.metric(),
            records = store.len(),
            "gallery opened"
        );

        let store = Arc::new(store);
        galleries.insert(model.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Returns an already-open gallery.
    pub fn get(&self, model: &str) -> Option<Arc<IdentityStore>> {
        self.galleries.lock().get(model).cloned()
    }

    /// Names of the open galleries.
    pub fn names(&self) -> Vec<String> {
        self.galleries.lock().keys().cloned().collect()
    }

    /// Forgets the gallery for `model` without touching its data. Handles
    /// held elsewhere stay usable.
    pub fn remove(&self, model: &str) -> Option<Arc<IdentityStore>> {
        self.galleries.lock().remove(model)
    }

    /// Wipes the gallery for `model` (records and backing file) and forgets
    /// it. Returns false if it was not open.
    pub fn purge(&self, model: &str) -> Result<bool, GalleryError> {
        let mut galleries = self.galleries.lock();
        let Some(store) = galleries.get(model) else {
            return Ok(false);
        };
        store.clear()?;
        galleries.remove(model);
        debug!(gallery = model, "gallery purged");
        Ok(true)
    }

    /// Forgets every gallery. Data on disk is kept.
    pub fn clear_all(&self) {
        self.galleries.lock().clear();
    }
}
