//! Face-embedding galleries with metric-aware nearest-identity matching.
//!
//! A gallery maps identity names to embedding vectors of a fixed length and
//! answers "who is this?" by a linear scan under one of three metrics.
//! Galleries are small (tens to hundreds of identities), so there is no
//! index.
//!
//! # Usage
//!
//! ```
//! use facekit_gallery::{DistanceMetric, IdentityRecord, IdentityStore, Metric};
//!
//! let metric = DistanceMetric::new(Metric::Euclidean, 0.5).unwrap();
//! let store = IdentityStore::in_memory("facenet", 2, metric).unwrap();
//! store.add_record(IdentityRecord::new("alice", vec![0.0, 0.0])).unwrap();
//! store.add_record(IdentityRecord::new("bob", vec![10.0, 1.0])).unwrap();
//!
//! let id = store.find_closest_with_threshold(&[9.9, 1.0]).unwrap();
//! assert_eq!(id.display_name(), "bob");
//!
//! let id = store.find_closest_with_threshold(&[100.0, 100.0]).unwrap();
//! assert_eq!(id.display_name(), facekit_gallery::UNKNOWN_NAME);
//! ```
//!
//! # Persistence
//!
//! [`IdentityStore::open`] binds a gallery to `gallery_<id>.json` and
//! rewrites it after every mutation. See [`IdentityStore::set_autosave`]
//! for batching.
//!
//! # Registry
//!
//! [`GalleryRegistry`] hands out one shared store per model name using the
//! metric and threshold from a [`GalleryConfig`].

mod config;
mod error;
mod metric;
mod persist;
mod record;
mod registry;
mod store;
pub mod vector;

pub use config::{GalleryConfig, ModelConfig};
pub use error::GalleryError;
pub use metric::{DistanceMetric, Metric};
pub use record::{IdentityRecord, UNKNOWN_NAME};
pub use registry::GalleryRegistry;
pub use store::{Identification, IdentityStore, Match};
