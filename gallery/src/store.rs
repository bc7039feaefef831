use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use tracing::{debug, error, warn};

use crate::metric::DistanceMetric;
use crate::persist;
use crate::record::{IdentityRecord, UNKNOWN_NAME};
use crate::GalleryError;

/// Nearest gallery entry for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub record: IdentityRecord,

    /// Distance under the gallery's metric. Lower is closer.
    pub distance: f64,
}

impl Match {
    pub fn name(&self) -> &str {
        self.record.name()
    }
}

/// Outcome of a thresholded lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Identification {
    /// The nearest identity is within the gallery threshold.
    Known(Match),
    /// An identity was nearest but too far away to be accepted.
    Unknown { nearest: Match },
    /// The gallery has no identities.
    Empty,
}

impl Identification {
    /// Name to show to a user. Rejected and empty lookups both read as
    /// [`UNKNOWN_NAME`] so the two cannot be told apart.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Known(m) => m.name(),
            Self::Unknown { .. } | Self::Empty => UNKNOWN_NAME,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// Returns the accepted match, if any.
    pub fn known(&self) -> Option<&Match> {
        match self {
            Self::Known(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the nearest identity whether or not it was accepted.
    pub fn nearest(&self) -> Option<&Match> {
        match self {
            Self::Known(m) | Self::Unknown { nearest: m } => Some(m),
            Self::Empty => None,
        }
    }
}

/// Checks a vector against a gallery dimension: exact length, finite
/// components.
pub(crate) fn validate_vector(dim: usize, v: &[f32]) -> Result<(), GalleryError> {
    if v.len() != dim {
        return Err(GalleryError::invalid_vector(format!(
            "length {} does not match gallery dimension {dim}",
            v.len()
        )));
    }
    if let Some(i) = v.iter().position(|x| !x.is_finite()) {
        return Err(GalleryError::invalid_vector(format!(
            "component {i} is not finite ({})",
            v[i]
        )));
    }
    Ok(())
}

struct StoreInner {
    records: HashMap<String, IdentityRecord>,
    autosave: bool,
}

/// One named gallery of enrolled identities.
///
/// Thread-safe: lookups take a shared lock and see a consistent snapshot;
/// mutations are serialized. File I/O is serialized by its own lock, which
/// is always taken before the record lock, so a save never overlaps a load.
///
/// Every mutation is written to disk before it returns unless autosave is
/// off (see [`IdentityStore::set_autosave`]).
pub struct IdentityStore {
    id: String,
    dim: usize,
    metric: DistanceMetric,
    path: Option<PathBuf>,
    io: Mutex<()>,
    inner: RwLock<StoreInner>,
}

impl IdentityStore {
    /// Opens the gallery stored as `gallery_<id>.json` under `dir`.
    ///
    /// A missing, unreadable or mismatching file is logged and the store
    /// starts empty.
    pub fn open(
        dir: impl AsRef<Path>,
        id: &str,
        dim: usize,
        metric: DistanceMetric,
    ) -> Result<Self, GalleryError> {
        check_id(id)?;
        let path = dir.as_ref().join(Self::file_name(id));
        Self::open_path(path, id, dim, metric)
    }

    /// Like [`IdentityStore::open`] with an explicit file path.
    pub fn open_path(
        path: impl Into<PathBuf>,
        id: &str,
        dim: usize,
        metric: DistanceMetric,
    ) -> Result<Self, GalleryError> {
        let store = Self::build(Some(path.into()), id, dim, metric)?;
        let exists = store.path.as_deref().is_some_and(Path::exists);
        match store.load_database() {
            Ok(n) => debug!(gallery = %store.id, records = n, "gallery loaded"),
            Err(e) if !exists => {
                debug!(gallery = %store.id, error = %e, "no gallery file, starting empty")
            }
            Err(e) => {
                warn!(gallery = %store.id, error = %e, "failed to load gallery, starting empty")
            }
        }
        Ok(store)
    }

    /// Creates a gallery without a backing file. Save and load are no-ops.
    pub fn in_memory(id: &str, dim: usize, metric: DistanceMetric) -> Result<Self, GalleryError> {
        Self::build(None, id, dim, metric)
    }

    fn build(
        path: Option<PathBuf>,
        id: &str,
        dim: usize,
        metric: DistanceMetric,
    ) -> Result<Self, GalleryError> {
        check_id(id)?;
        if dim == 0 {
            return Err(GalleryError::Configuration(format!(
                "gallery {id:?}: vector length must be positive"
            )));
        }
        Ok(Self {
            id: id.to_string(),
            dim,
            metric,
            path,
            io: Mutex::new(()),
            inner: RwLock::new(StoreInner {
                records: HashMap::new(),
                autosave: true,
            }),
        })
    }

    /// File name used by [`IdentityStore::open`] for a gallery id.
    pub fn file_name(id: &str) -> String {
        format!("gallery_{id}.json")
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Embedding length every vector in this gallery must have.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Backing file, or `None` for in-memory galleries.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Turns per-mutation saving on or off. With autosave off, call
    /// [`IdentityStore::save_database`] after a batch of changes.
    pub fn set_autosave(&self, on: bool) {
        self.inner.write().autosave = on;
    }

    pub fn autosave(&self) -> bool {
        self.inner.read().autosave
    }

    /// Enrolls a vector under `record`'s name.
    ///
    /// A new name is stored with weight 1. An existing name has the vector
    /// folded in (see [`IdentityRecord`] correction) and its weight bumped.
    /// Returns the record as stored.
    ///
    /// On a save failure the change stays applied in memory and the error is
    /// returned.
    pub fn add_record(&self, record: IdentityRecord) -> Result<IdentityRecord, GalleryError> {
        self.validate_record(&record)?;

        let _io = self.io.lock();
        let mut inner = self.inner.write();
        let stored = match inner.records.entry(record.name.clone()) {
            Entry::Occupied(mut e) => {
                let mut corrected = e.get().clone();
                corrected.correct(&record.vector)?;
                self.validate_record(&corrected)?;
                e.insert(corrected.clone());
                corrected
            }
            Entry::Vacant(e) => {
                let mut record = record;
                record.weight = 1;
                e.insert(record).clone()
            }
        };
        self.persist_after_write(inner)?;
        Ok(stored)
    }

    /// Stores `record` as given, replacing any existing entry for the name.
    pub fn force_add_record(&self, record: IdentityRecord) -> Result<(), GalleryError> {
        self.validate_record(&record)?;

        let _io = self.io.lock();
        let mut inner = self.inner.write();
        inner.records.insert(record.name.clone(), record);
        self.persist_after_write(inner)
    }

    /// Removes `name`. Removing an absent name is not an error.
    /// Returns whether a record was removed.
    pub fn remove_record(&self, name: &str) -> Result<bool, GalleryError> {
        let _io = self.io.lock();
        let mut inner = self.inner.write();
        let removed = inner.records.remove(name).is_some();
        self.persist_after_write(inner)?;
        Ok(removed)
    }

    pub fn get_record(&self, name: &str) -> Option<IdentityRecord> {
        self.inner.read().records.get(name).cloned()
    }

    pub fn get_vector(&self, name: &str) -> Option<Vec<f32>> {
        self.inner.read().records.get(name).map(|r| r.vector.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().records.contains_key(name)
    }

    /// Names of all enrolled identities, in no particular order.
    pub fn list_names(&self) -> Vec<String> {
        self.inner.read().records.keys().cloned().collect()
    }

    /// Snapshot of all records, in no particular order.
    pub fn records(&self) -> Vec<IdentityRecord> {
        self.inner.read().records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the record nearest to `vector` by linear scan, or `None` if
    /// the gallery is empty.
    ///
    /// Ties keep the first record reached: a later record replaces the
    /// incumbent only with a strictly smaller distance. Records whose
    /// distance is NaN never win.
    pub fn find_closest(&self, vector: &[f32]) -> Result<Option<Match>, GalleryError> {
        validate_vector(self.dim, vector)?;
        self.metric.check_operand(vector)?;
        let query = self.metric.normalize(vector);

        let inner = self.inner.read();
        let mut min = f64::MAX;
        let mut best: Option<&IdentityRecord> = None;
        for record in inner.records.values() {
            let d = self
                .metric
                .distance(&query, &self.metric.normalize(&record.vector))?;
            if d < min {
                min = d;
                best = Some(record);
            }
        }

        Ok(best.map(|record| Match {
            record: record.clone(),
            distance: min,
        }))
    }

    /// Nearest-identity lookup gated by the gallery threshold.
    pub fn find_closest_with_threshold(
        &self,
        vector: &[f32],
    ) -> Result<Identification, GalleryError> {
        Ok(match self.find_closest(vector)? {
            None => Identification::Empty,
            Some(m) if self.metric.accepts(m.distance) => Identification::Known(m),
            Some(m) => Identification::Unknown { nearest: m },
        })
    }

    /// Writes the whole gallery to its backing file.
    pub fn save_database(&self) -> Result<(), GalleryError> {
        let _io = self.io.lock();
        let inner = self.inner.read();
        self.persist(&inner.records)
    }

    /// Replaces the in-memory gallery with the contents of the backing file.
    ///
    /// Returns the number of records loaded. On any failure (missing file,
    /// I/O error, malformed document, `Id` or `VectorLength` mismatch,
    /// invalid record) nothing in memory changes.
    pub fn load_database(&self) -> Result<usize, GalleryError> {
        let Some(path) = &self.path else {
            return Ok(0);
        };

        let _io = self.io.lock();
        let data = persist::read_file(path)?;
        let records = persist::decode(&data, &self.id, self.dim)?;
        let n = records.len();
        self.inner.write().records = records;
        Ok(n)
    }

    /// Replaces all records with a gallery document held in memory, such
    /// as a bundled sample gallery. The document header must match this
    /// gallery exactly. Persists on success.
    pub fn import_database(&self, data: &[u8]) -> Result<usize, GalleryError> {
        let records = persist::decode(data, &self.id, self.dim)?;
        let n = records.len();

        let _io = self.io.lock();
        let mut inner = self.inner.write();
        inner.records = records;
        self.persist_after_write(inner)?;
        debug!(gallery = %self.id, records = n, "gallery imported");
        Ok(n)
    }

    /// Serializes the gallery to bytes in the file format.
    pub fn export_database(&self) -> Result<Vec<u8>, GalleryError> {
        let inner = self.inner.read();
        persist::encode(&self.id, self.dim, &inner.records)
    }

    /// Deletes the backing file and forgets every record.
    ///
    /// If the file exists and cannot be deleted, the error is returned and
    /// the in-memory gallery is kept.
    pub fn clear(&self) -> Result<(), GalleryError> {
        let _io = self.io.lock();
        let mut inner = self.inner.write();
        if let Some(path) = self.path.as_deref().filter(|p| p.exists()) {
            std::fs::remove_file(path).map_err(|e| {
                error!(gallery = %self.id, error = %e, "cannot remove gallery file");
                GalleryError::Persistence(format!("remove {}: {e}", path.display()))
            })?;
            debug!(gallery = %self.id, "gallery file removed");
        }
        inner.records.clear();
        Ok(())
    }

    fn validate_record(&self, record: &IdentityRecord) -> Result<(), GalleryError> {
        if record.name.is_empty() || record.name == UNKNOWN_NAME {
            return Err(GalleryError::InvalidName(record.name.clone()));
        }
        validate_vector(self.dim, &record.vector)?;
        self.metric.check_operand(&record.vector)

    }

    /// Saves after a mutation if autosave is on. The write guard is
    /// downgraded so lookups can proceed while the file is written; the
    /// caller's I/O lock keeps other writers out.
    fn persist_after_write(
        &self,
        inner: RwLockWriteGuard<'_, StoreInner>,
    ) -> Result<(), GalleryError> {
        let inner = RwLockWriteGuard::downgrade(inner);
        if !inner.autosave {
            return Ok(());
        }
        self.persist(&inner.records)
    }

    fn persist(&self, records: &HashMap<String, IdentityRecord>) -> Result<(), GalleryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = persist::encode(&self.id, self.dim, records)?;
        if let Err(e) = persist::write_file(path, &data) {
            error!(gallery = %self.id, error = %e, "cannot save gallery");
            return Err(e);
        }
        debug!(gallery = %self.id, records = records.len(), "gallery saved");
        Ok(())
    }
}

fn check_id(id: &str) -> Result<(), GalleryError> {
    if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
        return Err(GalleryError::Configuration(format!(
            "invalid gallery id {id:?}"
        )));
    }
    Ok(())
}
