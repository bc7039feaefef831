//! Gallery file codec.
//!
//! A gallery file is one JSON object:
//!
//! ```text
//! {
//!   "Id": "<gallery id>",
//!   "VectorLength": <D>,
//!   "UserRecords": "<JSON string of {name: {username, vector, weight}}>"
//! }
//! ```
//!
//! `UserRecords` is a string holding a second JSON document, not a nested
//! object. Readers check `Id` and `VectorLength` before touching it.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::record::IdentityRecord;
use crate::store::validate_vector;
use crate::GalleryError;

#[derive(Serialize, Deserialize)]
struct GalleryDocument {
    #[serde(rename = "Id")]
    id: String,

    #[serde(rename = "VectorLength")]
    vector_length: usize,

    #[serde(rename = "UserRecords")]
    user_records: String,
}

/// Serializes a gallery. Records are written in name order so that saving
/// an unchanged gallery yields identical bytes.
pub(crate) fn encode(
    id: &str,
    dim: usize,
    records: &HashMap<String, IdentityRecord>,
) -> Result<Vec<u8>, GalleryError> {
    let sorted: BTreeMap<&str, &IdentityRecord> =
        records.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let user_records = serde_json::to_string(&sorted)
        .map_err(|e| GalleryError::InvalidFormat(e.to_string()))?;
    let doc = GalleryDocument {
        id: id.to_string(),
        vector_length: dim,
        user_records,
    };
    serde_json::to_vec(&doc).map_err(|e| GalleryError::InvalidFormat(e.to_string()))
}

/// Parses a gallery and checks it against the expected header.
///
/// Every record must be keyed by its own name and carry a valid vector.
/// A stored weight of 0 is read as 1.
pub(crate) fn decode(
    data: &[u8],
    id: &str,
    dim: usize,
) -> Result<HashMap<String, IdentityRecord>, GalleryError> {
    let doc: GalleryDocument =
        serde_json::from_slice(data).map_err(|e| GalleryError::InvalidFormat(e.to_string()))?;

    if doc.id != id {
        return Err(GalleryError::HeaderMismatch {
            field: "Id",
            expected: id.to_string(),
            got: doc.id,
        });
    }
    if doc.vector_length != dim {
        return Err(GalleryError::HeaderMismatch {
            field: "VectorLength",
            expected: dim.to_string(),
            got: doc.vector_length.to_string(),
        });
    }

    let mut records: HashMap<String, IdentityRecord> = serde_json::from_str(&doc.user_records)
        .map_err(|e| GalleryError::InvalidFormat(format!("UserRecords: {e}")))?;

    for (key, record) in records.iter_mut() {
        if *key != record.name {
            return Err(GalleryError::InvalidFormat(format!(
                "record key {key:?} holds username {:?}",
                record.name
            )));
        }
        validate_vector(dim, &record.vector).map_err(|e| {
            GalleryError::InvalidFormat(format!("record {key:?}: {e}"))
        })?;
        if record.weight == 0 {
            record.weight = 1;
        }
    }

    Ok(records)
}

/// Writes `data` next to `path` and renames it into place.
pub(crate) fn write_file(path: &Path, data: &[u8]) -> Result<(), GalleryError> {
    let io_err = |e: std::io::Error| GalleryError::Persistence(format!("{}: {e}", path.display()));

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);

    let mut f = fs::File::create(tmp).map_err(io_err)?;
    f.write_all(data).map_err(io_err)?;
    f.sync_all().map_err(io_err)?;
    drop(f);

    fs::rename(tmp, path).map_err(io_err)
}

/// Reads a gallery file. A missing file is a persistence error like any
/// other I/O failure; callers decide how loud to be about it.
pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>, GalleryError> {
    fs::read(path).map_err(|e| GalleryError::Persistence(format!("{}: {e}", path.display())))
}
