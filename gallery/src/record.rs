use std::fmt;

use serde::{Deserialize, Serialize};

use crate::GalleryError;

/// Placeholder name reported when no enrolled identity is close enough.
/// It can never be enrolled.
pub const UNKNOWN_NAME: &str = "Unknown";

/// One enrolled identity.
///
/// Field names on the wire are `username`, `vector` and `weight`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(rename = "username")]
    pub(crate) name: String,

    pub(crate) vector: Vec<f32>,

    /// Number of vectors folded into `vector`. Older files omit it.
    #[serde(default = "default_weight")]
    pub(crate) weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl IdentityRecord {
    /// Creates a fresh record with weight 1.
    pub fn new(name: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            vector,
            weight: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn into_vector(self) -> Vec<f32> {
        self.vector
    }

    /// Folds `incoming` into the stored vector and bumps the weight.
    ///
    /// Per component: `new = (old * weight + incoming) / weight + 1`.
    /// Note this is not a running mean, which would divide by `weight + 1`.
    ///
    /// The record is left untouched when the result would not be finite.
    pub(crate) fn correct(&mut self, incoming: &[f32]) -> Result<(), GalleryError> {
        if incoming.len() != self.vector.len() {
            return Err(GalleryError::DimensionMismatch {
                expected: self.vector.len(),
                got: incoming.len(),
            });
        }
        let w = self.weight as f32;
        let corrected: Vec<f32> = self
            .vector
            .iter()
            .zip(incoming)
            .map(|(&old, &new)| (old * w + new) / w + 1.0)
            .collect();
        if let Some(i) = corrected.iter().position(|x| !x.is_finite()) {
            return Err(GalleryError::invalid_vector(format!(
                "correction of {:?} overflows at component {i}",
                self.name
            )));
        }
        self.vector = corrected;
        self.weight = self.weight.saturating_add(1);
        Ok(())
    }
}

impl fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("vector_len", &self.vector.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_has_weight_one() {
        let r = IdentityRecord::new("alice", vec![1.0, 2.0]);
        assert_eq!(r.name(), "alice");
        assert_eq!(r.vector(), &[1.0, 2.0]);
        assert_eq!(r.weight(), 1);
    }

    #[test]
    fn correction_formula() {
        let mut r = IdentityRecord::new("a", vec![2.0]);
        r.correct(&[4.0]).unwrap();
        assert_eq!(r.vector(), &[7.0]);
        assert_eq!(r.weight(), 2);

        // (7 * 2 + 1) / 2 + 1 = 8.5
        r.correct(&[1.0]).unwrap();
        assert_eq!(r.vector(), &[8.5]);
        assert_eq!(r.weight(), 3);
    }

    #[test]
    fn correction_length_mismatch() {
        let mut r = IdentityRecord::new("a", vec![2.0, 3.0]);
        assert!(r.correct(&[4.0]).is_err());
        assert_eq!(r.vector(), &[2.0, 3.0]);
        assert_eq!(r.weight(), 1);
    }

    #[test]
    fn correction_overflow_keeps_record() {
        let mut r = IdentityRecord::new("big", vec![3e38, 0.0]);
        let err = r.correct(&[3e38, 0.0]).unwrap_err();
        assert!(matches!(err, GalleryError::InvalidVector { .. }), "{err}");
        assert_eq!(r.vector(), &[3e38, 0.0]);
        assert_eq!(r.weight(), 1);
    }

    #[test]
    fn wire_format() {
        let r = IdentityRecord::new("bob", vec![0.5]);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"username":"bob","vector":[0.5],"weight":1}"#);
    }

    #[test]
    fn missing_weight_defaults_to_one() {
        let r: IdentityRecord = serde_json::from_str(r#"{"username":"x","vector":[1.0]}"#).unwrap();
        assert_eq!(r.weight(), 1);
    }

    #[test]
    fn debug_hides_vector() {
        let r = IdentityRecord::new("c", vec![0.0; 128]);
        let s = format!("{r:?}");
        assert!(s.contains("vector_len: 128"));
    }
}
