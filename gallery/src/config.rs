//! Per-model gallery configuration.
//!
//! ```yaml
//! data_dir: /var/lib/facekit
//! models:
//!   facenet:
//!     metric: EUCLIDEAN_NORM
//!     threshold: 1.1
//!   mobilefacenet:
//!     metric: COSINE
//!     threshold: 0.35
//!     dim: 192
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::metric::{DistanceMetric, Metric};
use crate::GalleryError;

/// Matching settings for one embedding model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub metric: Metric,

    /// Largest distance still accepted as a match.
    pub threshold: f64,

    /// Expected embedding length. Checked against the model when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<usize>,
}

/// Gallery settings for all models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GalleryConfig {
    /// Directory holding gallery files. In-memory galleries when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
}

impl GalleryConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self, GalleryError> {
        let cfg: Self =
            serde_yaml::from_str(s).map_err(|e| GalleryError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_str(s: &str) -> Result<Self, GalleryError> {
        let cfg: Self =
            serde_json::from_str(s).map_err(|e| GalleryError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads a `.yaml`, `.yml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GalleryError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| GalleryError::Configuration(format!("{}: {e}", path.display())))?;
        match path.extension().and_then(|s| s.to_str()).unwrap_or("") {
            "json" => Self::from_json_str(&data),
            "yaml" | "yml" => Self::from_yaml_str(&data),
            ext => Err(GalleryError::Configuration(format!(
                "{}: unsupported config extension {ext:?}",
                path.display()
            ))),
        }
    }

    /// Adds or replaces a model entry.
    pub fn with_model(mut self, name: &str, metric: Metric, threshold: f64) -> Self {
        self.models.insert(
            name.to_string(),
            ModelConfig {
                metric,
                threshold,
                dim: None,
            },
        );
        self
    }

    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    /// Returns the metric bound to `model`. A model without settings is a
    /// configuration error: there is no sensible default distance.
    pub fn metric_for(&self, model: &str) -> Result<DistanceMetric, GalleryError> {
        let m = self.models.get(model).ok_or_else(|| {
            GalleryError::Configuration(format!(
                "no metric/threshold configured for model {model:?}"
            ))
        })?;
        DistanceMetric::new(m.metric, m.threshold)
    }

    fn validate(&self) -> Result<(), GalleryError> {
        for (name, m) in &self.models {
            DistanceMetric::new(m.metric, m.threshold)
                .map_err(|e| GalleryError::Configuration(format!("model {name:?}: {e}")))?;
            if m.dim == Some(0) {
                return Err(GalleryError::Configuration(format!(
                    "model {name:?}: dim must be positive"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
data_dir: /tmp/galleries
models:
  facenet:
    metric: EUCLIDEAN_NORM
    threshold: 1.1
  mobile:
    metric: cosine
    threshold: 0.35
    dim: 192
"#;

    #[test]
    fn parse_yaml() {
        let cfg = GalleryConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(cfg.data_dir.as_deref(), Some(Path::new("/tmp/galleries")));
        let m = cfg.metric_for("facenet").unwrap();
        assert_eq!(m.metric(), Metric::EuclideanNorm);
        assert_eq!(m.threshold(), 1.1);
        assert_eq!(cfg.model("mobile").unwrap().dim, Some(192));
        assert_eq!(cfg.model("mobile").unwrap().metric, Metric::Cosine);
    }

    #[test]
    fn parse_json() {
        let cfg = GalleryConfig::from_json_str(
            r#"{"models": {"m": {"metric": "EUCLIDEAN", "threshold": 10}}}"#,
        )
        .unwrap();
        assert!(cfg.data_dir.is_none());
        assert_eq!(cfg.metric_for("m").unwrap().metric(), Metric::Euclidean);
    }

    #[test]
    fn unknown_model_is_configuration_error() {
        let cfg = GalleryConfig::default().with_model("a", Metric::Cosine, 0.3);
        assert!(matches!(
            cfg.metric_for("b"),
            Err(GalleryError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_bad_entries() {
        for bad in [
            "models:\n  a:\n    metric: COSINE\n    threshold: -1\n",
            "models:\n  a:\n    metric: L1\n    threshold: 1\n",
            "models:\n  a:\n    metric: COSINE\n    threshold: 1\n    dim: 0\n",
        ] {
            assert!(GalleryConfig::from_yaml_str(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("galleries.yaml");
        std::fs::write(&yaml, YAML).unwrap();
        assert_eq!(GalleryConfig::load(&yaml).unwrap().models.len(), 2);

        let toml = dir.path().join("galleries.toml");
        std::fs::write(&toml, "").unwrap();
        assert!(GalleryConfig::load(&toml).is_err());
        assert!(GalleryConfig::load(dir.path().join("missing.yaml")).is_err());
    }
}
