use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::vector::{cosine_distance, euclidean_distance, is_finite, l2_normalize};
use crate::GalleryError;

/// Distance function family a gallery compares embeddings with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Metric {
    /// Raw Euclidean distance.
    #[serde(alias = "euclidean")]
    Euclidean,
    /// Euclidean distance between L2-normalized operands.
    #[serde(alias = "euclidean_norm", alias = "euclidean-norm")]
    EuclideanNorm,
    /// Cosine distance (`1 - cos`). Normalization is implicit in the formula.
    #[serde(alias = "cosine")]
    Cosine,
}

impl Metric {
    /// Applies this metric's normalization step.
    pub fn normalize<'a>(&self, v: &'a [f32]) -> Cow<'a, [f32]> {
        match self {
            Self::EuclideanNorm => Cow::Owned(l2_normalize(v)),
            Self::Euclidean | Self::Cosine => Cow::Borrowed(v),
        }
    }

    /// Applies this metric's distance function. Operands are used as given;
    /// call [`Metric::normalize`] first.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f64, GalleryError> {
        match self {
            Self::Cosine => cosine_distance(a, b),
            Self::Euclidean | Self::EuclideanNorm => euclidean_distance(a, b),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Euclidean => "EUCLIDEAN",
            Self::EuclideanNorm => "EUCLIDEAN_NORM",
            Self::Cosine => "COSINE",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = GalleryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "EUCLIDEAN" => Ok(Self::Euclidean),
            "EUCLIDEAN_NORM" => Ok(Self::EuclideanNorm),
            "COSINE" => Ok(Self::Cosine),
            _ => Err(GalleryError::Configuration(format!("unknown metric {s:?}"))),
        }
    }
}

/// A metric bound to its match-acceptance threshold.
///
/// Fixed for the lifetime of a gallery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceMetric {
    metric: Metric,
    threshold: f64,
}

impl DistanceMetric {
    /// Fails if `threshold` is negative or not finite.
    pub fn new(metric: Metric, threshold: f64) -> Result<Self, GalleryError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(GalleryError::Configuration(format!(
                "{metric} threshold must be a finite non-negative number, got {threshold}"
            )));
        }
        Ok(Self { metric, threshold })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn normalize<'a>(&self, v: &'a [f32]) -> Cow<'a, [f32]> {
        self.metric.normalize(v)
    }

    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f64, GalleryError> {
        self.metric.distance(a, b)
    }

    /// Normalizes both operands, then measures them.
    pub fn measure(&self, a: &[f32], b: &[f32]) -> Result<f64, GalleryError> {
        self.distance(&self.normalize(a), &self.normalize(b))
    }

    /// Rejects vectors this metric cannot measure: ones whose L2
    /// normalization is not finite under `EUCLIDEAN_NORM`, and zero-norm
    /// vectors under `COSINE`.
    pub fn check_operand(&self, v: &[f32]) -> Result<(), GalleryError> {
        let measurable = match self.metric {
            Metric::Euclidean => true,
            Metric::EuclideanNorm => is_finite(&l2_normalize(v)),
            Metric::Cosine => v.iter().any(|&x| x != 0.0),
        };
        if !measurable {
            return Err(GalleryError::invalid_vector(format!(
                "vector cannot be measured under {}",
                self.metric
            )));
        }
        Ok(())
    }

    /// A match is rejected only when its distance exceeds the threshold.
    pub fn accepts(&self, distance: f64) -> bool {
        distance <= self.threshold
    }
}
