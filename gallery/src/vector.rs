//! Numeric primitives over embedding vectors.
//!
//! All accumulation is done in f64; results of [`l2_normalize`] are narrowed
//! back to f32 so they can be stored alongside raw embeddings.

use crate::GalleryError;

/// Scales `v` to unit L2 norm.
///
/// The all-zero vector is not special-cased: every component becomes NaN.
/// Gallery validation rejects such vectors, so a zero embedding fed through
/// an `EUCLIDEAN_NORM` gallery surfaces as an invalid vector rather than
/// silently matching.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = v
        .iter()
        .map(|&x| (x as f64) * (x as f64))
        .sum::<f64>()
        .sqrt();
    v.iter().map(|&x| (x as f64 / norm) as f32).collect()
}

/// Returns `sqrt(sum((a[i] - b[i])^2))`.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f64, GalleryError> {
    check_len(a, b)?;
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum();
    Ok(sum.sqrt())
}

/// Returns the cosine distance `1 - (a . b) / (|a| |b|)`.
///
/// 0 means identical direction, 1 orthogonal, 2 opposite. Unlike
/// [`l2_normalize`] there is no clamping: zero vectors yield NaN.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f64, GalleryError> {
    check_len(a, b)?;

    let mut dot: f64 = 0.0;
    let mut norm_a: f64 = 0.0;
    let mut norm_b: f64 = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    Ok(1.0 - dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Returns true if every component is finite.
pub fn is_finite(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

fn check_len(a: &[f32], b: &[f32]) -> Result<(), GalleryError> {
    if a.len() != b.len() {
        return Err(GalleryError::InvalidArgument(format!(
            "vector lengths differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: [f32; 9] = [3.0, 4.0, 1.0, 2.0, 8.0, 6.0, 4.0, 1.0, 9.0];
    const B: [f32; 9] = [5.0, 1.0, 4.0, 2.0, 1.0, 7.0, 40.0, 11.0, 2.0];

    #[test]
    fn l2_normalize_reference() {
        let v = [3.0, 4.0, 1.0, 2.0, 8.0, 6.0, 4.0, 1.0, 9.0, 0.0];
        let expected = [
            0.19867985f32, 0.26490647, 0.06622662, 0.13245323, 0.52981293, 0.3973597,
            0.26490647, 0.06622662, 0.59603953, 0.0,
        ];
        let got = l2_normalize(&v);
        assert_eq!(got.len(), expected.len());
        for (g, e) in got.iter().zip(expected.iter()) {
            assert!((g - e).abs() < 1e-5, "got {g}, want {e}");
        }
    }

    #[test]
    fn l2_normalize_unit_length() {
        let n = l2_normalize(&[1.0, 2.0, 2.0]);
        let len: f32 = n.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((len - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector_is_nan() {
        let n = l2_normalize(&[0.0, 0.0, 0.0]);
        assert!(n.iter().all(|x| x.is_nan()));
        assert!(!is_finite(&n));
    }

    #[test]
    fn euclidean_reference() {
        let d = euclidean_distance(&A, &B).unwrap();
        assert!((d - 38.948684188).abs() < 1e-4, "got {d}");
    }

    #[test]
    fn euclidean_identical_is_zero() {
        assert_eq!(euclidean_distance(&A, &A).unwrap(), 0.0);
    }

    #[test]
    fn cosine_reference() {
        let d = cosine_distance(&A, &B).unwrap();
        assert!((d - 0.5871814).abs() < 1e-4, "got {d}");
    }

    #[test]
    fn cosine_orthogonal_and_opposite() {
        let d = cosine_distance(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((d - 1.0).abs() < 1e-9);
        let d = cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert!((d - 2.0).abs() < 1e-9);
    }

    #[test]
    fn length_mismatch_is_invalid_argument() {
        assert!(matches!(
            euclidean_distance(&[1.0], &[1.0, 2.0]),
            Err(GalleryError::InvalidArgument(_))
        ));
        assert!(matches!(
            cosine_distance(&[1.0, 2.0], &[1.0]),
            Err(GalleryError::InvalidArgument(_))
        ));
    }
}
