use jobmatch_vector_store::{cosine_similarity, normalized};
use ndarray::{Array1, ArrayView1};

/// Mean of the unit-normalized `vectors`; `None` when there are none.
pub fn centroid<'a>(vectors: impl IntoIterator<Item = &'a [f32]>, dimension: usize) -> Option<Vec<f32>> {
    let mut sum = Array1::<f32>::zeros(dimension);
    let mut count = 0usize;
    for vector in vectors {
        if vector.len() != dimension {
            continue;
        }
        let unit = normalized(vector);
        sum += &ArrayView1::from(unit.as_slice());
        count += 1;
    }
    if count == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = sum / count as f32;
    Some(mean.to_vec())
}

/// Mean cosine distance of `vectors` to `centre`.
pub fn dispersion<'a>(vectors: impl IntoIterator<Item = &'a [f32]>, centre: &[f32]) -> f32 {
    let mut total = 0.0f32;
    let mut count = 0usize;
    for vector in vectors {
        total += 1.0 - cosine_similarity(vector, centre);
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    {
        total / count as f32
    }
}

/// `1 - cos(a, b)`, in `[0, 2]`.
#[must_use]
pub fn centroid_shift(a: &[f32], b: &[f32]) -> f32 {
    (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0)
}

/// Jensen-Shannon divergence in bits between two non-negative weight vectors.
///
/// Inputs are normalized to distributions first. Two empty distributions are identical;
/// an empty one against a non-empty one is maximally distant.
#[must_use]
pub fn jensen_shannon(p: &[f32], q: &[f32]) -> f32 {
    let len = p.len().max(q.len());
    let p = to_distribution(p, len);
    let q = to_distribution(q, len);
    match (p, q) {
        (None, None) => 0.0,
        (None, Some(_)) | (Some(_), None) => 1.0,
        (Some(p), Some(q)) => {
            let m = (&p + &q) * 0.5;
            let js = 0.5 * kl_bits(&p, &m) + 0.5 * kl_bits(&q, &m);
            js.clamp(0.0, 1.0) as f32
        }
    }
}

fn to_distribution(weights: &[f32], len: usize) -> Option<Array1<f64>> {
    let mut dist = Array1::<f64>::zeros(len);
    for (slot, weight) in dist.iter_mut().zip(weights) {
        *slot = f64::from(weight.max(0.0));
    }
    let total = dist.sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    Some(dist / total)
}

fn kl_bits(p: &Array1<f64>, m: &Array1<f64>) -> f64 {
    p.iter()
        .zip(m.iter())
        .filter(|(pi, _)| **pi > 0.0)
        .map(|(pi, mi)| pi * (pi / mi).log2())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroid_of_normalized_vectors() {
        let vectors = [vec![2.0, 0.0], vec![0.0, 3.0]];
        let c = centroid(vectors.iter().map(Vec::as_slice), 2).unwrap();
        assert!((c[0] - 0.5).abs() < 1e-6);
        assert!((c[1] - 0.5).abs() < 1e-6);
        assert!(centroid(std::iter::empty::<&[f32]>(), 2).is_none());
    }

    #[test]
    fn identical_vectors_have_zero_dispersion() {
        let vectors = [vec![1.0, 1.0], vec![2.0, 2.0]];
        let c = centroid(vectors.iter().map(Vec::as_slice), 2).unwrap();
        assert!(dispersion(vectors.iter().map(Vec::as_slice), &c).abs() < 1e-6);
    }

    #[test]
    fn jensen_shannon_bounds() {
        assert!(jensen_shannon(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]).abs() < 1e-6);
        assert!((jensen_shannon(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(jensen_shannon(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(jensen_shannon(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        let partial = jensen_shannon(&[0.5, 0.5], &[0.9, 0.1]);
        assert!(partial > 0.0 && partial < 1.0);
    }
}
