use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use ndarray::ArrayView1;

/// Opaque text-to-vector function used by ingestion sources and query callers.
///
/// The store never calls an embedder itself; it only validates the vectors it is handed.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| VectorStoreError::EmbeddingError("embedder returned no vector".into()))
    }
}

/// Deterministic hash-seeded embedder for offline runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct StubEmbedder {
    dimension: usize,
}

impl StubEmbedder {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| stub_embed(text, self.dimension))
            .collect())
    }
}

pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

#[must_use]
pub fn normalized(vec: &[f32]) -> Vec<f32> {
    let mut out = vec.to_vec();
    normalize(&mut out);
    out
}

/// Inner product; equals cosine similarity when both inputs are unit length.
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    ArrayView1::from(a).dot(&ArrayView1::from(b))
}

#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot(a, b) / (norm_a * norm_b)
}

fn stub_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut state =
        fnv1a_64(text.as_bytes()) ^ (dimension as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut vec = Vec::with_capacity(dimension);
    for _ in 0..dimension {
        vec.push(unit_f32(splitmix64(&mut state)).mul_add(2.0, -1.0));
    }
    normalize(&mut vec);
    vec
}

/// Uniform sample in `[0, 1)` from the high bits of a 64-bit value.
pub(crate) fn unit_f32(bits: u64) -> f32 {
    let high = (bits >> 32) as u32;
    let mantissa = high >> 9;
    f32::from_bits(0x3f80_0000 | mantissa) - 1.0
}

pub(crate) fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

pub(crate) const fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
