//! The `EmbeddingProvider` contract: text -> fixed-dimension unit vector.

use super::EMBEDDING_DIM;
use crate::error::Result;
use async_trait::async_trait;

/// Pure function of `(text, model_id)`. Must be safe to call from many
/// concurrent tasks (§4.2, §5).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// The model identifier this provider reports on stored units.
    fn model_id(&self) -> &str;

    /// Embed `text` into a fixed-length unit vector.
    ///
    /// # Errors
    /// Returns `Error::Retrieval` if the underlying model call fails.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// A deterministic, dependency-free embedding provider used as the default
/// and in tests: hashes n-grams of the input into a fixed-dimension vector
/// and L2-normalizes it. Out-of-process model providers (OpenAI, local
/// ONNX, etc.) are external collaborators per §1 scope and are not
/// reimplemented here; this provider exists so the rest of the engine is
/// independently testable without a network dependency.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    model_id: String,
    dim: usize,
}

impl HashEmbeddingProvider {
    #[must_use]
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            dim: EMBEDDING_DIM,
        }
    }

    #[must_use]
    pub fn with_dim(model_id: impl Into<String>, dim: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dim,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dim];
        let lower = text.to_lowercase();
        for token in lower.split_whitespace() {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash as usize) % self.dim;
            v[bucket] += 1.0;
            // Mix in a second bucket so single-token queries don't collapse
            // to a one-hot vector.
            let bucket2 = (hash.rotate_left(17) as usize) % self.dim;
            v[bucket2] += 0.5;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_is_deterministic_and_unit_length() {
        let provider = HashEmbeddingProvider::new("hash-v1");
        let a = provider.embed("fix the auth bug").await.unwrap();
        let b = provider.embed("fix the auth bug").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[tokio::test]
    async fn embed_distinguishes_different_text() {
        let provider = HashEmbeddingProvider::new("hash-v1");
        let a = provider.embed("database connection pool").await.unwrap();
        let b = provider.embed("unrelated payment flow").await.unwrap();
        assert_ne!(a, b);
    }
}
