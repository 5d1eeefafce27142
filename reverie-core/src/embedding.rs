//! Text embeddings.
//!
//! The engine treats embeddings as an opaque `embed(text) -> vector`
//! service plus cosine similarity. Vectors are cached per memory store
//! under the node's embedding key, so each text is embedded once.

use crate::error::Result;
use crate::types::Embedding;

/// Turns memory descriptions and focal points into vectors.
///
/// One provider is shared by every agent through an `Arc`.
pub trait EmbeddingProvider: Send + Sync {
    /// Vector for `text`.
    ///
    /// # Errors
    /// Returns an error if the backing model cannot produce one; the
    /// engine then scores relevance as zero.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Vectors for several texts, in order.
    ///
    /// # Errors
    /// Fails on the first text that fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Vector length.
    fn dimensions(&self) -> usize;

    /// Name recorded alongside cached vectors.
    fn model_name(&self) -> &str;
}

/// Cosine of the angle between `a` and `b`; `0.0` for a zero vector or
/// mismatched lengths.
#[must_use]
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    a.cosine_similarity(b)
}

// ---------------------------------------------------------------------------
// Hashed bag-of-words provider
// ---------------------------------------------------------------------------

/// A deterministic provider that hashes lower-cased words into buckets.
///
/// Texts sharing words get positive similarity, so relevance behaves
/// sensibly in headless runs and tests without loading a model.
pub struct HashingEmbeddingProvider {
    dims: usize,
}

impl HashingEmbeddingProvider {
    /// Create a hashing provider with `dimensions` buckets.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions.max(1) }
    }

    fn bucket(&self, word: &str) -> usize {
        // FNV-1a, stable across runs and platforms.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in word.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        (hash % self.dims as u64) as usize
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EmbeddingProvider for HashingEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut raw = vec![0.0_f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            raw[self.bucket(&word.to_lowercase())] += 1.0;
        }
        Ok(l2_normalize(raw))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "hashed-bag-of-words"
    }
}

fn l2_normalize(raw: Vec<f32>) -> Embedding {
    let mag: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag < f32::EPSILON {
        return Embedding(raw);
    }
    Embedding(raw.into_iter().map(|x| x / mag).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_edges() {
        let x = Embedding(vec![1.0, 0.0]);
        let y = Embedding(vec![0.0, 1.0]);
        assert!((cosine_similarity(&x, &x) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&x, &y).abs() < 1e-6);
        assert_eq!(cosine_similarity(&x, &Embedding(vec![1.0, 0.0, 0.0])), 0.0);
        assert_eq!(cosine_similarity(&x, &Embedding(vec![0.0, 0.0])), 0.0);
    }

    #[test]
    fn hashing_provider_is_deterministic_and_word_sensitive() {
        let provider = HashingEmbeddingProvider::new(128);
        let a = provider.embed("Isabella is brewing coffee").expect("embed");
        let b = provider.embed("isabella is brewing coffee").expect("embed");
        let c = provider.embed("stove catches fire").expect("embed");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c) < cosine_similarity(&a, &b));
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let provider = HashingEmbeddingProvider::new(16);
        let emb = provider.embed("  ,. ").expect("embed");
        assert!(emb.0.iter().all(|&x| x == 0.0));
        assert_eq!(provider.dimensions(), 16);
    }

    #[test]
    fn batch_embed_works() {
        let provider = HashingEmbeddingProvider::new(8);
        let results = provider.embed_batch(&["hello", "world", "test"]).expect("batch");
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|e| e.0.len() == 8));
    }
}
