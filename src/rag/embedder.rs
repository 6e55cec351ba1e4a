//! Embedding backend abstraction.
//!
//! The default implementation is a deterministic, dependency-free hashing
//! embedder: stable across runs, requires no network access or model
//! download, and is good enough to support approximate similarity search in
//! tests and offline operation. A real sentence-transformer HTTP backend can
//! be dropped in later by implementing `Embed`.

use sha2::{Digest, Sha256};

const DIMENSIONS: usize = 256;

pub trait Embed: Send + Sync {
   /// Embed a batch of strings into unit vectors of length `DIMENSIONS`.
   fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>>;

   fn dimensions(&self) -> usize {
      DIMENSIONS
   }

   fn model_name(&self) -> &str;
}

/// Deterministic bag-of-hashed-tokens embedder. Each token is hashed into a
/// bucket in a fixed-size vector; the vector is L2-normalized before return
/// so that dot product equals cosine similarity.
pub struct HashingEmbedder {
   dimensions: usize,
}

impl Default for HashingEmbedder {
   fn default() -> Self {
      Self { dimensions: DIMENSIONS }
   }
}

impl HashingEmbedder {
   pub fn new(dimensions: usize) -> Self {
      Self { dimensions }
   }

   fn embed_one(&self, text: &str) -> Vec<f32> {
      let mut vector = vec![0f32; self.dimensions];
      for token in text.split_whitespace().map(str::to_lowercase) {
         let mut hasher = Sha256::new();
         hasher.update(token.as_bytes());
         let digest = hasher.finalize();
         let bucket = (u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize)
            % self.dimensions;
         let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
         vector[bucket] += sign;
      }
      normalize(&mut vector);
      vector
   }
}

impl Embed for HashingEmbedder {
   fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
      texts.iter().map(|t| self.embed_one(t)).collect()
   }

   fn dimensions(&self) -> usize {
      self.dimensions
   }

   fn model_name(&self) -> &str {
      "hashing-embedder-v1"
   }
}

pub fn normalize(vector: &mut [f32]) {
   let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
   if norm > f32::EPSILON {
      for v in vector.iter_mut() {
         *v /= norm;
      }
   }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
   a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn embedding_is_deterministic() {
      let embedder = HashingEmbedder::default();
      let a = embedder.embed_batch(&["nginx web server".to_string()]);
      let b = embedder.embed_batch(&["nginx web server".to_string()]);
      assert_eq!(a, b);
   }

   #[test]
   fn embeddings_are_unit_vectors() {
      let embedder = HashingEmbedder::default();
      let v = &embedder.embed_batch(&["redis in-memory database".to_string()])[0];
      let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
      assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
   }
}
