pub mod embedder;
pub mod indexer;

pub use embedder::{Embed, HashingEmbedder};
pub use indexer::RagIndexer;
