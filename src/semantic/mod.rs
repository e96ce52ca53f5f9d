//! Semantic value cache.
//!
//! Embeds observed column values so literal values in generated SQL can be
//! corrected to the nearest known value when they do not exist verbatim in
//! the database.

mod embedder;
mod store;

pub use embedder::{cosine_similarity, EmbeddingModel, NgramEmbedder};
pub use store::{is_text_type, EmbeddingEntry, EmbeddingStore};
