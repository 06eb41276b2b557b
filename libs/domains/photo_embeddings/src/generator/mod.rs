mod http;
mod provider;

pub use http::{HttpEmbedderConfig, HttpImageEmbedder};
pub use provider::EmbeddingGenerator;

#[cfg(test)]
pub use provider::MockEmbeddingGenerator;
