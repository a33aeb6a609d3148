//! OpenAI embedding provider implementation

use super::client::OpenAiClient;
use super::types::{EmbeddingRequest, EmbeddingResponse};
use crate::providers::embedding_unavailable;
use crate::EmbeddingProvider;
use async_trait::async_trait;
use renum_core::{EmbeddingVector, RenumError, RenumResult, EMBEDDING_DIMENSIONS, EMBEDDING_MODEL};

/// OpenAI embedding provider.
///
/// The dimension is fixed at construction; the request pins it so the model
/// returns matching vectors. Upstream failures surface as
/// `EmbeddingUnavailable`, which the orchestrator treats as "proceed without
/// semantic retrieval".
pub struct OpenAiEmbeddingProvider {
    client: OpenAiClient,
    model: String,
    dimensions: i32,
}

impl OpenAiEmbeddingProvider {
    /// Create a new OpenAI embedding provider.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dimensions: i32) -> Self {
        Self {
            client: OpenAiClient::new(api_key, 60),
            model: model.into(),
            dimensions,
        }
    }

    /// Create provider with the deployment default (text-embedding-3-small, 384 dims).
    pub fn with_default_model(api_key: impl Into<String>) -> Self {
        Self::new(api_key, EMBEDDING_MODEL, EMBEDDING_DIMENSIONS)
    }

    fn demote(err: RenumError) -> RenumError {
        // Every transport-level failure on the embeddings endpoint becomes
        // EmbeddingUnavailable so callers degrade instead of failing the turn.
        embedding_unavailable(format!("{}", err))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> RenumResult<EmbeddingVector> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: vec![text.to_string()],
            dimensions: Some(self.dimensions),
        };

        let response: EmbeddingResponse = self
            .client
            .request("embeddings", request)
            .await
            .map_err(Self::demote)?;

        let data = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| embedding_unavailable("No embedding data in response"))?;

        let vector = EmbeddingVector::new(data.embedding, self.model.clone());
        vector.check_dimensions(self.dimensions)?;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[&str]) -> RenumResult<Vec<EmbeddingVector>> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts.iter().map(|s| s.to_string()).collect(),
            dimensions: Some(self.dimensions),
        };

        let response: EmbeddingResponse = self
            .client
            .request("embeddings", request)
            .await
            .map_err(Self::demote)?;

        let embeddings: Vec<_> = response
            .data
            .into_iter()
            .map(|data| EmbeddingVector::new(data.embedding, self.model.clone()))
            .collect();

        if embeddings.len() != texts.len() {
            return Err(embedding_unavailable(format!(
                "Expected {} embeddings but got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        for vector in &embeddings {
            vector.check_dimensions(self.dimensions)?;
        }

        Ok(embeddings)
    }

    fn dimensions(&self) -> i32 {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OpenAiEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbeddingProvider")
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}
