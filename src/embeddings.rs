use async_trait::async_trait;

use crate::errors::StrategyError;

/// Pluggable embedding computation, executed inside workers.
///
/// Deployments back this with whatever actually produces vectors (a remote
/// embeddings API, a local model); the broker only sees the trait.
#[async_trait]
pub trait EmbeddingStrategy: Send + Sync + 'static {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StrategyError>;
}

/// Adapts a synchronous closure into an [`EmbeddingStrategy`].
pub struct FnEmbeddings<F> {
    f: F,
}

impl<F> FnEmbeddings<F>
where
    F: Fn(&str) -> Result<Vec<f32>, StrategyError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> EmbeddingStrategy for FnEmbeddings<F>
where
    F: Fn(&str) -> Result<Vec<f32>, StrategyError> + Send + Sync + 'static,
{
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StrategyError> {
        (self.f)(text)
    }
}

/// Local, deterministic strategy: an L2-normalized byte-frequency histogram
/// folded into `dims` bins. No external service required; useful as a
/// stand-in backend and for exercising the full pipeline.
pub struct ByteFrequencyEmbeddings {
    dims: usize,
}

impl ByteFrequencyEmbeddings {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

#[async_trait]
impl EmbeddingStrategy for ByteFrequencyEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StrategyError> {
        let mut vector = vec![0.0f32; self.dims];
        for byte in text.bytes() {
            vector[byte as usize % self.dims] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}
