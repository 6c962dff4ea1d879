use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::ArticleError;
use crate::service::EmbedService;

/// Article metadata produced by the summarization step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub field: String,
    pub authors: Vec<String>,
    pub publication_date: String,
    pub summary: String,
}

/// An article as kept by the store, with its summary embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArticle {
    pub id: Uuid,
    pub article: Article,
    pub summary_embeddings: Vec<f32>,
}

/// One semantic-search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: Uuid,
    pub score: f32,
    pub article: Article,
}

/// Extracts plain text from an uploaded document (e.g. a PDF parser).
pub trait TextExtractor: Send + Sync {
    fn extract(&self, document: &[u8]) -> Result<String, ArticleError>;
}

/// Produces article metadata from extracted text (e.g. an LLM).
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<Article, ArticleError>;
}

/// Storage/search capability behind a single interface; which backend is
/// wired in is a deployment concern.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn index(&self, record: StoredArticle) -> Result<(), ArticleError>;
    async fn get(&self, id: Uuid) -> Result<StoredArticle, ArticleError>;
    async fn delete(&self, id: Uuid) -> Result<(), ArticleError>;

    /// Returns up to `nb_neighbors` records ranked by cosine similarity to
    /// `embedding`.
    async fn search(
        &self,
        embedding: &[f32],
        nb_neighbors: usize,
    ) -> Result<Vec<SearchHit>, ArticleError>;
}

/// In-process store with exact cosine-similarity search.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<Uuid, StoredArticle>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArticleStore for InMemoryStore {
    async fn index(&self, record: StoredArticle) -> Result<(), ArticleError> {
        debug!(id = %record.id, title = %record.article.title, "indexing article");
        self.records.write().await.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<StoredArticle, ArticleError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ArticleError::NotFound(id))
    }

    async fn delete(&self, id: Uuid) -> Result<(), ArticleError> {
        self.records
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(ArticleError::NotFound(id))
    }

    async fn search(
        &self,
        embedding: &[f32],
        nb_neighbors: usize,
    ) -> Result<Vec<SearchHit>, ArticleError> {
        let records = self.records.read().await;
        let mut hits: Vec<SearchHit> = records
            .values()
            .map(|record| SearchHit {
                id: record.id,
                score: cosine_similarity(embedding, &record.summary_embeddings),
                article: record.article.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(nb_neighbors);
        Ok(hits)
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Document pipeline: extract, summarize, embed through the broker, index.
pub struct ArticleCatalog {
    extractor: Arc<dyn TextExtractor>,
    summarizer: Arc<dyn Summarizer>,
    store: Arc<dyn ArticleStore>,
    embeddings: Arc<EmbedService>,
    timeout: Duration,
}

impl ArticleCatalog {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        summarizer: Arc<dyn Summarizer>,
        store: Arc<dyn ArticleStore>,
        embeddings: Arc<EmbedService>,
        timeout: Duration,
    ) -> Self {
        Self {
            extractor,
            summarizer,
            store,
            embeddings,
            timeout,
        }
    }

    /// Ingests one uploaded document and returns the new article id.
    pub async fn add_article(&self, document: &[u8]) -> Result<Uuid, ArticleError> {
        let text = self.extractor.extract(document)?;
        let article = self.summarizer.summarize(&text).await?;
        let summary_embeddings = self
            .embeddings
            .request_embedding(article.summary.clone(), self.timeout)
            .await?;

        let id = Uuid::new_v4();
        self.store
            .index(StoredArticle {
                id,
                article,
                summary_embeddings,
            })
            .await?;
        info!(%id, "article indexed");
        Ok(id)
    }

    pub async fn get_article(&self, id: Uuid) -> Result<StoredArticle, ArticleError> {
        self.store.get(id).await
    }

    pub async fn delete_article(&self, id: Uuid) -> Result<(), ArticleError> {
        self.store.delete(id).await
    }

    /// Embeds the query and returns the closest articles.
    pub async fn semantic_search(
        &self,
        query: &str,
        nb_neighbors: usize,
    ) -> Result<Vec<SearchHit>, ArticleError> {
        let embedding = self
            .embeddings
            .request_embedding(query.to_string(), self.timeout)
            .await?;
        self.store.search(&embedding, nb_neighbors).await
    }
}
