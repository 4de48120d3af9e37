//! Nearest-neighbor index over the playlist catalog
//!
//! Built once at startup: every catalog name is embedded and unit-normalized,
//! so inner product equals cosine similarity. The index is read-only after
//! build and safe to query from many tasks through an `Arc`.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::embedding::{Embedder, EmbeddingError};
use crate::models::CatalogItem;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// A catalog item and its similarity to a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    #[serde(flatten)]
    pub item: CatalogItem,
    pub score: f32,
}

struct Entry {
    item: CatalogItem,
    vector: Vec<f32>,
}

/// Flat inner-product index over unit vectors
pub struct EmbeddingIndex {
    entries: Vec<Entry>,
    dimension: usize,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("entries", &self.entries.len())
            .field("dimension", &self.dimension)
            .field("embedder", &self.embedder.name())
            .finish()
    }
}

/// Scale `vector` to unit length; the zero vector is left as is
fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl EmbeddingIndex {
    /// Embed every catalog item; an empty catalog never touches the embedder
    #[instrument(
        skip(catalog, embedder),
        fields(items = catalog.len(), embedder = embedder.name())
    )]
    pub async fn build(
        catalog: Vec<CatalogItem>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, IndexError> {
        if catalog.is_empty() {
            info!("Catalog is empty, playlist resolution will never match");
            return Ok(Self {
                entries: Vec::new(),
                dimension: 0,
                embedder,
            });
        }

        let names: Vec<String> = catalog.iter().map(|item| item.name.clone()).collect();
        let vectors = embedder.embed_batch(&names).await?;

        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        let mut entries = Vec::with_capacity(catalog.len());

        for (item, mut vector) in catalog.into_iter().zip(vectors) {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            normalize(&mut vector);
            entries.push(Entry { item, vector });
        }

        info!(entries = entries.len(), dimension, "Playlist index built");

        Ok(Self {
            entries,
            dimension,
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension, 0 for an empty index
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Up to `k` items by descending similarity; ties keep catalog order
    #[instrument(skip(self))]
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<Match>, IndexError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = self.embedder.embed(text).await?;
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, dot(&entry.vector, &query)))
            .collect();

        // sort_by is stable, so equal scores stay in catalog order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        debug!(
            best = scored.first().map(|(i, _)| self.entries[*i].item.id.as_str()),
            "Query resolved"
        );

        Ok(scored
            .into_iter()
            .map(|(i, score)| Match {
                item: self.entries[i].item.clone(),
                score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::embedding::HashingEmbedder;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns preset vectors by text and counts calls
    struct FixedEmbedder {
        vectors: Vec<(&'static str, Vec<f32>)>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .vectors
                .iter()
                .find(|(t, _)| *t == text)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| vec![0.0, 0.0]))
        }
    }

    fn fixed(vectors: Vec<(&'static str, Vec<f32>)>) -> Arc<FixedEmbedder> {
        Arc::new(FixedEmbedder {
            vectors,
            calls: AtomicUsize::new(0),
        })
    }

    fn sample_catalog() -> Vec<CatalogItem> {
        vec![
            CatalogItem::new("PL1", "Lofi Beats"),
            CatalogItem::new("PL2", "Metal Workout"),
            CatalogItem::new("PL3", "Sunday Jazz Brunch"),
        ]
    }

    #[tokio::test]
    async fn test_exact_name_resolves_to_item() {
        let index = EmbeddingIndex::build(sample_catalog(), Arc::new(HashingEmbedder::default()))
            .await
            .unwrap();

        for item in sample_catalog() {
            let matches = index.query(&item.name, 1).await.unwrap();
            assert_eq!(matches.len(), 1);
            assert_eq!(matches[0].item, item);
            assert!((matches[0].score - 1.0).abs() < 1e-4);
        }
    }

    #[tokio::test]
    async fn test_results_sorted_and_bounded() {
        let index = EmbeddingIndex::build(sample_catalog(), Arc::new(HashingEmbedder::default()))
            .await
            .unwrap();

        let matches = index.query("lofi", 10).await.unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(matches[0].item.id, "PL1");
    }

    #[tokio::test]
    async fn test_k_zero_returns_nothing() {
        let index = EmbeddingIndex::build(sample_catalog(), Arc::new(HashingEmbedder::default()))
            .await
            .unwrap();
        assert!(index.query("Lofi Beats", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_never_embeds() {
        let embedder = fixed(vec![]);
        let index = EmbeddingIndex::build(Vec::new(), embedder.clone())
            .await
            .unwrap();

        assert!(index.is_empty());
        assert!(index.query("anything", 5).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ties_keep_catalog_order() {
        let embedder = fixed(vec![
            ("first", vec![1.0, 0.0]),
            ("second", vec![2.0, 0.0]),
            ("query", vec![3.0, 0.0]),
        ]);
        let catalog = vec![
            CatalogItem::new("A", "first"),
            CatalogItem::new("B", "second"),
        ];
        let index = EmbeddingIndex::build(catalog, embedder).await.unwrap();

        let matches = index.query("query", 2).await.unwrap();
        assert_eq!(matches[0].item.id, "A");
        assert_eq!(matches[1].item.id, "B");
    }

    #[tokio::test]
    async fn test_zero_vector_scores_zero() {
        let embedder = fixed(vec![("named", vec![0.0, 1.0]), ("query", vec![0.0, 1.0])]);
        let catalog = vec![
            CatalogItem::new("Z", "unknown"),
            CatalogItem::new("N", "named"),
        ];
        let index = EmbeddingIndex::build(catalog, embedder).await.unwrap();

        let matches = index.query("query", 2).await.unwrap();
        assert_eq!(matches[0].item.id, "N");
        assert_eq!(matches[1].score, 0.0);
    }

    #[tokio::test]
    async fn test_inconsistent_dimensions_rejected() {
        let embedder = fixed(vec![("a", vec![1.0, 0.0]), ("b", vec![1.0, 0.0, 0.0])]);
        let catalog = vec![CatalogItem::new("A", "a"), CatalogItem::new("B", "b")];

        let result = EmbeddingIndex::build(catalog, embedder).await;
        assert_matches!(
            result,
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );
    }

    #[tokio::test]
    async fn test_debug_summarizes_index() {
        let embedder = fixed(vec![("a", vec![1.0, 0.0])]);
        let index = EmbeddingIndex::build(vec![CatalogItem::new("A", "a")], embedder)
            .await
            .unwrap();

        let rendered = format!("{:?}", index);
        assert!(rendered.contains("entries: 1"));
        assert!(rendered.contains("dimension: 2"));
    }
}
