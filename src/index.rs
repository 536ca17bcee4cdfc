//! The retrieval index: embeds on write, ranks on read.
//!
//! [`Index`] pairs a [`VectorStore`] with an [`Embedder`]. Course summaries
//! are embedded by title for fuzzy name resolution; corpus units are
//! embedded with their course/lesson prefix for semantic search.
//!
//! Every store or embedder failure surfaces as
//! [`RagError::IndexUnavailable`].

use std::sync::Arc;

use crate::embedding::{Embedder, Similarity};
use crate::error::{RagError, RagResult};
use crate::models::{CorpusUnit, CourseSummary, SearchFilter, SearchResult};
use crate::store::VectorStore;

pub struct Index {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    similarity: Similarity,
    max_results: usize,
    course_match_threshold: f32,
}

impl Index {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        similarity: Similarity,
        max_results: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            similarity,
            max_results: max_results.max(1),
            course_match_threshold: 0.0,
        }
    }

    /// A course name resolves only when its best score is strictly above `threshold`.
    pub fn with_course_match_threshold(mut self, threshold: f32) -> Self {
        self.course_match_threshold = threshold;
        self
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub async fn upsert_course_summary(&self, course: &CourseSummary) -> RagResult<()> {
        let vector = self
            .embedder
            .embed_one(&course.title)
            .await
            .map_err(RagError::index)?;
        self.store
            .upsert_course(course, &vector)
            .await
            .map_err(RagError::index)
    }

    pub async fn upsert_units(&self, units: &[CorpusUnit]) -> RagResult<()> {
        if units.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = units.iter().map(|u| u.context_text()).collect();
        let vectors = self.embedder.embed(&texts).await.map_err(RagError::index)?;
        if vectors.len() != units.len() {
            return Err(RagError::IndexUnavailable(format!(
                "embedder returned {} vectors for {} units",
                vectors.len(),
                units.len()
            )));
        }
        self.store
            .upsert_units(units, &vectors)
            .await
            .map_err(RagError::index)
    }

    /// Rank units against `query`, at most `k` (default `max_results`).
    ///
    /// An empty index yields an empty result.
    pub async fn search_semantic(
        &self,
        query: &str,
        filter: &SearchFilter,
        k: Option<usize>,
    ) -> RagResult<SearchResult> {
        let limit = k.unwrap_or(self.max_results);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self
            .embedder
            .embed_one(query)
            .await
            .map_err(RagError::index)?;
        let hits = self
            .store
            .unit_candidates(&query_vec, filter, limit, self.similarity)
            .await
            .map_err(RagError::index)?;

        tracing::debug!(
            query,
            course = ?filter.course_id,
            lesson = ?filter.lesson_id,
            hits = hits.len(),
            "semantic search"
        );
        Ok(hits)
    }

    /// Map a partial or fuzzy course name to the best-matching `course_id`.
    ///
    /// Ties go to the course inserted first.
    pub async fn resolve_course_name(&self, fuzzy_name: &str) -> RagResult<String> {
        let query_vec = self
            .embedder
            .embed_one(fuzzy_name)
            .await
            .map_err(RagError::index)?;
        let best = self
            .store
            .course_candidates(&query_vec, 1, self.similarity)
            .await
            .map_err(RagError::index)?
            .into_iter()
            .next();

        match best {
            Some(c) if c.score > self.course_match_threshold => {
                tracing::debug!(name = fuzzy_name, course = %c.course_id, score = c.score, "resolved course");
                Ok(c.course_id)
            }
            _ => Err(RagError::CourseNotResolved(fuzzy_name.to_string())),
        }
    }

    pub async fn courses(&self) -> RagResult<Vec<CourseSummary>> {
        self.store.list_courses().await.map_err(RagError::index)
    }

    pub async fn get_course(&self, course_id: &str) -> RagResult<Option<CourseSummary>> {
        self.store
            .get_course(course_id)
            .await
            .map_err(RagError::index)
    }

    pub async fn existing_course_titles(&self) -> RagResult<Vec<String>> {
        Ok(self.courses().await?.into_iter().map(|c| c.title).collect())
    }

    /// Drop a course's units ahead of re-indexing it.
    pub async fn remove_course_units(&self, course_id: &str) -> RagResult<usize> {
        self.store
            .delete_course_units(course_id)
            .await
            .map_err(RagError::index)
    }

    pub async fn clear(&self) -> RagResult<()> {
        self.store.clear().await.map_err(RagError::index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::segment::segment;
    use crate::store::InMemoryStore;

    fn index() -> Index {
        Index::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(HashEmbedder::default()),
            Similarity::Cosine,
            5,
        )
    }

    #[tokio::test]
    async fn test_empty_index_returns_empty() {
        let idx = index();
        let hits = idx
            .search_semantic("anything", &SearchFilter::default(), None)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_ranks_matching_unit_first() {
        let idx = index();
        let mut units = segment("LinAlg", Some(1), "A vector has magnitude and direction.", 800, 100);
        units.extend(segment("LinAlg", Some(2), "Determinants measure area scaling.", 800, 100));
        idx.upsert_units(&units).await.unwrap();

        let hits = idx
            .search_semantic("what is a vector", &SearchFilter::default(), None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].lesson_id, Some(1));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_search_respects_k() {
        let idx = index();
        let text: String = (0..20)
            .map(|i| format!("Fact number {} about vectors.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let units = segment("LinAlg", Some(1), &text, 60, 10);
        assert!(units.len() > 3);
        idx.upsert_units(&units).await.unwrap();

        let hits = idx
            .search_semantic("vectors", &SearchFilter::default(), Some(3))
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_course_name() {
        let idx = index();
        idx.upsert_course_summary(&CourseSummary::new("Introduction to Linear Algebra"))
            .await
            .unwrap();
        idx.upsert_course_summary(&CourseSummary::new("Organic Chemistry Basics"))
            .await
            .unwrap();

        let id = idx.resolve_course_name("linear algebra").await.unwrap();
        assert_eq!(id, "Introduction to Linear Algebra");

        let err = idx.resolve_course_name("quantum cooking").await.unwrap_err();
        assert!(matches!(err, RagError::CourseNotResolved(_)));
    }

    #[tokio::test]
    async fn test_resolve_on_empty_index_fails() {
        let idx = index();
        assert!(matches!(
            idx.resolve_course_name("anything").await,
            Err(RagError::CourseNotResolved(_))
        ));
    }

    #[tokio::test]
    async fn test_existing_titles() {
        let idx = index();
        idx.upsert_course_summary(&CourseSummary::new("A")).await.unwrap();
        idx.upsert_course_summary(&CourseSummary::new("B")).await.unwrap();
        idx.upsert_course_summary(&CourseSummary::new("A")).await.unwrap();
        assert_eq!(idx.existing_course_titles().await.unwrap(), vec!["A", "B"]);
    }
}
