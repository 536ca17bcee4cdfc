//! Storage abstraction for the retrieval index.
//!
//! The [`VectorStore`] trait holds two collections: course summaries (used
//! to resolve fuzzy course names) and corpus units (the retrievable text).
//! Both are ranked by brute-force similarity against stored vectors.
//!
//! | Backend | Type | Persistence |
//! |---------|------|-------------|
//! | `memory` | [`InMemoryStore`] | process lifetime |
//! | `sqlite` | [`SqliteStore`] | on disk, survives restarts |
//!
//! Implementations must be `Send + Sync`; the index is shared across
//! concurrent queries.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::Similarity;
use crate::models::{CorpusUnit, CourseSummary, SearchFilter, SearchHit};

/// A course scored against a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseCandidate {
    pub course_id: String,
    pub score: f32,
}

/// Abstract storage backend for course summaries and corpus units.
///
/// Writes are idempotent on identity: a course is keyed by `course_id`,
/// a unit by [`CorpusUnit::key`]. Re-upserting replaces the stored copy
/// and keeps its original insertion position.
///
/// Candidate lists are sorted by descending score; equal scores keep
/// insertion order.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert_course(&self, course: &CourseSummary, vector: &[f32]) -> Result<()>;

    /// Store units alongside their vectors; `vectors[i]` belongs to `units[i]`.
    async fn upsert_units(&self, units: &[CorpusUnit], vectors: &[Vec<f32>]) -> Result<()>;

    async fn course_candidates(
        &self,
        query_vec: &[f32],
        limit: usize,
        similarity: Similarity,
    ) -> Result<Vec<CourseCandidate>>;

    async fn unit_candidates(
        &self,
        query_vec: &[f32],
        filter: &SearchFilter,
        limit: usize,
        similarity: Similarity,
    ) -> Result<Vec<SearchHit>>;

    /// All courses in insertion order.
    async fn list_courses(&self) -> Result<Vec<CourseSummary>>;

    async fn get_course(&self, course_id: &str) -> Result<Option<CourseSummary>>;

    /// Remove every unit of one course, returning how many were dropped.
    async fn delete_course_units(&self, course_id: &str) -> Result<usize>;

    /// Remove every course and unit.
    async fn clear(&self) -> Result<()>;
}

/// Stable descending sort by score, truncated to `limit`.
pub(crate) fn rank<T>(mut scored: Vec<(T, f32)>, limit: usize) -> Vec<(T, f32)> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}
