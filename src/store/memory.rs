//! In-memory [`VectorStore`] for tests and throwaway sessions.
//!
//! Courses and units live in `Vec`s behind `std::sync::RwLock`, so
//! insertion order is iteration order. Search is brute force over every
//! stored vector.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::Similarity;
use crate::models::{CorpusUnit, CourseSummary, SearchFilter, SearchHit};

use super::{rank, CourseCandidate, VectorStore};

struct StoredCourse {
    summary: CourseSummary,
    vector: Vec<f32>,
}

struct StoredUnit {
    key: String,
    unit: CorpusUnit,
    vector: Vec<f32>,
}

#[derive(Default)]
pub struct InMemoryStore {
    courses: RwLock<Vec<StoredCourse>>,
    units: RwLock<Vec<StoredUnit>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit_count(&self) -> Result<usize> {
        Ok(read(&self.units)?.len())
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert_course(&self, course: &CourseSummary, vector: &[f32]) -> Result<()> {
        let mut courses = write(&self.courses)?;
        let stored = StoredCourse {
            summary: course.clone(),
            vector: vector.to_vec(),
        };
        match courses
            .iter_mut()
            .find(|c| c.summary.course_id == course.course_id)
        {
            Some(existing) => *existing = stored,
            None => courses.push(stored),
        }
        Ok(())
    }

    async fn upsert_units(&self, units: &[CorpusUnit], vectors: &[Vec<f32>]) -> Result<()> {
        if units.len() != vectors.len() {
            anyhow::bail!(
                "unit/vector count mismatch: {} units, {} vectors",
                units.len(),
                vectors.len()
            );
        }

        let mut stored = write(&self.units)?;
        for (unit, vector) in units.iter().zip(vectors) {
            let entry = StoredUnit {
                key: unit.key(),
                unit: unit.clone(),
                vector: vector.clone(),
            };
            match stored.iter_mut().find(|s| s.key == entry.key) {
                Some(existing) => *existing = entry,
                None => stored.push(entry),
            }
        }
        Ok(())
    }

    async fn course_candidates(
        &self,
        query_vec: &[f32],
        limit: usize,
        similarity: Similarity,
    ) -> Result<Vec<CourseCandidate>> {
        let courses = read(&self.courses)?;
        let scored = courses
            .iter()
            .map(|c| {
                (
                    c.summary.course_id.clone(),
                    similarity.score(query_vec, &c.vector),
                )
            })
            .collect();

        Ok(rank(scored, limit)
            .into_iter()
            .map(|(course_id, score)| CourseCandidate { course_id, score })
            .collect())
    }

    async fn unit_candidates(
        &self,
        query_vec: &[f32],
        filter: &SearchFilter,
        limit: usize,
        similarity: Similarity,
    ) -> Result<Vec<SearchHit>> {
        let units = read(&self.units)?;
        let scored = units
            .iter()
            .filter(|s| filter.matches(&s.unit.course_id, s.unit.lesson_id))
            .map(|s| (s, similarity.score(query_vec, &s.vector)))
            .collect();

        Ok(rank(scored, limit)
            .into_iter()
            .map(|(s, score)| SearchHit {
                course_id: s.unit.course_id.clone(),
                lesson_id: s.unit.lesson_id,
                sequence_index: s.unit.sequence_index,
                text: s.unit.text.clone(),
                score,
            })
            .collect())
    }

    async fn list_courses(&self) -> Result<Vec<CourseSummary>> {
        Ok(read(&self.courses)?
            .iter()
            .map(|c| c.summary.clone())
            .collect())
    }

    async fn get_course(&self, course_id: &str) -> Result<Option<CourseSummary>> {
        Ok(read(&self.courses)?
            .iter()
            .find(|c| c.summary.course_id == course_id)
            .map(|c| c.summary.clone()))
    }

    async fn delete_course_units(&self, course_id: &str) -> Result<usize> {
        let mut stored = write(&self.units)?;
        let before = stored.len();
        stored.retain(|s| s.unit.course_id != course_id);
        Ok(before - stored.len())
    }

    async fn clear(&self) -> Result<()> {
        write(&self.courses)?.clear();
        write(&self.units)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::segment;

    fn units(course: &str, lesson: u32, text: &str) -> Vec<CorpusUnit> {
        segment(course, Some(lesson), text, 800, 100)
    }

    #[tokio::test]
    async fn test_upsert_unit_replaces_same_identity() {
        let store = InMemoryStore::new();
        let first = units("A", 1, "Old text.");
        let second = units("A", 1, "New text.");
        store.upsert_units(&first, &[vec![1.0, 0.0]]).await.unwrap();
        store.upsert_units(&second, &[vec![1.0, 0.0]]).await.unwrap();

        assert_eq!(store.unit_count().unwrap(), 1);
        let hits = store
            .unit_candidates(&[1.0, 0.0], &SearchFilter::default(), 5, Similarity::Cosine)
            .await
            .unwrap();
        assert_eq!(hits[0].text, "New text.");
    }

    #[tokio::test]
    async fn test_filter_restricts_hits() {
        let store = InMemoryStore::new();
        store
            .upsert_units(&units("A", 1, "Alpha."), &[vec![1.0, 0.0]])
            .await
            .unwrap();
        store
            .upsert_units(&units("B", 1, "Beta."), &[vec![1.0, 0.0]])
            .await
            .unwrap();
        store
            .upsert_units(&units("A", 2, "Gamma."), &[vec![0.0, 1.0]])
            .await
            .unwrap();

        let filter = SearchFilter {
            course_id: Some("A".to_string()),
            lesson_id: None,
        };
        let hits = store
            .unit_candidates(&[1.0, 0.0], &filter, 10, Similarity::Cosine)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.course_id == "A"));
        assert_eq!(hits[0].lesson_id, Some(1));

        let filter = SearchFilter {
            course_id: Some("A".to_string()),
            lesson_id: Some(2),
        };
        let hits = store
            .unit_candidates(&[1.0, 0.0], &filter, 10, Similarity::Cosine)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Gamma.");
    }

    #[tokio::test]
    async fn test_course_ties_keep_insertion_order() {
        let store = InMemoryStore::new();
        store
            .upsert_course(&CourseSummary::new("First"), &[1.0, 0.0])
            .await
            .unwrap();
        store
            .upsert_course(&CourseSummary::new("Second"), &[1.0, 0.0])
            .await
            .unwrap();
        // Re-upserting keeps the original position.
        store
            .upsert_course(&CourseSummary::new("First"), &[1.0, 0.0])
            .await
            .unwrap();

        let ranked = store
            .course_candidates(&[1.0, 0.0], 2, Similarity::Cosine)
            .await
            .unwrap();
        assert_eq!(ranked[0].course_id, "First");
        assert_eq!(ranked[1].course_id, "Second");
        assert_eq!(store.list_courses().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mismatched_vectors_rejected() {
        let store = InMemoryStore::new();
        assert!(store.upsert_units(&units("A", 1, "Text."), &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_course_units_leaves_other_courses() {
        let store = InMemoryStore::new();
        store
            .upsert_units(&units("A", 1, "Alpha."), &[vec![1.0, 0.0]])
            .await
            .unwrap();
        store
            .upsert_units(&units("B", 1, "Beta."), &[vec![1.0, 0.0]])
            .await
            .unwrap();

        assert_eq!(store.delete_course_units("A").await.unwrap(), 1);
        assert_eq!(store.delete_course_units("A").await.unwrap(), 0);
        assert_eq!(store.unit_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryStore::new();
        store
            .upsert_course(&CourseSummary::new("A"), &[1.0])
            .await
            .unwrap();
        store.clear().await.unwrap();
        assert!(store.list_courses().await.unwrap().is_empty());
        assert!(store.get_course("A").await.unwrap().is_none());
    }
}
