//! SQLite-backed [`VectorStore`].
//!
//! Vectors are stored as little-endian `f32` BLOBs next to the rows they
//! describe. Filtering happens in SQL; scoring is brute force in Rust over
//! the filtered rows, ordered by `rowid` so ties keep insertion order.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob, Similarity};
use crate::migrate;
use crate::models::{CorpusUnit, CourseSummary, Lesson, SearchFilter, SearchHit};

use super::{rank, CourseCandidate, VectorStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and apply the schema.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_course(row: &SqliteRow) -> Result<CourseSummary> {
    let lessons_json: String = row.try_get("lessons_json")?;
    let lessons: Vec<Lesson> = serde_json::from_str(&lessons_json)?;
    Ok(CourseSummary {
        course_id: row.try_get("id")?,
        title: row.try_get("title")?,
        course_link: row.try_get("course_link")?,
        instructor: row.try_get("instructor")?,
        lessons,
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert_course(&self, course: &CourseSummary, vector: &[f32]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let lessons_json = serde_json::to_string(&course.lessons)?;

        sqlx::query(
            r#"
            INSERT INTO courses (id, title, course_link, instructor, lessons_json,
                                 embedding, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                course_link = excluded.course_link,
                instructor = excluded.instructor,
                lessons_json = excluded.lessons_json,
                embedding = excluded.embedding,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&course.course_id)
        .bind(&course.title)
        .bind(&course.course_link)
        .bind(&course.instructor)
        .bind(&lessons_json)
        .bind(vec_to_blob(vector))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

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

        let mut tx = self.pool.begin().await?;

        for (unit, vector) in units.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO units (id, course_id, lesson_id, sequence_index, text,
                                   char_start, char_end, overlap_len, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    char_start = excluded.char_start,
                    char_end = excluded.char_end,
                    overlap_len = excluded.overlap_len,
                    hash = excluded.hash,
                    embedding = excluded.embedding
                "#,
            )
            .bind(unit.key())
            .bind(&unit.course_id)
            .bind(unit.lesson_id.map(i64::from))
            .bind(i64::from(unit.sequence_index))
            .bind(&unit.text)
            .bind(unit.char_range.start as i64)
            .bind(unit.char_range.end as i64)
            .bind(unit.overlap_len as i64)
            .bind(&unit.hash)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn course_candidates(
        &self,
        query_vec: &[f32],
        limit: usize,
        similarity: Similarity,
    ) -> Result<Vec<CourseCandidate>> {
        let rows = sqlx::query("SELECT id, embedding FROM courses ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id")?;
            let blob: Vec<u8> = row.try_get("embedding")?;
            scored.push((id, similarity.score(query_vec, &blob_to_vec(&blob))));
        }

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
        let lesson = filter.lesson_id.map(i64::from);
        let rows = sqlx::query(
            r#"
            SELECT course_id, lesson_id, sequence_index, text, embedding
            FROM units
            WHERE (? IS NULL OR course_id = ?)
              AND (? IS NULL OR lesson_id = ?)
            ORDER BY rowid
            "#,
        )
        .bind(&filter.course_id)
        .bind(&filter.course_id)
        .bind(lesson)
        .bind(lesson)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            let lesson_id: Option<i64> = row.try_get("lesson_id")?;
            let sequence_index: i64 = row.try_get("sequence_index")?;
            let hit = SearchHit {
                course_id: row.try_get("course_id")?,
                lesson_id: lesson_id.map(|l| l as u32),
                sequence_index: sequence_index as u32,
                text: row.try_get("text")?,
                score: 0.0,
            };
            let score = similarity.score(query_vec, &blob_to_vec(&blob));
            scored.push((hit, score));
        }

        Ok(rank(scored, limit)
            .into_iter()
            .map(|(hit, score)| SearchHit { score, ..hit })
            .collect())
    }

    async fn list_courses(&self) -> Result<Vec<CourseSummary>> {
        let rows = sqlx::query(
            "SELECT id, title, course_link, instructor, lessons_json FROM courses ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_course).collect()
    }

    async fn get_course(&self, course_id: &str) -> Result<Option<CourseSummary>> {
        let row = sqlx::query(
            "SELECT id, title, course_link, instructor, lessons_json FROM courses WHERE id = ?",
        )
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_course).transpose()
    }

    async fn delete_course_units(&self, course_id: &str) -> Result<usize> {
        let res = sqlx::query("DELETE FROM units WHERE course_id = ?")
            .bind(course_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() as usize)
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM units").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM courses").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
