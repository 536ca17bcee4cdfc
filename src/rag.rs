//! Orchestrator: wires index, tools, generator and session memory behind
//! `answer(query, session_id)` and the ingestion entry points.
//!
//! # Query path
//!
//! ```text
//! query + session_id
//!   → SessionStore::get_history
//!   → Generator::answer  ⇄  ToolRegistry  ⇄  Index
//!   → SessionStore::append
//!   → (answer, sources, session_id)
//! ```
//!
//! # Write path
//!
//! ```text
//! file → extract → parse_course_document → segment (per lesson) → Index
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::{Config, StoreBackend};
use crate::document::{parse_course_document, ParsedCourse};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{RagError, RagResult};
use crate::extract::read_course_file;
use crate::generator::Generator;
use crate::index::Index;
use crate::llm::{CompletionClient, OpenAiChatClient};
use crate::models::{CourseAnalytics, CourseSummary, QueryResponse};
use crate::segment::segment;
use crate::session::SessionStore;
use crate::store::{InMemoryStore, SqliteStore, VectorStore};
use crate::tools::ToolRegistry;

/// Outcome of a folder ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub courses_added: usize,
    pub units_added: usize,
    /// Titles already present in the index.
    pub skipped: Vec<String>,
    /// Files that could not be read or parsed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

pub struct RagSystem {
    config: Config,
    index: Arc<Index>,
    tools: ToolRegistry,
    generator: Generator,
    sessions: SessionStore,
}

impl RagSystem {
    /// Build the production stack from configuration: the configured store
    /// backend (schema applied), embedder, and OpenAI-compatible client.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn VectorStore> = match config.retrieval.backend {
            StoreBackend::Sqlite => Arc::new(SqliteStore::open(&config).await?),
            StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        };
        let embedder = create_embedder(&config.embedding)?;
        let client = Arc::new(OpenAiChatClient::from_config(&config.llm)?);
        Ok(Self::new(config, store, embedder, client))
    }

    pub fn new(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        client: Arc<dyn CompletionClient>,
    ) -> Self {
        let index = Arc::new(
            Index::new(
                store,
                embedder,
                config.retrieval.similarity,
                config.retrieval.max_results,
            )
            .with_course_match_threshold(config.retrieval.course_match_threshold),
        );
        let tools = ToolRegistry::with_course_search(Arc::clone(&index));
        let generator = Generator::new(client, config.llm.max_rounds);
        let sessions = SessionStore::new(config.session.max_history, config.session.max_sessions);

        Self {
            config,
            index,
            tools,
            generator,
            sessions,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Arc<Index> {
        &self.index
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Answer `query` in the context of `session_id`.
    ///
    /// `None` starts a new session. The exchange is recorded only when
    /// generation succeeds.
    pub async fn answer(&self, query: &str, session_id: Option<&str>) -> RagResult<QueryResponse> {
        let history = match session_id {
            Some(id) => self.sessions.get_history(id).await,
            None => Vec::new(),
        };

        let generated = self.generator.answer(query, &history, &self.tools).await?;
        let session_id = self
            .sessions
            .append(session_id, query, generated.text.as_str())
            .await;

        tracing::info!(
            session_id = %session_id,
            rounds = generated.rounds,
            sources = generated.sources.len(),
            "answered query"
        );

        Ok(QueryResponse {
            answer: generated.text,
            sources: generated.sources,
            session_id,
        })
    }

    /// Index one parsed course: its summary plus every lesson's units.
    /// Units from an earlier copy of the course are replaced, not merged.
    /// Returns the number of units written.
    pub async fn ingest_course(&self, course: &ParsedCourse) -> RagResult<usize> {
        let course_id = course.summary.course_id.as_str();
        self.index.upsert_course_summary(&course.summary).await?;

        let removed = self.index.remove_course_units(course_id).await?;
        if removed > 0 {
            tracing::debug!(course = course_id, units = removed, "dropped previous units");
        }

        let mut total = 0;
        for lesson in &course.lessons {
            let units = segment(
                course_id,
                lesson.lesson_id,
                &lesson.text,
                self.config.chunking.chunk_size,
                self.config.chunking.chunk_overlap,
            );
            if units.is_empty() {
                tracing::warn!(course = course_id, lesson = ?lesson.lesson_id, "lesson produced no units");
                continue;
            }
            self.index.upsert_units(&units).await?;
            total += units.len();
        }

        tracing::info!(course = course_id, lessons = course.lessons.len(), units = total, "indexed course");
        Ok(total)
    }

    /// Parse and index course text. `fallback_title` names the course when
    /// the first line is blank.
    pub async fn add_course_text(
        &self,
        text: &str,
        fallback_title: &str,
    ) -> RagResult<(CourseSummary, usize)> {
        let parsed = parse_course_document(text, fallback_title);
        if parsed.summary.title.trim().is_empty() {
            return Err(RagError::Ingestion("course has no title".to_string()));
        }
        let units = self.ingest_course(&parsed).await?;
        Ok((parsed.summary, units))
    }

    /// Read, parse and index one course file.
    pub async fn add_course_document(&self, path: &Path) -> RagResult<(CourseSummary, usize)> {
        let text = read_course_file(path).map_err(RagError::ingestion)?;
        let fallback = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.add_course_text(&text, &fallback).await
    }

    /// Index every matching course file under `folder`.
    ///
    /// Courses whose title is already indexed are skipped. Unreadable files
    /// are logged and skipped; an index write failure aborts.
    pub async fn add_course_folder(
        &self,
        folder: &Path,
        clear_existing: bool,
    ) -> RagResult<IngestReport> {
        if !folder.is_dir() {
            return Err(RagError::Ingestion(format!(
                "folder does not exist: {}",
                folder.display()
            )));
        }

        if clear_existing {
            tracing::info!("clearing existing index");
            self.index.clear().await?;
        }

        let include = build_globset(&self.config.ingest.include_globs)?;
        let mut excludes = vec!["**/.git/**".to_string()];
        excludes.extend(self.config.ingest.exclude_globs.iter().cloned());
        let exclude = build_globset(&excludes)?;

        let mut known: HashSet<String> = self
            .index
            .existing_course_titles()
            .await?
            .into_iter()
            .collect();
        let mut report = IngestReport::default();

        for path in course_files(folder, &include, &exclude) {
            let text = match read_course_file(&path) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable course file");
                    report.failed.push((path, e.to_string()));
                    continue;
                }
            };

            let fallback = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let parsed = parse_course_document(&text, &fallback);
            let title = parsed.summary.title.clone();

            if known.contains(&title) {
                tracing::info!(course = %title, "course already indexed, skipping");
                report.skipped.push(title);
                continue;
            }

            let units = self.ingest_course(&parsed).await?;
            known.insert(title);
            report.courses_added += 1;
            report.units_added += units;
        }

        Ok(report)
    }

    pub async fn course_analytics(&self) -> RagResult<CourseAnalytics> {
        let course_titles = self.index.existing_course_titles().await?;
        Ok(CourseAnalytics {
            total_courses: course_titles.len(),
            course_titles,
        })
    }
}

fn build_globset(patterns: &[String]) -> RagResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::Config(e.to_string()))
}

/// Matching files under `root`, sorted by relative path.
fn course_files(root: &Path, include: &GlobSet, exclude: &GlobSet) -> Vec<PathBuf> {
    let mut files: Vec<(String, PathBuf)> = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();
        if exclude.is_match(&rel) || !include.is_match(&rel) {
            continue;
        }
        files.push((rel, path.to_path_buf()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    files.into_iter().map(|(_, p)| p).collect()
}
