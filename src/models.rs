//! Core data types that flow through ingestion and retrieval.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A contiguous span of lesson text; the atomic retrieval granule.
///
/// Identity is `(course_id, lesson_id, sequence_index)`. Re-upserting a
/// unit with the same identity replaces the stored copy.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusUnit {
    pub course_id: String,
    /// Lesson number; `None` for documents without lesson markers.
    pub lesson_id: Option<u32>,
    /// Position of this unit within its lesson, starting at 0.
    pub sequence_index: u32,
    /// Raw span of the source text, overlap prefix included.
    pub text: String,
    /// Character offsets of `text` within the segmented lesson text.
    pub char_range: Range<usize>,
    /// Leading characters of `text` repeated from the previous unit.
    pub overlap_len: usize,
    /// SHA-256 of `text`.
    pub hash: String,
}

impl CorpusUnit {
    /// Stable storage key derived from the unit identity.
    pub fn key(&self) -> String {
        unit_key(&self.course_id, self.lesson_id, self.sequence_index)
    }

    /// The part of `text` not repeated from the previous unit.
    pub fn fresh_text(&self) -> &str {
        match self.text.char_indices().nth(self.overlap_len) {
            Some((byte, _)) => &self.text[byte..],
            None if self.overlap_len == 0 => &self.text,
            None => "",
        }
    }

    /// Text handed to the embedder: the unit prefixed with its course and lesson.
    pub fn context_text(&self) -> String {
        match self.lesson_id {
            Some(lesson) => format!(
                "Course {} Lesson {} content: {}",
                self.course_id,
                lesson,
                self.text.trim()
            ),
            None => format!("Course {} content: {}", self.course_id, self.text.trim()),
        }
    }
}

pub fn unit_key(course_id: &str, lesson_id: Option<u32>, sequence_index: u32) -> String {
    match lesson_id {
        Some(lesson) => format!("{}::{}::{}", course_id, lesson, sequence_index),
        None => format!("{}::-::{}", course_id, sequence_index),
    }
}

/// One lesson of a course, in course order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// Per-course metadata used for course-name resolution.
///
/// The course title doubles as its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub course_id: String,
    pub title: String,
    #[serde(default)]
    pub course_link: Option<String>,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

impl CourseSummary {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            course_id: title.clone(),
            title,
            course_link: None,
            instructor: None,
            lessons: Vec::new(),
        }
    }

    pub fn lesson_titles(&self) -> Vec<&str> {
        self.lessons.iter().map(|l| l.title.as_str()).collect()
    }

    pub fn lesson_link(&self, number: u32) -> Option<&str> {
        self.lessons
            .iter()
            .find(|l| l.number == number)
            .and_then(|l| l.link.as_deref())
    }
}

/// Structured restriction applied to semantic search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub course_id: Option<String>,
    pub lesson_id: Option<u32>,
}

impl SearchFilter {
    pub fn matches(&self, course_id: &str, lesson_id: Option<u32>) -> bool {
        if let Some(c) = &self.course_id {
            if c != course_id {
                return false;
            }
        }
        match self.lesson_id {
            Some(l) => lesson_id == Some(l),
            None => true,
        }
    }
}

/// One ranked unit returned by the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub course_id: String,
    pub lesson_id: Option<u32>,
    pub sequence_index: u32,
    pub text: String,
    pub score: f32,
}

impl SearchHit {
    /// Human-readable citation label, e.g. `"LinAlg - Lesson 2"`.
    pub fn source_label(&self) -> String {
        match self.lesson_id {
            Some(lesson) => format!("{} - Lesson {}", self.course_id, lesson),
            None => self.course_id.clone(),
        }
    }
}

/// A citation attached to an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    /// `"Course - Lesson N"`, or the course title for lesson-less content.
    pub label: String,
    /// Lesson link when the course document gave one, else the course link.
    pub link: Option<String>,
}

impl Source {
    pub fn new(label: impl Into<String>, link: Option<String>) -> Self {
        Self {
            label: label.into(),
            link,
        }
    }
}

/// Hits ordered by descending similarity.
pub type SearchResult = Vec<SearchHit>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Reply to a single query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseAnalytics {
    pub total_courses: usize,
    pub course_titles: Vec<String>,
}
