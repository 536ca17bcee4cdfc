//! Course document parsing.
//!
//! Turns the text of one course file into a [`CourseSummary`] plus the
//! body of every lesson. The expected layout is:
//!
//! ```text
//! Course Title: Linear Algebra
//! Course Link: https://example.com/linalg
//! Course Instructor: Ada
//!
//! Lesson 1: Intro to Vectors
//! Lesson Link: https://example.com/linalg/1
//! A vector is ...
//! ```
//!
//! The header lines are optional past the first; without the
//! `Course Title:` prefix the first line is taken as the title verbatim.
//! A file without any `Lesson N:` marker becomes a single section with no
//! lesson number. A section whose lesson number does not fit a `u32`, or
//! repeats an earlier section's number, is logged and dropped.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::RagError;
use crate::models::{CourseSummary, Lesson};

/// The body of one lesson, whitespace-normalized and ready for segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct LessonText {
    pub lesson_id: Option<u32>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCourse {
    pub summary: CourseSummary,
    pub lessons: Vec<LessonText>,
}

struct Patterns {
    title: Regex,
    link: Regex,
    instructor: Regex,
    lesson: Regex,
    lesson_link: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        title: Regex::new(r"(?i)^Course Title:\s*(.+)$").expect("valid regex"),
        link: Regex::new(r"(?i)^Course Link:\s*(.+)$").expect("valid regex"),
        instructor: Regex::new(r"(?i)^Course Instructor:\s*(.+)$").expect("valid regex"),
        lesson: Regex::new(r"(?i)^Lesson\s+(\d+):\s*(.+)$").expect("valid regex"),
        lesson_link: Regex::new(r"(?i)^Lesson Link:\s*(.+)$").expect("valid regex"),
    })
}

/// Collapse every whitespace run to a single space.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a course document.
///
/// `fallback_title` (usually the file name) is used when the first line is
/// blank.
pub fn parse_course_document(content: &str, fallback_title: &str) -> ParsedCourse {
    let p = patterns();
    let lines: Vec<&str> = content.trim().lines().collect();

    let mut summary = CourseSummary::new(fallback_title);
    if let Some(first) = lines.first().map(|l| l.trim()).filter(|l| !l.is_empty()) {
        let title = p
            .title
            .captures(first)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_else(|| first.to_string());
        summary = CourseSummary::new(title);
    }

    for line in lines.iter().take(4).skip(1) {
        let line = line.trim();
        if let Some(c) = p.link.captures(line) {
            summary.course_link = Some(c[1].trim().to_string());
        } else if let Some(c) = p.instructor.captures(line) {
            summary.instructor = Some(c[1].trim().to_string());
        }
    }

    let mut start = 1;
    while start < lines.len() && start < 4 && is_header_line(lines[start]) {
        start += 1;
    }

    let mut lessons = Vec::new();
    let mut current: Option<Lesson> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut saw_marker = false;

    let mut i = start;
    while i < lines.len() {
        let line = lines[i];
        if let Some(c) = p.lesson.captures(line.trim()) {
            saw_marker = true;
            flush_lesson(&mut summary, &mut lessons, current.take(), &body);
            body.clear();

            let link = lines
                .get(i + 1)
                .and_then(|next| p.lesson_link.captures(next.trim()))
                .map(|l| l[1].trim().to_string());
            if link.is_some() {
                i += 1;
            }

            match c[1].parse::<u32>() {
                Ok(number) => {
                    current = Some(Lesson {
                        number,
                        title: c[2].trim().to_string(),
                        link,
                    });
                }
                Err(e) => {
                    let err = RagError::Ingestion(format!("lesson number '{}': {}", &c[1], e));
                    tracing::warn!(
                        course = %summary.title,
                        error = %err,
                        "skipping lesson section"
                    );
                }
            }
        } else if current.is_some() {
            body.push(line);
        }
        i += 1;
    }
    flush_lesson(&mut summary, &mut lessons, current.take(), &body);

    if !saw_marker {
        let rest = normalize_whitespace(&lines.get(start..).unwrap_or_default().join("\n"));
        if !rest.is_empty() {
            lessons.push(LessonText {
                lesson_id: None,
                text: rest,
            });
        }
    }

    ParsedCourse { summary, lessons }
}

fn is_header_line(line: &str) -> bool {
    let p = patterns();
    let line = line.trim();
    line.is_empty() || p.link.is_match(line) || p.instructor.is_match(line)
}

fn flush_lesson(
    summary: &mut CourseSummary,
    lessons: &mut Vec<LessonText>,
    lesson: Option<Lesson>,
    body: &[&str],
) {
    let Some(lesson) = lesson else {
        return;
    };
    if summary.lessons.iter().any(|l| l.number == lesson.number) {
        let err = RagError::Ingestion(format!("duplicate lesson number {}", lesson.number));
        tracing::warn!(course = %summary.title, error = %err, "skipping lesson section");
        return;
    }
    let text = normalize_whitespace(&body.join("\n"));
    if text.is_empty() {
        return;
    }
    lessons.push(LessonText {
        lesson_id: Some(lesson.number),
        text,
    });
    summary.lessons.push(lesson);
}
