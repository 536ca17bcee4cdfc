//! Sentence-boundary segmenter with character overlap.
//!
//! Splits lesson text into [`CorpusUnit`]s of at most `chunk_size`
//! characters. Units are packed from whole sentences; each unit after the
//! first starts with the trailing `overlap` characters of the previous one,
//! so every unit is a contiguous slice of the input.
//!
//! # Algorithm
//!
//! 1. Split the text into contiguous sentence spans. A boundary sits after
//!    `.`, `!` or `?` followed by whitespace and an uppercase letter, unless
//!    the terminator closes an abbreviation (`Mr.`, `e.g.`). The whitespace
//!    stays with the sentence before it, so the spans cover the whole text.
//! 2. Start a unit at the next unconsumed sentence and prepend up to
//!    `overlap` characters from the end of the previous unit.
//! 3. Append sentences while the unit stays within `chunk_size`.
//! 4. A unit always takes at least one sentence. If that sentence plus the
//!    full overlap would not fit, the overlap shrinks; a sentence longer
//!    than `chunk_size` becomes a unit of its own.
//!
//! # Guarantees
//!
//! - Concatenating [`CorpusUnit::fresh_text`] over all units reproduces the
//!   input exactly.
//! - Output depends only on the arguments.
//! - Blank input yields no units.
//!
//! # Example
//!
//! ```rust
//! use course_rag::segment::segment;
//!
//! let units = segment("LinAlg", Some(1), "Vectors add. Matrices multiply.", 800, 100);
//! assert_eq!(units.len(), 1);
//! assert_eq!(units[0].sequence_index, 0);
//! ```

use sha2::{Digest, Sha256};

use crate::models::CorpusUnit;

/// Split `text` into overlapping units of at most `chunk_size` characters.
pub fn segment(
    course_id: &str,
    lesson_id: Option<u32>,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<CorpusUnit> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let byte_at: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let sentences = sentence_spans(&chars);

    let mut units = Vec::new();
    let mut prev_len: Option<usize> = None;
    let mut next = 0;

    while next < sentences.len() {
        let content_start = sentences[next].0;
        let first_len = sentences[next].1 - sentences[next].0;

        let mut prefix = prev_len.map_or(0, |len| overlap.min(len));
        if prefix + first_len > chunk_size {
            prefix = chunk_size.saturating_sub(first_len);
        }

        let mut end = sentences[next].1;
        next += 1;
        while next < sentences.len() {
            let (s, e) = sentences[next];
            if prefix + (end - content_start) + (e - s) > chunk_size {
                break;
            }
            end = e;
            next += 1;
        }

        let start = content_start - prefix;
        let slice = &text[byte_at[start]..byte_at[end]];
        units.push(make_unit(
            course_id,
            lesson_id,
            units.len() as u32,
            slice,
            start..end,
            prefix,
        ));
        prev_len = Some(end - start);
    }

    units
}

/// Contiguous `(start, end)` character spans, one per sentence.
fn sentence_spans(chars: &[char]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        if matches!(chars[i], '.' | '!' | '?')
            && chars.get(i + 1).is_some_and(|c| c.is_whitespace())
        {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && chars[j].is_uppercase() && !is_abbreviation(chars, i) {
                spans.push((start, j));
                start = j;
            }
            i = j;
            continue;
        }
        i += 1;
    }

    if start < chars.len() {
        spans.push((start, chars.len()));
    }
    spans
}

/// Whether the terminator at `i` ends an abbreviation such as `Mr.` or `e.g.`.
fn is_abbreviation(chars: &[char], i: usize) -> bool {
    if i >= 2 && chars[i - 2].is_uppercase() && chars[i - 1].is_lowercase() {
        return true;
    }
    i >= 3 && chars[i - 2] == '.' && is_word(chars[i - 3]) && is_word(chars[i - 1])
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn make_unit(
    course_id: &str,
    lesson_id: Option<u32>,
    sequence_index: u32,
    text: &str,
    char_range: std::ops::Range<usize>,
    overlap_len: usize,
) -> CorpusUnit {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    CorpusUnit {
        course_id: course_id.to_string(),
        lesson_id,
        sequence_index,
        text: text.to_string(),
        char_range,
        overlap_len,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejoin(units: &[CorpusUnit]) -> String {
        units.iter().map(|u| u.fresh_text()).collect()
    }

    fn sample_text() -> String {
        (0..40)
            .map(|i| format!("Sentence number {} talks about vectors and spans.", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_small_text_single_unit() {
        let units = segment("c", Some(1), "Hello, world!", 800, 100);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "Hello, world!");
        assert_eq!(units[0].overlap_len, 0);
        assert_eq!(units[0].char_range, 0..13);
    }

    #[test]
    fn test_empty_and_blank_text() {
        assert!(segment("c", Some(1), "", 800, 100).is_empty());
        assert!(segment("c", Some(1), "   \n  ", 800, 100).is_empty());
    }

    #[test]
    fn test_rejoin_reconstructs_input() {
        let text = sample_text();
        for (size, overlap) in [(120, 30), (60, 0), (200, 199), (49, 10)] {
            let units = segment("c", Some(1), &text, size, overlap);
            assert_eq!(rejoin(&units), text, "size={} overlap={}", size, overlap);
        }
    }

    #[test]
    fn test_units_respect_chunk_size() {
        let text = sample_text();
        let units = segment("c", Some(1), &text, 120, 30);
        assert!(units.len() > 1);
        for u in &units {
            assert!(u.text.chars().count() <= 120, "unit too long: {:?}", u.text);
        }
    }

    #[test]
    fn test_oversized_sentence_is_its_own_unit() {
        let long = "word ".repeat(60);
        let text = format!("Short one. Big {} end. Tail sentence.", long.trim_end());
        let units = segment("c", None, &text, 50, 10);
        let oversized: Vec<_> = units
            .iter()
            .filter(|u| u.text.chars().count() > 50)
            .collect();
        assert_eq!(oversized.len(), 1);
        assert_eq!(oversized[0].overlap_len, 0);
        assert_eq!(rejoin(&units), text);
    }

    #[test]
    fn test_overlap_repeats_previous_tail() {
        let text = sample_text();
        let units = segment("c", Some(1), &text, 120, 30);
        for pair in units.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let next = &pair[1];
            assert!(next.overlap_len <= 30);
            let tail: String = prev[prev.len() - next.overlap_len..].iter().collect();
            let head: String = next.text.chars().take(next.overlap_len).collect();
            assert_eq!(tail, head);
            assert_eq!(next.char_range.start + next.overlap_len, pair[0].char_range.end);
        }
        assert!(units.iter().skip(1).all(|u| u.overlap_len == 30));
    }

    #[test]
    fn test_sequence_indices_contiguous() {
        let units = segment("c", Some(4), &sample_text(), 100, 20);
        for (i, u) in units.iter().enumerate() {
            assert_eq!(u.sequence_index, i as u32);
            assert_eq!(u.lesson_id, Some(4));
            assert_eq!(u.course_id, "c");
        }
    }

    #[test]
    fn test_deterministic() {
        let text = sample_text();
        let a = segment("c", Some(1), &text, 90, 25);
        let b = segment("c", Some(1), &text, 90, 25);
        assert_eq!(a, b);
    }

    #[test]
    fn test_abbreviations_do_not_split() {
        let spans = sentence_spans(&"Ask Mr. Smith. See e.g. Chapter two.".chars().collect::<Vec<_>>());
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn test_lowercase_after_period_does_not_split() {
        let spans = sentence_spans(&"Version 2. then more text".chars().collect::<Vec<_>>());
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_multibyte_text() {
        let text = "Ünïcödé text here. Ångström units matter. Émile wrote this.";
        let units = segment("c", Some(1), text, 25, 5);
        assert_eq!(rejoin(&units), text);
    }
}
