use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::{ParsedReview, RawBlock};

/// One glyph of a star rating in the source UI.
pub const STAR: char = '★';

const VARIATION_MARKER: &str = "Variation:";

/// Seller-reply markers, longest first so prefix stripping keeps the reply
/// text clean. "Selleker" is a localized spelling seen in the wild.
const SELLER_MARKERS: &[&str] = &["Seller Response", "Seller Reply", "Selleker", "Seller"];

const MAX_COMMENT_LINES: usize = 3;
const MIN_COMMENT_LINE_CHARS: usize = 3;
const EXCERPT_CAP: usize = 200;

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());
static SLASH_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());
static VERBOSE_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\d{1,2}) (January|February|March|April|May|June|July|August|September|October|November|December) (\d{4})\b",
    )
    .unwrap()
});

/// A block that looked like a review but could not be parsed. Local to the
/// block: callers skip it, never abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("fewer than two non-empty lines")]
    TooFewLines,
}

/// Recover structured fields from a review-shaped text block.
///
/// Pure over the block content: the same block always yields the same
/// `ParsedReview`.
pub fn extract(block: &RawBlock) -> Result<ParsedReview, ParseFailure> {
    let lines: Vec<&str> = block
        .content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.len() < 2 {
        return Err(ParseFailure::TooFewLines);
    }

    let author = extract_author(lines[0], &block.content);
    let rating = extract_rating(&block.content);
    let timestamp = extract_timestamp(&lines);
    let comment = extract_comment(&lines);
    let variant = extract_variant(&lines);
    let seller_reply = extract_seller_reply(&block.content);
    let raw_excerpt: String = block.content.chars().take(EXCERPT_CAP).collect();
    let content_length = comment.chars().count();

    Ok(ParsedReview {
        author,
        rating,
        timestamp,
        comment,
        variant,
        seller_reply,
        raw_excerpt,
        content_length,
    })
}

/// First line, keeping only username-safe characters. Empty or single-char
/// results get a deterministic pseudonym derived from the whole block.
fn extract_author(first_line: &str, full_text: &str) -> String {
    let cleaned: String = first_line
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '*' | '-' | '.'))
        .collect();
    if cleaned.chars().count() >= 2 {
        return cleaned;
    }
    let digest = Sha256::digest(full_text.as_bytes());
    format!(
        "user_{:02x}{:02x}{:02x}{:02x}",
        digest[0], digest[1], digest[2], digest[3]
    )
}

/// Count star glyphs across the whole block, clamped to 5. Zero glyphs
/// defaults to 5, matching the source system's behavior (see DESIGN.md).
fn extract_rating(text: &str) -> u8 {
    let stars = text.chars().filter(|&c| c == STAR).count();
    if stars == 0 {
        5
    } else {
        stars.min(5) as u8
    }
}

/// First date on the first line carrying one, normalized to ISO.
/// Patterns tried per line in priority order: ISO, DD/MM/YYYY, D Month YYYY.
fn extract_timestamp(lines: &[&str]) -> String {
    for line in lines {
        if let Some(m) = ISO_DATE_RE.find(line) {
            return m.as_str().to_string();
        }
        if let Some(caps) = SLASH_DATE_RE.captures(line) {
            let (d, mo, y) = (&caps[1], &caps[2], &caps[3]);
            if let Some(date) = parse_dmy(d, mo, y) {
                return date.format("%Y-%m-%d").to_string();
            }
        }
        if let Some(caps) = VERBOSE_DATE_RE.captures(line) {
            let candidate = format!("{} {} {}", &caps[1], &caps[2], &caps[3]);
            if let Ok(date) = NaiveDate::parse_from_str(&candidate, "%d %B %Y") {
                return date.format("%Y-%m-%d").to_string();
            }
        }
    }
    "unknown".to_string()
}

fn parse_dmy(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        year.parse().ok()?,
        month.parse().ok()?,
        day.parse().ok()?,
    )
}

/// Comment body: skip the author line, date-led lines and variation lines;
/// stop outright at a seller-reply marker (everything after it belongs to
/// the seller, not the buyer). Capped at the first few eligible lines.
fn extract_comment(lines: &[&str]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if i == 0 || line_starts_with_date(line) || line.contains(VARIATION_MARKER) {
            continue;
        }
        if contains_seller_marker(line) {
            break;
        }
        if line.chars().count() > MIN_COMMENT_LINE_CHARS {
            parts.push(line);
            if parts.len() == MAX_COMMENT_LINES {
                break;
            }
        }
    }
    parts.join(" ")
}

/// A line counts as a date line only when the date sits at its start;
/// comments that merely mention a date stay in the comment body.
fn line_starts_with_date(line: &str) -> bool {
    [&*ISO_DATE_RE, &*SLASH_DATE_RE, &*VERBOSE_DATE_RE]
        .iter()
        .any(|re| re.find(line).is_some_and(|m| m.start() == 0))
}

fn contains_seller_marker(line: &str) -> bool {
    SELLER_MARKERS.iter().any(|m| line.contains(m))
}

fn extract_variant(lines: &[&str]) -> String {
    lines
        .iter()
        .find_map(|line| {
            line.find(VARIATION_MARKER)
                .map(|idx| line[idx + VARIATION_MARKER.len()..].trim().to_string())
        })
        .unwrap_or_default()
}

/// Secondary scan over the raw text: everything from the seller-reply marker
/// to the next blank line. Raw lines are used here because blank lines are
/// the paragraph boundary.
fn extract_seller_reply(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let Some(start) = lines.iter().position(|l| contains_seller_marker(l)) else {
        return String::new();
    };

    let mut parts: Vec<&str> = Vec::new();
    let marker = SELLER_MARKERS
        .iter()
        .find(|m| lines[start].contains(*m))
        .unwrap_or(&SELLER_MARKERS[0]);
    if let Some(idx) = lines[start].find(marker) {
        let after = lines[start][idx + marker.len()..]
            .trim_start_matches(':')
            .trim();
        if !after.is_empty() {
            parts.push(after);
        }
    }
    for line in &lines[start + 1..] {
        if line.is_empty() {
            break;
        }
        parts.push(line);
    }
    parts.join(" ")
}
