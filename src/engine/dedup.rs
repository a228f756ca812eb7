use super::ParsedReview;

/// Comment characters that participate in the key. Long enough to tell
/// distinct reviews apart, short enough to tolerate re-render drift in the
/// comment tail.
pub const COMMENT_PREFIX_CHARS: usize = 40;

/// Content-addressed identity of a review across extraction passes.
///
/// Pure: identical review content always yields the identical key, and
/// incidental whitespace around the comment survives normalization.
pub fn dedup_key(review: &ParsedReview) -> String {
    let normalized: String = review
        .comment
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .chars()
        .take(COMMENT_PREFIX_CHARS)
        .collect();
    format!(
        "{}|{}|{}",
        review.author.to_lowercase(),
        review.timestamp,
        normalized
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(author: &str, timestamp: &str, comment: &str) -> ParsedReview {
        ParsedReview {
            author: author.to_string(),
            rating: 4,
            timestamp: timestamp.to_string(),
            comment: comment.to_string(),
            variant: String::new(),
            seller_reply: String::new(),
            raw_excerpt: comment.to_string(),
            content_length: comment.chars().count(),
        }
    }

    #[test]
    fn identical_content_identical_key() {
        let a = review("john_doe", "2024-03-10", "great product");
        let b = review("john_doe", "2024-03-10", "great product");
        assert_eq!(dedup_key(&a), dedup_key(&b));
    }

    #[test]
    fn whitespace_drift_same_key() {
        let a = review("john_doe", "2024-03-10", "great  product,\tfast shipping");
        let b = review("john_doe", "2024-03-10", " great product, fast shipping ");
        assert_eq!(dedup_key(&a), dedup_key(&b));
    }

    #[test]
    fn tail_drift_beyond_prefix_same_key() {
        let base = "x".repeat(COMMENT_PREFIX_CHARS);
        let a = review("u", "2024-01-01", &format!("{base} tail one"));
        let b = review("u", "2024-01-01", &format!("{base} another tail"));
        assert_eq!(dedup_key(&a), dedup_key(&b));
    }

    #[test]
    fn difference_inside_prefix_distinct_key() {
        let base = "x".repeat(COMMENT_PREFIX_CHARS - 1);
        let a = review("u", "2024-01-01", &format!("{base}a"));
        let b = review("u", "2024-01-01", &format!("{base}b"));
        assert_ne!(dedup_key(&a), dedup_key(&b));
    }

    #[test]
    fn author_case_folded() {
        let a = review("John_Doe", "2024-03-10", "great product");
        let b = review("john_doe", "2024-03-10", "great product");
        assert_eq!(dedup_key(&a), dedup_key(&b));
    }

    #[test]
    fn distinct_timestamp_distinct_key() {
        let a = review("u", "2024-03-10", "great product");
        let b = review("u", "2024-03-11", "great product");
        assert_ne!(dedup_key(&a), dedup_key(&b));
    }
}
