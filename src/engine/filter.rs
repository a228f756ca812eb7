use super::extract::STAR;
use super::RawBlock;

/// Blocks at or below this length are stray UI fragments that happen to
/// carry a star glyph (rating widgets, sort buttons), not reviews.
pub const MIN_BLOCK_CHARS: usize = 20;

/// Decide whether a raw text block plausibly holds one review.
///
/// Deliberately over-inclusive: false positives fall out later when field
/// extraction returns no parse, false negatives are accepted as loss.
pub fn classify(block: &RawBlock) -> bool {
    let text = block.content.trim();
    !text.is_empty() && text.contains(STAR) && text.chars().count() > MIN_BLOCK_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(content: &str) -> RawBlock {
        RawBlock {
            content: content.to_string(),
            sequence_index: 0,
        }
    }

    #[test]
    fn empty_block_rejected() {
        assert!(!classify(&block("")));
        assert!(!classify(&block("   \n  \t ")));
    }

    #[test]
    fn no_glyph_rejected() {
        assert!(!classify(&block(
            "john_doe\n2024-03-10\nGreat product, fast shipping"
        )));
    }

    #[test]
    fn short_fragment_with_glyph_rejected() {
        // A stray rating widget: has the glyph but is too short.
        assert!(!classify(&block("★★★★★")));
        assert!(!classify(&block("Sort: ★ rating")));
    }

    #[test]
    fn review_shaped_block_accepted() {
        assert!(classify(&block(
            "john_doe★★★★☆\n2024-03-10\nGreat product, fast shipping"
        )));
    }

    #[test]
    fn boundary_length() {
        // Exactly MIN_BLOCK_CHARS chars is still too short; one more passes.
        let at = format!("★{}", "x".repeat(MIN_BLOCK_CHARS - 1));
        let over = format!("★{}", "x".repeat(MIN_BLOCK_CHARS));
        assert_eq!(at.chars().count(), MIN_BLOCK_CHARS);
        assert!(!classify(&block(&at)));
        assert!(classify(&block(&over)));
    }
}
