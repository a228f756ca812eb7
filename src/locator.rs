use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::engine::extract::STAR;
use crate::engine::RawBlock;

/// Container selectors the review widget has been seen to use. The markup
/// shifts between renders, so these are guesses tried before the generic
/// scan.
const CONTAINER_SELECTORS: &[&str] = &[
    "div.shopee-product-rating",
    "div[class*='product-rating-card']",
    "div[class*='rating__main']",
    "div[class*='review-item']",
];

static CONTAINERS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    CONTAINER_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});
static DIV: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").unwrap());

/// Candidate-locator strategies in priority order; the first one returning
/// a non-empty result wins. Each is a pure function over the snapshot.
const STRATEGIES: &[(&str, fn(&Html) -> Vec<String>)] = &[
    ("review-containers", known_containers),
    ("starred-divs", starred_divs),
];

/// Turn a rendered page snapshot into the text blocks visible in it.
pub fn locate_blocks(html: &str) -> Vec<RawBlock> {
    let doc = Html::parse_document(html);
    for (name, locate) in STRATEGIES {
        let texts = locate(&doc);
        if !texts.is_empty() {
            debug!(strategy = name, blocks = texts.len(), "locator strategy matched");
            return texts
                .into_iter()
                .enumerate()
                .map(|(sequence_index, content)| RawBlock {
                    content,
                    sequence_index,
                })
                .collect();
        }
    }
    Vec::new()
}

/// Known review-container selectors, keeping only star-bearing blocks.
fn known_containers(doc: &Html) -> Vec<String> {
    let mut texts = Vec::new();
    for selector in CONTAINERS.iter() {
        for el in doc.select(selector) {
            let text = element_lines(el);
            if text.contains(STAR) {
                texts.push(text);
            }
        }
        if !texts.is_empty() {
            break;
        }
    }
    texts
}

/// Generic fallback: every div whose text carries a star glyph. Nested
/// containers produce redundant blocks; the dedup stage absorbs them.
fn starred_divs(doc: &Html) -> Vec<String> {
    doc.select(&DIV)
        .map(element_lines)
        .filter(|t| t.contains(STAR))
        .collect()
}

/// Element text with child-element boundaries preserved as line breaks,
/// approximating what a browser driver reports as visible text.
fn element_lines(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINER_PAGE: &str = r#"
        <html><body>
          <div class="page-header">Some Product</div>
          <div class="shopee-product-rating">
            <div>john_doe★★★★☆</div>
            <div>2024-03-10</div>
            <div>Great product, fast shipping</div>
            <div>Variation: Red-L</div>
          </div>
          <div class="shopee-product-rating">
            <div>anna_k★★★★★</div>
            <div>2024-03-12</div>
            <div>Exactly as described</div>
          </div>
        </body></html>"#;

    #[test]
    fn container_strategy_wins() {
        let blocks = locate_blocks(CONTAINER_PAGE);
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].content.contains("john_doe"));
        assert!(blocks[0].content.contains("Variation: Red-L"));
        assert_eq!(blocks[0].sequence_index, 0);
        assert_eq!(blocks[1].sequence_index, 1);
    }

    #[test]
    fn container_text_keeps_line_structure() {
        let blocks = locate_blocks(CONTAINER_PAGE);
        let lines: Vec<&str> = blocks[0].content.lines().collect();
        assert_eq!(lines[0], "john_doe★★★★☆");
        assert_eq!(lines[1], "2024-03-10");
    }

    #[test]
    fn generic_scan_catches_unknown_markup() {
        let html = r#"
            <html><body>
              <div class="x9f3a">
                <div>buyer42★★★</div>
                <div>2024-05-01</div>
                <div>Came a bit late but works</div>
              </div>
            </body></html>"#;
        let blocks = locate_blocks(html);
        assert!(!blocks.is_empty());
        assert!(blocks.iter().any(|b| b.content.contains("buyer42")));
    }

    #[test]
    fn starless_container_falls_through() {
        // Containers exist but hold no ratings: the strategy must not
        // short-circuit with useless blocks.
        let html = r#"
            <html><body>
              <div class="shopee-product-rating">No reviews yet</div>
              <div class="other">
                <div>late_adopter★★★★</div>
                <div>really solid build</div>
              </div>
            </body></html>"#;
        let blocks = locate_blocks(html);
        assert!(blocks.iter().all(|b| b.content.contains(STAR)));
        assert!(blocks.iter().any(|b| b.content.contains("late_adopter")));
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(locate_blocks("<html><body><p>nothing here</p></body></html>").is_empty());
    }

    #[test]
    fn fixture_page_parses_end_to_end() {
        use crate::engine::{convergence, extract, filter};

        let html = std::fs::read_to_string("tests/fixtures/review_page.html").unwrap();
        let blocks = locate_blocks(&html);
        assert!(blocks.len() >= 3);

        let mut state = convergence::CollectionState::new(50);
        convergence::scan_pass(&mut state, &blocks);
        assert_eq!(state.collected.len(), 3);

        let first = &state.collected[0];
        assert_eq!(first.author, "dewi.s");
        assert_eq!(first.rating, 5);
        assert_eq!(first.timestamp, "2024-06-18");

        // Every located block that passes the filter must also extract.
        let failures = blocks
            .iter()
            .filter(|b| filter::classify(b))
            .filter(|b| extract::extract(b).is_err())
            .count();
        assert_eq!(failures, 0);
    }
}
