pub mod convergence;
pub mod dedup;
pub mod extract;
pub mod filter;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single text block observed in one snapshot. Produced fresh on every
/// snapshot, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub content: String,
    /// Order the block was seen within its pass.
    pub sequence_index: usize,
}

/// Structured review recovered from one raw block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReview {
    pub author: String,
    pub rating: u8,
    pub timestamp: String,
    pub comment: String,
    pub variant: String,
    pub seller_reply: String,
    /// Bounded copy of the source text, diagnostics only.
    pub raw_excerpt: String,
    pub content_length: usize,
}

#[derive(Debug, Error)]
pub enum HarvestError {
    /// The rendering collaborator could not be reached or set up.
    /// Fatal: the run cannot start.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),
    /// The collaborator failed mid-run. The controller keeps partial results.
    #[error("collaborator failed: {0}")]
    Collaborator(String),
}
