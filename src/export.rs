use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::engine::ParsedReview;

const HEADER: [&str; 6] = [
    "author",
    "timestamp",
    "rating",
    "comment",
    "variant",
    "seller_reply",
];

/// Write reviews to a CSV file, one row per review, insertion order kept.
pub fn write_csv(path: &Path, reviews: &[ParsedReview]) -> Result<usize> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(HEADER)?;
    for r in reviews {
        let rating = r.rating.to_string();
        wtr.write_record([
            r.author.as_str(),
            r.timestamp.as_str(),
            rating.as_str(),
            r.comment.as_str(),
            r.variant.as_str(),
            r.seller_reply.as_str(),
        ])?;
    }
    wtr.flush()?;
    info!(path = %path.display(), rows = reviews.len(), "CSV written");
    Ok(reviews.len())
}
