use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::engine::{dedup, ParsedReview};

const DB_PATH: &str = "data/reviews.sqlite";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id           INTEGER PRIMARY KEY,
            url          TEXT NOT NULL,
            target_count INTEGER NOT NULL,
            status       TEXT NOT NULL,
            passes       INTEGER NOT NULL,
            collected    INTEGER NOT NULL,
            started_at   TEXT NOT NULL,
            finished_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS reviews (
            id             INTEGER PRIMARY KEY,
            run_id         INTEGER NOT NULL REFERENCES runs(id),
            author         TEXT NOT NULL,
            rating         INTEGER NOT NULL,
            posted_at      TEXT NOT NULL,
            comment        TEXT NOT NULL,
            variant        TEXT NOT NULL,
            seller_reply   TEXT NOT NULL,
            raw_excerpt    TEXT NOT NULL,
            content_length INTEGER NOT NULL,
            dedup_key      TEXT NOT NULL,
            UNIQUE(run_id, dedup_key)
        );
        CREATE INDEX IF NOT EXISTS idx_reviews_run ON reviews(run_id);
        ",
    )?;
    Ok(())
}

pub struct RunRow {
    pub id: i64,
    pub url: String,
    pub target_count: i64,
    pub status: String,
    pub passes: i64,
    pub collected: i64,
    pub started_at: String,
    pub finished_at: String,
}

/// Persist one finished run with its reviews. Rowid order preserves
/// insertion order, so exports read back in extraction order.
pub fn save_run(
    conn: &Connection,
    url: &str,
    target_count: usize,
    status: &str,
    passes: usize,
    started_at: DateTime<Utc>,
    reviews: &[ParsedReview],
) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO runs (url, target_count, status, passes, collected, started_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            url,
            target_count as i64,
            status,
            passes as i64,
            reviews.len() as i64,
            started_at.to_rfc3339(),
        ],
    )?;
    let run_id = tx.last_insert_rowid();
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO reviews
             (run_id, author, rating, posted_at, comment, variant, seller_reply,
              raw_excerpt, content_length, dedup_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for r in reviews {
            stmt.execute(rusqlite::params![
                run_id,
                r.author,
                r.rating,
                r.timestamp,
                r.comment,
                r.variant,
                r.seller_reply,
                r.raw_excerpt,
                r.content_length as i64,
                dedup::dedup_key(r),
            ])?;
        }
    }
    tx.commit()?;
    Ok(run_id)
}

pub fn fetch_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, url, target_count, status, passes, collected, started_at, finished_at
         FROM runs ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(RunRow {
                id: row.get(0)?,
                url: row.get(1)?,
                target_count: row.get(2)?,
                status: row.get(3)?,
                passes: row.get(4)?,
                collected: row.get(5)?,
                started_at: row.get(6)?,
                finished_at: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn latest_run_id(conn: &Connection) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT MAX(id) FROM runs", [], |r| r.get::<_, Option<i64>>(0))?;
    Ok(id)
}

pub fn fetch_run_reviews(conn: &Connection, run_id: i64) -> Result<Vec<ParsedReview>> {
    let mut stmt = conn.prepare(
        "SELECT author, rating, posted_at, comment, variant, seller_reply,
                raw_excerpt, content_length
         FROM reviews WHERE run_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([run_id], |row| {
            Ok(ParsedReview {
                author: row.get(0)?,
                rating: row.get(1)?,
                timestamp: row.get(2)?,
                comment: row.get(3)?,
                variant: row.get(4)?,
                seller_reply: row.get(5)?,
                raw_excerpt: row.get(6)?,
                content_length: row.get::<_, i64>(7)? as usize,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub runs: usize,
    pub reviews: usize,
    pub avg_rating: f64,
    pub unique_authors: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let runs: usize = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    let reviews: usize = conn.query_row("SELECT COUNT(*) FROM reviews", [], |r| r.get(0))?;
    let avg_rating: f64 = conn.query_row(
        "SELECT COALESCE(AVG(rating), 0.0) FROM reviews",
        [],
        |r| r.get(0),
    )?;
    let unique_authors: usize = conn.query_row(
        "SELECT COUNT(DISTINCT author) FROM reviews",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        runs,
        reviews,
        avg_rating,
        unique_authors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(author: &str, rating: u8, comment: &str) -> ParsedReview {
        ParsedReview {
            author: author.to_string(),
            rating,
            timestamp: "2024-03-10".to_string(),
            comment: comment.to_string(),
            variant: String::new(),
            seller_reply: String::new(),
            raw_excerpt: comment.to_string(),
            content_length: comment.chars().count(),
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn save_and_fetch_preserves_order() {
        let conn = test_conn();
        let reviews = vec![
            review("alice", 5, "first review body"),
            review("bob", 3, "second review body"),
            review("carol", 4, "third review body"),
        ];
        let run_id = save_run(
            &conn,
            "https://shopee.co.id/product-i.1.2",
            50,
            "content_exhausted",
            3,
            Utc::now(),
            &reviews,
        )
        .unwrap();

        let back = fetch_run_reviews(&conn, run_id).unwrap();
        assert_eq!(back, reviews);
    }

    #[test]
    fn duplicate_keys_ignored_within_run() {
        let conn = test_conn();
        let reviews = vec![
            review("alice", 5, "same body"),
            review("alice", 5, "same body"),
        ];
        let run_id = save_run(&conn, "u", 10, "target_reached", 1, Utc::now(), &reviews).unwrap();
        assert_eq!(fetch_run_reviews(&conn, run_id).unwrap().len(), 1);
    }

    #[test]
    fn latest_run_and_stats() {
        let conn = test_conn();
        assert!(latest_run_id(&conn).unwrap().is_none());

        save_run(&conn, "u1", 10, "target_reached", 1, Utc::now(), &[review("a", 4, "one body")])
            .unwrap();
        let second = save_run(
            &conn,
            "u2",
            10,
            "target_reached",
            1,
            Utc::now(),
            &[review("a", 2, "two body"), review("b", 4, "three body")],
        )
        .unwrap();

        assert_eq!(latest_run_id(&conn).unwrap(), Some(second));
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.runs, 2);
        assert_eq!(s.reviews, 3);
        assert_eq!(s.unique_authors, 2);
        assert!((s.avg_rating - 10.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn runs_listing_newest_first() {
        let conn = test_conn();
        save_run(&conn, "first", 10, "target_reached", 1, Utc::now(), &[]).unwrap();
        save_run(&conn, "second", 10, "no_candidates", 2, Utc::now(), &[]).unwrap();
        let rows = fetch_runs(&conn, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].url, "second");
        assert_eq!(rows[1].url, "first");
    }
}
