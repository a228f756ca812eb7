mod db;
mod driver;
mod engine;
mod export;
mod locator;

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::warn;

use driver::BrowserSource;
use engine::convergence::{self, CollectionConfig, HarvestOutcome, HarvestStatus};
use engine::{HarvestError, ParsedReview};

#[derive(Parser)]
#[command(name = "shopee_reviews", about = "Shopee review scraper via WebDriver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest reviews from a product page
    Harvest {
        /// Product page URL
        url: String,
        /// Target review count
        #[arg(short = 'n', long, default_value = "50")]
        count: usize,
        /// Max reveal (scroll) actions before giving up
        #[arg(long, default_value = "5")]
        max_reveals: usize,
        /// Settle delay after each reveal, in milliseconds
        #[arg(long, default_value = "2000")]
        settle_ms: u64,
        /// Overall time budget in seconds (partial results are kept)
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Show the browser window instead of running headless
        #[arg(long)]
        show_browser: bool,
        /// WebDriver endpoint
        #[arg(long, default_value = "http://localhost:9515")]
        webdriver_url: String,
        /// Also write the result to this CSV file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Export a stored run to CSV
    Export {
        /// Run id (default: latest run)
        #[arg(short, long)]
        run: Option<i64>,
        /// Output CSV path
        #[arg(short, long, default_value = "reviews.csv")]
        out: PathBuf,
    },
    /// List stored runs
    Runs {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Show collection statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Harvest {
            url,
            count,
            max_reveals,
            settle_ms,
            timeout_secs,
            show_browser,
            webdriver_url,
            out,
        } => {
            let config = CollectionConfig {
                target_count: count,
                max_reveals,
                settle_delay: Duration::from_millis(settle_ms),
                deadline: timeout_secs.map(Duration::from_secs),
            };
            harvest(&url, &webdriver_url, !show_browser, &config, out.as_deref()).await
        }
        Commands::Export { run, out } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let run_id = match run.or(db::latest_run_id(&conn)?) {
                Some(id) => id,
                None => {
                    println!("No stored runs. Run 'harvest' first.");
                    return Ok(());
                }
            };
            let reviews = db::fetch_run_reviews(&conn, run_id)?;
            let rows = export::write_csv(&out, &reviews)?;
            println!("Exported {} reviews from run {} to {}", rows, run_id, out.display());
            Ok(())
        }
        Commands::Runs { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let rows = db::fetch_runs(&conn, limit)?;
            if rows.is_empty() {
                println!("No runs yet.");
                return Ok(());
            }
            println!(
                "{:>4} | {:<44} | {:>6} | {:>6} | {:>6} | {:<24}",
                "id", "URL", "Target", "Got", "Passes", "Status"
            );
            println!("{}", "-".repeat(104));
            for r in &rows {
                println!(
                    "{:>4} | {:<44} | {:>6} | {:>6} | {:>6} | {:<24}",
                    r.id,
                    truncate(&r.url, 44),
                    r.target_count,
                    r.collected,
                    r.passes,
                    r.status
                );
            }
            println!("\n{} runs", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Runs:           {}", s.runs);
            println!("Reviews:        {}", s.reviews);
            println!("Avg rating:     {:.1}", s.avg_rating);
            println!("Unique authors: {}", s.unique_authors);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn harvest(
    url: &str,
    webdriver_url: &str,
    headless: bool,
    config: &CollectionConfig,
    out: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    let conn = db::connect()?;
    db::init_schema(&conn)?;

    let started = Utc::now();
    let mut source = BrowserSource::connect(webdriver_url, headless).await?;
    let outcome = drive_session(&mut source, url, config).await;
    if let Err(e) = source.quit().await {
        warn!(error = %e, "failed to close browser session");
    }
    let outcome = outcome?;

    let run_id = db::save_run(
        &conn,
        url,
        config.target_count,
        outcome.status.as_str(),
        outcome.passes,
        started,
        &outcome.reviews,
    )?;

    report_outcome(&outcome, run_id);

    if let Some(path) = out {
        let rows = export::write_csv(path, &outcome.reviews)?;
        println!("Wrote {} reviews to {}", rows, path.display());
    }
    Ok(())
}

async fn drive_session(
    source: &mut BrowserSource,
    url: &str,
    config: &CollectionConfig,
) -> Result<HarvestOutcome, HarvestError> {
    source.navigate(url).await?;
    match source.title().await {
        Ok(title) => println!("Page: {}", title),
        Err(e) => warn!(error = %e, "could not read page title"),
    }
    convergence::run(source, config).await
}

fn report_outcome(outcome: &HarvestOutcome, run_id: i64) {
    if outcome.status == HarvestStatus::NoCandidates {
        println!("No reviews found (run {} saved with empty result).", run_id);
        println!("Possible causes:");
        println!("  - the product has no reviews");
        println!("  - the page structure changed");
        println!("  - the page did not finish loading before the scan");
        return;
    }

    println!(
        "Collected {} reviews in {} passes ({}), saved as run {}.",
        outcome.reviews.len(),
        outcome.passes,
        outcome.status,
        run_id
    );
    if outcome.parse_failures > 0 {
        println!("Skipped {} unparseable candidate blocks.", outcome.parse_failures);
    }
    print_summary(&outcome.reviews);
}

/// Summary counters computed over the returned sequence, not stored state.
fn print_summary(reviews: &[ParsedReview]) {
    if reviews.is_empty() {
        return;
    }
    let total = reviews.len();
    let avg = reviews.iter().map(|r| r.rating as f64).sum::<f64>() / total as f64;
    let authors: HashSet<&str> = reviews.iter().map(|r| r.author.as_str()).collect();

    println!("\nTotal reviews:  {}", total);
    println!("Average rating: {:.1}", avg);
    println!("Unique authors: {}", authors.len());

    let mut dist = [0usize; 6];
    for r in reviews {
        dist[r.rating.min(5) as usize] += 1;
    }
    println!("\nRating distribution:");
    for rating in (0..=5).rev() {
        if dist[rating] > 0 {
            println!("  {}\u{2605}: {:>4}", rating, dist[rating]);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_and_long() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-product-url", 6), "a-very...");
    }

    #[test]
    fn duration_formats() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3700)), "1h 1m 40s");
    }
}
