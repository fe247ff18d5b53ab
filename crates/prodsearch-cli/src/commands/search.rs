//! Search command - Semantic product search

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use prodsearch_search::{CandidateHit, SearchError, SearchErrorKind, SearchQuery, SearchResult};

use super::{build_searcher, load_config};
use crate::progress::{clear_spinner, finish_spinner_error, spinner};
use crate::GlobalOptions;

/// Arguments for the search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query (e.g., "blue shoes", "casual shirt", "women dress")
    query: String,

    /// Number of distinct products to return [default: from config, 10]
    #[arg(long, short = 'n')]
    limit: Option<usize>,

    /// Candidates to request from the index before deduplication
    #[arg(long, short = 'k')]
    candidates: Option<usize>,

    /// Output format: text (default), json
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

/// Execute the search command
pub async fn execute(args: SearchArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global)?;
    let searcher = build_searcher(&config)?;

    let pb = spinner("Searching for products...", global.quiet);
    let outcome = match args.candidates {
        Some(candidates) => {
            let limit = args.limit.unwrap_or(searcher.options().default_limit);
            match SearchQuery::with_counts(&args.query, limit, candidates) {
                Ok(query) => searcher.search(&query).await,
                Err(e) => Err(e),
            }
        }
        None => searcher.search_text(&args.query, args.limit).await,
    };

    let result = match outcome {
        Ok(result) => {
            clear_spinner(pb);
            result
        }
        Err(e) => {
            finish_spinner_error(pb, "Search failed");
            return Err(explain(e, &args.query));
        }
    };

    match args.output {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&result).context("Failed to serialize results")?;
            println!("{}", json);
        }
        OutputFormat::Text => print_results(&result),
    }

    Ok(())
}

/// Lead with the message for the error's kind; keep the cause underneath.
///
/// Bad counts on a non-blank query are reported as-is.
fn explain(err: SearchError, query: &str) -> anyhow::Error {
    let kind = err.kind();
    if kind == SearchErrorKind::InvalidInput && !query.trim().is_empty() {
        return anyhow::Error::new(err);
    }
    anyhow::Error::new(err).context(kind.user_message())
}

fn print_results(result: &SearchResult) {
    if result.is_empty() {
        println!("No products found matching your search query. Try different keywords!");
        return;
    }

    println!("Found {} distinct products\n", result.len());
    for (rank, hit) in result.iter().enumerate() {
        print_hit(rank + 1, hit);
    }
}

fn print_hit(rank: usize, hit: &CandidateHit) {
    let fields = &hit.fields;
    println!("{}. {}", rank, or_na(fields.name.as_deref()));
    println!("   Brand:       {}", or_na(fields.brand.as_deref()));
    println!("   Color:       {}", or_na(fields.primary_color.as_deref()));
    println!("   Description: {}", or_na(fields.description.as_deref()));
    if let Some(price) = fields.price_inr {
        println!("   Price:       {}", format_price(price));
    }
    println!("   Similarity:  {:.3}", hit.score);
    println!();
}

fn or_na(value: Option<&str>) -> &str {
    value.unwrap_or("N/A")
}

/// Format an INR amount with thousands separators, e.g. `₹1,299`.
///
/// Whole amounts print without decimals; anything else keeps two places.
fn format_price(price: f64) -> String {
    let cents = (price.abs() * 100.0).round() as u64;
    let (whole, fraction) = (cents / 100, cents % 100);

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if price < 0.0 && cents > 0 { "-" } else { "" };
    if fraction == 0 {
        format!("{}₹{}", sign, grouped)
    } else {
        format!("{}₹{}.{:02}", sign, grouped, fraction)
    }
}
