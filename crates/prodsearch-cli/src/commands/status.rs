//! Status command - Probe the vector index and the embedding provider

use anyhow::Result;
use clap::Args;
use prodsearch_search::{EmbeddingProvider, ProviderStatus, SearchError, VectorIndex};
use serde::Serialize;

use super::{build_index, build_provider, load_config};
use crate::progress::{finish_spinner, finish_spinner_error, finish_spinner_warn, spinner};
use crate::GlobalOptions;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Load the embedding model before reporting (downloads it if missing)
    #[arg(long)]
    warmup: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct IndexReport {
    backend: String,
    url: String,
    index: String,
    dimension: usize,
    reachable: bool,
    latency_ms: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingReport {
    provider: String,
    model: String,
    dimension: usize,
    device: String,
    available: bool,
    model_ready: bool,
    latency_ms: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    index: IndexReport,
    embedding: EmbeddingReport,
}

impl StatusReport {
    fn healthy(&self) -> bool {
        self.index.reachable && self.embedding.available
    }
}

/// Execute the status command
pub async fn execute(args: StatusArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global)?;
    config.validate()?;

    let index = build_index(&config)?;
    let provider = build_provider(&config)?;
    let quiet = global.quiet || args.json;

    let pb = spinner("Checking vector index...", quiet);
    let index_report = probe_index(index.as_ref(), &config.index.url, &config.index.index_name).await;
    if index_report.reachable {
        finish_spinner(pb, "Vector index reachable");
    } else {
        finish_spinner_error(pb, "Vector index unreachable");
    }

    let pb = spinner("Checking embedding provider...", quiet);
    let embedding_report = probe_provider(provider.as_ref(), args.warmup).await;
    if embedding_report.model_ready {
        finish_spinner(pb, "Embedding model ready");
    } else if embedding_report.available {
        finish_spinner_warn(pb, "Embedding model available but not loaded");
    } else {
        finish_spinner_error(pb, "Embedding model unavailable");
    }

    let report = StatusReport {
        index: index_report,
        embedding: embedding_report,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.healthy() {
        anyhow::bail!("prodsearch is not ready to serve searches");
    }
    Ok(())
}

async fn probe_index(index: &dyn VectorIndex, url: &str, name: &str) -> IndexReport {
    let ping = index.ping().await;
    IndexReport {
        backend: index.backend_type().to_string(),
        url: url.to_string(),
        index: name.to_string(),
        dimension: index.dimension(),
        reachable: ping.is_ok(),
        latency_ms: ping.as_ref().ok().map(|d| d.as_millis() as u64),
        error: ping.err().map(|e| e.to_string()),
    }
}

async fn probe_provider(provider: &dyn EmbeddingProvider, warmup: bool) -> EmbeddingReport {
    let warmup_error = if warmup {
        provider.warmup().await.err().map(|e| model_error(&e))
    } else {
        None
    };

    let status = provider
        .check_status()
        .await
        .unwrap_or_else(|e| ProviderStatus::unavailable(provider.provider_type(), model_error(&e)));

    EmbeddingReport {
        provider: provider.provider_type().to_string(),
        model: provider.model_id().to_string(),
        dimension: provider.embedding_dim(),
        device: status.device,
        available: status.available && warmup_error.is_none(),
        model_ready: status.model_ready,
        latency_ms: status.latency_ms,
        error: warmup_error.or(status.error),
    }
}

fn model_error(err: &SearchError) -> String {
    format!("{} ({})", err.kind().user_message(), err)
}

fn print_report(report: &StatusReport) {
    println!("prodsearch Status");
    println!("=================\n");

    let index = &report.index;
    println!("Vector index");
    println!("  Backend:    {}", index.backend);
    println!("  URL:        {}", index.url);
    println!("  Index:      {}", index.index);
    println!("  Dimension:  {}", index.dimension);
    match (index.latency_ms, &index.error) {
        (Some(ms), _) => println!("  Status:     reachable ({} ms)", ms),
        (None, Some(err)) => println!("  Status:     unreachable: {}", err),
        (None, None) => println!("  Status:     unknown"),
    }

    let embedding = &report.embedding;
    println!("\nEmbedding provider");
    println!("  Provider:   {}", embedding.provider);
    println!("  Model:      {}", embedding.model);
    println!("  Dimension:  {}", embedding.dimension);
    println!("  Device:     {}", embedding.device);
    let state = if embedding.model_ready {
        "loaded"
    } else if embedding.available {
        "available"
    } else {
        "unavailable"
    };
    match embedding.latency_ms {
        Some(ms) => println!("  Status:     {} ({} ms)", state, ms),
        None => println!("  Status:     {}", state),
    }
    if let Some(ref err) = embedding.error {
        println!("  Error:      {}", err);
    }

    if index.dimension != embedding.dimension {
        println!(
            "\nwarning: index dimension {} does not match embedding dimension {}",
            index.dimension, embedding.dimension
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(reachable: bool, available: bool) -> StatusReport {
        StatusReport {
            index: IndexReport {
                backend: "elasticsearch".into(),
                url: "http://localhost:9200".into(),
                index: "all_products".into(),
                dimension: 768,
                reachable,
                latency_ms: reachable.then_some(3),
                error: (!reachable).then(|| "connection refused".into()),
            },
            embedding: EmbeddingReport {
                provider: "local".into(),
                model: "jinaai/jina-embeddings-v2-base-en".into(),
                dimension: 768,
                device: "CPU".into(),
                available,
                model_ready: false,
                latency_ms: None,
                error: None,
            },
        }
    }

    #[test]
    fn test_healthy_requires_both_components() {
        assert!(report(true, true).healthy());
        assert!(!report(false, true).healthy());
        assert!(!report(true, false).healthy());
    }

    #[test]
    fn test_report_serializes() {
        let json = serde_json::to_value(report(true, true)).unwrap();
        assert_eq!(json["index"]["latency_ms"], 3);
        assert_eq!(json["embedding"]["provider"], "local");
    }
}
