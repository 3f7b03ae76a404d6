//! RangeCache CLI - Range descriptor cache diagnostics
//!
//! Builds an in-memory range hierarchy from the configuration, resolves keys
//! through a range descriptor cache and reports what each lookup cost.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rangecache_client::{InMemoryDescriptorDb, LookupOptions, RangeDescriptorCache, StatsSnapshot};
use rangecache_common::{Config, Key, range_meta_key};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "rangecache-cli")]
#[command(about = "Range descriptor cache diagnostics")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "rangecache.toml")]
    config: String,

    /// Log level (overrides the configuration file)
    #[arg(long)]
    log_level: Option<String>,

    /// Cache byte budget (overrides the configuration file)
    #[arg(long)]
    max_bytes: Option<usize>,

    /// Additional user range split keys
    #[arg(long = "split")]
    splits: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve keys and print the descriptor found for each
    Lookup {
        /// Keys to resolve, with `\xNN` escapes for raw bytes
        keys: Vec<String>,
        /// Find the range ending at each key instead of the one containing it
        #[arg(long)]
        reverse: bool,
    },
    /// Resolve keys, then print the cache contents
    Dump {
        /// Keys to resolve before dumping
        keys: Vec<String>,
    },
    /// Print the authoritative descriptors of the in-memory hierarchy
    Ranges,
}

fn build_db(config: &Config, extra_splits: &[String]) -> Result<InMemoryDescriptorDb> {
    let db = InMemoryDescriptorDb::new().with_batch_size(config.cluster.lookup_batch_size);
    for split in config.cluster.splits.iter().chain(extra_splits) {
        let key = Key::parse_escaped(split)?;
        db.split_range(&key)
            .with_context(|| format!("failed to split at \"{split}\""))?;
    }
    for split in &config.cluster.meta_splits {
        let key = range_meta_key(&Key::parse_escaped(split)?);
        db.split_range(&key)
            .with_context(|| format!("failed to split meta2 at \"{split}\""))?;
    }
    Ok(db)
}

fn stats_json(stats: &StatsSnapshot) -> serde_json::Value {
    json!({
        "hits": stats.hits,
        "misses": stats.misses,
        "provider_lookups": stats.provider_lookups,
        "first_range_lookups": stats.first_range_lookups,
        "inserts": stats.inserts,
        "overlap_evictions": stats.overlap_evictions,
        "evictions": stats.evictions,
        "capacity_evictions": stats.capacity_evictions,
        "coalesced": stats.coalesced,
    })
}

async fn resolve_keys(
    cache: &RangeDescriptorCache<Arc<InMemoryDescriptorDb>>,
    keys: &[String],
    options: LookupOptions,
) -> Result<Vec<serde_json::Value>> {
    let mut results = Vec::with_capacity(keys.len());
    for raw in keys {
        let key = Key::parse_escaped(raw)?;
        let desc = cache
            .lookup_range_descriptor(&key, options)
            .await
            .with_context(|| format!("lookup of \"{raw}\" failed"))?;
        let round_trips = cache.provider().take_lookup_count();
        debug!(%key, range = %desc, round_trips, "lookup complete");
        results.push(json!({
            "key": key,
            "range": *desc,
            "provider_lookups": round_trips,
        }));
    }
    Ok(results)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;
    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }
    if let Some(max_bytes) = args.max_bytes {
        config.cache.max_bytes = max_bytes;
    }
    config.validate()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let db = Arc::new(build_db(&config, &args.splits)?);
    info!(
        ranges = db.descriptors().len(),
        max_bytes = config.cache.max_bytes,
        "Built in-memory range hierarchy"
    );
    let cache = RangeDescriptorCache::with_config(Arc::clone(&db), &config.cache);

    let output = match args.command {
        Commands::Lookup { keys, reverse } => {
            let options = if reverse {
                LookupOptions::reverse()
            } else {
                LookupOptions::default()
            };
            let lookups = resolve_keys(&cache, &keys, options).await?;
            json!({
                "lookups": lookups,
                "stats": stats_json(&cache.stats().snapshot()),
            })
        }
        Commands::Dump { keys } => {
            resolve_keys(&cache, &keys, LookupOptions::default()).await?;
            let entries: Vec<_> = cache
                .dump()
                .into_iter()
                .map(|(cache_key, desc)| json!({ "cache_key": cache_key, "range": *desc }))
                .collect();
            json!({
                "entries": entries,
                "size_bytes": cache.size_bytes(),
                "stats": stats_json(&cache.stats().snapshot()),
            })
        }
        Commands::Ranges => json!({ "ranges": db.descriptors() }),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
