//! Command-line client for the tiered cache.
//!
//! Connects to the configured shared backends, selects one, and runs a single
//! cache operation through a fresh [`TieredCache`].
//!
//! # Usage
//!
//! ```bash
//! # Store a JSON value for five minutes
//! tiered-cache set user:1 '{"name":"Ada"}' --ttl 300
//!
//! # Read it back
//! tiered-cache get user:1
//!
//! # Bump a counter
//! tiered-cache incr hits 5
//!
//! # Which backend is authoritative?
//! tiered-cache backend
//! ```
//!
//! # Environment Variables
//!
//! See [`tiered_cache::config`] for the full list.

use tiered_cache::config::{self, Config};
use tiered_cache::domain::SharedCacheStore;
use tiered_cache::infrastructure::cache::{
    BoundedLocalCache, MemcacheConnection, MemcachedBackedStore, RedisBackedStore,
};
use tiered_cache::{SharedBackend, TieredCache, telemetry};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;

/// CLI for the Redis / Memcached tiered cache.
#[derive(Parser)]
#[command(name = "tiered-cache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Cache operations.
#[derive(Subcommand)]
enum Commands {
    /// Read a value
    Get {
        key: String,
    },

    /// Store a JSON value
    Set {
        key: String,

        /// Value as JSON (bare words are stored as strings)
        value: String,

        /// Lifetime in seconds; 0 stores without expiry
        #[arg(short, long)]
        ttl: Option<u64>,
    },

    /// Remove a key from both tiers
    Delete {
        key: String,
    },

    /// Atomically increment a counter
    Incr {
        key: String,

        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        amount: i64,
    },

    /// Atomically decrement a counter
    Decr {
        key: String,

        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        amount: i64,
    },

    /// Show which shared backend was selected
    Backend,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = config::load_from_env()?;
    telemetry::init_tracing(&config.log_level, &config.log_format);
    config.print_summary();

    let cache = build_cache(&config).await?;

    match cli.command {
        Commands::Get { key } => match cache.get(&key).await? {
            Some(value) => println!("{}", value),
            None => println!("{} {}", "✗".red(), "(absent)".dimmed()),
        },
        Commands::Set { key, value, ttl } => {
            let value = serde_json::from_str(&value)
                .unwrap_or_else(|_| serde_json::Value::String(value));
            cache.set(&key, value, ttl).await?;
            println!("{} {}", "✓".green(), key.bold());
        }
        Commands::Delete { key } => {
            cache.delete(&key).await?;
            println!("{} {}", "✓".green(), key.bold());
        }
        Commands::Incr { key, amount } => {
            let value = cache.shared().increment(&key, amount).await?;
            println!("{}", value);
        }
        Commands::Decr { key, amount } => {
            let value = cache.shared().decrement(&key, amount).await?;
            println!("{}", value);
        }
        Commands::Backend => {
            println!("{}", cache.backend().to_string().cyan().bold());
        }
    }

    Ok(())
}

/// Opens the configured connections and assembles the cache.
///
/// A backend that fails to connect is skipped with a warning; selection then
/// decides whether what is left is usable.
async fn build_cache(config: &Config) -> Result<TieredCache> {
    let memcached = match &config.memcached_url {
        Some(url) => match connect_memcached(url).await {
            Ok(client) => Some(MemcachedBackedStore::new(Arc::new(
                MemcacheConnection::new(client),
            ))),
            Err(e) => {
                tracing::warn!("Failed to connect to Memcached: {:#}", e);
                None
            }
        },
        None => None,
    };

    let redis = match &config.redis_url {
        Some(url) => match connect_redis(url).await {
            Ok(manager) => Some(
                RedisBackedStore::new(Arc::new(manager))
                    .with_key_prefix(config.redis_key_prefix.clone()),
            ),
            Err(e) => {
                tracing::warn!("Failed to connect to Redis: {:#}", e);
                None
            }
        },
        None => None,
    };

    let shared = SharedBackend::select(memcached, redis)
        .await
        .context("No shared cache backend available")?;

    let local = BoundedLocalCache::new(config.l1_capacity(), config.l1_ttl());
    Ok(TieredCache::new(local, Arc::new(shared)))
}

/// `memcache::Client::connect` dials the server synchronously, so it runs on
/// the blocking pool.
async fn connect_memcached(url: &str) -> Result<memcache::Client> {
    let url = url.to_string();
    tokio::task::spawn_blocking(move || memcache::Client::connect(url.as_str()))
        .await
        .context("Memcached connect task failed")?
        .context("Failed to connect to Memcached")
}

async fn connect_redis(url: &str) -> Result<redis::aio::ConnectionManager> {
    let client = redis::Client::open(url).context("Failed to create Redis client")?;
    let manager = redis::aio::ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;

    RedisBackedStore::new(Arc::new(manager.clone()))
        .ping()
        .await
        .context("Redis PING failed")?;

    Ok(manager)
}
