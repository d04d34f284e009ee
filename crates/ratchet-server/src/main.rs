//! Ratchet key-exchange server binary.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 24h idle TTL, sweep every 60s, unbounded sessions
//! ratchet-server --bind 0.0.0.0:8080
//!
//! # Keep sessions until deleted, cap the store
//! ratchet-server --session-ttl-secs 0 --max-sessions 100000
//! ```

use std::time::Duration;

use clap::Parser;
use ratchet_core::StoreConfig;
use ratchet_server::{Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Ratchet key-exchange server
#[derive(Parser, Debug)]
#[command(name = "ratchet-server")]
#[command(about = "HTTP key-exchange service for ratchet sessions")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: String,

    /// Idle seconds before a session is evicted (0 disables expiry)
    #[arg(long, default_value = "86400")]
    session_ttl_secs: u64,

    /// Seconds between expiry sweeps
    #[arg(long, default_value = "60")]
    sweep_interval_secs: u64,

    /// Maximum live sessions (unbounded when omitted)
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            session_ttl: (self.session_ttl_secs > 0)
                .then(|| Duration::from_secs(self.session_ttl_secs)),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            max_sessions: self.max_sessions,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Ratchet server starting");
    tracing::info!("Binding to {}", args.bind);

    let store = args.store_config();
    match store.session_ttl {
        Some(ttl) => tracing::info!("Idle sessions expire after {:?}", ttl),
        None => tracing::warn!("Session expiry disabled - sessions live until deleted"),
    }

    let config = ServerRuntimeConfig { bind_address: args.bind, store };
    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
