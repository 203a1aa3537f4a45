use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tollgate::config::{LoggingConfig, TollgateConfig};
use tollgate::ratelimit::{spawn_sweeper, LimiterConfig, LimiterRegistry, RateLimiter};

/// Fire a burst of requests at a rate limiter and report each decision.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Args {
    /// YAML configuration file (tiers, eviction, logging)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use this configured tier instead of the strategy flags
    #[arg(long)]
    tier: Option<String>,

    /// Rate limiting strategy
    #[arg(long, value_enum, default_value_t = Strategy::Fixed)]
    strategy: Strategy,

    /// Maximum requests allowed per window (fixed/sliding)
    #[arg(long, default_value_t = 10)]
    max_requests: u64,

    /// Window length in seconds (fixed/sliding)
    #[arg(long, default_value_t = 60.0)]
    window: f64,

    /// Token bucket capacity
    #[arg(long, default_value_t = 10.0)]
    capacity: f64,

    /// Token bucket refill rate (tokens/second)
    #[arg(long, default_value_t = 1.0)]
    refill_rate: f64,

    /// Number of requests to send
    #[arg(long, default_value_t = 15)]
    num_requests: u32,

    /// Cost of each request
    #[arg(long, default_value_t = 1)]
    cost: u32,

    /// Identifier to rate limit
    #[arg(long, default_value = "test-user")]
    identifier: String,

    /// Delay between requests in milliseconds
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Strategy {
    Fixed,
    Sliding,
    TokenBucket,
}

impl Args {
    fn limiter_config(&self) -> anyhow::Result<LimiterConfig> {
        let config = match self.strategy {
            Strategy::Fixed | Strategy::Sliding => {
                let window = Duration::try_from_secs_f64(self.window)
                    .map_err(|e| anyhow::anyhow!("invalid --window {}: {}", self.window, e))?;
                if self.strategy == Strategy::Fixed {
                    LimiterConfig::fixed_window(self.max_requests, window)
                } else {
                    LimiterConfig::sliding_window(self.max_requests, window)
                }
            }
            Strategy::TokenBucket => LimiterConfig::token_bucket(self.capacity, self.refill_rate),
        };
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = TollgateConfig::load(args.config.as_deref())?;

    init_tracing(&config.logging);

    info!("Starting Tollgate rate limit simulation");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let (registry, tier) = match &args.tier {
        Some(tier) => (LimiterRegistry::from_rules(&config.limits)?, tier.clone()),
        None => {
            let mut registry = LimiterRegistry::new();
            registry.insert("cli", RateLimiter::new(args.limiter_config()?)?);
            (registry, "cli".to_string())
        }
    };
    let registry = Arc::new(registry);
    let (served_by, limiter) = registry.resolve_named(&tier)?;
    let (served_by, limiter) = (served_by.to_string(), limiter.clone());

    info!(
        tier = %served_by,
        config = ?limiter.config(),
        identifier = %args.identifier,
        requests = args.num_requests,
        "Limiter ready"
    );

    let sweeper = spawn_sweeper(registry.clone(), config.eviction.sweeper_config());

    tokio::select! {
        (allowed, denied) = run(&limiter, &served_by, &args) => {
            info!(allowed = allowed, denied = denied, "Simulation finished");
        }
        _ = shutdown_signal() => {
            warn!("Simulation interrupted");
        }
    }

    sweeper.shutdown().await;
    Ok(())
}

/// Send the configured requests, returning (allowed, denied).
async fn run(limiter: &RateLimiter, tier: &str, args: &Args) -> (u32, u32) {
    let mut allowed = 0;
    let mut denied = 0;

    for i in 1..=args.num_requests {
        let decision = limiter.allow(&args.identifier, args.cost);
        let headers = decision.headers().with_tier(tier);

        if decision.allowed {
            allowed += 1;
        } else {
            denied += 1;
        }

        info!(
            request = i,
            allowed = decision.allowed,
            remaining = decision.remaining,
            headers = ?headers.to_pairs(),
            "Decision"
        );

        if i < args.num_requests && args.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
        }
    }

    (allowed, denied)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping");
        }
    }
}
