use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ratelimit::config::{LoggingConfig, RatelimitConfig};
use ratelimit::RateLimiter;

/// Drive a rate limiter from several workers and report its decisions.
#[derive(Debug, Parser)]
#[command(name = "ratelimit-demo", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Events allowed per unit (overrides the configuration)
    #[arg(short, long)]
    rate: Option<u64>,

    /// Unit length, e.g. `1s` or `250ms` (overrides the configuration)
    #[arg(short, long, value_parser = humantime::parse_duration)]
    per: Option<Duration>,

    /// Calls issued by each worker
    #[arg(long, default_value_t = 20)]
    calls: usize,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Pause between calls of one worker
    #[arg(long, value_parser = humantime::parse_duration, default_value = "0s")]
    interval: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = RatelimitConfig::load(args.config.as_deref())?;
    if let Some(rate) = args.rate {
        config.limiter.rate = rate;
    }
    if let Some(per) = args.per {
        config.limiter.per = per;
    }

    init_tracing(&config.logging);

    info!("Starting ratelimit demo");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &args.config {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Configuration loaded from defaults and environment"),
    }

    let limiter = Arc::new(config.limiter.build());
    info!(
        rate = limiter.rate(),
        per = %humantime::format_duration(limiter.per()),
        workers = args.workers,
        calls = args.calls,
        "Rate limiter initialized"
    );

    let mut handles = Vec::with_capacity(args.workers);
    for worker in 0..args.workers {
        let limiter = limiter.clone();
        let calls = args.calls;
        let interval = args.interval;
        handles.push(tokio::spawn(async move {
            run_worker(worker, &limiter, calls, interval).await
        }));
    }

    let (mut allowed, mut denied) = (0, 0);
    for handle in handles {
        let (a, d) = handle.await?;
        allowed += a;
        denied += d;
    }

    info!(allowed = allowed, denied = denied, "Demo finished");
    Ok(())
}

/// Issue `calls` limit checks, returning the allowed and denied counts.
async fn run_worker(
    worker: usize,
    limiter: &RateLimiter,
    calls: usize,
    interval: Duration,
) -> (usize, usize) {
    let (mut allowed, mut denied) = (0, 0);
    for call in 0..calls {
        if limiter.limit() {
            warn!(worker = worker, call = call, "Over limit");
            denied += 1;
        } else {
            info!(worker = worker, call = call, "OK");
            allowed += 1;
        }

        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }
    (allowed, denied)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
