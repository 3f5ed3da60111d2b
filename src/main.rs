//! cloudlb - An HTTP reverse-proxy load balancer
//!
//! Usage:
//!     cloudlb --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use cloudlb::balancer::LoadBalancer;
use cloudlb::config::{load_config, Config};
use cloudlb::health::HealthChecker;
use cloudlb::ratelimit::RateLimiter;
use cloudlb::server::{Router, Server};
use cloudlb::util::{init_logging, ShutdownSignal};

/// Rate and burst applied when rate limiting is disabled: large enough
/// that the admission middleware never denies.
const UNLIMITED_RATE: f64 = 1_000_000.0;
const UNLIMITED_BURST: u32 = 1_000_000;

/// An HTTP reverse-proxy load balancer written in Rust.
#[derive(Parser, Debug)]
#[command(name = "cloudlb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // Determine log level (CLI overrides config)
    let log_level = cli.log_level.as_deref().unwrap_or(&config.logging.level);

    init_logging(log_level, &config.logging.environment);

    // If --validate flag, just validate and exit
    if cli.validate {
        info!("configuration is valid");
        println!("Configuration is valid.");
        println!("  Port: {}", config.server.port);
        println!("  Strategy: {}", config.load_balancer.method);
        println!("  Backends: {}", config.backends.len());
        for backend in &config.backends {
            println!(
                "    - {} -> {}:{} [enabled: {}]",
                backend.id, backend.host, backend.port, backend.enabled
            );
        }
        return Ok(());
    }

    info!(
        config_path = %cli.config.display(),
        port = config.server.port,
        strategy = %config.load_balancer.method,
        backends = config.backends.len(),
        rate_limiting = config.rate_limit.enabled,
        "cloudlb starting"
    );

    run(config)
}

/// Run the load balancer with the given configuration.
fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config).await })
}

/// Async entry point for the load balancer.
async fn run_async(config: Config) -> Result<()> {
    let balancer =
        Arc::new(LoadBalancer::new(&config).context("failed to initialize load balancer")?);

    let limiter = if config.rate_limit.enabled {
        RateLimiter::new(config.rate_limit.default_rate, config.rate_limit.default_burst)
    } else {
        info!("rate limiting is disabled");
        RateLimiter::new(UNLIMITED_RATE, UNLIMITED_BURST)
    };
    let limiter = Arc::new(limiter);

    let shutdown = ShutdownSignal::new();

    let checker = HealthChecker::new(
        balancer.get_backends(),
        config.load_balancer.health_check_interval,
    );
    tokio::spawn(checker.run(shutdown.subscribe()));

    let router = Arc::new(Router::new(Arc::clone(&balancer), limiter));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let server = Server::bind(addr, router)
        .await
        .context("failed to bind listener")?;

    let server_task = tokio::spawn(server.run(shutdown.subscribe()));

    // Wait for shutdown signal
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal");
        }
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    }

    shutdown.shutdown();

    server_task
        .await
        .context("listener task failed")?
        .context("shutdown was not clean")?;

    info!("cloudlb shut down cleanly");
    Ok(())
}
