//! circuit-gate command line tool.
//!
//! # Commands
//! - `check <CONFIG>`: load and validate a configuration file
//! - `simulate`: drive a synthetic flaky operation through a breaker and
//!   report every transition
//!
//! ```text
//!   callers ──▶ CircuitBreaker ──▶ simulated operation
//!                   │                 (latency, failure rate)
//!                   ▼
//!              listeners ──▶ log lines
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use rand::Rng;

use circuit_gate::config::{load_config, BreakerConfig, GateConfig};
use circuit_gate::observability::{logging, metrics};
use circuit_gate::{BreakerError, BreakerEvent, BreakerRegistry, CircuitBreaker};

#[derive(Parser)]
#[command(name = "circuit-gate")]
#[command(about = "Circuit breaker configuration checker and workload simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and print the resolved breakers
    Check {
        /// Path to the TOML configuration
        config: PathBuf,
    },
    /// Run a simulated flaky workload through a breaker
    Simulate {
        /// Path to the TOML configuration (built-in demo breaker if omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Breaker to drive
        #[arg(long, default_value = "demo")]
        breaker: String,

        /// Total calls to issue
        #[arg(long, default_value_t = 200)]
        calls: u64,

        /// Calls in flight at once
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Probability that a simulated call fails
        #[arg(long, default_value_t = 0.3)]
        failure_rate: f64,

        /// Simulated latency per call in milliseconds
        #[arg(long, default_value_t = 20)]
        latency_ms: u64,

        /// Print the final snapshot as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Default)]
struct Tally {
    ok: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    rejected: AtomicU64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => check(config),
        Commands::Simulate {
            config,
            breaker,
            calls,
            concurrency,
            failure_rate,
            latency_ms,
            json,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => demo_config(),
            };
            let workload = Workload {
                calls,
                concurrency: concurrency.max(1),
                failure_rate: if failure_rate.is_nan() { 0.0 } else { failure_rate.clamp(0.0, 1.0) },
                latency: Duration::from_millis(latency_ms),
            };
            simulate(config, &breaker, workload, json).await
        }
    }
}

fn check(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&path)?;

    println!("{}: {} breaker(s) OK", path.display(), config.breakers.len());
    for b in &config.breakers {
        println!(
            "  {:<20} max_failures={} call_timeout={:?} reset_timeout={:?} backoff={}x max_reset={:?} random_factor={}",
            b.name,
            b.max_failures,
            b.call_timeout,
            b.reset_timeout,
            b.backoff_factor,
            b.reset_timeout_cap(),
            b.random_factor,
        );
    }
    Ok(())
}

fn demo_config() -> GateConfig {
    GateConfig {
        breakers: vec![
            BreakerConfig::new(3, Duration::from_millis(100), Duration::from_secs(1))
                .named("demo")
                .with_exponential_backoff(Duration::from_secs(10)),
        ],
        ..Default::default()
    }
}

struct Workload {
    calls: u64,
    concurrency: usize,
    failure_rate: f64,
    latency: Duration,
}

async fn simulate(
    config: GateConfig,
    name: &str,
    workload: Workload,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    logging::init(&config.observability.log_level);
    tracing::info!("circuit-gate v{} starting simulation", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = BreakerRegistry::from_config(&config)?;
    let breaker = registry
        .get(name)
        .ok_or_else(|| format!("no breaker named '{name}' in configuration"))?;
    attach_logging_listeners(&breaker);

    tracing::info!(
        breaker = %name,
        calls = workload.calls,
        concurrency = workload.concurrency,
        failure_rate = workload.failure_rate,
        latency_ms = workload.latency.as_millis() as u64,
        "Workload configured"
    );

    let tally = Tally::default();
    let run = run_workload(&breaker, &workload, &tally);

    tokio::select! {
        _ = run => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping workload");
        }
    }

    println!(
        "ok={} failed={} timed_out={} rejected={}",
        tally.ok.load(Ordering::Relaxed),
        tally.failed.load(Ordering::Relaxed),
        tally.timed_out.load(Ordering::Relaxed),
        tally.rejected.load(Ordering::Relaxed),
    );

    let snapshot = breaker.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!(
            "{}: state={} failures={}/{} reset_timeout={}ms",
            snapshot.name,
            snapshot.state,
            snapshot.failure_count,
            snapshot.max_failures,
            snapshot.current_reset_timeout_ms,
        );
    }
    Ok(())
}

fn attach_logging_listeners(breaker: &CircuitBreaker) {
    // Listeners live inside the breaker, so they must not hold a handle to it.
    for event in [BreakerEvent::Open, BreakerEvent::HalfOpen, BreakerEvent::Close] {
        let name = breaker.name().to_string();
        breaker.add_listener(event, move || {
            tracing::info!(breaker = %name, event = %event, "Transition");
        });
    }
}

async fn run_workload(breaker: &CircuitBreaker, workload: &Workload, tally: &Tally) {
    let issued = Arc::new(AtomicU64::new(0));

    let workers = (0..workload.concurrency).map(|_| {
        let issued = issued.clone();
        async move {
            while issued.fetch_add(1, Ordering::Relaxed) < workload.calls {
                let latency = workload.latency;
                let fails = rand::thread_rng().gen_bool(workload.failure_rate);

                let result = breaker
                    .invoke(|| async move {
                        tokio::time::sleep(latency).await;
                        if fails {
                            Err("simulated failure")
                        } else {
                            Ok(())
                        }
                    })
                    .await;

                let counter = match result {
                    Ok(()) => &tally.ok,
                    Err(BreakerError::Operation(_)) => &tally.failed,
                    Err(BreakerError::CallTimeout(_)) => &tally.timed_out,
                    Err(BreakerError::Open) => {
                        // Back off a little so rejected workers don't spin.
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        &tally.rejected
                    }
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    join_all(workers).await;
}
