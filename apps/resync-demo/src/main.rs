//! # Resync Demo
//!
//! Drives a [`SyncQueue`] with a simulated sync routine so coalescing can be
//! observed from the command line.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Initialize tracing (RUST_LOG, default info)                         │
//! │  2. Load queue.toml + RESYNC_* overrides                                │
//! │  3. Install a routine that sleeps --work-ms (fails every --fail-every)  │
//! │  4. Fire --burst requests, --spacing-ms apart                           │
//! │  5. Optionally cancel after --cancel-after-ms                           │
//! │  6. Wait for the loop, clear the reference, print status JSON           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ```text
//! $ RUST_LOG=resync_queue=debug resync-demo --burst 50 --spacing-ms 2 --work-ms 40
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use resync_queue::{QueueConfig, QueueError, QueueMode, SyncQueue, TracingEmitter};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "resync-demo", about = "Fire bursts of sync requests at a coalescing queue")]
struct Args {
    /// Path to queue.toml (defaults to the platform config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured mode: live, preview, or test.
    #[arg(long)]
    mode: Option<QueueMode>,

    /// Enable coalescing simulation (only meaningful with --mode test).
    #[arg(long)]
    simulate: bool,

    /// Number of requests to fire.
    #[arg(long, default_value_t = 20)]
    burst: usize,

    /// Delay between requests in milliseconds.
    #[arg(long, default_value_t = 5)]
    spacing_ms: u64,

    /// Duration of one simulated sync in milliseconds.
    #[arg(long, default_value_t = 50)]
    work_ms: u64,

    /// Make every Nth sync fail.
    #[arg(long)]
    fail_every: Option<usize>,

    /// Cancel the loop this many milliseconds after the burst.
    #[arg(long)]
    cancel_after_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let mut config = QueueConfig::load(args.config.clone())?;
    if let Some(mode) = args.mode {
        config.queue.mode = mode;
    }
    if args.simulate {
        config.diagnostics.enabled = true;
        config.diagnostics.simulate_coalescing_in_test = true;
    }
    config.validate()?;

    let queue = SyncQueue::builder(config.mode())
        .with_name(config.name())
        .simulate_coalescing_in_test(config.simulate_coalescing_in_test())
        .with_emitter(Arc::new(TracingEmitter::new(config.name())))
        .build();

    let runs = Arc::new(AtomicUsize::new(0));
    {
        let runs = runs.clone();
        let work = Duration::from_millis(args.work_ms);
        let fail_every = args.fail_every.filter(|n| *n > 0);
        queue.set_on_work_requested(move || {
            let runs = runs.clone();
            async move {
                let run = runs.fetch_add(1, Ordering::SeqCst) + 1;
                info!(run, "Simulated sync starting");
                tokio::time::sleep(work).await;

                match fail_every {
                    Some(n) if run % n == 0 => Err(QueueError::work(format!("simulated failure on run {}", run))),
                    _ => Ok(()),
                }
            }
        });
    }

    info!(
        mode = %config.mode(),
        burst = args.burst,
        spacing_ms = args.spacing_ms,
        work_ms = args.work_ms,
        "Firing sync requests"
    );

    let spacing = Duration::from_millis(args.spacing_ms);
    for _ in 0..args.burst {
        queue.request_sync();
        if !spacing.is_zero() {
            tokio::time::sleep(spacing).await;
        }
    }

    if let Some(ms) = args.cancel_after_ms {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        queue.cancel_loop();
    }

    queue.await_loop().await;
    queue.clear_loop_reference();

    info!(
        requests = args.burst,
        runs = runs.load(Ordering::SeqCst),
        "Burst complete"
    );
    println!("{}", serde_json::to_string_pretty(&queue.status())?);

    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=resync_queue=trace` - Show every merged request
/// - Default: INFO level
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,resync_queue=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
