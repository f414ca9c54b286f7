//! entitykv Server Binary
//!
//! Starts the HTTP service and stops it on Ctrl+C.

use std::time::Duration;

use clap::Parser;
use entitykv::config::{self, Config};
use entitykv::Service;
use tracing_subscriber::{fmt, EnvFilter};

/// entitykv Server
#[derive(Parser, Debug)]
#[command(name = "entitykv-server")]
#[command(about = "HTTP key-value service with admission-controlled dispatch")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./entitykv_data")]
    data_dir: String,

    /// Listen host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Listen port
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Memtable flush threshold in bytes
    #[arg(short, long, default_value_t = config::DEFAULT_FLUSH_THRESHOLD)]
    flush_threshold: usize,

    /// Worker threads (defaults to available processing units)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Requests allowed to wait for a free worker
    #[arg(short, long, default_value_t = config::DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Seconds to wait for in-flight requests at shutdown
    #[arg(long, default_value_t = 10)]
    shutdown_timeout_secs: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,entitykv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("entitykv server v{}", entitykv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .host(&args.host)
        .port(args.port)
        .flush_threshold(args.flush_threshold)
        .pool_size(args.workers.unwrap_or_else(config::available_workers))
        .queue_capacity(args.queue_capacity)
        .shutdown_timeout(Duration::from_secs(args.shutdown_timeout_secs))
        .build();

    let mut service = Service::new(config);
    if let Err(e) = service.start() {
        tracing::error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = service.wait_for_ctrl_c() {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
    } else {
        tracing::info!("Received Ctrl+C, initiating shutdown...");
    }

    if let Err(e) = service.stop() {
        tracing::error!("Shutdown failed: {}", e);
        std::process::exit(1);
    }
}
