use std::sync::Arc;

use clap::Parser;
use sukashi::compositor::FfmpegCompositor;
use sukashi::config::Config;
use sukashi::pipeline::Pipeline;
use sukashi::server;
use sukashi::storage::{ObjectStore, S3Store};

/// Sukashi - watermark overlay service for S3-hosted video and image assets
#[derive(Parser, Debug)]
#[command(name = "sukashi")]
#[command(version, about, long_about = None)]
struct Args {
    /// Validate configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() {
    // Initialize logging subsystem
    sukashi::logging::init_subscriber().expect("Failed to initialize logging subsystem");

    let args = Args::parse();

    // Missing required configuration is fatal at startup; the process must
    // not start serving requests.
    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });

    if args.check {
        println!("configuration ok");
        return;
    }

    tracing::info!(
        bucket = %config.bucket,
        region = %config.region,
        work_dir = %config.work_dir.display(),
        logo = %config.logo_path.display(),
        "configuration loaded successfully"
    );

    let config = Arc::new(config);
    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&config).await);
    let compositor = Arc::new(FfmpegCompositor::new(&config));
    let pipeline = Arc::new(Pipeline::new(config.clone(), store, compositor));

    if let Err(e) = server::serve(config, pipeline).await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
