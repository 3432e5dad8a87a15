use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sukashi::config::Config;
use sukashi::gallery::GalleryStore;
use sukashi::http::{router, AppState};
use sukashi::pipeline::RenderPipeline;
use sukashi::source::SourceResolver;
use sukashi::storage::S3ObjectStore;

/// Sukashi - image watermarking service for private object storage
#[derive(Parser, Debug)]
#[command(name = "sukashi")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    sukashi::logging::init_subscriber().expect("Failed to initialize logging subsystem");

    let args = Args::parse();

    let config = Config::from_file(&args.config).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        bucket = %config.storage.bucket,
        trusted_suffix = %config.fetch.trusted_suffix,
        "Configuration loaded successfully"
    );

    let storage = Arc::new(S3ObjectStore::from_config(&config.storage).await);

    let resolver = SourceResolver::new(
        storage,
        Duration::from_secs(config.fetch.timeout_secs),
        config.fetch.max_body_bytes,
    )
    .unwrap_or_else(|e| {
        eprintln!("Failed to build source resolver: {}", e);
        std::process::exit(1);
    });

    let gallery = GalleryStore::connect(&config.gallery.database_url, config.gallery.list_limit)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to open gallery database: {}", e);
            std::process::exit(1);
        });

    let state = AppState {
        resolver: Arc::new(resolver),
        pipeline: Arc::new(RenderPipeline::new(config.overlay.clone())),
        gallery,
        trusted_suffix: config.fetch.trusted_suffix.clone(),
        thumb_max_age: config.overlay.thumb_max_age,
    };

    let addr = format!("{}:{}", config.server.address, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!(address = %addr, "Server listening");

    if let Err(e) = axum::serve(listener, router(state)).await {
        tracing::error!(error = %e, "Server terminated");
        std::process::exit(1);
    }
}
