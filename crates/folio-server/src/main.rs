mod config;
mod error;
mod handlers;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use folio_core::config::parse_size;
use folio_core::{FolderStore, LocalContentStore};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{ServerSection, StoreOverrides};
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "folio-server", version, about = "folio versioned folder store server")]
struct Cli {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8686")]
    listen: String,

    /// Directory for state.json and stored objects (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// YAML store configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output format: "json" or "pretty"
    #[arg(long, default_value = "pretty")]
    log_format: String,

    /// Quota for accounts created without registration (e.g. "100M", "1G", plain bytes)
    #[arg(long, value_parser = parse_size)]
    default_quota: Option<u64>,

    /// Content store call timeout in milliseconds
    #[arg(long)]
    store_timeout: Option<u64>,

    /// Number of tokio worker threads (minimum 1)
    #[arg(long, default_value_t = 4, value_parser = parse_min_one)]
    worker_threads: usize,
}

fn parse_min_one(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("{e}"))?;
    if n == 0 {
        return Err("value must be at least 1".into());
    }
    Ok(n)
}

fn main() {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.worker_threads)
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to build tokio runtime: {e}");
            std::process::exit(1);
        });

    runtime.block_on(async_main(cli));
}

async fn async_main(cli: Cli) {
    let token = std::env::var("FOLIO_TOKEN").unwrap_or_default();
    if token.is_empty() {
        eprintln!("Error: FOLIO_TOKEN environment variable must be set");
        std::process::exit(1);
    }

    let section = ServerSection {
        listen: cli.listen,
        token,
        log_format: cli.log_format,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match section.log_format.as_str() {
        "json" => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let folio = StoreOverrides {
        config_file: cli.config,
        data_dir: cli.data_dir,
        default_quota: cli.default_quota,
        store_timeout_ms: cli.store_timeout,
    }
    .resolve()
    .unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let objects = LocalContentStore::new(folio.data_dir.join("objects")).unwrap_or_else(|e| {
        eprintln!(
            "Error: cannot open object store in '{}': {e}",
            folio.data_dir.display()
        );
        std::process::exit(1);
    });
    let store = FolderStore::open(folio, Arc::new(objects)).unwrap_or_else(|e| {
        eprintln!("Error: cannot open folder store: {e}");
        std::process::exit(1);
    });

    let listen_addr = section.listen.clone();
    let app = handlers::router(AppState::new(section, store));

    info!("folio-server listening on {listen_addr}");
    let listener = TcpListener::bind(&listen_addr).await.unwrap_or_else(|e| {
        eprintln!("Error: cannot bind to {listen_addr}: {e}");
        std::process::exit(1);
    });
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Error: server stopped: {e}");
        std::process::exit(1);
    }
}
