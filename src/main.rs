use std::path::PathBuf;
use std::sync::Arc;

use bookclub::config::{Cli, Command, Config, default_config_dir, default_config_path};
use bookclub::db::Database;
use bookclub::handler::AppState;
use bookclub::seed::{self, SeedFile};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    // The database lives next to the config file; without --config both go
    // under ~/.bookclub/
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = Config::new(&config_path).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    let db = Arc::new(Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup database");
        std::process::exit(1);
    }));

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cfg, db).await,
        Command::Seed { file } => {
            let seed_file = SeedFile::load(&file).unwrap_or_else(|e| {
                tracing::error!(error = %e, path = ?file, "failed to load seed file");
                std::process::exit(1);
            });
            if let Err(e) = seed::apply(&db, &seed_file).await {
                tracing::error!(error = %format!("{e:#}"), "failed to apply seed");
                std::process::exit(1);
            }
        }
    }
}

async fn serve(cfg: &Config, db: Arc<Database>) {
    tracing::info!("bookclub.svc starting");

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let app = bookclub::routes(AppState { db }, cfg.app.request_timeout());

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!("bookclub.svc running on {}", &address);
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
        }
        tracing::info!("ctrl+c signal received, preparing to shutdown");
    };

    if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }

    tracing::info!("bookclub.svc going off, graceful shutdown complete");
}
