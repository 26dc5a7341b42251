//! User Import Worker - reconciles batches of external users into a user directory
//!
//! Serves import requests over NATS, or runs a single import from a file.

mod cli;
mod config;
mod defaults;
mod error;
mod handlers;
mod services;
mod types;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::services::directory::create_directory_service;
use crate::services::importer::Importer;
use crate::types::ImportRequest;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs directory - use LOGS_DIR env var or default to ../logs
    let logs_dir = std::env::var("LOGS_DIR")
        .unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &logs_dir,
        "user-import.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,user_import_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())  // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))  // file
        .init();

    let config = Config::from_env()?;
    info!("Configuration loaded");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Import { file } => import_file(config, &file).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting User Import Worker...");

    let directory = create_directory_service(config.directory_backend, &config.directory)?;

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (config.nats_user.clone(), config.nats_password.clone()) {
        (Some(user), Some(password)) => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    let handler_result =
        handlers::start_handlers(nats_client, directory, config.contact_types).await;

    if let Err(e) = handler_result {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Run one import from a JSON file and print the report
async fn import_file(config: Config, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let request: ImportRequest = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a valid import request", path.display()))?;

    let directory = create_directory_service(config.directory_backend, &config.directory)?;
    let importer = Importer::new(directory, config.contact_types);
    let run = importer.run(request).await;

    println!("{}", serde_json::to_string_pretty(&run.outcome)?);

    if run.outcome.has_failures() {
        tracing::warn!(
            "{} of {} users failed to import",
            run.outcome.failed_records,
            run.outcome.total_records
        );
    }

    if run.aborted {
        anyhow::bail!(
            "Import aborted (status {}): {}",
            run.status_code(),
            run.outcome.error.unwrap_or_default()
        );
    }
    Ok(())
}
