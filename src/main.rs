//! Project Restore Tool
//!
//! Restores buckets, tables, aliases and component configurations of a
//! project from an S3 backup through the Storage API.

// projectrestore/src/main.rs
mod config;
mod errors;
mod platform;
mod restore;
mod storage;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use config::AppConfig;
use dotenv::dotenv;
use log::{error, info};
use platform::StorageApiClient;
use restore::{Phase, Restorer};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use storage::{S3Connector, S3ObjectStore};

const CONFIG_PATH_ENV: &str = "RESTORE_CONFIG_PATH";

/// Main entry point for the restore tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run_app().await {
        Ok(_) => {
            info!("Restore completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Restore failed: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let config_path = env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let app_config = AppConfig::load_from_json(&config_path)
        .with_context(|| format!("Failed to load application configuration from {}", config_path.display()))?;

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };
    let phase: Phase = choice.parse()?;

    info!(
        "Restoring from s3://{}/{} into {}",
        app_config.s3.bucket_name, app_config.s3.folder_prefix, app_config.storage_api.url
    );
    let source = S3ObjectStore::from_config(&app_config.s3).await;
    let connector = Arc::new(S3Connector);
    let platform = StorageApiClient::new(&app_config.storage_api, connector.clone())
        .context("Failed to create Storage API client")?;

    let restorer = Restorer::new(
        Arc::new(source),
        connector,
        Arc::new(platform),
        app_config.s3.bucket_name.clone(),
        Some(&app_config.s3.folder_prefix),
    );
    restore::run_restore_flow(&restorer, phase, app_config.restore.check_backend)
        .await
        .context("Restore process failed")
}

/// Prompts for the restore phase to run
///
/// Returns the user's choice as String; empty input means every phase
fn prompt_choice() -> Result<String> {
    use std::io::{Write, stdin, stdout};

    println!("Select what to restore:");
    println!("0. Everything (or type 'all', default)");
    println!("1. Buckets (or type 'buckets')");
    println!("2. Tables (or type 'tables')");
    println!("3. Table aliases (or type 'aliases')");
    println!("4. Configurations (or type 'configs')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
