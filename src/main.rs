//! PKI Bootstrap - one-shot CA and certificate provisioning
//!
//! Reads its request from environment variables (or the TOML file named by
//! `PKI_BOOTSTRAP_CONFIG`) and performs exactly one of:
//!
//! - `generate_ca`: create the root CA unless one already exists, and
//!   optionally issue the configured leaf right away
//! - `generate_server_cert`: load the existing root CA and issue the
//!   configured server or client certificate
//!
//! Logging is controlled with `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use pki_bootstrap::bootstrap::{self, Outcome};
use pki_bootstrap::configs::AppConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const CONFIG_PATH_VAR: &str = "PKI_BOOTSTRAP_CONFIG";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config = load_config()?;
    let outcome = bootstrap::run(&config)
        .with_context(|| format!("{:?} request failed", config.request_type))?;
    if let Outcome::CaExists = outcome {
        println!(
            "CA already exists at {}, nothing to do",
            config.ca_storage_path.display()
        );
    }
    Ok(())
}

fn load_config() -> Result<AppConfig> {
    match std::env::var_os(CONFIG_PATH_VAR) {
        Some(path) => {
            let path = PathBuf::from(path);
            AppConfig::from_file(&path)
                .with_context(|| format!("Failed to load config file {}", path.display()))
        }
        None => AppConfig::from_env().context("Invalid environment configuration"),
    }
}
