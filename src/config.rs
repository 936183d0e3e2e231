use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "bookclub")]
#[command(about = "Serves the book club catalog", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Import integrations and book clubs from a YAML file
    Seed { file: PathBuf },
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bookclub")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    database: String,
    port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub turso_url: Option<String>,
    #[serde(default)]
    pub turso_auth_token: Option<String>,
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_sync_interval() -> u64 {
    60
}

impl App {
    pub fn get_db(&self) -> &str {
        &self.database
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Remote primary for embedded-replica mode. Both settings must be non-empty;
    /// `${TURSO_URL:-}` style placeholders expand to empty strings when unset.
    pub fn replica(&self) -> Option<(&str, &str)> {
        let url = self.turso_url.as_deref().filter(|s| !s.trim().is_empty())?;
        let token = self.turso_auth_token.as_deref().filter(|s| !s.trim().is_empty())?;
        Some((url, token))
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub app: App,
}

impl Config {
    pub fn new(path: &Path) -> Result<Self> {
        let yaml_str =
            fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
        Config::from_yaml(&yaml_str)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        let yaml_with_env = substitute_env_vars(yaml_str);
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }
}

/// Expands `${VAR}` and `${VAR:-default}` from the process environment.
/// An unset variable without a default expands to an empty string.
fn substitute_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);

        let expr = &rest[start + 2..start + len];
        let value = match expr.split_once(":-") {
            Some((name, default)) => env::var(name).unwrap_or_else(|_| default.to_string()),
            None => env::var(expr).unwrap_or_else(|_| {
                tracing::warn!("environment variable '{}' not found", expr);
                String::new()
            }),
        };
        out.push_str(&value);
        rest = &rest[start + len + 1..];
    }

    out.push_str(rest);
    out
}
