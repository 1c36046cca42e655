use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, path::PathBuf, str::FromStr};

/// Which blob backend serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Google Cloud Storage JSON API.
    Gcs,
    /// SQLite metadata plus payload files on disk.
    Local,
    /// Process memory. Lost on exit.
    Memory,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gcs" => Ok(Backend::Gcs),
            "local" => Ok(Backend::Local),
            "memory" => Ok(Backend::Memory),
            other => bail!("unknown backend `{}` (expected gcs, local or memory)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub storage_dir: String,
    pub database_url: String,
    pub gcs_endpoint: String,
    /// Buckets created at startup on the `local` and `memory` backends.
    pub buckets: Vec<String>,
    pub credentials_file: Option<PathBuf>,
    pub access_token: Option<String>,
    pub project_id: Option<String>,
    pub region_id: Option<String>,
    /// Surface unexpected storage faults on read routes instead of
    /// answering with an empty listing or file.
    pub strict_errors: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Folder-style storage bridge for notebook front ends")]
pub struct Args {
    /// Host to bind to (overrides BRIDGE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides BRIDGE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage backend (overrides BRIDGE_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Directory where payloads are stored by the local backend (overrides BRIDGE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL for the local backend (overrides BRIDGE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// GCS JSON API endpoint (overrides BRIDGE_GCS_ENDPOINT)
    #[arg(long)]
    pub gcs_endpoint: Option<String>,

    /// Comma-separated buckets to create on local/memory backends (overrides BRIDGE_BUCKETS)
    #[arg(long, value_delimiter = ',')]
    pub buckets: Option<Vec<String>>,

    /// JSON file holding access_token, project_id and region_id (overrides BRIDGE_CREDENTIALS_FILE)
    #[arg(long)]
    pub credentials_file: Option<PathBuf>,

    /// Report storage faults on read routes (overrides BRIDGE_STRICT_ERRORS)
    #[arg(long)]
    pub strict_errors: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("BRIDGE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("BRIDGE_PORT", 8080u16)?;
        let env_backend = parse_env("BRIDGE_BACKEND", Backend::Gcs)?;
        let env_strict = parse_env_flag("BRIDGE_STRICT_ERRORS")?;
        let env_storage =
            env::var("BRIDGE_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("BRIDGE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/bridge.db".into());
        let env_endpoint = env::var("BRIDGE_GCS_ENDPOINT")
            .unwrap_or_else(|_| crate::services::gcs_client::DEFAULT_GCS_ENDPOINT.into());
        let env_buckets = env::var("BRIDGE_BUCKETS")
            .map(|v| v.split(',').map(str::to_string).collect())
            .unwrap_or_default();

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            gcs_endpoint: args.gcs_endpoint.unwrap_or(env_endpoint),
            buckets: clean_buckets(args.buckets.unwrap_or(env_buckets)),
            credentials_file: args
                .credentials_file
                .or_else(|| env::var_os("BRIDGE_CREDENTIALS_FILE").map(PathBuf::from)),
            access_token: non_empty_env("BRIDGE_ACCESS_TOKEN"),
            project_id: non_empty_env("BRIDGE_PROJECT_ID"),
            region_id: non_empty_env("BRIDGE_REGION_ID"),
            strict_errors: args.strict_errors || env_strict,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read `name`, falling back to `default` when unset. A set but unparsable
/// value is an error.
fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

/// Boolean env flag. Unset or empty is false.
fn parse_env_flag(name: &str) -> Result<bool> {
    match env::var(name) {
        Ok(value) => flag_value(&value).with_context(|| {
            format!(
                "parsing {} value `{}` (expected true/false, 1/0, yes/no or on/off)",
                name, value
            )
        }),
        Err(env::VarError::NotPresent) => Ok(false),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn flag_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn clean_buckets(buckets: Vec<String>) -> Vec<String> {
    buckets
        .into_iter()
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty())
        .collect()
}
