//! Environment configuration.
//!
//! ```text
//!   BAILIFF_PORT              listen port (default 4001)
//!   BAILIFF_DATA_DIR          registry, cases and audit log (default ./bailiff-data)
//!   BAILIFF_KEYS_DIR          identity PEM directory (default <data>/identity)
//!   BAILIFF_IDENTITY_NAME     identity file prefix (default tribunal)
//!   BAILIFF_SEED_IDENTITY     self-register own key on startup (default true)
//!   BAILIFF_DEVICE_NAME       device name used when seeding (default tribunal-primary)
//!   BAILIFF_OWNER_EMAIL       owner email used when seeding
//!   BAILIFF_MAX_UPLOAD_BYTES  request body limit (default 52428800)
//!   BAILIFF_LOG_FORMAT        "json" for structured logs, "pretty" for dev
//! ```

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 4001;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_RECEIVER_URL: &str = "http://127.0.0.1:4001";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub keys_dir: PathBuf,
    pub identity_name: String,
    pub seed_identity: bool,
    pub device_name: String,
    pub owner_email: Option<String>,
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Unparseable values fall back to the
    /// default with a warning.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = PathBuf::from(var("BAILIFF_DATA_DIR").unwrap_or_else(|| "./bailiff-data".into()));
        let keys_dir = var("BAILIFF_KEYS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("identity"));

        Self {
            port: parsed(&var, "BAILIFF_PORT", DEFAULT_PORT),
            keys_dir,
            data_dir,
            identity_name: var("BAILIFF_IDENTITY_NAME").unwrap_or_else(|| "tribunal".into()),
            seed_identity: var("BAILIFF_SEED_IDENTITY")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(true),
            device_name: var("BAILIFF_DEVICE_NAME").unwrap_or_else(|| "tribunal-primary".into()),
            owner_email: var("BAILIFF_OWNER_EMAIL"),
            max_upload_bytes: parsed(&var, "BAILIFF_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            log_format: match var("BAILIFF_LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        }
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.data_dir.join("keys")
    }

    pub fn cases_dir(&self) -> PathBuf {
        self.data_dir.join("cases")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.data_dir.join("bailiff-audit.jsonl")
    }
}

fn parsed<T: std::str::FromStr + std::fmt::Display + Copy>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> T {
    match var(name) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, default = %default, "invalid value, using default");
            default
        }),
    }
}
