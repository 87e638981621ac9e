use avicast_core::detection::{validate_threshold, DEFAULT_CONFIDENCE_THRESHOLD};
use avicast_detection::DetectorConfig;
use avicast_pipeline::storage::DEFAULT_MAX_UPLOAD_BYTES;

use crate::auth::jwt::JwtConfig;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for local development.
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// SQLite database URL (default: `sqlite://avicast.db`).
    pub database_url: String,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `60`). Covers the
    /// synchronous detection call made by `process`.
    pub request_timeout_secs: u64,
    /// Directory uploaded images are written to (default: `./uploads`).
    pub upload_dir: String,
    /// Largest accepted upload in bytes (default: 20 MiB).
    pub max_upload_bytes: usize,
    /// Detections below this confidence are discarded (default: `0.75`).
    pub confidence_threshold: f64,
    /// Detection service connection settings.
    pub detection: DetectorConfig,
    /// JWT validation settings.
    pub jwt: JwtConfig,
    /// Log line format (default: pretty).
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                 |
    /// |----------------------------------|-------------------------|
    /// | `HOST`                           | `0.0.0.0`               |
    /// | `PORT`                           | `3000`                  |
    /// | `DATABASE_URL`                   | `sqlite://avicast.db`   |
    /// | `CORS_ORIGINS`                   | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`           | `60`                    |
    /// | `UPLOAD_DIR`                     | `./uploads`             |
    /// | `MAX_UPLOAD_BYTES`               | `20971520`              |
    /// | `DETECTION_CONFIDENCE_THRESHOLD` | `0.75`                  |
    /// | `LOG_FORMAT`                     | `pretty`                |
    ///
    /// Detection (`DETECTION_URL`, `DETECTION_TIMEOUT_SECS`) and JWT
    /// (`JWT_SECRET`, required) settings are read by their own loaders.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://avicast.db".into());

        let cors_origins = parse_origins(
            &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".into()),
        );

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".into());

        let max_upload_bytes: usize = std::env::var("MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| DEFAULT_MAX_UPLOAD_BYTES.to_string())
            .parse()
            .expect("MAX_UPLOAD_BYTES must be a valid usize");

        let confidence_threshold: f64 = std::env::var("DETECTION_CONFIDENCE_THRESHOLD")
            .unwrap_or_else(|_| DEFAULT_CONFIDENCE_THRESHOLD.to_string())
            .parse()
            .expect("DETECTION_CONFIDENCE_THRESHOLD must be a number");
        if let Err(msg) = validate_threshold(confidence_threshold) {
            panic!("DETECTION_CONFIDENCE_THRESHOLD is invalid: {msg}");
        }

        let log_format = std::env::var("LOG_FORMAT")
            .map(|v| LogFormat::parse(&v).expect("LOG_FORMAT must be 'pretty' or 'json'"))
            .unwrap_or(LogFormat::Pretty);

        Self {
            host,
            port,
            database_url,
            cors_origins,
            request_timeout_secs,
            upload_dir,
            max_upload_bytes,
            confidence_threshold,
            detection: DetectorConfig::from_env(),
            jwt: JwtConfig::from_env(),
            log_format,
        }
    }
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
