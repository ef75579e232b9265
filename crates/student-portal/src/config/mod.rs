use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the portal service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub backend: BackendConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            backend: BackendConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

pub const DEFAULT_DOCUMENT_BUCKET: &str = "applicant-documents";
pub const DEFAULT_SUBMISSION_BUCKET: &str = "assignment-submissions";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Connection details for the hosted backend. When `remote` is `None` the service runs
/// against the seeded in-memory gateway.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub remote: Option<RemoteBackend>,
    pub document_bucket: String,
    pub submission_bucket: String,
    pub request_timeout: Duration,
}

#[derive(Clone)]
pub struct RemoteBackend {
    pub base_url: String,
    pub api_key: String,
}

impl fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl BackendConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = non_empty_var("PORTAL_BACKEND_URL");
        let api_key = non_empty_var("PORTAL_BACKEND_KEY");

        let remote = match (base_url, api_key) {
            (Some(base_url), Some(api_key)) => Some(RemoteBackend {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key,
            }),
            (Some(_), None) => return Err(ConfigError::MissingBackendKey),
            (None, _) => None,
        };

        let request_timeout = match non_empty_var("PORTAL_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidTimeout)?,
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        Ok(Self {
            remote,
            document_bucket: non_empty_var("PORTAL_DOCUMENT_BUCKET")
                .unwrap_or_else(|| DEFAULT_DOCUMENT_BUCKET.to_string()),
            submission_bucket: non_empty_var("PORTAL_SUBMISSION_BUCKET")
                .unwrap_or_else(|| DEFAULT_SUBMISSION_BUCKET.to_string()),
            request_timeout,
        })
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            remote: None,
            document_bucket: DEFAULT_DOCUMENT_BUCKET.to_string(),
            submission_bucket: DEFAULT_SUBMISSION_BUCKET.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    MissingBackendKey,
    InvalidTimeout,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::MissingBackendKey => {
                write!(f, "PORTAL_BACKEND_KEY is required when PORTAL_BACKEND_URL is set")
            }
            ConfigError::InvalidTimeout => {
                write!(f, "PORTAL_REQUEST_TIMEOUT_SECS must be a positive integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::MissingBackendKey
            | ConfigError::InvalidTimeout => None,
        }
    }
}
