use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub rates: RateTableConfig,
}

pub const DEFAULT_RATE_TABLE_PATH: &str = "crates/loan-officer/data/rate_matrix.csv";

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

        let timeout_secs = parse_number::<u64>("LLM_TIMEOUT_SECS", 30)?;
        let max_attempts = parse_number::<u32>("LLM_MAX_ATTEMPTS", 2)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidNumber {
                variable: "LLM_MAX_ATTEMPTS",
            });
        }

        let llm = LlmConfig {
            api_key: env::var("OPENAI_API_KEY")
                .ok()
                .filter(|value| !value.trim().is_empty()),
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4-turbo".to_string()),
            timeout: Duration::from_secs(timeout_secs),
            max_attempts,
        };

        let top_k = parse_number::<usize>("RETRIEVAL_TOP_K", 3)?;
        if top_k == 0 {
            return Err(ConfigError::InvalidNumber {
                variable: "RETRIEVAL_TOP_K",
            });
        }
        let retrieval = RetrievalConfig {
            endpoint: env::var("RETRIEVAL_URL")
                .ok()
                .filter(|value| !value.trim().is_empty()),
            top_k,
        };

        let rates = RateTableConfig {
            path: env::var("RATE_TABLE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_RATE_TABLE_PATH)),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            llm,
            retrieval,
            rates,
        })
    }
}

impl AppConfig {
    /// Production refuses to start without model credentials; other environments degrade
    /// to the per-turn apology instead.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.environment == AppEnvironment::Production && self.llm.api_key.is_none() {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(
    variable: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { variable }),
        Err(_) => Ok(default),
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

/// Completion service connection settings.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Document retrieval endpoint; `None` means no company corpus is wired in.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub endpoint: Option<String>,
    pub top_k: usize,
}

#[derive(Debug, Clone)]
pub struct RateTableConfig {
    pub path: PathBuf,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str },
    MissingApiKey,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a positive integer")
            }
            ConfigError::MissingApiKey => {
                write!(f, "OPENAI_API_KEY is required to reach the completion service")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::MissingApiKey => None,
        }
    }
}
