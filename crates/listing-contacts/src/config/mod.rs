use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::contacts::{ContactSettings, DuplicateEmailPolicy};

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
    pub contacts: ContactsConfig,
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
            contacts: ContactsConfig::from_env()?,
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

/// Which listing-interest index backs the contact service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingIndexKind {
    /// Single edge table, atomic link/unlink.
    JoinTable,
    /// Two independent id lists kept in record meta.
    Meta,
}

impl ListingIndexKind {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "join_table" | "join-table" | "table" => Ok(Self::JoinTable),
            "meta" | "post_meta" => Ok(Self::Meta),
            other => Err(ConfigError::InvalidListingIndex(other.to_string())),
        }
    }
}

/// Contact service behavior.
#[derive(Debug, Clone)]
pub struct ContactsConfig {
    pub notes_page_size: usize,
    pub duplicate_emails: DuplicateEmailPolicy,
    pub listing_index: ListingIndexKind,
}

impl ContactsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let notes_page_size = env::var("CONTACTS_NOTES_PAGE_SIZE")
            .unwrap_or_else(|_| "20".to_string())
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|size| *size > 0)
            .ok_or(ConfigError::InvalidNotesPageSize)?;

        let duplicate_emails = match env::var("CONTACTS_DUPLICATE_EMAILS") {
            Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "reject" => DuplicateEmailPolicy::Reject,
                "oldest" | "first" => DuplicateEmailPolicy::Oldest,
                other => return Err(ConfigError::InvalidDuplicatePolicy(other.to_string())),
            },
            Err(_) => DuplicateEmailPolicy::Reject,
        };

        let listing_index = match env::var("CONTACTS_LISTING_INDEX") {
            Ok(raw) => ListingIndexKind::parse(&raw)?,
            Err(_) => ListingIndexKind::JoinTable,
        };

        Ok(Self {
            notes_page_size,
            duplicate_emails,
            listing_index,
        })
    }

    pub fn settings(&self) -> ContactSettings {
        ContactSettings {
            notes_page_size: self.notes_page_size,
            duplicate_emails: self.duplicate_emails,
        }
    }
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            notes_page_size: 20,
            duplicate_emails: DuplicateEmailPolicy::Reject,
            listing_index: ListingIndexKind::JoinTable,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNotesPageSize,
    InvalidDuplicatePolicy(String),
    InvalidListingIndex(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNotesPageSize => {
                write!(f, "CONTACTS_NOTES_PAGE_SIZE must be a positive integer")
            }
            ConfigError::InvalidDuplicatePolicy(value) => write!(
                f,
                "CONTACTS_DUPLICATE_EMAILS must be 'reject' or 'oldest', got '{}'",
                value
            ),
            ConfigError::InvalidListingIndex(value) => write!(
                f,
                "CONTACTS_LISTING_INDEX must be 'join_table' or 'meta', got '{}'",
                value
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNotesPageSize
            | ConfigError::InvalidDuplicatePolicy(_)
            | ConfigError::InvalidListingIndex(_) => None,
        }
    }
}
