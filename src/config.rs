//! Environment-based runtime configuration.

use std::env;

use thiserror::Error;

/// Default authorization host of the external music service.
const DEFAULT_ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";
/// Default catalog API host of the external music service.
const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
/// Default public URL clients are redirected back to after OAuth.
const DEFAULT_SERVER_BASE_URL: &str = "http://localhost:3000";
/// Default listening port.
const DEFAULT_PORT: u16 = 8080;

/// Errors raised while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("invalid value for environment variable `{var}`: {value}")]
    InvalidEnvVar { var: &'static str, value: String },
}

/// Deployment mode, controlling log verbosity hints and redirect strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Credentials and endpoints for the external music service.
#[derive(Debug, Clone)]
pub struct MusicConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub accounts_base_url: String,
    pub api_base_url: String,
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Public base URL used for post-OAuth redirects back into rooms.
    pub base_url: String,
    pub port: u16,
    pub environment: Environment,
}

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub music: MusicConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Assemble the configuration from the process environment.
    ///
    /// Music credentials are mandatory; endpoints and server settings fall
    /// back to sensible defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let music = MusicConfig {
            client_id: require("MUSIC_CLIENT_ID")?,
            client_secret: require("MUSIC_CLIENT_SECRET")?,
            redirect_uri: require("MUSIC_REDIRECT_URI")?,
            accounts_base_url: env::var("MUSIC_ACCOUNTS_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_ACCOUNTS_BASE_URL.into()),
            api_base_url: env::var("MUSIC_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.into()),
        };

        let port = match env::var("PORT").or_else(|_| env::var("SERVER_PORT")) {
            Ok(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidEnvVar {
                    var: "PORT",
                    value,
                })?,
            Err(_) => DEFAULT_PORT,
        };

        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            _ => Environment::Development,
        };

        let server = ServerConfig {
            base_url: env::var("SERVER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_SERVER_BASE_URL.into()),
            port,
            environment,
        };

        Ok(Self { music, server })
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    env::var(var)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingEnvVar { var })
}
