// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding `credentials.redb` | `/data` |
//! | `SESSION_SIGNING_KEY` | HMAC key for session tokens (≥ 32 bytes) | Required |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token lifetime (≤ 10 years) | `10` |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh token lifetime (≤ 10 years) | `864000` |
//! | `REVOKE_ON_ROTATION` | Delete the old token record on refresh | `false` |
//! | `OAUTH_CLIENT_ID` | OAuth app client ID | Unset disables login |
//! | `OAUTH_CLIENT_SECRET` | OAuth app client secret | Unset disables login |
//! | `OAUTH_TOKEN_URL` | Code exchange endpoint | GitHub |
//! | `OAUTH_EMAILS_URL` | Email listing endpoint | GitHub |
//! | `UPSTREAM_TIMEOUT_SECS` | Deadline for identity provider calls | `10` |
//! | `STORE_OPEN_ATTEMPTS` | Store open attempts at startup | `9` |
//! | `STORE_RETRY_DELAY_MS` | First retry delay, doubled per attempt | `1000` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use url::Url;

use crate::auth::identity::{DEFAULT_EMAILS_URL, DEFAULT_TOKEN_URL};
use crate::auth::session::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS, MAX_TTL_SECS};
use crate::auth::{OAuthConfig, SessionConfig};
use crate::storage::{RetryPolicy, CREDENTIALS_DB_FILE};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the data directory path.
///
/// # Default
/// `/data`
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable name for the session token HMAC key.
///
/// Must be at least [`MIN_SIGNING_KEY_LEN`] bytes. Never logged.
pub const SESSION_SIGNING_KEY_ENV: &str = "SESSION_SIGNING_KEY";

pub const ACCESS_TOKEN_TTL_ENV: &str = "ACCESS_TOKEN_TTL_SECS";
pub const REFRESH_TOKEN_TTL_ENV: &str = "REFRESH_TOKEN_TTL_SECS";
pub const REVOKE_ON_ROTATION_ENV: &str = "REVOKE_ON_ROTATION";

pub const OAUTH_CLIENT_ID_ENV: &str = "OAUTH_CLIENT_ID";
pub const OAUTH_CLIENT_SECRET_ENV: &str = "OAUTH_CLIENT_SECRET";
pub const OAUTH_TOKEN_URL_ENV: &str = "OAUTH_TOKEN_URL";
pub const OAUTH_EMAILS_URL_ENV: &str = "OAUTH_EMAILS_URL";
pub const UPSTREAM_TIMEOUT_ENV: &str = "UPSTREAM_TIMEOUT_SECS";

pub const STORE_OPEN_ATTEMPTS_ENV: &str = "STORE_OPEN_ATTEMPTS";
pub const STORE_RETRY_DELAY_ENV: &str = "STORE_RETRY_DELAY_MS";

/// Environment variable name for log output format.
///
/// - `json` - Structured JSON logs (recommended for production)
/// - `pretty` - Human-readable colored output (default)
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default `RUST_LOG` filter when unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "/data";
pub const MIN_SIGNING_KEY_LEN: usize = 32;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STORE_OPEN_ATTEMPTS: u32 = 9;
pub const DEFAULT_STORE_RETRY_DELAY_MS: u64 = 1000;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("expected `json` or `pretty`, got `{other}`")),
        }
    }
}

/// Fully parsed runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub session: SessionConfig,
    /// `None` when OAuth credentials are not configured
    pub oauth: Option<OAuthConfig>,
    pub store_retry: RetryPolicy,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host: IpAddr = parse_or(&var, HOST_ENV, IpAddr::V4(Ipv4Addr::UNSPECIFIED))?;
        let port: u16 = parse_or(&var, PORT_ENV, DEFAULT_PORT)?;
        let data_dir = PathBuf::from(var(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));

        let signing_key = var(SESSION_SIGNING_KEY_ENV).ok_or(ConfigError::Missing(SESSION_SIGNING_KEY_ENV))?;
        if signing_key.len() < MIN_SIGNING_KEY_LEN {
            return Err(ConfigError::Invalid {
                var: SESSION_SIGNING_KEY_ENV,
                reason: format!("must be at least {MIN_SIGNING_KEY_LEN} bytes"),
            });
        }

        let mut session = SessionConfig::new(signing_key.into_bytes());
        session.access_ttl_secs = parse_positive(&var, ACCESS_TOKEN_TTL_ENV, DEFAULT_ACCESS_TTL_SECS)?;
        session.refresh_ttl_secs = parse_positive(&var, REFRESH_TOKEN_TTL_ENV, DEFAULT_REFRESH_TTL_SECS)?;
        session.revoke_on_rotation = parse_or(&var, REVOKE_ON_ROTATION_ENV, false)?;
        for (name, ttl) in [
            (ACCESS_TOKEN_TTL_ENV, session.access_ttl_secs),
            (REFRESH_TOKEN_TTL_ENV, session.refresh_ttl_secs),
        ] {
            if ttl > MAX_TTL_SECS {
                return Err(ConfigError::Invalid {
                    var: name,
                    reason: format!("must not exceed {MAX_TTL_SECS} seconds"),
                });
            }
        }
        if session.refresh_ttl_secs < session.access_ttl_secs {
            return Err(ConfigError::Invalid {
                var: REFRESH_TOKEN_TTL_ENV,
                reason: "must not be shorter than the access token lifetime".to_string(),
            });
        }

        let timeout = Duration::from_secs(parse_positive(&var, UPSTREAM_TIMEOUT_ENV, DEFAULT_UPSTREAM_TIMEOUT_SECS)?);
        let oauth = match (var(OAUTH_CLIENT_ID_ENV), var(OAUTH_CLIENT_SECRET_ENV)) {
            (Some(client_id), Some(client_secret)) => Some(OAuthConfig {
                client_id,
                client_secret,
                token_url: parse_url(&var, OAUTH_TOKEN_URL_ENV, DEFAULT_TOKEN_URL)?,
                emails_url: parse_url(&var, OAUTH_EMAILS_URL_ENV, DEFAULT_EMAILS_URL)?,
                timeout,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(OAUTH_CLIENT_SECRET_ENV)),
            (None, Some(_)) => return Err(ConfigError::Missing(OAUTH_CLIENT_ID_ENV)),
        };

        let store_retry = RetryPolicy {
            attempts: parse_positive(&var, STORE_OPEN_ATTEMPTS_ENV, DEFAULT_STORE_OPEN_ATTEMPTS)?,
            base_delay: Duration::from_millis(parse_or(&var, STORE_RETRY_DELAY_ENV, DEFAULT_STORE_RETRY_DELAY_MS)?),
            ..RetryPolicy::default()
        };

        let log_format = match var(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse::<LogFormat>().map_err(|reason| ConfigError::Invalid {
                var: LOG_FORMAT_ENV,
                reason,
            })?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            data_dir,
            session,
            oauth,
            store_retry,
            log_format,
        })
    }

    /// Path of the credential database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(CREDENTIALS_DB_FILE)
    }
}

fn invalid<E: std::fmt::Display>(var: &'static str) -> impl Fn(E) -> ConfigError {
    move |e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    }
}

fn parse_or<T, V>(var: &V, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(invalid(name)),
        None => Ok(default),
    }
}

fn parse_positive<T, V>(var: &V, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    let value = parse_or(var, name, default)?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            var: name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn parse_url<V>(var: &V, name: &'static str, default: &str) -> Result<Url, ConfigError>
where
    V: Fn(&str) -> Option<String>,
{
    let raw = var(name).unwrap_or_else(|| default.to_string());
    Url::parse(&raw).map_err(invalid(name))
}
