// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment exactly once, in `main`, and the
//! resulting [`AppConfig`] is handed to every component that needs it.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `3000` |
//! | `DATA_DIR` | Directory holding the linked-account database | `./data` |
//! | `PLAID_CLIENT_ID` | Plaid client identifier | Required |
//! | `PLAID_SECRET` | Plaid secret | Required |
//! | `PLAID_ENV` | `sandbox`, `development` or `production` | `sandbox` |
//! | `PLAID_BASE_URL` | Overrides the URL derived from `PLAID_ENV` | - |
//! | `PLAID_CLIENT_NAME` | Client name shown in Plaid Link | `broke be gone` |
//! | `PLAID_PRODUCTS` | Comma-separated Plaid products | `transactions` |
//! | `PLAID_COUNTRY_CODES` | Comma-separated country codes | `US` |
//! | `PLAID_LANGUAGE` | Plaid Link language | `en` |
//! | `IDENTITY_BASE_URL` | Identity provider base URL | `http://localhost:3001` |
//! | `PROVIDER_TIMEOUT_SECS` | Timeout for every outbound call | `15` |
//! | `BALANCE_FAILURE_POLICY` | `fail_fast` or `partial` | `partial` |
//! | `BALANCE_MAX_CONCURRENCY` | Concurrent institution fetches | `4` |
//! | `SIGN_IN_PATH` | Where unauthenticated requests are redirected | `/log-in` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::{fmt, net::SocketAddr, path::PathBuf, time::Duration};

use url::Url;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const PLAID_CLIENT_ID_ENV: &str = "PLAID_CLIENT_ID";
pub const PLAID_SECRET_ENV: &str = "PLAID_SECRET";
pub const PLAID_ENV_ENV: &str = "PLAID_ENV";
pub const PLAID_BASE_URL_ENV: &str = "PLAID_BASE_URL";
pub const PLAID_CLIENT_NAME_ENV: &str = "PLAID_CLIENT_NAME";
pub const PLAID_PRODUCTS_ENV: &str = "PLAID_PRODUCTS";
pub const PLAID_COUNTRY_CODES_ENV: &str = "PLAID_COUNTRY_CODES";
pub const PLAID_LANGUAGE_ENV: &str = "PLAID_LANGUAGE";
pub const IDENTITY_BASE_URL_ENV: &str = "IDENTITY_BASE_URL";
pub const PROVIDER_TIMEOUT_ENV: &str = "PROVIDER_TIMEOUT_SECS";
pub const BALANCE_FAILURE_POLICY_ENV: &str = "BALANCE_FAILURE_POLICY";
pub const BALANCE_MAX_CONCURRENCY_ENV: &str = "BALANCE_MAX_CONCURRENCY";
pub const SIGN_IN_PATH_ENV: &str = "SIGN_IN_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_CLIENT_NAME: &str = "broke be gone";
const DEFAULT_PRODUCTS: &str = "transactions";
const DEFAULT_COUNTRY_CODES: &str = "US";
const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_IDENTITY_BASE_URL: &str = "http://localhost:3001";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 15;
const DEFAULT_BALANCE_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_SIGN_IN_PATH: &str = "/log-in";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Plaid deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaidEnvironment {
    Sandbox,
    Development,
    Production,
}

impl PlaidEnvironment {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Some(Self::Sandbox),
            "development" => Some(Self::Development),
            "production" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.plaid.com",
            Self::Development => "https://development.plaid.com",
            Self::Production => "https://production.plaid.com",
        }
    }
}

/// A secret string that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Plaid API credentials and endpoint.
#[derive(Debug, Clone)]
pub struct PlaidConfig {
    pub base_url: Url,
    pub client_id: String,
    pub secret: Secret,
}

/// Fixed parameters of every link session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    pub client_name: String,
    pub products: Vec<String>,
    pub country_codes: Vec<String>,
    pub language: String,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            products: split_list(DEFAULT_PRODUCTS, false),
            country_codes: split_list(DEFAULT_COUNTRY_CODES, true),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

/// What the balance aggregator does when one institution cannot be queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceFailurePolicy {
    /// Abort the whole aggregation on the first institution failure.
    FailFast,
    /// Return successful institutions and list the failed ones separately.
    Partial,
}

impl BalanceFailurePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Some(Self::FailFast),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceSettings {
    pub failure_policy: BalanceFailurePolicy,
    pub max_concurrency: usize,
}

impl Default for BalanceSettings {
    fn default() -> Self {
        Self {
            failure_policy: BalanceFailurePolicy::Partial,
            max_concurrency: DEFAULT_BALANCE_MAX_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Complete process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub plaid: PlaidConfig,
    pub link: LinkSettings,
    pub identity_base_url: Url,
    pub provider_timeout: Duration,
    pub balances: BalanceSettings,
    pub sign_in_path: String,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: PORT_ENV,
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };
        let bind_addr: SocketAddr =
            format!("{host}:{port}")
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                    name: HOST_ENV,
                    reason: e.to_string(),
                })?;

        let data_dir = PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));

        let environment = match get(PLAID_ENV_ENV) {
            Some(raw) => PlaidEnvironment::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                name: PLAID_ENV_ENV,
                reason: format!("unknown Plaid environment `{raw}`"),
            })?,
            None => PlaidEnvironment::Sandbox,
        };
        let plaid_base_url = get(PLAID_BASE_URL_ENV)
            .unwrap_or_else(|| environment.base_url().to_string());
        let plaid = PlaidConfig {
            base_url: parse_url(PLAID_BASE_URL_ENV, &plaid_base_url)?,
            client_id: get(PLAID_CLIENT_ID_ENV).ok_or(ConfigError::Missing(PLAID_CLIENT_ID_ENV))?,
            secret: Secret::new(get(PLAID_SECRET_ENV).ok_or(ConfigError::Missing(PLAID_SECRET_ENV))?),
        };

        let defaults = LinkSettings::default();
        let link = LinkSettings {
            client_name: get(PLAID_CLIENT_NAME_ENV).unwrap_or(defaults.client_name),
            products: get(PLAID_PRODUCTS_ENV)
                .map(|raw| split_list(&raw, false))
                .unwrap_or(defaults.products),
            country_codes: get(PLAID_COUNTRY_CODES_ENV)
                .map(|raw| split_list(&raw, true))
                .unwrap_or(defaults.country_codes),
            language: get(PLAID_LANGUAGE_ENV).unwrap_or(defaults.language),
        };
        if link.products.is_empty() {
            return Err(ConfigError::Invalid {
                name: PLAID_PRODUCTS_ENV,
                reason: "at least one product is required".to_string(),
            });
        }
        if link.country_codes.is_empty() {
            return Err(ConfigError::Invalid {
                name: PLAID_COUNTRY_CODES_ENV,
                reason: "at least one country code is required".to_string(),
            });
        }

        let identity_base_url = parse_url(
            IDENTITY_BASE_URL_ENV,
            &get(IDENTITY_BASE_URL_ENV).unwrap_or_else(|| DEFAULT_IDENTITY_BASE_URL.to_string()),
        )?;

        let timeout_secs = parse_positive(PROVIDER_TIMEOUT_ENV, get(PROVIDER_TIMEOUT_ENV))?
            .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS as usize);

        let mut balances = BalanceSettings::default();
        if let Some(raw) = get(BALANCE_FAILURE_POLICY_ENV) {
            balances.failure_policy =
                BalanceFailurePolicy::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                    name: BALANCE_FAILURE_POLICY_ENV,
                    reason: format!("expected `fail_fast` or `partial`, got `{raw}`"),
                })?;
        }
        if let Some(limit) =
            parse_positive(BALANCE_MAX_CONCURRENCY_ENV, get(BALANCE_MAX_CONCURRENCY_ENV))?
        {
            balances.max_concurrency = limit;
        }

        let sign_in_path = get(SIGN_IN_PATH_ENV).unwrap_or_else(|| DEFAULT_SIGN_IN_PATH.to_string());
        if !sign_in_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                name: SIGN_IN_PATH_ENV,
                reason: "must be an absolute path".to_string(),
            });
        }

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            bind_addr,
            data_dir,
            plaid,
            link,
            identity_base_url,
            provider_timeout: Duration::from_secs(timeout_secs as u64),
            balances,
            sign_in_path,
            log_format,
        })
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("unsupported scheme `{}`", url.scheme()),
        });
    }
    Ok(url)
}

fn parse_positive(name: &'static str, raw: Option<String>) -> Result<Option<usize>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.parse::<usize>() {
        Ok(value) if value > 0 => Ok(Some(value)),
        _ => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a positive integer, got `{raw}`"),
        }),
    }
}

fn split_list(raw: &str, uppercase: bool) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            if uppercase {
                item.to_ascii_uppercase()
            } else {
                item.to_ascii_lowercase()
            }
        })
        .collect()
}
