use crate::error::{DashboardError, DashboardResult};
use crate::login::{Argon2Verifier, CredentialVerifier, MAX_SESSION_TTL, PlaintextVerifier};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

lazy_static! {
    static ref SPREADSHEET_URL_REGEX: Regex =
        Regex::new(r"/spreadsheets/d/([A-Za-z0-9_-]+)").unwrap();
}

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_SHEETS_API: &str = "https://sheets.googleapis.com/v4";
const DEFAULT_RECORDS_SHEET: &str = "test sheet";
const DEFAULT_COMPLAINTS_SHEET: &str = "Complained";
const DEFAULT_CSV_DIR: &str = "database";
const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Sheets {
        api_base: String,
        spreadsheet_id: String,
        access_token: Option<String>,
        api_key: Option<String>,
    },
    Csv {
        dir: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialsMode {
    Plaintext,
    Argon2,
}

impl CredentialsMode {
    pub fn verifier(&self) -> Box<dyn CredentialVerifier> {
        match self {
            CredentialsMode::Plaintext => Box::new(PlaintextVerifier),
            CredentialsMode::Argon2 => Box::new(Argon2Verifier),
        }
    }
}

/// Runtime settings, read from the environment (and `.env` through dotenvy).
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub bind: String,
    pub store: StoreBackend,
    pub records_sheet: String,
    pub complaints_sheet: String,
    pub credentials: CredentialsMode,
    pub session_ttl: Duration,
}

impl Config {
    pub fn from_env() -> DashboardResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> DashboardResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let store = match get("DASHBOARD_STORE").as_deref().unwrap_or("sheets") {
            "sheets" => {
                let spreadsheet = get("SHEETS_SPREADSHEET").ok_or_else(|| {
                    DashboardError::Config("SHEETS_SPREADSHEET must be set for the sheets store".into())
                })?;
                StoreBackend::Sheets {
                    api_base: get("SHEETS_API_BASE")
                        .unwrap_or_else(|| DEFAULT_SHEETS_API.to_string())
                        .trim_end_matches('/')
                        .to_string(),
                    spreadsheet_id: spreadsheet_id(&spreadsheet),
                    access_token: get("SHEETS_ACCESS_TOKEN"),
                    api_key: get("SHEETS_API_KEY"),
                }
            }
            "csv" => StoreBackend::Csv {
                dir: PathBuf::from(get("CSV_STORE_DIR").unwrap_or_else(|| DEFAULT_CSV_DIR.to_string())),
            },
            other => {
                return Err(DashboardError::Config(format!(
                    "Unknown DASHBOARD_STORE '{}', expected 'sheets' or 'csv'",
                    other
                )));
            }
        };

        let credentials = match get("CREDENTIALS_MODE").as_deref().unwrap_or("plaintext") {
            "plaintext" => CredentialsMode::Plaintext,
            "argon2" => CredentialsMode::Argon2,
            other => {
                return Err(DashboardError::Config(format!(
                    "Unknown CREDENTIALS_MODE '{}', expected 'plaintext' or 'argon2'",
                    other
                )));
            }
        };

        let session_ttl = match get("SESSION_TTL_SECS") {
            Some(secs) => secs.parse::<u64>().map_err(|_| {
                DashboardError::Config(format!("SESSION_TTL_SECS must be a number, got '{}'", secs))
            })?,
            None => SESSION_DURATION,
        };
        if session_ttl > MAX_SESSION_TTL.as_secs() {
            return Err(DashboardError::Config(format!(
                "SESSION_TTL_SECS must be at most {}, got {}",
                MAX_SESSION_TTL.as_secs(),
                session_ttl
            )));
        }

        Ok(Config {
            bind: get("DASHBOARD_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            store,
            records_sheet: get("RECORDS_SHEET").unwrap_or_else(|| DEFAULT_RECORDS_SHEET.to_string()),
            complaints_sheet: get("COMPLAINTS_SHEET")
                .unwrap_or_else(|| DEFAULT_COMPLAINTS_SHEET.to_string()),
            credentials,
            session_ttl: Duration::from_secs(session_ttl),
        })
    }
}

/// Accepts either a bare spreadsheet id or a full docs.google.com URL.
pub fn spreadsheet_id(value: &str) -> String {
    SPREADSHEET_URL_REGEX
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| value.trim().to_string())
}
