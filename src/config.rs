//! Configuration types.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default Bot API host.
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// User-Agent substring sent by the form-filling platform.
pub const DEFAULT_FORM_UA_MARKER: &str = "Google-Dialogflow";

/// Dispatcher configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the webhook server binds to.
    pub bind_addr: SocketAddr,
    /// Bot token used for every outbound messaging call.
    pub telegram_token: SecretString,
    /// Bot API base URL (overridable for tests and proxies).
    pub telegram_api_base: String,
    /// Document store project identifier.
    pub project_id: String,
    /// Document store database identifier.
    pub database_id: String,
    /// Blob store bucket name.
    pub bucket: String,
    /// Root directory for local store files.
    pub data_dir: PathBuf,
    /// Timeout applied to every outbound HTTP call.
    pub http_timeout: Duration,
    /// User-Agent marker that identifies form-platform requests.
    pub form_ua_marker: String,
    /// Confirm the bot token with `getMe` before serving.
    pub verify_token: bool,
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("TELEGRAM_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_TOKEN".into()))?;
        validate_token(&token)?;

        let bind_addr = match lookup("AREMS_BIND") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "AREMS_BIND".into(),
                message: format!("{raw:?} is not a socket address: {e}"),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let http_timeout_secs: u64 = match lookup("AREMS_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "AREMS_HTTP_TIMEOUT_SECS".into(),
                message: format!("{raw:?} is not a whole number of seconds"),
            })?,
            None => 30,
        };
        if http_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "AREMS_HTTP_TIMEOUT_SECS".into(),
                message: "timeout must be greater than zero".into(),
            });
        }

        let verify_token = match lookup("AREMS_VERIFY_TOKEN").as_deref() {
            None => true,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "AREMS_VERIFY_TOKEN".into(),
                    message: format!("{other:?} is not a boolean"),
                });
            }
        };

        Ok(Self {
            bind_addr,
            telegram_token: SecretString::from(token),
            telegram_api_base: lookup("TELEGRAM_API_BASE")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            project_id: lookup("AREMS_PROJECT_ID").unwrap_or_else(|| "arems-project".into()),
            database_id: lookup("AREMS_DATABASE_ID")
                .unwrap_or_else(|| "arems-platform-core-db".into()),
            bucket: lookup("AREMS_BUCKET").unwrap_or_else(|| "arems-user-upload".into()),
            data_dir: lookup("AREMS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            http_timeout: Duration::from_secs(http_timeout_secs),
            form_ua_marker: lookup("AREMS_FORM_UA_MARKER")
                .unwrap_or_else(|| DEFAULT_FORM_UA_MARKER.to_string()),
            verify_token,
        })
    }

    /// Path of the document store database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir
            .join(&self.project_id)
            .join(format!("{}.db", self.database_id))
    }

    /// Root directory of the blob bucket.
    pub fn bucket_root(&self) -> PathBuf {
        self.data_dir.join("buckets").join(&self.bucket)
    }
}

/// Bot tokens look like `123456789:AAH...`: a numeric bot id, a colon, and an
/// opaque secret without whitespace or slashes.
fn validate_token(token: &str) -> Result<(), ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        key: "TELEGRAM_TOKEN".into(),
        message: message.into(),
    };

    let (bot_id, secret) = token
        .split_once(':')
        .ok_or_else(|| invalid("expected <bot-id>:<secret>"))?;
    if bot_id.is_empty() || !bot_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("bot id must be numeric"));
    }
    if secret.is_empty()
        || !secret
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid("secret part contains unexpected characters"));
    }
    Ok(())
}
