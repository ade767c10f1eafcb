//! Read-only process configuration for the notification engine.
//!
//! Built once at process start (the CLI sources it from flags/environment)
//! and passed explicitly into the engine and service. Nothing here is mutated
//! after construction.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::NotifyError;
use crate::fallback_link::DEFAULT_FALLBACK_LINK_BASE;

pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://smsquicker.com/api";
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    pub gateway_base_url: String,
    pub api_credential: Option<String>,
    pub admin_recipient: Option<String>,
    pub fallback_enabled: bool,
    pub fallback_link_base: String,
    pub attempt_timeout_ms: u64,
    /// Upper bound for one whole `send`; `None` leaves only the per-attempt timeouts.
    pub overall_deadline_ms: Option<u64>,
    pub probe_timeout_ms: u64,
    pub failure_log_path: Option<PathBuf>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            gateway_base_url: DEFAULT_GATEWAY_BASE_URL.to_string(),
            api_credential: None,
            admin_recipient: None,
            fallback_enabled: true,
            fallback_link_base: DEFAULT_FALLBACK_LINK_BASE.to_string(),
            attempt_timeout_ms: DEFAULT_ATTEMPT_TIMEOUT_MS,
            overall_deadline_ms: None,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            failure_log_path: None,
        }
    }
}

impl NotifyConfig {
    pub fn validate(&self) -> Result<(), NotifyError> {
        let base = self.gateway_base_url.trim();
        if base.is_empty() {
            return Err(NotifyError::InvalidConfig(
                "gateway base url must not be empty".to_string(),
            ));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(NotifyError::InvalidConfig(format!(
                "gateway base url '{base}' must use http or https"
            )));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(NotifyError::InvalidConfig(
                "attempt timeout must be greater than 0".to_string(),
            ));
        }
        if self.probe_timeout_ms == 0 {
            return Err(NotifyError::InvalidConfig(
                "probe timeout must be greater than 0".to_string(),
            ));
        }
        if self.overall_deadline_ms == Some(0) {
            return Err(NotifyError::InvalidConfig(
                "overall deadline must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the credential when present and non-blank.
    pub fn credential(&self) -> Option<&str> {
        non_blank(self.api_credential.as_deref())
    }

    pub fn admin_recipient(&self) -> Option<&str> {
        non_blank(self.admin_recipient.as_deref())
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn overall_deadline(&self) -> Option<Duration> {
        self.overall_deadline_ms.map(Duration::from_millis)
    }

    /// Masks the credential for startup diagnostics.
    pub fn credential_hint(&self) -> String {
        match self.credential() {
            Some(secret) if secret.chars().count() > 8 => {
                let prefix = secret.chars().take(4).collect::<String>();
                format!("set ({prefix}...)")
            }
            Some(_) => "set".to_string(),
            None => "not set".to_string(),
        }
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}
