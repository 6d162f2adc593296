//! Process-level settings for a harness run.
//!
//! Resolution order: built-in defaults, then the TOML file named by
//! `AUTOTEST_CONFIG` (if set), then individual `AUTOTEST_*` environment
//! variables.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SettingsError;

/// Default location of the testing service.
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8090/SDKTestingService";

pub const ENV_CONFIG_FILE: &str = "AUTOTEST_CONFIG";
pub const ENV_SERVICE_URL: &str = "AUTOTEST_SERVICE_URL";
pub const ENV_DISABLE_SERVICE: &str = "AUTOTEST_DISABLE_SERVICE";
pub const ENV_WITH_RETRY: &str = "AUTOTEST_WITH_RETRY";
pub const ENV_RUN_ID: &str = "AUTOTEST_RUN_ID";
pub const ENV_LOG: &str = "AUTOTEST_LOG";
pub const ENV_OPERATION_TIMEOUT: &str = "AUTOTEST_OPERATION_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessSettings {
    /// Base URL of the external testing service.
    pub service_url: String,
    /// Skip session setup and teardown; every operation reports as skipped.
    pub service_disabled: bool,
    /// Attach a retry policy to requests of operations that honour the flag.
    pub with_retry: bool,
    /// Run identifier sent when opening the session.
    pub run_id: String,
    /// `tracing` filter directives.
    pub log_filter: String,
    /// Per-operation deadline imposed by the runner.
    pub operation_timeout_secs: Option<u64>,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        HarnessSettings {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            service_disabled: false,
            with_retry: false,
            run_id: "local".to_string(),
            log_filter: "info".to_string(),
            operation_timeout_secs: None,
        }
    }
}

impl HarnessSettings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Load settings using `lookup` in place of the process environment.
    pub fn resolve<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = match lookup(ENV_CONFIG_FILE).filter(|p| !p.is_empty()) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => HarnessSettings::default(),
        };
        settings.apply_overrides(lookup)?;
        Ok(settings)
    }

    /// Read a TOML settings file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_SERVICE_URL).filter(|v| !v.is_empty()) {
            self.service_url = url;
        }
        if let Some(flag) = lookup(ENV_DISABLE_SERVICE) {
            self.service_disabled = is_truthy(&flag);
        }
        if let Some(flag) = lookup(ENV_WITH_RETRY) {
            self.with_retry = is_truthy(&flag);
        }
        if let Some(run_id) = lookup(ENV_RUN_ID).filter(|v| !v.is_empty()) {
            self.run_id = run_id;
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
            self.log_filter = filter;
        }
        if let Some(raw) = lookup(ENV_OPERATION_TIMEOUT).filter(|v| !v.is_empty()) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| SettingsError::InvalidValue {
                    key: ENV_OPERATION_TIMEOUT.to_string(),
                    value: raw.clone(),
                })?;
            self.operation_timeout_secs = Some(secs);
        }
        Ok(())
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

/// `1`, `true`, `yes` and `on` (any case) switch a flag on.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
