//! # Controller Configuration
//!
//! Controller-level configuration loaded from environment variables.
//!
//! All configuration has sensible defaults and can be overridden via environment variables.
//! Environment variables are populated from a ConfigMap using `envFrom` in the deployment.

use crate::constants::{
    DEFAULT_APPCONFIG_BRANCH, DEFAULT_APPLICATION_BUNDLE, DEFAULT_BUNDLE_DIR,
    DEFAULT_ERROR_BACKOFF_MAX_SECS, DEFAULT_ERROR_BACKOFF_MIN_SECS, DEFAULT_METRICS_PORT,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_PORTAL_BUNDLE, DEFAULT_TRANSITION_REQUEUE_SECS,
};
use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Directory holding the template bundles
    pub bundle_dir: PathBuf,
    /// Bundle rendered per Release (relative to `bundle_dir`)
    pub application_bundle: String,
    /// Bundle rendered per Portal (relative to `bundle_dir`)
    pub portal_bundle: String,
    /// Branch used by Applications whose template names neither branch nor commit
    pub default_branch: String,
    /// Requeue delay after a state transition
    pub transition_requeue_secs: u64,
    /// Requeue delay while waiting on dependents
    pub poll_interval_secs: u64,
    /// Error backoff lower bound
    pub error_backoff_min_secs: u64,
    /// Error backoff upper bound
    pub error_backoff_max_secs: u64,
    /// HTTP server port for metrics and health probes
    pub metrics_port: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bundle_dir: PathBuf::from(DEFAULT_BUNDLE_DIR),
            application_bundle: DEFAULT_APPLICATION_BUNDLE.to_string(),
            portal_bundle: DEFAULT_PORTAL_BUNDLE.to_string(),
            default_branch: DEFAULT_APPCONFIG_BRANCH.to_string(),
            transition_requeue_secs: DEFAULT_TRANSITION_REQUEUE_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            error_backoff_min_secs: DEFAULT_ERROR_BACKOFF_MIN_SECS,
            error_backoff_max_secs: DEFAULT_ERROR_BACKOFF_MAX_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Unset or unparseable values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            bundle_dir: lookup("BUNDLE_DIR").map_or(defaults.bundle_dir, PathBuf::from),
            application_bundle: lookup("APPLICATION_BUNDLE")
                .unwrap_or(defaults.application_bundle),
            portal_bundle: lookup("PORTAL_BUNDLE").unwrap_or(defaults.portal_bundle),
            default_branch: lookup("DEFAULT_APPCONFIG_BRANCH")
                .filter(|b| !b.is_empty())
                .unwrap_or(defaults.default_branch),
            transition_requeue_secs: parse_or(
                &lookup,
                "TRANSITION_REQUEUE_SECS",
                defaults.transition_requeue_secs,
            ),
            poll_interval_secs: parse_or(&lookup, "POLL_INTERVAL_SECS", defaults.poll_interval_secs),
            error_backoff_min_secs: parse_or(
                &lookup,
                "ERROR_BACKOFF_MIN_SECS",
                defaults.error_backoff_min_secs,
            ),
            error_backoff_max_secs: parse_or(
                &lookup,
                "ERROR_BACKOFF_MAX_SECS",
                defaults.error_backoff_max_secs,
            ),
            metrics_port: parse_or(&lookup, "METRICS_PORT", defaults.metrics_port),
        }
    }

    /// Full path of the application bundle
    pub fn application_bundle_path(&self) -> PathBuf {
        self.bundle_dir.join(&self.application_bundle)
    }

    /// Full path of the portal bundle
    pub fn portal_bundle_path(&self) -> PathBuf {
        self.bundle_dir.join(&self.portal_bundle)
    }

    pub fn transition_requeue(&self) -> Duration {
        Duration::from_secs(self.transition_requeue_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Read a key or return the default value
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = ControllerConfig::from_lookup(|_| None);
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(
            config.application_bundle_path(),
            PathBuf::from("bundles/application")
        );
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let env: HashMap<&str, &str> = [
            ("BUNDLE_DIR", "/opt/bundles"),
            ("PORTAL_BUNDLE", "ui"),
            ("POLL_INTERVAL_SECS", "30"),
            ("METRICS_PORT", "not-a-port"),
            ("DEFAULT_APPCONFIG_BRANCH", ""),
        ]
        .into_iter()
        .collect();
        let config = ControllerConfig::from_lookup(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.portal_bundle_path(), PathBuf::from("/opt/bundles/ui"));
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.metrics_port, DEFAULT_METRICS_PORT);
        assert_eq!(config.default_branch, "main");
    }
}
