//! Nozzle configuration: a JSON file with per-key environment overrides.
//!
//! The file uses the same key names as the nozzle's deployment manifests
//! (`UAAURL`, `WebServerPort`, ...). Environment variables override
//! individual keys after the file is parsed; an empty environment value
//! leaves the file value in place. The resulting [`Configuration`] is frozen
//! at startup and handed to the other components read-only.

use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const UAA_URL_ENV: &str = "UAA_HOST";
const UAA_USERNAME_ENV: &str = "BM_UAA_USERNAME";
const UAA_PASSWORD_ENV: &str = "BM_UAA_PASSWORD";
const RLP_URL_ENV: &str = "RLP_URL";
const CC_HOST_ENV: &str = "CC_HOST";
const SUBSCRIPTION_ID_ENV: &str = "BM_SUBSCRIPTION_ID";
const DISABLE_ACCESS_CONTROL_ENV: &str = "BM_DISABLE_ACCESS_CONTROL";
const INSECURE_SSL_SKIP_VERIFY_ENV: &str = "BM_INSECURE_SSL_SKIP_VERIFY";
const IDLE_TIMEOUT_SECONDS_ENV: &str = "BM_IDLE_TIMEOUT_SECONDS";
const METRIC_CACHE_DURATION_SECONDS_ENV: &str = "BM_METRIC_CACHE_DURATION_SECONDS";
const WEB_SERVER_PORT_ENV: &str = "PORT";
const WEB_SERVER_USE_SSL_ENV: &str = "BM_WEBSERVER_USE_SSL";
const WEB_SERVER_CERT_LOCATION_ENV: &str = "BM_WEBSERVER_CERT_LOCATION";
const WEB_SERVER_KEY_LOCATION_ENV: &str = "BM_WEBSERVER_KEY_LOCATION";

/// Configuration loading errors. All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnv { var: String, reason: String },
}

/// Frozen process configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    #[serde(rename = "UAAURL")]
    pub uaa_url: String,
    #[serde(rename = "UAAUsername")]
    pub uaa_username: String,
    #[serde(rename = "UAAPassword")]
    pub uaa_password: String,
    #[serde(rename = "RLPURL")]
    pub rlp_url: String,
    #[serde(rename = "SubscriptionID")]
    pub subscription_id: String,
    #[serde(rename = "DisableAccessControl")]
    pub disable_access_control: bool,
    #[serde(rename = "InsecureSSLSkipVerify")]
    pub insecure_ssl_skip_verify: bool,
    #[serde(rename = "IdleTimeoutSeconds")]
    pub idle_timeout_seconds: u32,
    #[serde(rename = "MetricCacheDurationSeconds")]
    pub metric_cache_duration_seconds: u32,
    #[serde(rename = "WebServerPort")]
    pub web_server_port: u32,
    #[serde(rename = "WebServerUseSSL")]
    pub web_server_use_ssl: bool,
    #[serde(rename = "WebServerCertLocation")]
    pub web_server_cert_location: String,
    #[serde(rename = "WebServerKeyLocation")]
    pub web_server_key_location: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            uaa_url: String::new(),
            uaa_username: String::new(),
            uaa_password: String::new(),
            rlp_url: String::new(),
            subscription_id: String::new(),
            disable_access_control: false,
            insecure_ssl_skip_verify: false,
            idle_timeout_seconds: 60,
            metric_cache_duration_seconds: 120,
            web_server_port: 8081,
            web_server_use_ssl: false,
            web_server_cert_location: "./certs/cert.pem".to_string(),
            web_server_key_location: "./certs/key.pem".to_string(),
        }
    }
}

impl Configuration {
    /// Loads the configuration file and applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = absolute_path(path.as_ref());
        let display = path.display().to_string();

        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        let mut config: Configuration =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: display,
                source,
            })?;

        config.apply_env_overrides()?;

        debug!(
            uaa_url = %config.uaa_url,
            uaa_username = %config.uaa_username,
            rlp_url = %config.rlp_url,
            subscription_id = %config.subscription_id,
            disable_access_control = config.disable_access_control,
            insecure_ssl_skip_verify = config.insecure_ssl_skip_verify,
            web_server_port = config.web_server_port,
            "configuration loaded"
        );

        Ok(config)
    }

    /// Session idle timeout for REST tokens.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.idle_timeout_seconds))
    }

    /// Time-to-live applied to every cached metric.
    pub fn metric_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.metric_cache_duration_seconds))
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        override_string(UAA_URL_ENV, &mut self.uaa_url);
        override_string(UAA_USERNAME_ENV, &mut self.uaa_username);
        override_string(UAA_PASSWORD_ENV, &mut self.uaa_password);
        self.override_rlp_url();
        override_string(SUBSCRIPTION_ID_ENV, &mut self.subscription_id);
        override_bool(DISABLE_ACCESS_CONTROL_ENV, &mut self.disable_access_control)?;
        override_bool(
            INSECURE_SSL_SKIP_VERIFY_ENV,
            &mut self.insecure_ssl_skip_verify,
        )?;
        override_u32(IDLE_TIMEOUT_SECONDS_ENV, &mut self.idle_timeout_seconds)?;
        override_u32(
            METRIC_CACHE_DURATION_SECONDS_ENV,
            &mut self.metric_cache_duration_seconds,
        )?;
        override_u32(WEB_SERVER_PORT_ENV, &mut self.web_server_port)?;
        override_bool(WEB_SERVER_USE_SSL_ENV, &mut self.web_server_use_ssl)?;
        override_string(
            WEB_SERVER_CERT_LOCATION_ENV,
            &mut self.web_server_cert_location,
        );
        override_string(
            WEB_SERVER_KEY_LOCATION_ENV,
            &mut self.web_server_key_location,
        );
        Ok(())
    }

    /// `RLP_URL` wins outright; otherwise the CC API host is rewritten to its
    /// sibling log-stream host, matching how the gateway is addressed in a
    /// standard deployment.
    fn override_rlp_url(&mut self) {
        if let Some(value) = non_empty_env(RLP_URL_ENV) {
            self.rlp_url = value;
            return;
        }

        if let Some(cc_host) = non_empty_env(CC_HOST_ENV) {
            let pattern = Regex::new("://api").expect("Failed to compile host rewrite regex");
            self.rlp_url = pattern.replace(&cc_host, "://log-stream").into_owned();
        }
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.is_empty())
}

fn override_string(var: &str, slot: &mut String) {
    if let Some(value) = non_empty_env(var) {
        *slot = value;
    }
}

fn override_bool(var: &str, slot: &mut bool) -> Result<(), ConfigError> {
    let Some(value) = non_empty_env(var) else {
        return Ok(());
    };

    match value.to_lowercase().as_str() {
        "true" | "1" | "t" | "yes" => *slot = true,
        "false" | "0" | "f" | "no" => *slot = false,
        other => {
            return Err(ConfigError::InvalidEnv {
                var: var.to_string(),
                reason: format!("invalid boolean value {other:?}"),
            })
        }
    }
    Ok(())
}

fn override_u32(var: &str, slot: &mut u32) -> Result<(), ConfigError> {
    let Some(value) = non_empty_env(var) else {
        return Ok(());
    };

    *slot = value.parse().map_err(|e| ConfigError::InvalidEnv {
        var: var.to_string(),
        reason: format!("cannot parse {value:?} as unsigned integer: {e}"),
    })?;
    Ok(())
}

/// Resolves a path to absolute form, keeping the relative path on error.
pub fn absolute_path(path: &Path) -> PathBuf {
    match std::path::absolute(path) {
        Ok(absolute) => absolute,
        Err(error) => {
            warn!(path = %path.display(), %error, "could not absolutize path, using it as-is");
            path.to_path_buf()
        }
    }
}
