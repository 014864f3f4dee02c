//! Application configuration
//!
//! Settings come from environment variables, optionally seeded from a local `.env` file. Every
//! value has a default matching the component's own `Default` configuration.

use crate::connectivity::ProbeConfig;
use crate::store::StoreConfig;
use crate::sync::{AutoSyncConfig, SyncConfig};

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const DATA_DIR_VAR: &str = "OFFLINE_SYNC_DATA_DIR";
pub const LEDGER_URL_VAR: &str = "LEDGER_GRAPHQL_URL";
pub const PROBE_URL_VAR: &str = "CONNECTIVITY_PROBE_URL";
pub const PROBE_INTERVAL_VAR: &str = "CONNECTIVITY_PROBE_INTERVAL_SECS";
pub const MAX_RETRIES_VAR: &str = "SYNC_MAX_RETRIES";
pub const REMOTE_TIMEOUT_VAR: &str = "SYNC_REMOTE_TIMEOUT_SECS";
pub const SETTLE_DELAY_VAR: &str = "SYNC_SETTLE_DELAY_MS";
pub const STARTUP_DELAY_VAR: &str = "SYNC_STARTUP_DELAY_MS";
pub const FAIL_FAST_VAR: &str = "SYNC_FAIL_FAST_ON_REJECTION";
pub const MAX_QUEUED_VAR: &str = "STORE_MAX_QUEUED_TRANSFERS";

const DEFAULT_DATA_DIR: &str = "offline-data";
const DEFAULT_LEDGER_URL: &str = "http://localhost:4000/graphql";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
	#[error("Invalid value {value:?} for {name}: {reason}")]
	InvalidValue {
		name: &'static str,
		value: String,
		reason: String,
	},
}

/// Everything the binary needs to wire the store, ledger client, monitor and engine.
#[derive(Debug, Clone)]
pub struct AppConfig {
	pub data_dir: PathBuf,
	pub ledger_url: String,
	/// `None` disables the active probe; connectivity must then be reported externally.
	pub probe: Option<ProbeConfig>,
	pub store: StoreConfig,
	pub sync: SyncConfig,
	pub auto_sync: AutoSyncConfig,
}

impl AppConfig {
	/// Load from the process environment after applying a `.env` file if one exists.
	pub fn from_env() -> Result<Self, ConfigError> {
		if let Ok(path) = dotenvy::dotenv() {
			debug!("Loaded environment from {:?}", path);
		}
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Build from an arbitrary variable lookup.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let var = |name: &str| {
			lookup(name)
				.map(|value| value.trim().to_string())
				.filter(|value| !value.is_empty())
		};

		let sync_defaults = SyncConfig::default();
		let auto_defaults = AutoSyncConfig::default();

		let probe = match var(PROBE_URL_VAR) {
			Some(url) => {
				let mut probe = ProbeConfig::new(url);
				if let Some(secs) = parse_var::<u64>(&var, PROBE_INTERVAL_VAR)? {
					probe.interval = Duration::from_secs(secs);
				}
				Some(probe)
			}
			None => None,
		};

		Ok(Self {
			data_dir: var(DATA_DIR_VAR)
				.map(PathBuf::from)
				.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
			ledger_url: var(LEDGER_URL_VAR).unwrap_or_else(|| DEFAULT_LEDGER_URL.to_string()),
			probe,
			store: StoreConfig {
				max_queued_transfers: parse_var(&var, MAX_QUEUED_VAR)?,
			},
			sync: SyncConfig {
				max_retries: parse_var(&var, MAX_RETRIES_VAR)?.unwrap_or(sync_defaults.max_retries),
				remote_call_timeout: parse_var(&var, REMOTE_TIMEOUT_VAR)?
					.map(Duration::from_secs)
					.unwrap_or(sync_defaults.remote_call_timeout),
				fail_fast_on_rejection: parse_bool(&var, FAIL_FAST_VAR)?
					.unwrap_or(sync_defaults.fail_fast_on_rejection),
			},
			auto_sync: AutoSyncConfig {
				settle_delay: parse_var(&var, SETTLE_DELAY_VAR)?
					.map(Duration::from_millis)
					.unwrap_or(auto_defaults.settle_delay),
				startup_delay: parse_var(&var, STARTUP_DELAY_VAR)?
					.map(Duration::from_millis)
					.unwrap_or(auto_defaults.startup_delay),
			},
		})
	}
}

fn parse_var<T>(
	var: &impl Fn(&str) -> Option<String>,
	name: &'static str,
) -> Result<Option<T>, ConfigError>
where
	T: FromStr,
	T::Err: std::fmt::Display,
{
	var(name)
		.map(|value| {
			value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
				name,
				reason: e.to_string(),
				value,
			})
		})
		.transpose()
}

fn parse_bool(
	var: &impl Fn(&str) -> Option<String>,
	name: &'static str,
) -> Result<Option<bool>, ConfigError> {
	var(name)
		.map(|value| match value.to_ascii_lowercase().as_str() {
			"1" | "true" | "yes" | "on" => Ok(true),
			"0" | "false" | "no" | "off" => Ok(false),
			_ => Err(ConfigError::InvalidValue {
				name,
				value,
				reason: "expected a boolean".to_string(),
			}),
		})
		.transpose()
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| vars.get(name).cloned()
	}

	#[test]
	fn test_defaults_when_environment_is_empty() {
		let config = AppConfig::from_lookup(lookup(&[])).expect("config");

		assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
		assert_eq!(config.ledger_url, DEFAULT_LEDGER_URL);
		assert!(config.probe.is_none());
		assert_eq!(config.store.max_queued_transfers, None);
		assert_eq!(config.sync.max_retries, 2);
		assert_eq!(config.sync.remote_call_timeout, Duration::from_secs(15));
		assert!(!config.sync.fail_fast_on_rejection);
		assert_eq!(config.auto_sync.settle_delay, Duration::from_secs(2));
		assert_eq!(config.auto_sync.startup_delay, Duration::from_secs(3));
	}

	#[test]
	fn test_overrides_are_parsed() {
		let config = AppConfig::from_lookup(lookup(&[
			(DATA_DIR_VAR, "/var/lib/offline"),
			(LEDGER_URL_VAR, "https://ledger.example/graphql"),
			(PROBE_URL_VAR, "https://ledger.example/health"),
			(PROBE_INTERVAL_VAR, "30"),
			(MAX_RETRIES_VAR, "5"),
			(REMOTE_TIMEOUT_VAR, "8"),
			(SETTLE_DELAY_VAR, "250"),
			(STARTUP_DELAY_VAR, "0"),
			(FAIL_FAST_VAR, "TRUE"),
			(MAX_QUEUED_VAR, "100"),
		]))
		.expect("config");

		assert_eq!(config.data_dir, PathBuf::from("/var/lib/offline"));
		assert_eq!(config.ledger_url, "https://ledger.example/graphql");
		let probe = config.probe.expect("probe enabled");
		assert_eq!(probe.url, "https://ledger.example/health");
		assert_eq!(probe.interval, Duration::from_secs(30));
		assert_eq!(config.sync.max_retries, 5);
		assert_eq!(config.sync.remote_call_timeout, Duration::from_secs(8));
		assert!(config.sync.fail_fast_on_rejection);
		assert_eq!(config.auto_sync.settle_delay, Duration::from_millis(250));
		assert_eq!(config.auto_sync.startup_delay, Duration::ZERO);
		assert_eq!(config.store.max_queued_transfers, Some(100));
	}

	#[test]
	fn test_invalid_values_are_reported_by_name() {
		let err = AppConfig::from_lookup(lookup(&[(MAX_RETRIES_VAR, "lots")]))
			.expect_err("invalid retries");
		assert!(matches!(
			err,
			ConfigError::InvalidValue { name: MAX_RETRIES_VAR, ref value, .. } if value == "lots"
		));

		let err = AppConfig::from_lookup(lookup(&[(FAIL_FAST_VAR, "maybe")]))
			.expect_err("invalid bool");
		assert!(err.to_string().contains(FAIL_FAST_VAR));
	}

	#[test]
	fn test_blank_values_fall_back_to_defaults() {
		let config =
			AppConfig::from_lookup(lookup(&[(PROBE_URL_VAR, "  "), (MAX_RETRIES_VAR, "")]))
				.expect("config");
		assert!(config.probe.is_none());
		assert_eq!(config.sync.max_retries, 2);
	}
}
