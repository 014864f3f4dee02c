//! Active reachability probe
//!
//! On hosts without a platform online/offline signal, the probe periodically requests a health URL
//! and feeds the outcome (and the measured round trip) into a [`ConnectivityMonitor`].

use crate::connectivity::{ConnectivityMonitor, LinkQuality};

use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// Configuration for the connectivity probe
#[derive(Debug, Clone)]
pub struct ProbeConfig {
	/// URL that answers when the ledger side is reachable
	pub url: String,
	/// Time between probes
	pub interval: Duration,
	/// Per-probe timeout
	pub timeout: Duration,
}

impl ProbeConfig {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			interval: Duration::from_secs(10),
			timeout: Duration::from_secs(3),
		}
	}
}

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
	pub online: bool,
	pub round_trip: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
	#[error("HTTP client error: {0}")]
	HttpError(#[from] reqwest::Error),
}

pub struct ConnectivityProbe {
	http_client: Client,
	config: ProbeConfig,
}

impl ConnectivityProbe {
	pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
		let http_client = Client::builder().timeout(config.timeout).build()?;
		Ok(Self {
			http_client,
			config,
		})
	}

	/// Probe once. Any HTTP answer below 500 counts as reachable.
	pub async fn check(&self) -> ProbeResult {
		let started = Instant::now();
		match self.http_client.get(&self.config.url).send().await {
			Ok(response) if !response.status().is_server_error() => ProbeResult {
				online: true,
				round_trip: Some(started.elapsed()),
			},
			Ok(response) => {
				debug!("Probe of {} answered {}", self.config.url, response.status());
				ProbeResult {
					online: false,
					round_trip: None,
				}
			}
			Err(e) => {
				debug!("Probe of {} failed: {}", self.config.url, e);
				ProbeResult {
					online: false,
					round_trip: None,
				}
			}
		}
	}

	/// Probe once and record the result on the monitor.
	pub async fn check_and_report(&self, monitor: &ConnectivityMonitor) -> ProbeResult {
		let result = self.check().await;
		let link = LinkQuality {
			rtt_ms: result.round_trip.map(|rtt| rtt.as_millis() as u64),
			..monitor.current().link
		};
		monitor.report(result.online, link);
		result
	}

	/// Probe forever at the configured interval.
	pub fn spawn(self, monitor: Arc<ConnectivityMonitor>) -> JoinHandle<()> {
		tokio::spawn(async move {
			loop {
				self.check_and_report(&monitor).await;
				tokio::time::sleep(self.config.interval).await;
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_unreachable_url_reports_offline() {
		let mut config = ProbeConfig::new("http://127.0.0.1:9/health");
		config.timeout = Duration::from_millis(500);
		let probe = ConnectivityProbe::new(config).expect("client builds");
		let monitor = ConnectivityMonitor::new(true);

		let result = probe.check_and_report(&monitor).await;
		assert!(!result.online);
		assert!(result.round_trip.is_none());
		assert!(!monitor.is_online());
		assert_eq!(monitor.current().link.rtt_ms, None);
	}
}
