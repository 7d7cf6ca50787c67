//! Connection tuning knobs.

use std::time::Duration;

use conduit_rpc::codec::DEFAULT_MAX_CONTENT_LENGTH;
use serde::{Deserialize, Serialize};

/// Configuration for a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
	/// Largest frame body accepted from the peer, in bytes.
	pub max_content_length: usize,
	/// Per-request timeout in seconds for outbound requests. `None` waits indefinitely.
	pub request_timeout_secs: Option<u64>,
	/// Drain the outbound queue before closing when the peer hangs up.
	pub flush_on_eof: bool,
}

impl ConnectionConfig {
	/// The outbound request timeout, if any.
	#[must_use]
	pub fn request_timeout(&self) -> Option<Duration> {
		self.request_timeout_secs.map(Duration::from_secs)
	}
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self {
			max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
			request_timeout_secs: None,
			flush_on_eof: true,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_config_falls_back_to_defaults() {
		let cfg: ConnectionConfig = serde_json::from_str(r#"{"request_timeout_secs": 5}"#).unwrap();
		assert_eq!(cfg.request_timeout(), Some(Duration::from_secs(5)));
		assert_eq!(cfg.max_content_length, DEFAULT_MAX_CONTENT_LENGTH);
		assert!(cfg.flush_on_eof);
	}
}
