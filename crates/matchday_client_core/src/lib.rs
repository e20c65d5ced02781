#![forbid(unsafe_code)]

use std::time::Duration;

use matchday_util::endpoint::WsEndpoint;

pub mod backoff;
pub mod detail;
pub mod manager;
pub mod membership;
pub mod pipeline;
pub mod presence;
pub mod reconcile;
pub mod rest;
pub mod transport;


pub use backoff::BackoffPolicy;
pub use detail::{DetailEffect, MatchDetailController};
pub use manager::{ConnectionManager, EngineEvent, ShutdownHandle, start_engine};
pub use membership::{MembershipCommand, RoomMembership};
pub use pipeline::{DayBucket, TypingTracker, group_by_day, normalize_attachment, normalize_message};
pub use presence::PresenceTracker;
pub use reconcile::{Reconciled, reconcile};
pub use rest::{ApiClient, RequestError};
pub use transport::{ChannelKind, ClientEvent, Connector, ServerEvent, TransportError, WsConnector};

/// Client engine configuration (v1).
#[derive(Debug, Clone)]
pub struct SyncConfigV1 {
	/// Event endpoint in `ws://host:port` form; the three channels hang
	/// off it as path namespaces.
	pub server_endpoint: String,

	/// Base URL of the REST API.
	pub rest_base_url: String,

	/// Client identifier.
	pub client_name: String,

	/// Client instance id.
	pub client_instance_id: String,

	/// Timeout for dial + hello handshake of one channel.
	pub handshake_timeout: Duration,

	/// Fixed delay before the single retry after a remote close.
	pub remote_close_retry_delay: Duration,

	/// Retry policy for failed connect attempts, shared by all channels.
	pub backoff: BackoffPolicy,

	/// Inactivity window after which a typing indicator is dropped.
	pub typing_timeout: Duration,
}

impl SyncConfigV1 {
	/// Parse the configured `ws://host:port` event endpoint.
	pub fn ws_endpoint(&self) -> Result<WsEndpoint, TransportError> {
		WsEndpoint::parse(&self.server_endpoint).map_err(TransportError::Endpoint)
	}
}

impl Default for SyncConfigV1 {
	fn default() -> Self {
		// Local dev defaults.
		Self {
			server_endpoint: "ws://localhost:9087".to_string(),
			rest_base_url: "http://localhost:9088".to_string(),
			client_name: "matchday-client".to_string(),
			client_instance_id: String::new(),
			handshake_timeout: Duration::from_secs(5),
			remote_close_retry_delay: Duration::from_secs(2),
			backoff: BackoffPolicy::default(),
			typing_timeout: Duration::from_secs(6),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_endpoint_parses() {
		let cfg = SyncConfigV1::default();
		let e = cfg.ws_endpoint().expect("default endpoint parses");
		assert_eq!(e.port, 9087);
	}

	#[test]
	fn bad_endpoint_is_an_endpoint_error() {
		let cfg = SyncConfigV1 {
			server_endpoint: "http://localhost:9087".to_string(),
			..SyncConfigV1::default()
		};
		assert!(matches!(cfg.ws_endpoint(), Err(TransportError::Endpoint(_))));
	}
}
