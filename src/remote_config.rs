//! Remote configuration model and the staleness policy deciding when it is re-fetched.
//!
//! The policy is deliberately tiny: an artifact is stale when it was never fetched or when
//! its last successful fetch is older than the artifact's TTL. Only successful fetches write
//! a [`StalenessRecord`], so a failed fetch leaves the artifact stale and the next eligible
//! connection retries at once.

// std
use std::sync::atomic::{AtomicBool, Ordering};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::AppId, error::ResponseError};

/// App settings returned by the remote configuration endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerConfiguration {
	/// Application the settings belong to.
	#[serde(rename = "id")]
	pub app_id: AppId,
	/// Display name of the application.
	#[serde(rename = "name", default)]
	pub app_name: Option<String>,
	/// Whether implicit event logging is allowed.
	#[serde(rename = "supports_implicit_sdk_logging", default)]
	pub implicit_logging_enabled: bool,
	/// Whether the login tooltip should be shown.
	#[serde(rename = "gdpv4_nux_enabled", default)]
	pub login_tooltip_enabled: bool,
	/// Tooltip text, when the server supplies one.
	#[serde(rename = "gdpv4_nux_content", default)]
	pub login_tooltip_text: Option<String>,
	/// Inactivity timeout after which an event-logging session ends.
	#[serde(rename = "app_events_session_timeout", default)]
	pub session_timeout_seconds: Option<u64>,
	/// Feature bitmask for event logging.
	#[serde(rename = "app_events_feature_bitmask", default)]
	pub feature_bitmask: u64,
	/// Smart login option flags.
	#[serde(rename = "smart_login_options", default)]
	pub smart_login_options: u64,
	/// Error recovery categories, kept opaque.
	#[serde(rename = "ios_sdk_error_categories", default)]
	pub error_categories: Option<serde_json::Value>,
}
impl ServerConfiguration {
	/// Parses a configuration sub-response and fingerprints its body.
	pub fn from_response(body: &serde_json::Value) -> Result<(Self, String), ResponseError> {
		let configuration = serde_path_to_error::deserialize(body)
			.map_err(|source| ResponseError::Parse { endpoint: "configuration", source })?;

		Ok((configuration, fingerprint(body)))
	}
}

/// Last successful fetch of a cached artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessRecord {
	/// When the artifact was fetched.
	pub fetched_at: OffsetDateTime,
	/// Server version tag or body fingerprint.
	pub version: Option<String>,
}
impl StalenessRecord {
	/// Creates a record for a fetch completed at `fetched_at`.
	pub fn new(fetched_at: OffsetDateTime, version: Option<String>) -> Self {
		Self { fetched_at, version }
	}
}

/// Configuration paired with the record of its fetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedConfiguration {
	/// Cached settings.
	pub configuration: ServerConfiguration,
	/// Fetch metadata.
	pub record: StalenessRecord,
}

/// Returns `true` when `record` is absent or older than `ttl` at `now`.
pub fn is_stale(record: Option<&StalenessRecord>, now: OffsetDateTime, ttl: Duration) -> bool {
	match record {
		None => true,
		Some(record) => now - record.fetched_at > ttl,
	}
}

/// Single-flight gate for configuration fetches.
#[derive(Debug, Default)]
pub struct FetchGate(Arc<AtomicBool>);
impl FetchGate {
	/// Claims the gate; `None` while another fetch holds it.
	pub fn try_begin(&self) -> Option<FetchPermit> {
		self.0
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.ok()
			.map(|_| FetchPermit(self.0.clone()))
	}

	/// Returns `true` while a fetch holds the gate.
	pub fn is_fetching(&self) -> bool {
		self.0.load(Ordering::Acquire)
	}
}

/// Claim on a [`FetchGate`]; dropping it reopens the gate.
#[derive(Debug)]
pub struct FetchPermit(Arc<AtomicBool>);
impl Drop for FetchPermit {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}

fn fingerprint(body: &serde_json::Value) -> String {
	let mut hasher = Sha256::new();

	hasher.update(body.to_string().as_bytes());

	STANDARD_NO_PAD.encode(hasher.finalize())
}
