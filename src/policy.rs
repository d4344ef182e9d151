//! Tunable thresholds for piggyback decisions and their validating builder.

// self
use crate::{_prelude::*, error::ConfigError};

/// Graph fields requested by the remote configuration piggyback.
pub const DEFAULT_CONFIG_FIELDS: &[&str] = &[
	"app_events_feature_bitmask",
	"app_events_session_timeout",
	"gdpv4_nux_content",
	"gdpv4_nux_enabled",
	"ios_sdk_error_categories",
	"name",
	"smart_login_options",
	"supports_implicit_sdk_logging",
];

/// Thresholds consulted by the piggyback manager.
///
/// Durations serialize as whole seconds so the policy can live in a settings file. Missing
/// settings fall back to the defaults, and deserialization runs [`PiggybackPolicy::validate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PolicySettings")]
pub struct PiggybackPolicy {
	/// Token age after which a refresh is attached.
	#[serde(with = "seconds")]
	pub min_refresh_interval: Duration,
	/// Minimum spacing between two refresh attempts started by the staleness check.
	#[serde(with = "seconds")]
	pub refresh_retry_interval: Duration,
	/// Remaining token lifetime at or below which a refresh is attached regardless of age.
	#[serde(with = "seconds")]
	pub expiry_window: Duration,
	/// Age after which the cached remote configuration is re-fetched.
	#[serde(with = "seconds")]
	pub config_ttl: Duration,
	/// Fields requested by the configuration fetch.
	pub config_fields: Vec<String>,
}
impl PiggybackPolicy {
	/// Returns a builder seeded with the defaults.
	pub fn builder() -> PiggybackPolicyBuilder {
		PiggybackPolicyBuilder { policy: Self::default() }
	}

	/// Checks every invariant the builder enforces.
	pub fn validate(&self) -> Result<(), ConfigError> {
		for (field, value) in [
			("min_refresh_interval", self.min_refresh_interval),
			("refresh_retry_interval", self.refresh_retry_interval),
			("config_ttl", self.config_ttl),
		] {
			if !value.is_positive() {
				return Err(ConfigError::NonPositiveInterval { field });
			}
		}
		if self.expiry_window.is_negative() {
			return Err(ConfigError::NonPositiveInterval { field: "expiry_window" });
		}
		if let Some(name) = self
			.config_fields
			.iter()
			.find(|name| name.is_empty() || name.chars().any(char::is_whitespace))
		{
			return Err(ConfigError::InvalidFieldName { name: name.clone() });
		}

		Ok(())
	}

	/// Comma-joined `fields` parameter for the configuration request.
	pub fn config_fields_param(&self) -> String {
		self.config_fields.join(",")
	}
}
impl Default for PiggybackPolicy {
	fn default() -> Self {
		Self {
			min_refresh_interval: Duration::hours(24),
			refresh_retry_interval: Duration::hours(1),
			expiry_window: Duration::minutes(10),
			config_ttl: Duration::hours(1),
			config_fields: DEFAULT_CONFIG_FIELDS.iter().map(|field| field.to_string()).collect(),
		}
	}
}

impl TryFrom<PolicySettings> for PiggybackPolicy {
	type Error = ConfigError;

	fn try_from(settings: PolicySettings) -> Result<Self, Self::Error> {
		let policy = Self {
			min_refresh_interval: settings.min_refresh_interval,
			refresh_retry_interval: settings.refresh_retry_interval,
			expiry_window: settings.expiry_window,
			config_ttl: settings.config_ttl,
			config_fields: settings.config_fields,
		};

		policy.validate()?;

		Ok(policy)
	}
}

/// Raw settings-file shape, validated into a [`PiggybackPolicy`].
#[derive(Deserialize)]
#[serde(default)]
struct PolicySettings {
	#[serde(with = "seconds")]
	min_refresh_interval: Duration,
	#[serde(with = "seconds")]
	refresh_retry_interval: Duration,
	#[serde(with = "seconds")]
	expiry_window: Duration,
	#[serde(with = "seconds")]
	config_ttl: Duration,
	config_fields: Vec<String>,
}
impl Default for PolicySettings {
	fn default() -> Self {
		let policy = PiggybackPolicy::default();

		Self {
			min_refresh_interval: policy.min_refresh_interval,
			refresh_retry_interval: policy.refresh_retry_interval,
			expiry_window: policy.expiry_window,
			config_ttl: policy.config_ttl,
			config_fields: policy.config_fields,
		}
	}
}

/// Builder for [`PiggybackPolicy`].
#[derive(Clone, Debug)]
pub struct PiggybackPolicyBuilder {
	policy: PiggybackPolicy,
}
impl PiggybackPolicyBuilder {
	/// Sets the refresh age threshold.
	pub fn min_refresh_interval(mut self, interval: Duration) -> Self {
		self.policy.min_refresh_interval = interval;

		self
	}

	/// Sets the spacing between staleness-driven refresh attempts.
	pub fn refresh_retry_interval(mut self, interval: Duration) -> Self {
		self.policy.refresh_retry_interval = interval;

		self
	}

	/// Sets the remaining-lifetime window; zero disables it.
	pub fn expiry_window(mut self, window: Duration) -> Self {
		self.policy.expiry_window = window;

		self
	}

	/// Sets the configuration TTL.
	pub fn config_ttl(mut self, ttl: Duration) -> Self {
		self.policy.config_ttl = ttl;

		self
	}

	/// Replaces the requested configuration fields.
	pub fn config_fields<I, S>(mut self, fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.policy.config_fields = fields.into_iter().map(Into::into).collect();

		self
	}

	/// Validates and returns the policy.
	pub fn build(self) -> Result<PiggybackPolicy, ConfigError> {
		self.policy.validate()?;

		Ok(self.policy)
	}
}

mod seconds {
	// crates.io
	use serde::{Deserialize, Deserializer, Serializer};
	use time::Duration;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(value.whole_seconds())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::seconds)
	}
}
