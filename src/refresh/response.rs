//! Parsers for the token-extension and permissions-reload sub-responses.

// self
use crate::{
	_prelude::*,
	auth::PermissionSet,
	error::{ConfigError, ResponseError},
};

/// Refreshable token fields returned by the token-extension endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenRefreshResponse {
	/// Replacement token string.
	pub access_token: Option<String>,
	/// New expiry.
	pub expires_at: Option<OffsetDateTime>,
	/// New data-access expiry.
	pub data_access_expires_at: Option<OffsetDateTime>,
	/// Graph domain of the token.
	pub graph_domain: Option<String>,
}
impl TokenRefreshResponse {
	const ENDPOINT: &'static str = "token";

	/// Parses the sub-response body.
	///
	/// Timestamps are Unix seconds; zero means "not reported" and keeps the current value.
	pub fn parse(body: &serde_json::Value) -> Result<Self, ResponseError> {
		#[derive(Deserialize)]
		struct Wire {
			#[serde(default)]
			access_token: Option<String>,
			#[serde(default)]
			expires_at: Option<i64>,
			#[serde(default)]
			data_access_expiration_time: Option<i64>,
			#[serde(default)]
			graph_domain: Option<String>,
		}

		let wire: Wire = serde_path_to_error::deserialize(body)
			.map_err(|source| ResponseError::Parse { endpoint: Self::ENDPOINT, source })?;

		Ok(Self {
			access_token: wire.access_token.filter(|token| !token.is_empty()),
			expires_at: unix_timestamp("expires_at", wire.expires_at)?,
			data_access_expires_at: unix_timestamp(
				"data_access_expiration_time",
				wire.data_access_expiration_time,
			)?,
			graph_domain: wire.graph_domain,
		})
	}
}

/// Permission lists returned by the permissions-reload endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionsResponse {
	/// Permissions with status `granted`.
	pub granted: PermissionSet,
	/// Permissions with status `declined`.
	pub declined: PermissionSet,
	/// Permissions with status `expired`.
	pub expired: PermissionSet,
}
impl PermissionsResponse {
	const ENDPOINT: &'static str = "permissions";

	/// Parses the sub-response body; entries with unknown statuses are ignored.
	pub fn parse(body: &serde_json::Value) -> Result<Self, ResponseError> {
		#[derive(Deserialize)]
		struct Wire {
			data: Vec<Entry>,
		}
		#[derive(Deserialize)]
		struct Entry {
			permission: String,
			status: String,
		}

		let wire: Wire = serde_path_to_error::deserialize(body)
			.map_err(|source| ResponseError::Parse { endpoint: Self::ENDPOINT, source })?;
		let mut granted = Vec::new();
		let mut declined = Vec::new();
		let mut expired = Vec::new();

		for entry in wire.data {
			match entry.status.as_str() {
				"granted" => granted.push(entry.permission),
				"declined" => declined.push(entry.permission),
				"expired" => expired.push(entry.permission),
				_ => {},
			}
		}

		let build = |names: Vec<String>| {
			PermissionSet::new(names).map_err(|err| ResponseError::InvalidValue {
				endpoint: Self::ENDPOINT,
				source: ConfigError::from(err),
			})
		};

		Ok(Self { granted: build(granted)?, declined: build(declined)?, expired: build(expired)? })
	}
}

fn unix_timestamp(
	field: &'static str,
	value: Option<i64>,
) -> Result<Option<OffsetDateTime>, ResponseError> {
	match value {
		None | Some(0) => Ok(None),
		Some(seconds) =>
			OffsetDateTime::from_unix_timestamp(seconds).map(Some).map_err(|_| {
				ResponseError::InvalidTimestamp {
					endpoint: TokenRefreshResponse::ENDPOINT,
					field,
					value: seconds,
				}
			}),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	use time::macros;
	// self
	use super::*;

	#[test]
	fn token_response_reads_unix_timestamps() {
		let parsed = TokenRefreshResponse::parse(&json!({
			"access_token": "EAAB-new",
			"expires_at": 1_767_225_600,
			"data_access_expiration_time": 0,
			"graph_domain": "facebook",
		}))
		.expect("Token response should parse.");

		assert_eq!(parsed.access_token.as_deref(), Some("EAAB-new"));
		assert_eq!(parsed.expires_at, Some(macros::datetime!(2026-01-01 00:00 UTC)));
		assert_eq!(parsed.data_access_expires_at, None);
		assert_eq!(parsed.graph_domain.as_deref(), Some("facebook"));
	}

	#[test]
	fn token_response_rejects_wrong_types_and_out_of_range_instants() {
		assert!(matches!(
			TokenRefreshResponse::parse(&json!({ "expires_at": "tomorrow" })),
			Err(ResponseError::Parse { endpoint: "token", .. })
		));
		assert!(matches!(
			TokenRefreshResponse::parse(&json!({ "expires_at": i64::MAX })),
			Err(ResponseError::InvalidTimestamp { field: "expires_at", .. })
		));
	}

	#[test]
	fn permissions_response_partitions_by_status() {
		let parsed = PermissionsResponse::parse(&json!({
			"data": [
				{ "permission": "public_profile", "status": "granted" },
				{ "permission": "email", "status": "declined" },
				{ "permission": "user_photos", "status": "expired" },
				{ "permission": "user_likes", "status": "pending_review" },
			]
		}))
		.expect("Permissions response should parse.");

		assert!(parsed.granted.contains("public_profile"));
		assert!(parsed.declined.contains("email"));
		assert!(parsed.expired.contains("user_photos"));
		assert!(!parsed.granted.contains("user_likes"));
	}

	#[test]
	fn permissions_response_requires_data_array() {
		let err = PermissionsResponse::parse(&json!({ "error": "nope" }))
			.expect_err("Missing data should fail.");

		assert!(err.to_string().contains("permissions"));
	}
}
