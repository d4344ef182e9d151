//! Crate-level error types shared by the connection, store, refresh, and piggyback layers.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error delivered to sub-request completions and refresh listeners.
///
/// None of these ever reach the caller of a primary sub-request; they stay local to the
/// piggyback that produced them.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure reported by the connection for one sub-request.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The sub-request completed but its body could not be used.
	#[error(transparent)]
	Response(#[from] ResponseError),

	/// The owning connection was cancelled or dropped before the sub-request resolved.
	#[error("Connection was cancelled before the sub-request completed.")]
	Cancelled,
	/// The credential changed while the refresh was in flight; the result was discarded.
	#[error("Credential changed while the refresh was in flight.")]
	Superseded,
	/// The refresh response did not move the expiry forward.
	#[error("Refresh did not extend the credential expiry ({previous} -> {returned}).")]
	NotExtended {
		/// Expiry of the credential the refresh started from.
		previous: OffsetDateTime,
		/// Expiry carried by the refresh response.
		returned: OffsetDateTime,
	},
	/// No credential was available when one was required.
	#[error("No credential is available.")]
	MissingCredential,
}

/// Configuration and validation failures.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// An interval in the piggyback policy must be strictly positive.
	#[error("The {field} interval must be positive.")]
	NonPositiveInterval {
		/// Policy field that failed validation.
		field: &'static str,
	},
	/// Configuration field names cannot be empty or contain whitespace.
	#[error("Configuration field name is invalid: {name:?}.")]
	InvalidFieldName {
		/// Offending field name.
		name: String,
	},
	/// Credential builder validation failed.
	#[error("Unable to build credential.")]
	CredentialBuild(#[from] crate::auth::CredentialBuilderError),
	/// Permission names could not be normalized.
	#[error("Permission set is invalid.")]
	InvalidPermission(#[from] crate::auth::PermissionValidationError),
	/// Identifier validation failed.
	#[error("Identifier is invalid.")]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
}

/// Transport-level failures surfaced by a connection for a single sub-request.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying transport reported a network failure.
	#[error("Network error occurred while executing the sub-request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Server answered the sub-request with a non-success status.
	#[error("Sub-request failed with HTTP status {status}: {message}.")]
	Status {
		/// HTTP status code of the sub-response.
		status: u16,
		/// Server-provided message, when any.
		message: String,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while executing the sub-request.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Builds a status failure.
	pub fn status(status: u16, message: impl Into<String>) -> Self {
		Self::Status { status, message: message.into() }
	}
}

/// Malformed or unexpected sub-response bodies.
#[derive(Debug, ThisError)]
pub enum ResponseError {
	/// Body did not match the expected JSON shape.
	#[error("{endpoint} response is malformed.")]
	Parse {
		/// Logical endpoint label (`token`, `permissions`, `configuration`).
		endpoint: &'static str,
		/// Structured parsing failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A timestamp field could not be converted.
	#[error("{endpoint} response carries an invalid `{field}` timestamp: {value}.")]
	InvalidTimestamp {
		/// Logical endpoint label.
		endpoint: &'static str,
		/// Field holding the timestamp.
		field: &'static str,
		/// Raw value received.
		value: i64,
	},
	/// A field value failed domain validation.
	#[error("{endpoint} response carries an invalid value.")]
	InvalidValue {
		/// Logical endpoint label.
		endpoint: &'static str,
		/// Validation failure.
		#[source]
		source: ConfigError,
	},
}
