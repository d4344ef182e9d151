//! Connection seam: the about-to-be-sent batch piggybacks are appended to.
//!
//! The crate never performs I/O. A transport owns a [`Connection`], lets the piggyback manager
//! inspect and extend it right before dispatch, and later resolves every queued
//! [`Completion`] exactly once, with [`Error::Cancelled`] when the batch never went out.
//! [`RequestBatch`] is the bundled in-process implementation.

pub mod batch;

pub use batch::RequestBatch;

// self
use crate::_prelude::*;

/// Outcome delivered to a sub-request completion: the sub-response body or a local error.
pub type SubRequestResult = Result<serde_json::Value, Error>;

/// Callback fired once when a sub-request resolves.
pub type Completion = Box<dyn FnOnce(SubRequestResult) + Send>;

/// An outgoing batch of sub-requests sharing one round trip.
pub trait Connection {
	/// Identifier used in logs.
	fn id(&self) -> &str;

	/// Sub-requests queued so far, in dispatch order.
	fn sub_requests(&self) -> &[SubRequest];

	/// Appends a sub-request after every existing one.
	fn add_sub_request(&mut self, request: SubRequest, completion: Completion);

	/// Returns `true` when a piggyback of `kind` is already queued.
	fn has_piggyback(&self, kind: PiggybackKind) -> bool {
		self.sub_requests().iter().any(|request| request.piggyback == Some(kind))
	}

	/// Returns `true` when every queued sub-request tolerates piggybacks.
	fn is_piggyback_safe(&self) -> bool {
		self.sub_requests().iter().all(|request| request.piggyback_safe)
	}
}

/// Auxiliary sub-request kinds the manager can attach.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiggybackKind {
	/// Access-token extension.
	TokenRefresh,
	/// Permission list reload paired with a token refresh.
	PermissionsReload,
	/// Remote configuration fetch.
	ServerConfiguration,
}
impl PiggybackKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			PiggybackKind::TokenRefresh => "token_refresh",
			PiggybackKind::PermissionsReload => "permissions_reload",
			PiggybackKind::ServerConfiguration => "server_configuration",
		}
	}

	/// Batch name used for the sub-request of this kind.
	pub const fn batch_name(self) -> &'static str {
		match self {
			PiggybackKind::TokenRefresh => "piggyback_token_refresh",
			PiggybackKind::PermissionsReload => "piggyback_permissions_reload",
			PiggybackKind::ServerConfiguration => "piggyback_server_configuration",
		}
	}
}
impl Display for PiggybackKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// HTTP method of a sub-request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
	#[default]
	/// `GET`.
	Get,
	/// `POST`.
	Post,
	/// `DELETE`.
	Delete,
}

/// Descriptor of one sub-request inside a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubRequest {
	/// Name inside the batch; routes the sub-response back to its completion.
	pub name: String,
	/// Graph path relative to the API root (`me`, `oauth/access_token`, ...).
	pub graph_path: String,
	/// HTTP method.
	pub method: HttpMethod,
	/// Query or form parameters.
	pub parameters: BTreeMap<String, String>,
	/// Set when the sub-request was attached as a piggyback.
	pub piggyback: Option<PiggybackKind>,
	/// Whether the batch may carry piggybacks alongside this sub-request.
	pub piggyback_safe: bool,
}
impl SubRequest {
	/// Creates a `GET` sub-request that tolerates piggybacks.
	pub fn new(name: impl Into<String>, graph_path: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			graph_path: graph_path.into(),
			method: HttpMethod::Get,
			parameters: BTreeMap::new(),
			piggyback: None,
			piggyback_safe: true,
		}
	}

	/// Creates a piggyback sub-request of `kind` named after it.
	pub fn piggyback(kind: PiggybackKind, graph_path: impl Into<String>) -> Self {
		Self { piggyback: Some(kind), ..Self::new(kind.batch_name(), graph_path) }
	}

	/// Overrides the HTTP method.
	pub fn with_method(mut self, method: HttpMethod) -> Self {
		self.method = method;

		self
	}

	/// Adds or replaces one parameter.
	pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.parameters.insert(key.into(), value.into());

		self
	}

	/// Opts the whole batch out of piggybacks (e.g. requests sent without the client token).
	pub fn without_piggybacks(mut self) -> Self {
		self.piggyback_safe = false;

		self
	}
}
