//! Immutable credential snapshots, lifecycle helpers, and builders.

// self
use crate::{
	_prelude::*,
	auth::{AppId, PermissionSet, UserId, token::secret::TokenSecret},
};

/// Lifecycle status of a credential at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Token and data access are both valid.
	Active,
	/// Token is valid but the data-access window has closed.
	DataAccessExpired,
	/// Token exceeded its expiry instant.
	Expired,
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no token value was provided.
	#[error("Token string is required.")]
	MissingToken,
	/// Issued when no expiry was configured.
	#[error("Expiry must be supplied.")]
	MissingExpiry,
}

/// Access-token credential as held by a credential store.
///
/// Credentials are never edited in place: a refresh produces a new value through
/// [`Credential::refreshed`] and the store swaps the whole snapshot.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Access token; callers must avoid logging it.
	pub token: TokenSecret,
	/// User the token was issued to.
	pub user_id: UserId,
	/// Application the token was issued for.
	pub app_id: AppId,
	/// Permissions the user granted.
	pub permissions: PermissionSet,
	/// Permissions the user declined.
	pub declined_permissions: PermissionSet,
	/// Permissions that were granted once and have since expired.
	pub expired_permissions: PermissionSet,
	/// Token expiry.
	pub expires_at: OffsetDateTime,
	/// End of the data-access window.
	pub data_access_expires_at: OffsetDateTime,
	/// Last time the token was issued or refreshed.
	pub refreshed_at: OffsetDateTime,
	/// Graph domain the token belongs to, when the server reported one.
	pub graph_domain: Option<String>,
}
impl Credential {
	/// Returns a builder for the provided user + app pair.
	pub fn builder(user_id: UserId, app_id: AppId) -> CredentialBuilder {
		CredentialBuilder::new(user_id, app_id)
	}

	/// Computes the lifecycle status at `instant`.
	pub fn status_at(&self, instant: OffsetDateTime) -> CredentialStatus {
		if instant >= self.expires_at {
			return CredentialStatus::Expired;
		}
		if instant >= self.data_access_expires_at {
			return CredentialStatus::DataAccessExpired;
		}

		CredentialStatus::Active
	}

	/// Returns `true` if the token has expired at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), CredentialStatus::Expired)
	}

	/// Time left before expiry; negative once expired.
	pub fn remaining_lifetime_at(&self, instant: OffsetDateTime) -> Duration {
		self.expires_at - instant
	}

	/// Time elapsed since the last issue or refresh.
	pub fn age_at(&self, instant: OffsetDateTime) -> Duration {
		instant - self.refreshed_at
	}

	/// Builds the successor credential produced by a refresh.
	///
	/// User and app carry over unchanged; every other field comes from
	/// `update`, falling back to the current value when the server omitted it.
	pub fn refreshed(&self, update: CredentialUpdate, now: OffsetDateTime) -> Credential {
		let (permissions, declined_permissions) = match update.permissions {
			Some((granted, declined)) => (granted, declined),
			None => (self.permissions.clone(), self.declined_permissions.clone()),
		};

		Credential {
			token: update.token.map(TokenSecret::new).unwrap_or_else(|| self.token.clone()),
			user_id: self.user_id.clone(),
			app_id: self.app_id.clone(),
			permissions,
			declined_permissions,
			expired_permissions: update
				.expired_permissions
				.unwrap_or_else(|| self.expired_permissions.clone()),
			expires_at: update.expires_at.unwrap_or(self.expires_at),
			data_access_expires_at: update
				.data_access_expires_at
				.unwrap_or(self.data_access_expires_at),
			refreshed_at: now,
			graph_domain: update.graph_domain.or_else(|| self.graph_domain.clone()),
		}
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("token", &self.token)
			.field("user_id", &self.user_id)
			.field("app_id", &self.app_id)
			.field("permissions", &self.permissions)
			.field("declined_permissions", &self.declined_permissions)
			.field("expired_permissions", &self.expired_permissions)
			.field("expires_at", &self.expires_at)
			.field("data_access_expires_at", &self.data_access_expires_at)
			.field("refreshed_at", &self.refreshed_at)
			.field("graph_domain", &self.graph_domain)
			.finish()
	}
}

/// Refreshable fields parsed from a refresh response; `None` keeps the current value.
#[derive(Clone, Debug, Default)]
pub struct CredentialUpdate {
	/// New token string.
	pub token: Option<String>,
	/// New expiry.
	pub expires_at: Option<OffsetDateTime>,
	/// New data-access expiry.
	pub data_access_expires_at: Option<OffsetDateTime>,
	/// Granted + declined permission sets from a permissions reload.
	pub permissions: Option<(PermissionSet, PermissionSet)>,
	/// Expired permissions from a permissions reload.
	pub expired_permissions: Option<PermissionSet>,
	/// Graph domain reported with the token.
	pub graph_domain: Option<String>,
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	user_id: UserId,
	app_id: AppId,
	token: Option<TokenSecret>,
	permissions: PermissionSet,
	declined_permissions: PermissionSet,
	expired_permissions: PermissionSet,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	data_access_expires_at: Option<OffsetDateTime>,
	refreshed_at: Option<OffsetDateTime>,
	graph_domain: Option<String>,
}
impl CredentialBuilder {
	fn new(user_id: UserId, app_id: AppId) -> Self {
		Self {
			user_id,
			app_id,
			token: None,
			permissions: PermissionSet::default(),
			declined_permissions: PermissionSet::default(),
			expired_permissions: PermissionSet::default(),
			expires_at: None,
			expires_in: None,
			data_access_expires_at: None,
			refreshed_at: None,
			graph_domain: None,
		}
	}

	/// Provides the token string.
	pub fn token(mut self, token: impl Into<String>) -> Self {
		self.token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the granted permissions.
	pub fn permissions(mut self, permissions: PermissionSet) -> Self {
		self.permissions = permissions;

		self
	}

	/// Sets the declined permissions.
	pub fn declined_permissions(mut self, permissions: PermissionSet) -> Self {
		self.declined_permissions = permissions;

		self
	}

	/// Sets the expired permissions.
	pub fn expired_permissions(mut self, permissions: PermissionSet) -> Self {
		self.expired_permissions = permissions;

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry measured from the refresh instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Sets the data-access expiry; defaults to the token expiry.
	pub fn data_access_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.data_access_expires_at = Some(instant);

		self
	}

	/// Sets the refresh instant; defaults to the current clock.
	pub fn refreshed_at(mut self, instant: OffsetDateTime) -> Self {
		self.refreshed_at = Some(instant);

		self
	}

	/// Sets the graph domain.
	pub fn graph_domain(mut self, domain: impl Into<String>) -> Self {
		self.graph_domain = Some(domain.into());

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let token = self.token.ok_or(CredentialBuilderError::MissingToken)?;

		if token.expose().is_empty() {
			return Err(CredentialBuilderError::MissingToken);
		}

		let refreshed_at = self.refreshed_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => refreshed_at + delta,
			(None, None) => return Err(CredentialBuilderError::MissingExpiry),
		};

		Ok(Credential {
			token,
			user_id: self.user_id,
			app_id: self.app_id,
			permissions: self.permissions,
			declined_permissions: self.declined_permissions,
			expired_permissions: self.expired_permissions,
			expires_at,
			data_access_expires_at: self.data_access_expires_at.unwrap_or(expires_at),
			refreshed_at,
			graph_domain: self.graph_domain,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn ids() -> (UserId, AppId) {
		(
			UserId::new("user-1").expect("User fixture should be valid."),
			AppId::new("4242").expect("App fixture should be valid."),
		)
	}

	#[test]
	fn status_covers_data_access_window() {
		let (user, app) = ids();
		let credential = Credential::builder(user, app)
			.token("token")
			.refreshed_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(macros::datetime!(2025-03-01 00:00 UTC))
			.data_access_expires_at(macros::datetime!(2025-02-01 00:00 UTC))
			.build()
			.expect("Credential builder should succeed.");

		assert_eq!(
			credential.status_at(macros::datetime!(2025-01-15 00:00 UTC)),
			CredentialStatus::Active
		);
		assert_eq!(
			credential.status_at(macros::datetime!(2025-02-15 00:00 UTC)),
			CredentialStatus::DataAccessExpired
		);
		assert!(credential.is_expired_at(macros::datetime!(2025-03-01 00:00 UTC)));
		assert_eq!(
			credential.age_at(macros::datetime!(2025-01-02 00:00 UTC)),
			Duration::days(1)
		);
	}

	#[test]
	fn builder_requires_token_and_expiry() {
		let (user, app) = ids();

		assert_eq!(
			Credential::builder(user.clone(), app.clone()).expires_in(Duration::hours(1)).build(),
			Err(CredentialBuilderError::MissingToken)
		);
		assert_eq!(
			Credential::builder(user.clone(), app.clone()).token("t").build(),
			Err(CredentialBuilderError::MissingExpiry)
		);

		let credential = Credential::builder(user, app)
			.token("t")
			.refreshed_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::days(60))
			.build()
			.expect("Relative expiry should build.");

		assert_eq!(credential.expires_at, macros::datetime!(2025-03-02 00:00 UTC));
		assert_eq!(credential.data_access_expires_at, credential.expires_at);
	}

	#[test]
	fn refreshed_keeps_identity_and_falls_back_per_field() {
		let (user, app) = ids();
		let previous = Credential::builder(user, app)
			.token("old")
			.permissions(PermissionSet::new(["email"]).expect("Permissions should be valid."))
			.refreshed_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_at(macros::datetime!(2025-02-01 00:00 UTC))
			.graph_domain("facebook")
			.build()
			.expect("Credential builder should succeed.");
		let now = macros::datetime!(2025-01-20 00:00 UTC);
		let next = previous.refreshed(
			CredentialUpdate {
				token: Some("new".into()),
				expires_at: Some(macros::datetime!(2025-03-20 00:00 UTC)),
				..Default::default()
			},
			now,
		);

		assert_eq!(next.token.expose(), "new");
		assert_eq!(next.user_id, previous.user_id);
		assert_eq!(next.permissions, previous.permissions);
		assert_eq!(next.data_access_expires_at, previous.data_access_expires_at);
		assert_eq!(next.graph_domain.as_deref(), Some("facebook"));
		assert_eq!(next.refreshed_at, now);
	}

	#[test]
	fn debug_output_redacts_token() {
		let (user, app) = ids();
		let credential = Credential::builder(user, app)
			.token("EAAB-very-secret")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Credential builder should succeed.");

		assert!(!format!("{credential:?}").contains("EAAB-very-secret"));
	}
}
