//! Descriptors of the auxiliary sub-requests the manager appends.

// self
use crate::{
	auth::AppId,
	connection::{PiggybackKind, SubRequest},
};

const TOKEN_EXTENSION_PATH: &str = "oauth/access_token";
const TOKEN_EXTENSION_GRANT: &str = "fb_extend_sso_token";
const PERMISSIONS_PATH: &str = "me/permissions";
const PERMISSIONS_FIELDS: &str = "permission,status";

/// Token-extension sub-request for a credential issued to `app_id`.
pub fn token_refresh(app_id: &AppId) -> SubRequest {
	SubRequest::piggyback(PiggybackKind::TokenRefresh, TOKEN_EXTENSION_PATH)
		.with_parameter("grant_type", TOKEN_EXTENSION_GRANT)
		.with_parameter("client_id", app_id.as_ref())
}

/// Permission-list reload paired with a token extension.
pub fn permissions_reload() -> SubRequest {
	SubRequest::piggyback(PiggybackKind::PermissionsReload, PERMISSIONS_PATH)
		.with_parameter("fields", PERMISSIONS_FIELDS)
}

/// Remote configuration fetch for `app_id` restricted to `fields`.
pub fn server_configuration(app_id: &AppId, fields: String) -> SubRequest {
	SubRequest::piggyback(PiggybackKind::ServerConfiguration, app_id.as_ref())
		.with_parameter("fields", fields)
}
