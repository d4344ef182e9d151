//! Prepares a batch with a day-old credential, shows the piggybacks the manager attached, and
//! answers them with canned sub-responses from another task.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use serde_json::json;
use time::{Duration, OffsetDateTime};
// self
use graph_piggyback::{
	auth::{AppId, Credential, PermissionChange, PermissionSet, UserId},
	connection::{Connection, PiggybackKind, RequestBatch, SubRequest, SubRequestResult},
	piggyback::PiggybackManager,
	store::{ConfigCache, CredentialStore, MemoryConfigCache, MemoryCredentialStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let now = OffsetDateTime::now_utc();
	let app_id = AppId::new("1234567890")?;
	let credential = Credential::builder(UserId::new("user-42")?, app_id.clone())
		.token("EAAB-demo")
		.permissions(PermissionSet::new(["public_profile", "email"])?)
		.refreshed_at(now - Duration::days(2))
		.expires_at(now + Duration::days(10))
		.build()?;
	let store = Arc::new(MemoryCredentialStore::with_credential(credential));
	let cache = Arc::new(MemoryConfigCache::default());
	let manager =
		PiggybackManager::builder(store.clone(), cache.clone()).app_id(app_id.clone()).build()?;
	let mut batch = RequestBatch::new("demo-batch");

	batch.add_sub_request(
		SubRequest::new("me", "me").with_parameter("fields", "id,name"),
		Box::new(|result: SubRequestResult| {
			println!("primary `me` resolved: ok={}", result.is_ok());
		}),
	);

	let report = manager.add_piggyback_requests(&mut batch);
	let forced = manager.add_refresh_piggyback(
		&mut batch,
		Some(Box::new(|change: PermissionChange| {
			println!(
				"permissions changed: +[{}] -[{}]",
				change.newly_granted(),
				change.newly_declined()
			);
		})),
	);

	println!(
		"refresh: {:?}, configuration: {:?}, forced: {forced:?}",
		report.refresh, report.configuration
	);
	println!("{}", serde_json::to_string_pretty(batch.sub_requests())?);

	let expires_at = (now + Duration::days(60)).unix_timestamp();

	tokio::spawn(async move {
		batch.dispatch(|request| match request.piggyback {
			Some(PiggybackKind::TokenRefresh) =>
				Ok(json!({ "access_token": "EAAB-extended", "expires_at": expires_at })),
			Some(PiggybackKind::PermissionsReload) => Ok(json!({ "data": [
				{ "permission": "public_profile", "status": "granted" },
				{ "permission": "email", "status": "declined" },
			]})),
			Some(PiggybackKind::ServerConfiguration) =>
				Ok(json!({ "id": "1234567890", "name": "Piggyback Demo" })),
			None => Ok(json!({ "id": "user-42", "name": "Demo User" })),
		});
	})
	.await?;

	if let Some(current) = store.current() {
		println!("credential now expires at {}", current.expires_at);
	}
	if let Some(cached) = cache.get(&app_id) {
		println!("configuration cached for {:?}", cached.configuration.app_name);
	}

	Ok(())
}
