//! Fixtures shared by the integration suites.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime, macros};
// self
use graph_piggyback::{
	auth::{AppId, Credential, PermissionSet, UserId},
	clock::ManualClock,
	connection::{Connection, PiggybackKind, RequestBatch, SubRequest},
	piggyback::PiggybackManager,
	store::{CredentialStore, MemoryConfigCache, MemoryCredentialStore},
};

pub const NOW: OffsetDateTime = macros::datetime!(2025-06-01 12:00 UTC);

pub struct Harness {
	pub manager: Arc<PiggybackManager>,
	pub store: Arc<MemoryCredentialStore>,
	pub cache: Arc<MemoryConfigCache>,
	pub clock: Arc<ManualClock>,
}

pub fn app_id() -> AppId {
	AppId::new("1234567890").expect("Fixture app identifier should be valid.")
}

pub fn credential(token: &str, age: Duration, ttl: Duration) -> Credential {
	Credential::builder(UserId::new("user-42").expect("Fixture user id should be valid."), app_id())
		.token(token)
		.permissions(
			PermissionSet::new(["public_profile", "email"])
				.expect("Fixture permissions should be valid."),
		)
		.refreshed_at(NOW - age)
		.expires_at(NOW + ttl)
		.build()
		.expect("Credential fixture should build successfully.")
}

pub fn harness(seed: Option<Credential>) -> Harness {
	let store = Arc::new(MemoryCredentialStore::default());

	if let Some(seed) = seed {
		store.replace(Some(seed));
	}

	let cache = Arc::new(MemoryConfigCache::default());
	let clock = Arc::new(ManualClock::new(NOW));
	let manager = PiggybackManager::builder(store.clone(), cache.clone())
		.app_id(app_id())
		.clock(clock.clone())
		.build()
		.expect("Harness manager should build.");

	Harness { manager: Arc::new(manager), store, cache, clock }
}

pub fn primary_batch(id: &str) -> RequestBatch {
	let mut batch = RequestBatch::new(id);

	batch.add_sub_request(SubRequest::new("me", "me"), Box::new(|_| {}));

	batch
}

pub fn count(batch: &RequestBatch, kind: PiggybackKind) -> usize {
	batch.sub_requests().iter().filter(|request| request.piggyback == Some(kind)).count()
}

pub fn extended_token(token: &str, lifetime: Duration) -> Value {
	json!({
		"access_token": token,
		"expires_at": (NOW + lifetime).unix_timestamp(),
		"data_access_expiration_time": (NOW + Duration::days(90)).unix_timestamp(),
	})
}

pub fn permissions(granted: &[&str], declined: &[&str]) -> Value {
	let entries = granted
		.iter()
		.map(|name| json!({ "permission": name, "status": "granted" }))
		.chain(declined.iter().map(|name| json!({ "permission": name, "status": "declined" })))
		.collect::<Vec<_>>();

	json!({ "data": entries })
}
