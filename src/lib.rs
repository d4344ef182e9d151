//! Piggyback coordination for batched Graph-style requests.
//!
//! Token refreshes and remote configuration fetches ride along on the batches an application
//! already sends instead of costing their own round trips. Refreshes stay single-flight across
//! every connection and land through compare-and-replace on the credential store.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod clock;
pub mod connection;
pub mod error;
pub mod obs;
pub mod piggyback;
pub mod policy;
pub mod refresh;
pub mod remote_config;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// crates.io
	use time::macros;
	// self
	use crate::{
		auth::{AppId, Credential, PermissionSet, UserId},
		clock::ManualClock,
		piggyback::PiggybackManager,
		store::{CredentialStore, MemoryConfigCache, MemoryCredentialStore},
	};

	/// Instant every fixture clock starts at.
	pub const FIXTURE_NOW: OffsetDateTime = macros::datetime!(2025-06-01 12:00 UTC);

	/// Application identifier shared by fixtures.
	pub fn fixture_app_id() -> AppId {
		AppId::new("1234567890").expect("Fixture app identifier should be valid.")
	}

	/// Builds a credential refreshed `age` before [`FIXTURE_NOW`] that expires `ttl` after it.
	pub fn credential_fixture(token: &str, age: Duration, ttl: Duration) -> Credential {
		Credential::builder(
			UserId::new("user-42").expect("Fixture user identifier should be valid."),
			fixture_app_id(),
		)
		.token(token)
		.permissions(
			PermissionSet::new(["public_profile", "email"])
				.expect("Fixture permissions should be valid."),
		)
		.refreshed_at(FIXTURE_NOW - age)
		.expires_at(FIXTURE_NOW + ttl)
		.data_access_expires_at(FIXTURE_NOW + Duration::days(90))
		.build()
		.expect("Credential fixture should build successfully.")
	}

	/// Wires a manager against in-memory collaborators and a manual clock pinned at
	/// [`FIXTURE_NOW`].
	pub fn build_test_manager(
		credential: Option<Credential>,
	) -> (PiggybackManager, Arc<MemoryCredentialStore>, Arc<MemoryConfigCache>, Arc<ManualClock>)
	{
		let store = Arc::new(MemoryCredentialStore::default());

		if let Some(credential) = credential {
			store.replace(Some(credential));
		}

		let cache = Arc::new(MemoryConfigCache::default());
		let clock = Arc::new(ManualClock::new(FIXTURE_NOW));
		let manager = PiggybackManager::builder(store.clone(), cache.clone())
			.app_id(fixture_app_id())
			.clock(clock.clone())
			.build()
			.expect("Test manager should build.");

		(manager, store, cache, clock)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		hash::{Hash, Hasher},
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

pub use serde_json;
#[cfg(test)] use {color_eyre as _, tokio as _};
