//! Collaborator contracts for the credential store and the remote-configuration cache, plus
//! in-memory implementations.

pub mod memory;

pub use memory::{MemoryConfigCache, MemoryCredentialStore};

// self
use crate::{
	_prelude::*,
	auth::{AppId, Credential},
	refresh::RefreshCoordinator,
	remote_config::{CachedConfiguration, ServerConfiguration, StalenessRecord},
};

/// Observer invoked after the current credential changes.
pub type CredentialObserver = Arc<dyn Fn(&CredentialChange) + Send + Sync>;

/// Owner of the current credential.
///
/// Implementations must make [`compare_and_replace`](Self::compare_and_replace) atomic with
/// respect to every other mutation and must notify observers after releasing their locks.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Snapshot of the current credential, if any.
	fn current(&self) -> Option<Arc<Credential>>;

	/// Unconditionally installs `credential` (or clears the store) and returns the previous
	/// snapshot.
	fn replace(&self, credential: Option<Credential>) -> Option<Arc<Credential>>;

	/// Installs `replacement` only if the current snapshot is still `expected`.
	///
	/// Snapshots compare by identity, not by content: a credential installed after `expected`
	/// was read never matches, even when it carries the same token.
	fn compare_and_replace(
		&self,
		expected: &Arc<Credential>,
		replacement: Credential,
	) -> ReplaceOutcome;

	/// Refresh coordinator shared by every manager built over this store.
	fn refresh_coordinator(&self) -> &RefreshCoordinator;

	/// Refresh instant of the current credential.
	fn last_refresh_at(&self) -> Option<OffsetDateTime> {
		self.current().map(|credential| credential.refreshed_at)
	}

	/// Registers an observer for credential changes.
	fn subscribe(&self, observer: CredentialObserver) -> SubscriptionId;

	/// Removes a previously registered observer; unknown ids are ignored.
	fn unsubscribe(&self, id: SubscriptionId);
}

/// Result of a [`CredentialStore::compare_and_replace`] attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplaceOutcome {
	/// The expected snapshot was current and has been replaced.
	Replaced,
	/// A different snapshot was installed after the expected one was read.
	Changed,
	/// The store holds no credential.
	Missing,
}

/// Handle returned by [`CredentialStore::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Notification published after the current credential changes.
#[derive(Clone, Debug)]
pub struct CredentialChange {
	/// Snapshot before the change.
	pub previous: Option<Arc<Credential>>,
	/// Snapshot after the change.
	pub current: Option<Arc<Credential>>,
}
impl CredentialChange {
	/// Returns `true` when the change switched users, logged in, or logged out.
	pub fn user_changed(&self) -> bool {
		match (&self.previous, &self.current) {
			(Some(previous), Some(current)) => previous.user_id != current.user_id,
			(None, None) => false,
			_ => true,
		}
	}

	/// Returns `true` when the token string changed.
	pub fn token_changed(&self) -> bool {
		match (&self.previous, &self.current) {
			(Some(previous), Some(current)) => previous.token != current.token,
			(None, None) => false,
			_ => true,
		}
	}
}

/// Per-app cache of the last successfully fetched remote configuration.
pub trait ConfigCache
where
	Self: Send + Sync,
{
	/// Cached configuration and staleness record for `app_id`, if any.
	fn get(&self, app_id: &AppId) -> Option<CachedConfiguration>;

	/// Replaces the cached configuration for `app_id`.
	fn set(&self, app_id: &AppId, configuration: ServerConfiguration, record: StalenessRecord);
}
