//! Thread-safe in-memory store and cache for local development and tests.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{AppId, Credential},
	refresh::RefreshCoordinator,
	remote_config::{CachedConfiguration, ServerConfiguration, StalenessRecord},
	store::{
		ConfigCache, CredentialChange, CredentialObserver, CredentialStore, ReplaceOutcome,
		SubscriptionId,
	},
};

/// Credential store that keeps the current snapshot in-process.
#[derive(Default)]
pub struct MemoryCredentialStore {
	current: RwLock<Option<Arc<Credential>>>,
	observers: Mutex<Vec<(SubscriptionId, CredentialObserver)>>,
	next_subscription: AtomicU64,
	coordinator: RefreshCoordinator,
}
impl MemoryCredentialStore {
	/// Creates a store seeded with `credential`.
	pub fn with_credential(credential: Credential) -> Self {
		let store = Self::default();

		*store.current.write() = Some(Arc::new(credential));

		store
	}

	fn publish(&self, change: CredentialChange) {
		let observers = self
			.observers
			.lock()
			.iter()
			.map(|(_, observer)| observer.clone())
			.collect::<Vec<_>>();

		for observer in observers {
			observer(&change);
		}
	}
}
impl CredentialStore for MemoryCredentialStore {
	fn current(&self) -> Option<Arc<Credential>> {
		self.current.read().clone()
	}

	fn replace(&self, credential: Option<Credential>) -> Option<Arc<Credential>> {
		let next = credential.map(Arc::new);
		let previous = std::mem::replace(&mut *self.current.write(), next.clone());

		self.publish(CredentialChange { previous: previous.clone(), current: next });

		previous
	}

	fn compare_and_replace(
		&self,
		expected: &Arc<Credential>,
		replacement: Credential,
	) -> ReplaceOutcome {
		let replacement = Arc::new(replacement);
		let mut guard = self.current.write();
		let previous = match guard.as_ref() {
			Some(existing) if Arc::ptr_eq(existing, expected) => existing.clone(),
			Some(_) => return ReplaceOutcome::Changed,
			None => return ReplaceOutcome::Missing,
		};

		*guard = Some(replacement.clone());

		drop(guard);
		self.publish(CredentialChange { previous: Some(previous), current: Some(replacement) });

		ReplaceOutcome::Replaced
	}

	fn refresh_coordinator(&self) -> &RefreshCoordinator {
		&self.coordinator
	}

	fn subscribe(&self, observer: CredentialObserver) -> SubscriptionId {
		let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));

		self.observers.lock().push((id, observer));

		id
	}

	fn unsubscribe(&self, id: SubscriptionId) {
		self.observers.lock().retain(|(candidate, _)| *candidate != id);
	}
}
impl Debug for MemoryCredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryCredentialStore")
			.field("current", &self.current.read())
			.field("observers", &self.observers.lock().len())
			.field("coordinator", &self.coordinator)
			.finish()
	}
}

/// Remote-configuration cache keyed by app id.
#[derive(Clone, Debug, Default)]
pub struct MemoryConfigCache(Arc<RwLock<HashMap<AppId, CachedConfiguration>>>);
impl MemoryConfigCache {
	/// Drops the cached entry for `app_id`.
	pub fn evict(&self, app_id: &AppId) -> Option<CachedConfiguration> {
		self.0.write().remove(app_id)
	}
}
impl ConfigCache for MemoryConfigCache {
	fn get(&self, app_id: &AppId) -> Option<CachedConfiguration> {
		self.0.read().get(app_id).cloned()
	}

	fn set(&self, app_id: &AppId, configuration: ServerConfiguration, record: StalenessRecord) {
		self.0.write().insert(app_id.clone(), CachedConfiguration { configuration, record });
	}
}
