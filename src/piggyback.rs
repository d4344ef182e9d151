//! Piggyback manager: decides which auxiliary sub-requests ride along on an outgoing batch.
//!
//! [`PiggybackManager::add_piggyback_requests`] is the entry point a transport calls right
//! before dispatch. It attaches a token refresh when the current credential is due (subject to
//! the shared [`RefreshCoordinator`]) and a remote configuration fetch when the cached copy is
//! stale. Nothing here fails the caller's batch: every operation returns a
//! [`PiggybackDecision`] describing what happened, and every piggyback failure stays local to
//! its own completion.

pub mod requests;

// self
use crate::{
	_prelude::*,
	auth::{AppId, PermissionChange},
	clock::{Clock, SystemClock},
	connection::{Connection, PiggybackKind, SubRequestResult},
	error::ConfigError,
	obs::{self, PiggybackOutcome, PiggybackSpan},
	policy::PiggybackPolicy,
	refresh::{RefreshCoordinator, RefreshListener, RefreshSettlement},
	remote_config::{self, FetchGate, FetchPermit, ServerConfiguration, StalenessRecord},
	store::{ConfigCache, CredentialChange, CredentialStore, SubscriptionId},
};

/// Callback fired with the permission diff of an applied refresh.
pub type PermissionHandler = Box<dyn FnOnce(PermissionChange) + Send>;

/// What a piggyback operation did to the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PiggybackDecision {
	/// New sub-requests were appended.
	Attached,
	/// The caller's handler was attached to the refresh already in flight.
	Joined,
	/// Nothing was appended.
	Skipped(SkipReason),
}
impl PiggybackDecision {
	/// Returns `true` when sub-requests were appended.
	pub fn is_attached(self) -> bool {
		matches!(self, PiggybackDecision::Attached)
	}

	fn outcome(self) -> PiggybackOutcome {
		match self {
			PiggybackDecision::Attached => PiggybackOutcome::Attached,
			PiggybackDecision::Joined => PiggybackOutcome::Joined,
			PiggybackDecision::Skipped(_) => PiggybackOutcome::Skipped,
		}
	}
}

/// Why a piggyback was not attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
	/// The manager has no application identifier.
	MissingAppId,
	/// A queued sub-request does not tolerate piggybacks.
	UnsafeBatch,
	/// The store holds no credential.
	NoCredential,
	/// The connection already carries a piggyback of this kind.
	AlreadyAttached,
	/// The cached state is still fresh.
	Fresh,
	/// A refresh was attempted within the retry interval.
	RecentlyAttempted,
	/// Another connection already carries the refresh.
	RefreshInFlight,
	/// The connection carries a refresh that has already settled, so a handler has nothing to
	/// join.
	RefreshSettled,
	/// Another connection already carries the configuration fetch.
	FetchInFlight,
}
impl SkipReason {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SkipReason::MissingAppId => "missing_app_id",
			SkipReason::UnsafeBatch => "unsafe_batch",
			SkipReason::NoCredential => "no_credential",
			SkipReason::AlreadyAttached => "already_attached",
			SkipReason::Fresh => "fresh",
			SkipReason::RecentlyAttempted => "recently_attempted",
			SkipReason::RefreshInFlight => "refresh_in_flight",
			SkipReason::RefreshSettled => "refresh_settled",
			SkipReason::FetchInFlight => "fetch_in_flight",
		}
	}
}
impl Display for SkipReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Decisions taken by one [`PiggybackManager::add_piggyback_requests`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PiggybackReport {
	/// Token refresh decision.
	pub refresh: PiggybackDecision,
	/// Remote configuration decision.
	pub configuration: PiggybackDecision,
}
impl PiggybackReport {
	fn skipped(reason: SkipReason) -> Self {
		Self {
			refresh: PiggybackDecision::Skipped(reason),
			configuration: PiggybackDecision::Skipped(reason),
		}
	}
}

/// Attaches refresh and configuration piggybacks to outgoing connections.
pub struct PiggybackManager {
	credentials: Arc<dyn CredentialStore>,
	config_cache: Arc<dyn ConfigCache>,
	app_id: Option<AppId>,
	policy: PiggybackPolicy,
	clock: Arc<dyn Clock>,
	coordinator: RefreshCoordinator,
	config_gate: FetchGate,
	last_attempt: Arc<Mutex<Option<OffsetDateTime>>>,
	subscription: SubscriptionId,
}
impl PiggybackManager {
	/// Starts a builder around the two stateful collaborators.
	pub fn builder(
		credentials: Arc<dyn CredentialStore>,
		config_cache: Arc<dyn ConfigCache>,
	) -> PiggybackManagerBuilder {
		PiggybackManagerBuilder {
			credentials,
			config_cache,
			app_id: None,
			policy: PiggybackPolicy::default(),
			clock: Arc::new(SystemClock),
		}
	}

	/// Application identifier used for configuration fetches.
	pub fn app_id(&self) -> Option<&AppId> {
		self.app_id.as_ref()
	}

	/// Active policy.
	pub fn policy(&self) -> &PiggybackPolicy {
		&self.policy
	}

	/// Refresh coordinator owned by the credential store, shared with every manager built over
	/// the same store.
	pub fn coordinator(&self) -> &RefreshCoordinator {
		&self.coordinator
	}

	/// Instant of the last refresh this manager attached, reset when the user changes.
	pub fn last_refresh_attempt(&self) -> Option<OffsetDateTime> {
		*self.last_attempt.lock()
	}

	/// Attaches every piggyback that is due.
	///
	/// Does nothing without an app id or when a queued sub-request does not tolerate
	/// piggybacks. Calling it twice on the same connection never duplicates a piggyback.
	pub fn add_piggyback_requests<C>(&self, connection: &mut C) -> PiggybackReport
	where
		C: ?Sized + Connection,
	{
		if self.app_id.is_none() {
			return PiggybackReport::skipped(SkipReason::MissingAppId);
		}
		if !connection.is_piggyback_safe() {
			return PiggybackReport::skipped(SkipReason::UnsafeBatch);
		}

		PiggybackReport {
			refresh: self.add_refresh_piggyback_if_stale(connection),
			configuration: self.add_server_configuration_piggyback(connection),
		}
	}

	/// Attaches a token refresh regardless of staleness.
	///
	/// The refresh stays single-flight: when another connection already carries one, the
	/// handler joins that flight and nothing is appended. `permission_handler` fires at most
	/// once, after an applied refresh that changed permissions.
	///
	/// A connection never carries two refreshes. If it already carries one whose flight has
	/// settled, the handler is dropped without firing and the decision is
	/// `Skipped(RefreshSettled)`; attach to a fresh connection to observe the next refresh.
	pub fn add_refresh_piggyback<C>(
		&self,
		connection: &mut C,
		permission_handler: Option<PermissionHandler>,
	) -> PiggybackDecision
	where
		C: ?Sized + Connection,
	{
		const KIND: PiggybackKind = PiggybackKind::TokenRefresh;

		let _span = PiggybackSpan::new(KIND, "add_refresh_piggyback").entered();
		let decision = self.attach_refresh(connection, permission_handler);

		observe(KIND, connection.id(), decision)
	}

	/// Attaches a token refresh when the current credential is due.
	///
	/// A credential is due once it is older than the minimum refresh interval or its remaining
	/// lifetime drops into the expiry window. Attempts are spaced by the retry interval.
	pub fn add_refresh_piggyback_if_stale<C>(&self, connection: &mut C) -> PiggybackDecision
	where
		C: ?Sized + Connection,
	{
		const KIND: PiggybackKind = PiggybackKind::TokenRefresh;

		let _span = PiggybackSpan::new(KIND, "add_refresh_piggyback_if_stale").entered();
		let decision = match self.refresh_due(connection) {
			Ok(()) => self.attach_refresh(connection, None),
			Err(reason) => PiggybackDecision::Skipped(reason),
		};

		observe(KIND, connection.id(), decision)
	}

	/// Attaches a remote configuration fetch when the cached copy is absent or stale.
	pub fn add_server_configuration_piggyback<C>(&self, connection: &mut C) -> PiggybackDecision
	where
		C: ?Sized + Connection,
	{
		const KIND: PiggybackKind = PiggybackKind::ServerConfiguration;

		let _span = PiggybackSpan::new(KIND, "add_server_configuration_piggyback").entered();
		let decision = self.attach_configuration(connection);

		observe(KIND, connection.id(), decision)
	}

	fn refresh_due<C>(&self, connection: &C) -> Result<(), SkipReason>
	where
		C: ?Sized + Connection,
	{
		let credential = self.credentials.current().ok_or(SkipReason::NoCredential)?;

		if connection.has_piggyback(PiggybackKind::TokenRefresh) {
			return Err(SkipReason::AlreadyAttached);
		}

		let now = self.clock.now();
		let aged = credential.age_at(now) > self.policy.min_refresh_interval;
		let expiring = credential.remaining_lifetime_at(now) <= self.policy.expiry_window;

		if !aged && !expiring {
			return Err(SkipReason::Fresh);
		}
		if self
			.last_refresh_attempt()
			.is_some_and(|last| now - last <= self.policy.refresh_retry_interval)
		{
			return Err(SkipReason::RecentlyAttempted);
		}

		Ok(())
	}

	fn attach_refresh<C>(
		&self,
		connection: &mut C,
		permission_handler: Option<PermissionHandler>,
	) -> PiggybackDecision
	where
		C: ?Sized + Connection,
	{
		let Some(snapshot) = self.credentials.current() else {
			return PiggybackDecision::Skipped(SkipReason::NoCredential);
		};
		let listener = permission_handler.map(permission_listener);

		if connection.has_piggyback(PiggybackKind::TokenRefresh) {
			return match listener.map(|listener| self.coordinator.join(listener)) {
				Some(Ok(())) => PiggybackDecision::Joined,
				Some(Err(_)) => PiggybackDecision::Skipped(SkipReason::RefreshSettled),
				None => PiggybackDecision::Skipped(SkipReason::AlreadyAttached),
			};
		}

		let Some(ticket) = self.coordinator.begin_if_idle(snapshot.clone()) else {
			return match listener.map(|listener| self.coordinator.join(listener)) {
				Some(Ok(())) => PiggybackDecision::Joined,
				_ => PiggybackDecision::Skipped(SkipReason::RefreshInFlight),
			};
		};

		if let Some(listener) = listener {
			ticket.listen(listener);
		}

		*self.last_attempt.lock() = Some(self.clock.now());

		let (token_done, permissions_done) =
			ticket.into_completions(self.credentials.clone(), self.clock.clone());

		connection.add_sub_request(requests::token_refresh(&snapshot.app_id), token_done);
		connection.add_sub_request(requests::permissions_reload(), permissions_done);

		PiggybackDecision::Attached
	}

	fn attach_configuration<C>(&self, connection: &mut C) -> PiggybackDecision
	where
		C: ?Sized + Connection,
	{
		let Some(app_id) = self.app_id.clone() else {
			return PiggybackDecision::Skipped(SkipReason::MissingAppId);
		};

		if connection.has_piggyback(PiggybackKind::ServerConfiguration) {
			return PiggybackDecision::Skipped(SkipReason::AlreadyAttached);
		}

		let cached = self.config_cache.get(&app_id);

		if !remote_config::is_stale(
			cached.as_ref().map(|cached| &cached.record),
			self.clock.now(),
			self.policy.config_ttl,
		) {
			return PiggybackDecision::Skipped(SkipReason::Fresh);
		}

		let Some(permit) = self.config_gate.try_begin() else {
			return PiggybackDecision::Skipped(SkipReason::FetchInFlight);
		};
		let request = requests::server_configuration(&app_id, self.policy.config_fields_param());
		let settle = ConfigurationSettle {
			cache: self.config_cache.clone(),
			clock: self.clock.clone(),
			app_id,
			_permit: permit,
		};

		connection.add_sub_request(request, Box::new(move |result| settle.apply(result)));

		PiggybackDecision::Attached
	}
}
impl Drop for PiggybackManager {
	fn drop(&mut self) {
		self.credentials.unsubscribe(self.subscription);
	}
}
impl Debug for PiggybackManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PiggybackManager")
			.field("app_id", &self.app_id)
			.field("policy", &self.policy)
			.field("coordinator", &self.coordinator)
			.field("config_gate", &self.config_gate)
			.field("last_attempt", &self.last_attempt.lock())
			.finish()
	}
}

/// Builder for [`PiggybackManager`].
pub struct PiggybackManagerBuilder {
	credentials: Arc<dyn CredentialStore>,
	config_cache: Arc<dyn ConfigCache>,
	app_id: Option<AppId>,
	policy: PiggybackPolicy,
	clock: Arc<dyn Clock>,
}
impl PiggybackManagerBuilder {
	/// Sets the application identifier; configuration fetches require it.
	pub fn app_id(mut self, app_id: AppId) -> Self {
		self.app_id = Some(app_id);

		self
	}

	/// Replaces the default policy; [`build`](Self::build) validates it.
	pub fn policy(mut self, policy: PiggybackPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Replaces the system clock.
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Validates the policy, then builds the manager and subscribes it to credential changes.
	pub fn build(self) -> Result<PiggybackManager, ConfigError> {
		self.policy.validate()?;

		let coordinator = self.credentials.refresh_coordinator().clone();
		let last_attempt = Arc::new(Mutex::new(None));
		let observed_attempt = Arc::downgrade(&last_attempt);
		let subscription =
			self.credentials.subscribe(Arc::new(move |change: &CredentialChange| {
				if !change.user_changed() {
					return;
				}
				if let Some(last_attempt) = observed_attempt.upgrade() {
					*last_attempt.lock() = None;
				}
			}));

		Ok(PiggybackManager {
			credentials: self.credentials,
			config_cache: self.config_cache,
			app_id: self.app_id,
			policy: self.policy,
			clock: self.clock,
			coordinator,
			config_gate: FetchGate::default(),
			last_attempt,
			subscription,
		})
	}
}
impl Debug for PiggybackManagerBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PiggybackManagerBuilder")
			.field("app_id", &self.app_id)
			.field("policy", &self.policy)
			.finish()
	}
}

struct ConfigurationSettle {
	cache: Arc<dyn ConfigCache>,
	clock: Arc<dyn Clock>,
	app_id: AppId,
	_permit: FetchPermit,
}
impl ConfigurationSettle {
	fn apply(self, result: SubRequestResult) {
		const KIND: PiggybackKind = PiggybackKind::ServerConfiguration;

		let _span = PiggybackSpan::new(KIND, "settle").entered();
		let parsed = result.and_then(|body| {
			ServerConfiguration::from_response(&body).map_err(Error::from)
		});

		match parsed {
			Ok((configuration, version)) => {
				self.cache.set(
					&self.app_id,
					configuration,
					StalenessRecord::new(self.clock.now(), Some(version)),
				);
				obs::record_piggyback_outcome(KIND, PiggybackOutcome::Success);
			},
			Err(err) => {
				obs::record_piggyback_outcome(KIND, PiggybackOutcome::Failure);
				obs::log_failure(KIND, &err);
			},
		}
	}
}

fn permission_listener(handler: PermissionHandler) -> RefreshListener {
	Box::new(move |settlement: RefreshSettlement| {
		if let Some(change) = settlement.ok().and_then(|success| success.permission_change) {
			handler(change);
		}
	})
}

fn observe(
	kind: PiggybackKind,
	connection: &str,
	decision: PiggybackDecision,
) -> PiggybackDecision {
	if let PiggybackDecision::Skipped(reason) = decision {
		obs::log_skip(kind, connection, &reason);
	}

	obs::record_piggyback_outcome(kind, decision.outcome());

	decision
}
