//! Single-flight refresh coordination with compare-and-replace credential rotation.
//!
//! [`RefreshCoordinator`] is a two-state machine (`Idle`, `InFlight`). A flight starts when a
//! refresh piggyback is actually attached to a connection ([`RefreshCoordinator::begin_if_idle`]
//! hands out the only [`RefreshTicket`]) and ends when that ticket settles. Every other caller
//! that wants a refresh while the flight is open [`join`](RefreshCoordinator::join)s it and
//! receives the same settlement. A ticket that is dropped unsettled settles with
//! [`Error::Cancelled`], so listeners never hang on an aborted connection.
//!
//! Settling a successful response goes through [`CredentialStore::compare_and_replace`]
//! against the snapshot captured when the flight began. Any credential installed in the
//! meantime, including one that kept the same token, wins over the slow refresh.

mod metrics;
mod response;

pub use metrics::RefreshMetrics;
pub use response::{PermissionsResponse, TokenRefreshResponse};

// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialUpdate, PermissionChange},
	clock::Clock,
	connection::{Completion, PiggybackKind, SubRequestResult},
	obs::{self, PiggybackOutcome, PiggybackSpan},
	store::{CredentialStore, ReplaceOutcome},
};

/// Settlement fanned out to every listener of one flight.
pub type RefreshSettlement = Result<RefreshSuccess, Arc<Error>>;

/// Listener notified once when a flight settles.
pub type RefreshListener = Box<dyn FnOnce(RefreshSettlement) + Send>;

/// Observable coordinator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshState {
	/// No refresh is in flight.
	Idle,
	/// A refresh sub-request is attached to a connection and has not settled.
	InFlight,
}

/// Applied refresh result.
#[derive(Clone, Debug)]
pub struct RefreshSuccess {
	/// Credential now held by the store.
	pub credential: Arc<Credential>,
	/// Permission diff, present only when the refresh changed permissions.
	pub permission_change: Option<PermissionChange>,
}

/// Owner of the process-wide refresh flight.
#[derive(Clone, Debug, Default)]
pub struct RefreshCoordinator {
	slot: Arc<Mutex<FlightSlot>>,
	metrics: Arc<RefreshMetrics>,
}
impl RefreshCoordinator {
	/// Creates an idle coordinator.
	pub fn new() -> Self {
		Self::default()
	}

	/// Current state.
	pub fn state(&self) -> RefreshState {
		match self.slot.lock().flight {
			Some(_) => RefreshState::InFlight,
			None => RefreshState::Idle,
		}
	}

	/// Counters for flights handled by this coordinator.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Opens a flight for `snapshot` unless one is already open.
	pub fn begin_if_idle(&self, snapshot: Arc<Credential>) -> Option<RefreshTicket> {
		let mut slot = self.slot.lock();

		if slot.flight.is_some() {
			return None;
		}

		slot.next_id += 1;

		let id = slot.next_id;

		slot.flight = Some(Flight { id, listeners: Vec::new() });

		drop(slot);
		self.metrics.record_attempt();

		Some(RefreshTicket {
			slot: self.slot.clone(),
			metrics: self.metrics.clone(),
			id,
			started_from: snapshot,
			settled: false,
		})
	}

	/// Attaches `listener` to the open flight.
	///
	/// Hands the listener back when the coordinator is idle.
	pub fn join(&self, listener: RefreshListener) -> Result<(), RefreshListener> {
		let mut slot = self.slot.lock();

		match slot.flight.as_mut() {
			Some(flight) => {
				flight.listeners.push(listener);

				drop(slot);
				self.metrics.record_join();

				Ok(())
			},
			None => Err(listener),
		}
	}
}

/// Exclusive handle on an open flight.
pub struct RefreshTicket {
	slot: Arc<Mutex<FlightSlot>>,
	metrics: Arc<RefreshMetrics>,
	id: u64,
	started_from: Arc<Credential>,
	settled: bool,
}
impl RefreshTicket {
	/// Credential snapshot the flight refreshes.
	pub fn started_from(&self) -> &Arc<Credential> {
		&self.started_from
	}

	/// Adds a listener to this flight.
	pub fn listen(&self, listener: RefreshListener) {
		match self.slot.lock().flight.as_mut() {
			Some(flight) if flight.id == self.id => flight.listeners.push(listener),
			_ => {},
		}
	}

	/// Applies the sub-responses of this flight and settles it.
	///
	/// The token response is mandatory. A failed or malformed permissions response keeps the
	/// previous permission sets and does not fail the refresh.
	pub fn resolve(
		self,
		store: &dyn CredentialStore,
		token: SubRequestResult,
		permissions: SubRequestResult,
		now: OffsetDateTime,
	) -> RefreshSettlement {
		let _span = PiggybackSpan::new(PiggybackKind::TokenRefresh, "resolve").entered();
		let settlement = self.apply(store, token, permissions, now).map_err(Arc::new);

		self.finish(settlement.clone());

		settlement
	}

	/// Settles the flight with `settlement` and notifies every listener.
	pub fn finish(mut self, settlement: RefreshSettlement) {
		self.settle(settlement);
	}

	/// Splits the ticket into the completions of the token and permissions sub-requests.
	///
	/// The flight resolves once both have fired; if either is dropped without firing, the
	/// flight settles as cancelled.
	pub fn into_completions(
		self,
		store: Arc<dyn CredentialStore>,
		clock: Arc<dyn Clock>,
	) -> (Completion, Completion) {
		let pending = Arc::new(Mutex::new(PendingResponses {
			ticket: Some(self),
			token: None,
			permissions: None,
		}));
		let token_pending = pending.clone();
		let token_store = store.clone();
		let token_clock = clock.clone();
		let token: Completion = Box::new(move |result: SubRequestResult| {
			PendingResponses::deliver(
				&token_pending,
				token_store.as_ref(),
				token_clock.as_ref(),
				|state| state.token = Some(result),
			);
		});
		let permissions: Completion = Box::new(move |result: SubRequestResult| {
			PendingResponses::deliver(&pending, store.as_ref(), clock.as_ref(), |state| {
				state.permissions = Some(result);
			});
		});

		(token, permissions)
	}

	fn apply(
		&self,
		store: &dyn CredentialStore,
		token: SubRequestResult,
		permissions: SubRequestResult,
		now: OffsetDateTime,
	) -> Result<RefreshSuccess> {
		let token = TokenRefreshResponse::parse(&token?)?;
		let permissions = match permissions
			.and_then(|body| PermissionsResponse::parse(&body).map_err(Error::from))
		{
			Ok(parsed) => Some(parsed),
			Err(err) => {
				obs::log_failure(PiggybackKind::PermissionsReload, &err);

				None
			},
		};
		let previous = self.started_from.as_ref();
		let update = CredentialUpdate {
			token: token.access_token,
			expires_at: token.expires_at,
			data_access_expires_at: token.data_access_expires_at,
			expired_permissions: permissions.as_ref().map(|parsed| parsed.expired.clone()),
			permissions: permissions.map(|parsed| (parsed.granted, parsed.declined)),
			graph_domain: token.graph_domain,
		};
		let next = previous.refreshed(update, now);

		if next.expires_at <= previous.expires_at {
			return Err(Error::NotExtended {
				previous: previous.expires_at,
				returned: next.expires_at,
			});
		}

		match store.compare_and_replace(&self.started_from, next.clone()) {
			ReplaceOutcome::Replaced => {},
			ReplaceOutcome::Changed | ReplaceOutcome::Missing => return Err(Error::Superseded),
		}

		let change = PermissionChange {
			previous_granted: previous.permissions.clone(),
			previous_declined: previous.declined_permissions.clone(),
			granted: next.permissions.clone(),
			declined: next.declined_permissions.clone(),
		};

		Ok(RefreshSuccess {
			credential: Arc::new(next),
			permission_change: change.is_changed().then_some(change),
		})
	}

	fn settle(&mut self, settlement: RefreshSettlement) {
		if self.settled {
			return;
		}

		self.settled = true;

		let listeners = {
			let mut slot = self.slot.lock();

			match slot.flight.take_if(|flight| flight.id == self.id) {
				Some(flight) => flight.listeners,
				None => Vec::new(),
			}
		};

		match &settlement {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_piggyback_outcome(PiggybackKind::TokenRefresh, PiggybackOutcome::Success);
			},
			Err(err) => {
				self.metrics.record_failure();
				obs::record_piggyback_outcome(PiggybackKind::TokenRefresh, PiggybackOutcome::Failure);
				obs::log_failure(PiggybackKind::TokenRefresh, err);
			},
		}

		for listener in listeners {
			listener(settlement.clone());
		}
	}
}
impl Drop for RefreshTicket {
	fn drop(&mut self) {
		self.settle(Err(Arc::new(Error::Cancelled)));
	}
}
impl Debug for RefreshTicket {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshTicket")
			.field("id", &self.id)
			.field("user_id", &self.started_from.user_id)
			.field("settled", &self.settled)
			.finish()
	}
}

#[derive(Default)]
struct FlightSlot {
	flight: Option<Flight>,
	next_id: u64,
}
impl Debug for FlightSlot {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FlightSlot")
			.field("flight", &self.flight.as_ref().map(|flight| flight.id))
			.field("listeners", &self.flight.as_ref().map_or(0, |flight| flight.listeners.len()))
			.finish()
	}
}

struct Flight {
	id: u64,
	listeners: Vec<RefreshListener>,
}

struct PendingResponses {
	ticket: Option<RefreshTicket>,
	token: Option<SubRequestResult>,
	permissions: Option<SubRequestResult>,
}
impl PendingResponses {
	fn deliver<F>(
		pending: &Mutex<PendingResponses>,
		store: &dyn CredentialStore,
		clock: &dyn Clock,
		record: F,
	) where
		F: FnOnce(&mut PendingResponses),
	{
		let ready = {
			let mut state = pending.lock();

			record(&mut state);

			if state.token.is_none() || state.permissions.is_none() {
				return;
			}

			state
				.ticket
				.take()
				.zip(state.token.take())
				.zip(state.permissions.take())
				.map(|((ticket, token), permissions)| (ticket, token, permissions))
		};

		if let Some((ticket, token, permissions)) = ready {
			ticket.resolve(store, token, permissions, clock.now());
		}
	}
}
