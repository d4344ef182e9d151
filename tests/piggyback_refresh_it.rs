mod common;

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use parking_lot::Mutex;
use serde_json::json;
use time::Duration;
// self
use common::*;
use graph_piggyback::{
	auth::PermissionChange,
	connection::{Connection, PiggybackKind, RequestBatch, SubRequest, SubRequestResult},
	error::{Error, TransportError},
	piggyback::{PiggybackDecision, PiggybackManager, SkipReason},
	refresh::{RefreshSettlement, RefreshState},
	store::{ConfigCache, CredentialStore},
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_preparations_attach_a_single_refresh() {
	let Harness { manager, store, .. } =
		harness(Some(credential("token-a", Duration::days(3), Duration::days(30))));
	let mut tasks = Vec::new();

	for i in 0..16 {
		let manager = manager.clone();

		tasks.push(tokio::spawn(async move {
			tokio::task::yield_now().await;

			let mut batch = primary_batch(&format!("batch-{i}"));
			let report = manager.add_piggyback_requests(&mut batch);

			(batch, report)
		}));
	}

	let mut batches = Vec::new();

	for task in tasks {
		batches.push(task.await.expect("Preparation task should not panic."));
	}

	let attached = batches
		.iter()
		.filter(|(batch, _)| count(batch, PiggybackKind::TokenRefresh) == 1)
		.count();

	assert_eq!(attached, 1);
	assert!(batches.iter().all(|(batch, _)| count(batch, PiggybackKind::TokenRefresh) <= 1));
	assert_eq!(manager.coordinator().metrics().attempts(), 1);

	let before = store.current().expect("Credential should be present.");

	for (batch, report) in batches {
		if report.refresh.is_attached() {
			tokio::spawn(async move {
				batch.dispatch(|request| match request.piggyback {
					Some(PiggybackKind::TokenRefresh) =>
						Ok(extended_token("token-b", Duration::days(60))),
					Some(PiggybackKind::PermissionsReload) =>
						Ok(permissions(&["public_profile", "email"], &[])),
					_ => Ok(json!({})),
				});
			})
			.await
			.expect("Dispatch task should not panic.");
		}
	}

	let after = store.current().expect("Credential should be present.");

	assert_eq!(after.token.expose(), "token-b");
	assert!(after.expires_at > before.expires_at);
	assert_eq!(after.user_id, before.user_id);
	assert_eq!(manager.coordinator().state(), RefreshState::Idle);
}

#[test]
fn cancelled_connection_releases_every_waiter() {
	let Harness { manager, store, .. } =
		harness(Some(credential("token-a", Duration::days(3), Duration::days(30))));
	let before = store.current().expect("Credential should be present.");
	let mut carrier = primary_batch("carrier");
	let cancelled = Arc::new(AtomicUsize::new(0));

	assert!(manager.add_refresh_piggyback(&mut carrier, None).is_attached());

	for _ in 0..3 {
		let cancelled = cancelled.clone();

		manager
			.coordinator()
			.join(Box::new(move |settlement: RefreshSettlement| {
				if settlement.err().is_some_and(|err| matches!(*err, Error::Cancelled)) {
					cancelled.fetch_add(1, Ordering::SeqCst);
				}
			}))
			.unwrap_or_else(|_| panic!("Join should succeed while the refresh is in flight."));
	}

	drop(carrier);

	assert_eq!(cancelled.load(Ordering::SeqCst), 3);
	assert_eq!(manager.coordinator().state(), RefreshState::Idle);
	assert_eq!(store.current(), Some(before));

	let mut next = primary_batch("next");

	assert!(manager.add_refresh_piggyback(&mut next, None).is_attached());
}

fn failed_token_response(case: usize) -> SubRequestResult {
	match case {
		0 => Err(TransportError::status(400, "Invalid OAuth access token.").into()),
		1 => Ok(json!({ "access_token": 42 })),
		_ => Ok(json!({ "access_token": "token-b" })),
	}
}

#[test]
fn failed_refreshes_are_side_effect_free() {
	for case in 0..3 {
		let Harness { manager, store, .. } =
			harness(Some(credential("token-a", Duration::days(3), Duration::days(30))));
		let before = store.current().expect("Credential should be present.");
		let mut batch = primary_batch("batch-1");

		manager.add_refresh_piggyback(&mut batch, None);
		batch.dispatch(|request| match request.piggyback {
			Some(PiggybackKind::TokenRefresh) => failed_token_response(case),
			_ => Ok(permissions(&["public_profile"], &["email"])),
		});

		let after = store.current().expect("Credential should be present.");

		assert_eq!(*after, *before);
		assert_eq!(manager.coordinator().metrics().failures(), 1);
		assert_eq!(manager.coordinator().state(), RefreshState::Idle);
	}
}

#[test]
fn permission_reload_failure_still_applies_the_token() {
	let Harness { manager, store, clock, .. } =
		harness(Some(credential("token-a", Duration::days(3), Duration::days(30))));
	let before = store.current().expect("Credential should be present.");
	let mut batch = primary_batch("batch-1");

	manager.add_refresh_piggyback(&mut batch, None);
	clock.advance(Duration::seconds(2));

	assert!(batch.resolve(
		"piggyback_permissions_reload",
		Err(TransportError::status(500, "Internal").into())
	));
	assert!(batch.resolve(
		"piggyback_token_refresh",
		Ok(extended_token("token-b", Duration::days(60)))
	));

	let after = store.current().expect("Credential should be present.");

	assert_eq!(after.token.expose(), "token-b");
	assert_eq!(after.permissions, before.permissions);
	assert_eq!(after.refreshed_at, NOW + Duration::seconds(2));
	assert_eq!(manager.coordinator().metrics().successes(), 1);
}

#[test]
fn handler_receives_the_permission_diff_once() {
	let Harness { manager, .. } =
		harness(Some(credential("token-a", Duration::days(3), Duration::days(30))));
	let changes = Arc::new(Mutex::new(Vec::new()));
	let seen = changes.clone();
	let mut batch = primary_batch("batch-1");

	assert_eq!(
		manager.add_refresh_piggyback(
			&mut batch,
			Some(Box::new(move |change: PermissionChange| seen.lock().push(change))),
		),
		PiggybackDecision::Attached
	);

	batch.dispatch(|request| match request.piggyback {
		Some(PiggybackKind::TokenRefresh) => Ok(extended_token("token-b", Duration::days(60))),
		Some(PiggybackKind::PermissionsReload) =>
			Ok(permissions(&["public_profile", "user_friends"], &["email"])),
		_ => Ok(json!({})),
	});

	let changes = changes.lock();

	assert_eq!(changes.len(), 1);
	assert!(changes[0].newly_granted().contains("user_friends"));
	assert!(changes[0].newly_declined().contains("email"));
	assert!(!changes[0].granted.contains("email"));
}

#[test]
fn login_during_refresh_wins_over_the_stale_flight() {
	let Harness { manager, store, .. } =
		harness(Some(credential("token-a", Duration::days(3), Duration::days(30))));
	let mut batch = primary_batch("batch-1");

	manager.add_refresh_piggyback(&mut batch, None);
	store.replace(Some(credential("token-login", Duration::ZERO, Duration::days(60))));
	batch.dispatch(|request| match request.piggyback {
		Some(PiggybackKind::TokenRefresh) => Ok(extended_token("token-b", Duration::days(90))),
		_ => Ok(permissions(&["public_profile"], &[])),
	});

	assert_eq!(
		store.current().expect("Credential should be present.").token.expose(),
		"token-login"
	);
	assert_eq!(manager.coordinator().metrics().failures(), 1);
}

#[test]
fn same_token_login_during_refresh_is_not_overwritten() {
	let Harness { manager, store, .. } =
		harness(Some(credential("token-a", Duration::days(3), Duration::days(2))));
	let mut batch = primary_batch("batch-1");

	assert!(manager.add_refresh_piggyback(&mut batch, None).is_attached());

	store.replace(Some(credential("token-a", Duration::ZERO, Duration::days(90))));

	let fresher = store.current().expect("Credential should be present.");

	batch.dispatch(|request| match request.piggyback {
		Some(PiggybackKind::TokenRefresh) => Ok(extended_token("token-a", Duration::days(60))),
		_ => Ok(permissions(&["public_profile"], &[])),
	});

	let after = store.current().expect("Credential should be present.");

	assert!(Arc::ptr_eq(&after, &fresher));
	assert_eq!(after.expires_at, NOW + Duration::days(90));
	assert_eq!(after.permissions, fresher.permissions);
	assert_eq!(manager.coordinator().metrics().failures(), 1);
}

#[test]
fn managers_sharing_a_store_share_one_refresh() {
	let Harness { manager: first, store, cache, clock } =
		harness(Some(credential("token-a", Duration::days(3), Duration::days(30))));
	let second = PiggybackManager::builder(store.clone(), cache)
		.app_id(app_id())
		.clock(clock)
		.build()
		.expect("Second manager should build.");
	let mut carrier = primary_batch("carrier");
	let mut other = primary_batch("other");
	let handled = Arc::new(AtomicUsize::new(0));
	let handled_by_second = handled.clone();

	assert!(first.add_refresh_piggyback_if_stale(&mut carrier).is_attached());
	assert_eq!(
		second.add_refresh_piggyback_if_stale(&mut other),
		PiggybackDecision::Skipped(SkipReason::RefreshInFlight)
	);
	assert_eq!(
		second.add_refresh_piggyback(
			&mut other,
			Some(Box::new(move |_: PermissionChange| {
				handled_by_second.fetch_add(1, Ordering::SeqCst);
			})),
		),
		PiggybackDecision::Joined
	);
	assert_eq!(
		count(&carrier, PiggybackKind::TokenRefresh) + count(&other, PiggybackKind::TokenRefresh),
		1
	);
	assert_eq!(second.coordinator().state(), RefreshState::InFlight);

	carrier.dispatch(|request| match request.piggyback {
		Some(PiggybackKind::TokenRefresh) => Ok(extended_token("token-b", Duration::days(60))),
		Some(PiggybackKind::PermissionsReload) =>
			Ok(permissions(&["public_profile", "email", "user_friends"], &[])),
		_ => Ok(json!({})),
	});

	assert_eq!(store.current().expect("Credential should be present.").token.expose(), "token-b");
	assert_eq!(handled.load(Ordering::SeqCst), 1);
	assert_eq!(first.coordinator().metrics().attempts(), 1);
	assert_eq!(second.coordinator().state(), RefreshState::Idle);
}

#[test]
fn failed_piggybacks_leave_the_primary_result_untouched() {
	let Harness { manager, store, cache, .. } =
		harness(Some(credential("token-a", Duration::days(3), Duration::days(30))));
	let before = store.current().expect("Credential should be present.");
	let primary_results = Arc::new(Mutex::new(Vec::new()));
	let recorder = primary_results.clone();
	let mut batch = RequestBatch::new("batch-1");

	batch.add_sub_request(
		SubRequest::new("me", "me"),
		Box::new(move |result: SubRequestResult| {
			recorder.lock().push(result.map_err(|err| err.to_string()));
		}),
	);

	let report = manager.add_piggyback_requests(&mut batch);

	assert!(report.refresh.is_attached());
	assert!(report.configuration.is_attached());

	batch.dispatch(|request| match request.piggyback {
		None => Ok(json!({ "id": "user-42" })),
		Some(PiggybackKind::TokenRefresh) =>
			Err(TransportError::status(400, "Invalid OAuth access token.").into()),
		Some(PiggybackKind::PermissionsReload) => Ok(json!({ "data": "not-a-list" })),
		Some(PiggybackKind::ServerConfiguration) =>
			Ok(json!({ "id": "1234567890", "app_events_feature_bitmask": "five" })),
	});

	assert_eq!(*primary_results.lock(), vec![Ok(json!({ "id": "user-42" }))]);
	assert_eq!(store.current(), Some(before));
	assert!(cache.get(&app_id()).is_none());
	assert_eq!(manager.coordinator().state(), RefreshState::Idle);
}

#[test]
fn scenarios_around_the_minimum_refresh_interval() {
	let recent = harness(Some(credential("token-a", Duration::hours(2), Duration::hours(1))));
	let mut batch = primary_batch("recent");

	assert_eq!(
		recent.manager.add_refresh_piggyback_if_stale(&mut batch),
		PiggybackDecision::Skipped(SkipReason::Fresh)
	);
	assert_eq!(batch.sub_requests().len(), 1);

	let aged = harness(Some(credential("token-a", Duration::hours(25), Duration::days(30))));
	let mut batch = primary_batch("aged");

	assert!(aged.manager.add_refresh_piggyback_if_stale(&mut batch).is_attached());
	assert!(!aged.manager.add_refresh_piggyback_if_stale(&mut batch).is_attached());
	assert_eq!(count(&batch, PiggybackKind::TokenRefresh), 1);
	assert_eq!(count(&batch, PiggybackKind::PermissionsReload), 1);

	let anonymous = harness(None);

	for id in ["first", "second"] {
		let mut batch: RequestBatch = primary_batch(id);

		anonymous.manager.add_piggyback_requests(&mut batch);

		assert_eq!(count(&batch, PiggybackKind::TokenRefresh), 0);
	}
}
