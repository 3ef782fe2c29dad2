//! Single-flight session refresh.
//!
//! At most one refresh network call is outstanding per [`SessionClient`]. The first caller that
//! needs a refresh installs a fresh [`OnceCell`] in the shared slot and runs the call as the
//! cell's only initializer; concurrent callers clone the same cell and await its value. A drop
//! guard empties the slot once the call has returned, so a later, independent 401 starts a new
//! refresh instead of reusing a stale outcome. If the initializer is dropped before it returns,
//! the cell stays registered: a waiting caller takes over initialization, and later callers join
//! that refresh instead of starting another one.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use async_lock::OnceCell;
// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	error::DecodeError,
	http::{HttpTransport, Method},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	request::{self, RequestOptions},
	response,
	session::SessionClient,
};

type RefreshCell = Arc<OnceCell<RefreshOutcome>>;
type RefreshSlot = Mutex<Option<RefreshCell>>;

/// Result every waiter of one refresh observes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// A new token was stored.
	Refreshed,
	/// The refresh call failed and the credentials were cleared.
	Failed {
		/// Display form of the underlying failure.
		reason: String,
	},
}
impl RefreshOutcome {
	/// Whether the session now holds a fresh token.
	pub fn is_refreshed(&self) -> bool {
		matches!(self, Self::Refreshed)
	}
}

/// Owns the shared "refresh in progress" slot.
#[derive(Clone, Debug, Default)]
pub struct RefreshCoordinator {
	slot: Arc<RefreshSlot>,
	metrics: Arc<RefreshMetrics>,
}
impl RefreshCoordinator {
	/// Counters for refresh calls driven through this coordinator.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Whether a refresh is currently outstanding.
	pub fn is_pending(&self) -> bool {
		self.slot.lock().is_some()
	}

	/// Joins the outstanding refresh, or runs `refresh` as a new one.
	///
	/// `refresh` is invoked at most once per outstanding slot no matter how many callers arrive
	/// while it runs.
	pub async fn run<F, Fut>(&self, refresh: F) -> RefreshOutcome
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = RefreshOutcome>,
	{
		let (cell, joined) = self.pending_or_install();

		if joined {
			self.metrics.record_joined();
		}

		let slot = self.slot.as_ref();
		let current = &cell;
		cell.get_or_init(move || async move {
			let mut reset = SlotReset { slot, cell: current, settled: false };
			let outcome = refresh().await;

			reset.settled = true;

			outcome
		})
		.await
		.clone()
	}

	fn pending_or_install(&self) -> (RefreshCell, bool) {
		let mut slot = self.slot.lock();

		match slot.as_ref() {
			Some(cell) => (cell.clone(), true),
			None => {
				let cell = Arc::new(OnceCell::new());

				*slot = Some(cell.clone());

				(cell, false)
			},
		}
	}
}

/// Empties the slot once the refresh has returned.
///
/// A cancelled or panicking initializer leaves the cell registered so the caller that resumes
/// initialization stays the only outstanding refresh.
struct SlotReset<'a> {
	slot: &'a RefreshSlot,
	cell: &'a RefreshCell,
	settled: bool,
}
impl Drop for SlotReset<'_> {
	fn drop(&mut self) {
		if !self.settled {
			return;
		}

		let mut slot = self.slot.lock();

		if slot.as_ref().is_some_and(|pending| Arc::ptr_eq(pending, self.cell)) {
			*slot = None;
		}
	}
}

#[derive(Deserialize)]
struct RefreshedSession {
	#[serde(rename = "accessToken", alias = "access_token")]
	access_token: AccessToken,
	#[serde(default)]
	user: Option<Value>,
}

impl<T> SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Refreshes the session, joining the in-flight refresh when one exists.
	///
	/// On success the new token (and the user profile, when the endpoint returns one) is stored
	/// before any waiter resumes. On failure the token and cached profile are cleared.
	pub async fn refresh_session(&self) -> RefreshOutcome {
		self.refresh.run(|| self.perform_refresh()).await
	}

	async fn perform_refresh(&self) -> RefreshOutcome {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_session", &self.config.refresh_path);
		let metrics = self.refresh.metrics();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		metrics.record_attempt();

		span.instrument(async move {
			match self.request_new_session().await {
				Ok(()) => {
					metrics.record_success();
					obs::record_flow_outcome(KIND, FlowOutcome::Success);

					RefreshOutcome::Refreshed
				},
				Err(err) => {
					obs::warn_event(KIND, "Session refresh failed; clearing credentials.", &err);

					if let Err(clear_err) = self.credentials.clear() {
						obs::warn_event(KIND, "Failed to clear credentials.", &clear_err);
					}

					metrics.record_failure();
					obs::record_flow_outcome(KIND, FlowOutcome::Failure);

					RefreshOutcome::Failed { reason: err.to_string() }
				},
			}
		})
		.await
	}

	// Goes straight to the transport: a 401 here is a failure, never another refresh.
	async fn request_new_session(&self) -> Result<()> {
		let request = request::build_request(
			&self.config.base_url,
			&self.config.refresh_path,
			&RequestOptions::new(Method::Post),
			None,
		)?;
		let response = self.transport.send(request).await?;

		if !response.is_success() {
			return Err(response::api_error(&response).into());
		}

		let status = response.status;
		let session: RefreshedSession = serde_path_to_error::deserialize(
			&mut serde_json::Deserializer::from_slice(&response.body),
		)
		.map_err(|source| DecodeError::Shape { status, source })?;

		if session.access_token.is_blank() {
			return Err(DecodeError::EmptyField { status, field: "accessToken" }.into());
		}

		self.credentials.set_token(Some(&session.access_token))?;

		if let Some(user) = session.user.as_ref() {
			self.credentials.set_user(Some(user))?;
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		_preludet::*,
		http::HttpResponse,
		store::KeyValueStore,
	};

	#[tokio::test]
	async fn concurrent_callers_share_one_refresh() {
		let coordinator = RefreshCoordinator::default();
		let counter = AtomicUsize::new(0);
		let calls = &counter;
		let refresh = move || async move {
			calls.fetch_add(1, Ordering::SeqCst);
			tokio::task::yield_now().await;

			RefreshOutcome::Refreshed
		};
		let (first, second, third) =
			tokio::join!(coordinator.run(refresh), coordinator.run(refresh), coordinator.run(refresh));

		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(first.is_refreshed() && second.is_refreshed() && third.is_refreshed());
		assert_eq!(coordinator.metrics().joined(), 2);
		assert!(!coordinator.is_pending());
	}

	#[tokio::test]
	async fn slot_resets_after_each_outcome() {
		let coordinator = RefreshCoordinator::default();
		let counter = AtomicUsize::new(0);
		let calls = &counter;
		let failing = move || async move {
			calls.fetch_add(1, Ordering::SeqCst);

			RefreshOutcome::Failed { reason: "denied".into() }
		};

		assert_eq!(coordinator.run(failing).await, RefreshOutcome::Failed {
			reason: "denied".into()
		});
		assert!(!coordinator.is_pending());
		assert!(!coordinator.run(failing).await.is_refreshed());
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[derive(Default)]
	struct Tracker {
		calls: AtomicUsize,
		in_flight: AtomicUsize,
		max_in_flight: AtomicUsize,
	}

	struct InFlight(Arc<Tracker>);
	impl Drop for InFlight {
		fn drop(&mut self) {
			self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
		}
	}

	async fn tracked_refresh(tracker: Arc<Tracker>) -> RefreshOutcome {
		tracker.calls.fetch_add(1, Ordering::SeqCst);

		let now = tracker.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

		tracker.max_in_flight.fetch_max(now, Ordering::SeqCst);

		let _in_flight = InFlight(tracker);

		tokio::time::sleep(Duration::from_millis(50)).await;

		RefreshOutcome::Refreshed
	}

	fn spawn_refresh(
		coordinator: &RefreshCoordinator,
		tracker: &Arc<Tracker>,
	) -> tokio::task::JoinHandle<RefreshOutcome> {
		let coordinator = coordinator.clone();
		let tracker = tracker.clone();

		tokio::spawn(async move { coordinator.run(move || tracked_refresh(tracker)).await })
	}

	#[tokio::test]
	async fn dropped_refresh_does_not_wedge_the_slot() {
		let coordinator = RefreshCoordinator::default();
		let stalled = tokio::time::timeout(
			Duration::from_millis(10),
			coordinator.run(|| std::future::pending::<RefreshOutcome>()),
		)
		.await;

		assert!(stalled.is_err());
		assert!(coordinator.run(|| async { RefreshOutcome::Refreshed }).await.is_refreshed());
		assert!(!coordinator.is_pending());
	}

	#[tokio::test]
	async fn cancelled_leader_hands_off_to_one_waiter() {
		let coordinator = RefreshCoordinator::default();
		let tracker = Arc::new(Tracker::default());
		let leader = spawn_refresh(&coordinator, &tracker);

		tokio::time::sleep(Duration::from_millis(10)).await;

		let waiter = spawn_refresh(&coordinator, &tracker);

		tokio::time::sleep(Duration::from_millis(10)).await;
		leader.abort();

		assert!(leader.await.is_err());
		assert!(coordinator.is_pending());

		let late = coordinator.run(|| tracked_refresh(tracker.clone())).await;

		assert!(late.is_refreshed());
		assert!(waiter.await.expect("Waiter task should not panic.").is_refreshed());
		assert_eq!(tracker.calls.load(Ordering::SeqCst), 2);
		assert_eq!(tracker.max_in_flight.load(Ordering::SeqCst), 1);
		assert!(!coordinator.is_pending());
	}

	#[tokio::test]
	async fn refresh_persists_token_and_profile() {
		let (client, transport, store, _) = build_scripted_client(ScriptedTransport::queued([(
			"/api/auth/refresh",
			json_response(
				200,
				serde_json::json!({ "accessToken": "fresh", "user": { "id": 1, "name": "Ada" } }),
			),
		)]));

		assert!(client.refresh_session().await.is_refreshed());
		assert_eq!(
			store.get_item("accessToken").expect("Reading the token should succeed."),
			Some("fresh".into())
		);
		assert_eq!(
			client.credentials.user_value().expect("Reading the user should succeed."),
			Some(serde_json::json!({ "id": 1, "name": "Ada" }))
		);

		let sent = transport.requests_to("/api/auth/refresh");

		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].method, Method::Post);
		assert_eq!(sent[0].authorization(), None);
		assert_eq!(client.refresh_metrics().successes(), 1);
	}

	#[tokio::test]
	async fn refresh_without_profile_keeps_cached_profile() {
		let (client, _, _, _) = build_scripted_client(ScriptedTransport::queued([(
			"/api/auth/refresh",
			json_response(200, serde_json::json!({ "access_token": "snake" })),
		)]));

		client
			.credentials
			.set_user(Some(&serde_json::json!({ "id": 2 })))
			.expect("Seeding the user should succeed.");

		assert!(client.refresh_session().await.is_refreshed());
		assert_eq!(
			client.access_token().expect("Reading the token should succeed.").map(|t| t.expose().to_owned()),
			Some("snake".into())
		);
		assert_eq!(
			client.credentials.user_value().expect("Reading the user should succeed."),
			Some(serde_json::json!({ "id": 2 }))
		);
	}

	#[tokio::test]
	async fn failed_or_malformed_refresh_clears_credentials() {
		let cases = [
			HttpResponse::new(401).with_status_text("Unauthorized"),
			json_response(200, serde_json::json!({ "user": { "id": 3 } })),
			json_response(200, serde_json::json!({ "accessToken": "" })),
		];

		for response in cases {
			let (client, _, store, _) =
				build_scripted_client(ScriptedTransport::queued([("/api/auth/refresh", response)]));

			client.set_access_token(Some("stale".into())).expect("Seeding the token should succeed.");
			client
				.credentials
				.set_user(Some(&serde_json::json!({ "id": 3 })))
				.expect("Seeding the user should succeed.");

			assert!(!client.refresh_session().await.is_refreshed());
			assert!(store.is_empty());
			assert_eq!(client.refresh_metrics().failures(), 1);
		}
	}
}
