// std
use std::{
	sync::{
		Arc, OnceLock,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use serde_json::{Value, json};
use url::Url;
// self
use session_broker::{
	config::SessionConfig,
	http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	session::{RefreshMetrics, SessionClient},
	store::MemoryStore,
};

const CALLERS: usize = 5;
const REFRESH_PATH: &str = "/api/auth/refresh";

/// Rejects stale tokens and holds the refresh open until the expected callers have joined it.
struct GatedBackend {
	metrics: OnceLock<Arc<RefreshMetrics>>,
	joiners: u64,
	refreshes: AtomicUsize,
	refresh_status: u16,
}
impl GatedBackend {
	fn new(joiners: usize, refresh_status: u16) -> Self {
		Self {
			metrics: OnceLock::new(),
			joiners: joiners as u64,
			refreshes: AtomicUsize::new(0),
			refresh_status,
		}
	}

	fn json(status: u16, body: Value) -> HttpResponse {
		HttpResponse::new(status)
			.with_header("content-type", "application/json")
			.with_body(body.to_string())
	}
}
impl HttpTransport for GatedBackend {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			if request.url.path() == REFRESH_PATH {
				self.refreshes.fetch_add(1, Ordering::SeqCst);

				if let Some(metrics) = self.metrics.get() {
					while metrics.joined() < self.joiners {
						tokio::time::sleep(Duration::from_millis(5)).await;
					}
				}
				if self.refresh_status != 200 {
					return Ok(HttpResponse::new(self.refresh_status));
				}

				return Ok(Self::json(200, json!({ "accessToken": "new-token" })));
			}

			match request.authorization() {
				Some("Bearer new-token") =>
					Ok(Self::json(200, json!({ "path": request.url.path() }))),
				_ => Ok(Self::json(401, json!({ "message": "Token expired" }))),
			}
		})
	}
}

fn build_client(
	backend: Arc<GatedBackend>,
) -> (SessionClient<GatedBackend>, Arc<MemoryStore>, Arc<AtomicUsize>) {
	let config = SessionConfig::builder(
		Url::parse("https://app.example.com").expect("Base URL fixture should parse."),
	)
	.build()
	.expect("Session config should build.");
	let store = Arc::new(MemoryStore::default());
	let expired = Arc::new(AtomicUsize::new(0));
	let counter = expired.clone();
	let client = <SessionClient<GatedBackend>>::with_transport(config, store.clone(), backend.clone())
		.with_expiry_handler(Arc::new(move |_: &str| {
			counter.fetch_add(1, Ordering::SeqCst);
		}));

	client.set_access_token(Some("old-token".into())).expect("Seeding the token should succeed.");

	let _ = backend.metrics.set(client.refresh_metrics().clone());

	(client, store, expired)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_401s_share_a_single_refresh() {
	let backend = Arc::new(GatedBackend::new(CALLERS - 1, 200));
	let (client, _, expired) = build_client(backend.clone());
	let handles = (0..CALLERS)
		.map(|i| {
			let client = client.clone();

			tokio::spawn(async move { client.get::<Value>(&format!("/api/items/{i}")).await })
		})
		.collect::<Vec<_>>();

	for (i, handle) in handles.into_iter().enumerate() {
		let body = tokio::time::timeout(Duration::from_secs(5), handle)
			.await
			.expect("Caller should finish.")
			.expect("Caller task should not panic.")
			.expect("Caller should recover after the refresh.");

		assert_eq!(body, json!({ "path": format!("/api/items/{i}") }));
	}

	assert_eq!(backend.refreshes.load(Ordering::SeqCst), 1);
	assert_eq!(client.refresh_metrics().attempts(), 1);
	assert_eq!(client.refresh_metrics().joined(), (CALLERS - 1) as u64);
	assert_eq!(expired.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_401s_share_a_single_failure() {
	let backend = Arc::new(GatedBackend::new(CALLERS - 1, 403));
	let (client, store, expired) = build_client(backend.clone());
	let handles = (0..CALLERS)
		.map(|i| {
			let client = client.clone();

			tokio::spawn(async move { client.get::<Value>(&format!("/api/items/{i}")).await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let err = tokio::time::timeout(Duration::from_secs(5), handle)
			.await
			.expect("Caller should finish.")
			.expect("Caller task should not panic.")
			.expect_err("Caller should observe the expired session.");

		assert_eq!(err.status(), Some(401));
	}

	assert_eq!(backend.refreshes.load(Ordering::SeqCst), 1);
	assert_eq!(client.refresh_metrics().failures(), 1);
	assert_eq!(expired.load(Ordering::SeqCst), CALLERS);
	assert!(store.is_empty());
}

#[tokio::test]
async fn later_expiry_starts_a_new_refresh() {
	let backend = Arc::new(GatedBackend::new(0, 200));
	let (client, _, _) = build_client(backend.clone());

	client.get::<Value>("/api/items/1").await.expect("First expiry should recover.");
	client.set_access_token(Some("old-token".into())).expect("Re-seeding the token should succeed.");
	client.get::<Value>("/api/items/2").await.expect("Second expiry should recover.");

	assert_eq!(backend.refreshes.load(Ordering::SeqCst), 2);
	assert_eq!(client.refresh_metrics().joined(), 0);
}
