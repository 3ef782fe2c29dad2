//! Bearer-session HTTP client that keeps every caller signed in: it attaches the stored access
//! token, refreshes an expired session exactly once no matter how many requests notice the 401,
//! retries the triggering request, and tears the session down cleanly when refresh fails.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod request;
pub mod response;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// self
	use crate::{
		config::SessionConfig,
		error::TransportError,
		http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
		session::{SessionClient, SessionExpiryHandler},
		store::MemoryStore,
	};

	type Responder =
		Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + 'static + Send + Sync>;

	/// Transport that answers every request through a closure and records what it saw.
	pub struct ScriptedTransport {
		responder: Responder,
		requests: Mutex<Vec<HttpRequest>>,
	}
	impl ScriptedTransport {
		/// Wraps a responder closure.
		pub fn new<F>(responder: F) -> Self
		where
			F: 'static + Send + Sync + Fn(&HttpRequest) -> Result<HttpResponse, TransportError>,
		{
			Self { responder: Box::new(responder), requests: Default::default() }
		}

		/// Replays queued responses per path, falling back to `404` once a queue drains.
		pub fn queued<I, P>(script: I) -> Self
		where
			I: IntoIterator<Item = (P, HttpResponse)>,
			P: Into<String>,
		{
			let mut queues: HashMap<String, VecDeque<HttpResponse>> = HashMap::new();

			for (path, response) in script {
				queues.entry(path.into()).or_default().push_back(response);
			}

			let queues = Mutex::new(queues);

			Self::new(move |request| {
				let next = queues
					.lock()
					.get_mut(request.url.path())
					.and_then(VecDeque::pop_front)
					.unwrap_or_else(|| HttpResponse::new(404));

				Ok(next)
			})
		}

		/// Returns every request dispatched so far.
		pub fn requests(&self) -> Vec<HttpRequest> {
			self.requests.lock().clone()
		}

		/// Returns the requests dispatched to `path`.
		pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
			self.requests.lock().iter().filter(|request| request.url.path() == path).cloned().collect()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
			let outcome = (self.responder)(&request);

			self.requests.lock().push(request);

			Box::pin(async move { outcome })
		}
	}

	/// Expiry handler that remembers every login location it was asked to open.
	#[derive(Debug, Default)]
	pub struct RecordingExpiryHandler(Mutex<Vec<String>>);
	impl RecordingExpiryHandler {
		/// Returns the recorded redirect targets.
		pub fn redirects(&self) -> Vec<String> {
			self.0.lock().clone()
		}
	}
	impl SessionExpiryHandler for RecordingExpiryHandler {
		fn on_session_expired(&self, login_location: &str) {
			self.0.lock().push(login_location.to_owned());
		}
	}

	/// Base URL used by scripted-transport tests.
	pub fn test_base_url() -> Url {
		Url::parse("https://app.example.com").expect("Failed to parse the test base URL.")
	}

	/// Builds a client over a scripted transport, an in-memory store, and a recording handler.
	pub fn build_scripted_client(
		transport: ScriptedTransport,
	) -> (
		SessionClient<ScriptedTransport>,
		Arc<ScriptedTransport>,
		Arc<MemoryStore>,
		Arc<RecordingExpiryHandler>,
	) {
		let config = SessionConfig::builder(test_base_url())
			.build()
			.expect("Default session config should build.");
		let transport = Arc::new(transport);
		let store = Arc::new(MemoryStore::default());
		let expiry = Arc::new(RecordingExpiryHandler::default());
		let client = SessionClient::with_transport(config, store.clone(), transport.clone())
			.with_expiry_handler(expiry.clone());

		(client, transport, store, expiry)
	}

	/// JSON response fixture.
	pub fn json_response(status: u16, body: Value) -> HttpResponse {
		HttpResponse::new(status)
			.with_header("content-type", "application/json")
			.with_body(body.to_string())
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
