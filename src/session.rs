//! Session-aware client: bearer attachment, single-flight refresh, and retry-once.
//!
//! Every call reads the access token from the credential store right before it is sent. A `401`
//! from a path outside the authentication surface triggers [`SessionClient::refresh_session`];
//! concurrent callers join the same refresh, then each retries its own request exactly once with
//! the token the refresh stored. When the refresh fails, or the retry is rejected again, the
//! credentials are wiped, the [`SessionExpiryHandler`] receives the login location, and the
//! caller gets the [`ApiError`](crate::error::ApiError) of the failing response.

mod expiry;

pub mod refresh;

pub use expiry::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	config::SessionConfig,
	http::{HttpResponse, HttpTransport, Method, UNAUTHORIZED},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	request::{self, RequestBody, RequestOptions},
	response,
	store::{CredentialStore, KeyValueStore},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Session client specialized for the crate's default reqwest transport.
pub type ReqwestSessionClient = SessionClient<ReqwestTransport>;

/// Issues authenticated requests and keeps the session alive across token expiry.
///
/// Clones share the transport, the credential store, and the refresh slot, so a refresh started
/// by one clone is joined by every other clone.
pub struct SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Transport used for every outbound request, including the refresh call.
	pub transport: Arc<T>,
	/// Typed view over the persisted token and user profile.
	pub credentials: CredentialStore,
	/// Paths, keys, and timeouts this client was built with.
	pub config: SessionConfig,
	/// Hook invoked once credentials are wiped after an unrecoverable `401`.
	pub expiry_handler: Arc<dyn SessionExpiryHandler>,
	pub(crate) refresh: RefreshCoordinator,
}
impl<T> SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client over a caller-provided transport.
	///
	/// Session expiry is ignored until a handler is attached through
	/// [`SessionClient::with_expiry_handler`].
	pub fn with_transport(
		config: SessionConfig,
		store: Arc<dyn KeyValueStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		let credentials = CredentialStore::new(store).with_keys(config.credential_keys.clone());

		Self {
			transport: transport.into(),
			credentials,
			config,
			expiry_handler: Arc::new(IgnoreExpiry),
			refresh: Default::default(),
		}
	}

	/// Sets or replaces the session-expiry hook.
	pub fn with_expiry_handler(mut self, handler: Arc<dyn SessionExpiryHandler>) -> Self {
		self.expiry_handler = handler;

		self
	}

	/// Counters for refresh calls issued by this client and its clones.
	pub fn refresh_metrics(&self) -> &Arc<RefreshMetrics> {
		self.refresh.metrics()
	}

	/// Reads the stored access token.
	pub fn access_token(&self) -> Result<Option<AccessToken>> {
		Ok(self.credentials.token()?)
	}

	/// Stores `token`, or removes the stored token when `None`.
	pub fn set_access_token(&self, token: Option<AccessToken>) -> Result<()> {
		Ok(self.credentials.set_token(token.as_ref())?)
	}

	/// Reads the cached user profile as `U`.
	pub fn user<U>(&self) -> Result<Option<U>>
	where
		U: DeserializeOwned,
	{
		Ok(self.credentials.user()?)
	}

	/// Stores `user`, or removes the cached profile when `None`.
	pub fn set_user(&self, user: Option<&Value>) -> Result<()> {
		Ok(self.credentials.set_user(user)?)
	}

	/// Clears the token and the cached profile.
	pub fn logout(&self) -> Result<()> {
		Ok(self.credentials.clear()?)
	}

	/// Sends a `GET` and decodes the body.
	pub async fn get<R>(&self, path: &str) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.request(path, RequestOptions::new(Method::Get)).await
	}

	/// Sends a `POST` with `body` and decodes the response.
	pub async fn post<R>(&self, path: &str, body: impl Into<RequestBody>) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.request(path, RequestOptions::new(Method::Post).with_body(body)).await
	}

	/// Sends a `PUT` with `body` and decodes the response.
	pub async fn put<R>(&self, path: &str, body: impl Into<RequestBody>) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.request(path, RequestOptions::new(Method::Put).with_body(body)).await
	}

	/// Sends a `PATCH` with `body` and decodes the response.
	pub async fn patch<R>(&self, path: &str, body: impl Into<RequestBody>) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.request(path, RequestOptions::new(Method::Patch).with_body(body)).await
	}

	/// Sends a `DELETE` and decodes the body.
	pub async fn delete<R>(&self, path: &str) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.request(path, RequestOptions::new(Method::Delete)).await
	}

	/// Runs the full pipeline for `options` and decodes the final response into `R`.
	///
	/// Non-`2xx` responses become [`Error::Api`]; empty successes decode from JSON `null`, so
	/// `()` and `Option<_>` accept them.
	pub async fn request<R>(&self, path: &str, options: RequestOptions) -> Result<R>
	where
		R: DeserializeOwned,
	{
		let response = self.fetch(path, options).await?;

		response::classify(response)?.decode()
	}

	/// Runs the authentication pipeline and returns the final response, whatever its status.
	///
	/// Fails only on transport errors, invalid request inputs, and unrecoverable authentication
	/// failures (refresh failed, or the retry was rejected again).
	pub async fn fetch(&self, path: &str, options: RequestOptions) -> Result<HttpResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "fetch", path);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.execute(path, &options)).await;
		let outcome = match &result {
			Ok(response) if response.is_success() => FlowOutcome::Success,
			_ => FlowOutcome::Failure,
		};

		obs::record_flow_outcome(KIND, outcome);

		result
	}

	async fn execute(&self, path: &str, options: &RequestOptions) -> Result<HttpResponse> {
		let response = self.send_once(path, options).await?;

		if response.status != UNAUTHORIZED || self.config.is_exempt(path) {
			return Ok(response);
		}
		if let RefreshOutcome::Failed { .. } = self.refresh_session().await {
			return Err(self.expire_session(&response));
		}

		obs::debug_event(FlowKind::Request, "Session refreshed; retrying request.");

		let retried = self.send_once(path, options).await?;

		if retried.status == UNAUTHORIZED {
			return Err(self.expire_session(&retried));
		}

		Ok(retried)
	}

	async fn send_once(&self, path: &str, options: &RequestOptions) -> Result<HttpResponse> {
		let token = self.credentials.token()?;
		let request = request::build_request(&self.config.base_url, path, options, token.as_ref())?;

		Ok(self.transport.send(request).await?)
	}

	fn expire_session(&self, response: &HttpResponse) -> Error {
		obs::warn_event(FlowKind::Request, "Session expired.", &response.status);

		if let Err(err) = self.credentials.clear() {
			obs::warn_event(FlowKind::Request, "Failed to clear credentials.", &err);
		}

		self.expiry_handler.on_session_expired(&self.config.login_location);
		obs::record_flow_outcome(FlowKind::Request, FlowOutcome::Expired);

		response::api_error(response).into()
	}
}
#[cfg(feature = "reqwest")]
impl SessionClient<ReqwestTransport> {
	/// Creates a client backed by a cookie-enabled reqwest transport.
	///
	/// The transport applies [`SessionConfig::request_timeout`] to every call, the refresh
	/// included.
	pub fn new(config: SessionConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
		let transport = ReqwestTransport::new()?.with_timeout(config.request_timeout);

		Ok(Self::with_transport(config, store, transport))
	}
}
impl<T> Clone for SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			credentials: self.credentials.clone(),
			config: self.config.clone(),
			expiry_handler: self.expiry_handler.clone(),
			refresh: self.refresh.clone(),
		}
	}
}
impl<T> Debug for SessionClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("refresh_path", &self.config.refresh_path)
			.field("credentials", &self.credentials)
			.field("refresh_pending", &self.refresh.is_pending())
			.finish()
	}
}
