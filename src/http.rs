//! Transport primitives for session-aware requests.
//!
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack: it sends one fully-formed
//! [`HttpRequest`] and hands back a buffered [`HttpResponse`]. The session client never calls a
//! transport for anything else, so swapping reqwest for a custom client (or a scripted fake in
//! tests) only requires implementing [`HttpTransport::send`].

// std
use std::borrow::Cow;
#[cfg(feature = "reqwest")] use std::ops::Deref;
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// HTTP status signalling an expired or missing session.
pub const UNAUTHORIZED: u16 = 401;

/// Sends a request and returns status, headers, and the buffered body.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by every clone
/// of a session client. Transport failures are reported as [`TransportError`]; HTTP error
/// statuses are not failures at this layer.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Dispatches `request`.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// HTTP methods issued by the session client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	#[default]
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Ambient-credential policy attached to a request.
///
/// Session cookies coexist with bearer tokens, so every request the client builds includes them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CredentialsMode {
	#[default]
	/// Send cookies and other ambient credentials.
	Include,
}

/// Fully-formed outgoing request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL.
	pub url: Url,
	/// Header map keyed by lower-case name.
	pub headers: BTreeMap<String, String>,
	/// Serialized payload, if any.
	pub body: Option<Vec<u8>>,
	/// Ambient-credential policy.
	pub credentials: CredentialsMode,
}
impl HttpRequest {
	/// Looks up a header by (case-insensitive) name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Returns the `Authorization` header value, if present.
	pub fn authorization(&self) -> Option<&str> {
		self.header("authorization")
	}
}

/// Buffered response returned by a transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Reason phrase (may be empty, e.g. over HTTP/2).
	pub status_text: String,
	/// Header map keyed by lower-case name.
	pub headers: BTreeMap<String, String>,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Creates an empty response with the provided status.
	pub fn new(status: u16) -> Self {
		Self { status, ..Default::default() }
	}

	/// Sets the reason phrase.
	pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
		self.status_text = text.into();

		self
	}

	/// Adds a header; the name is lower-cased.
	pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
		self.headers.insert(name.to_ascii_lowercase(), value.into());

		self
	}

	/// Replaces the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// Looks up a header by (case-insensitive) name.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Whether the status is in the `2xx` range.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Whether the `content-type` header declares a JSON payload.
	pub fn is_json(&self) -> bool {
		self.header("content-type").is_some_and(|value| value.to_ascii_lowercase().contains("json"))
	}

	/// Body decoded as UTF-8, replacing invalid sequences.
	pub fn text(&self) -> Cow<'_, str> {
		String::from_utf8_lossy(&self.body)
	}
}

/// Reqwest-backed transport.
///
/// The default client keeps a cookie jar so session cookies travel with every request,
/// matching [`CredentialsMode::Include`]. Supply a custom client through
/// [`ReqwestTransport::with_client`]; enable its cookie store when the server relies on cookies.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	timeout: Option<Duration>,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport with a cookie-enabled client.
	pub fn new() -> Result<Self> {
		let client = ReqwestClient::builder()
			.cookie_store(true)
			.build()
			.map_err(crate::error::ConfigError::from)?;

		Ok(Self::with_client(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client, timeout: None }
	}

	/// Applies a per-request deadline; `None` leaves requests unbounded.
	pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.timeout = timeout;

		self
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.client
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let mut builder = self.client.request(reqwest_method(request.method), request.url);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}
			if let Some(timeout) = self.timeout {
				builder = builder.timeout(timeout);
			}

			let response = builder.send().await?;
			let status = response.status();
			let mut headers = BTreeMap::new();

			for (name, value) in response.headers() {
				let Ok(value) = value.to_str() else { continue };

				headers
					.entry(name.as_str().to_owned())
					.and_modify(|existing: &mut String| {
						existing.push_str(", ");
						existing.push_str(value);
					})
					.or_insert_with(|| value.to_owned());
			}

			let body = response.bytes().await?.to_vec();

			Ok(HttpResponse {
				status: status.as_u16(),
				status_text: status.canonical_reason().unwrap_or_default().to_owned(),
				headers,
				body,
			})
		})
	}
}

#[cfg(feature = "reqwest")]
fn reqwest_method(method: Method) -> reqwest::Method {
	match method {
		Method::Get => reqwest::Method::GET,
		Method::Post => reqwest::Method::POST,
		Method::Put => reqwest::Method::PUT,
		Method::Patch => reqwest::Method::PATCH,
		Method::Delete => reqwest::Method::DELETE,
	}
}
