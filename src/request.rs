//! Request descriptors and the builder that turns them into [`HttpRequest`] values.

// self
use crate::{
	_prelude::*,
	auth::AccessToken,
	error::ConfigError,
	http::{CredentialsMode, HttpRequest, Method},
};

const AUTHORIZATION: &str = "authorization";
const CONTENT_TYPE: &str = "content-type";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Payload kinds accepted by the request builder.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestBody {
	#[default]
	/// No payload.
	Empty,
	/// Structured payload, serialized with `content-type: application/json`.
	Json(Value),
	/// Pre-serialized text, sent unchanged.
	Text(String),
	/// Binary payload, sent unchanged with an optional content type.
	Bytes {
		/// Raw bytes.
		data: Vec<u8>,
		/// Content type to declare, if any.
		content_type: Option<String>,
	},
}
impl RequestBody {
	/// Serializes any [`Serialize`] value into a JSON body.
	pub fn json<S>(value: &S) -> Result<Self>
	where
		S: ?Sized + Serialize,
	{
		let value =
			serde_json::to_value(value).map_err(|source| ConfigError::InvalidBody { source })?;

		Ok(Self::Json(value))
	}

	/// Whether the body carries no payload.
	pub fn is_empty(&self) -> bool {
		matches!(self, Self::Empty)
	}
}
impl From<Value> for RequestBody {
	fn from(value: Value) -> Self {
		Self::Json(value)
	}
}
impl From<String> for RequestBody {
	fn from(value: String) -> Self {
		Self::Text(value)
	}
}
impl From<&str> for RequestBody {
	fn from(value: &str) -> Self {
		Self::Text(value.to_owned())
	}
}
impl From<Vec<u8>> for RequestBody {
	fn from(data: Vec<u8>) -> Self {
		Self::Bytes { data, content_type: None }
	}
}
impl From<()> for RequestBody {
	fn from(_: ()) -> Self {
		Self::Empty
	}
}

/// Per-call request options: method, body, and header overrides.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestOptions {
	/// HTTP method.
	pub method: Method,
	/// Payload.
	pub body: RequestBody,
	/// Header overrides applied after the builder's own headers; `authorization` is ignored.
	pub headers: BTreeMap<String, String>,
}
impl RequestOptions {
	/// Creates options for `method` with no body and no overrides.
	pub fn new(method: Method) -> Self {
		Self { method, ..Default::default() }
	}

	/// Sets the payload.
	pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
		self.body = body.into();

		self
	}

	/// Adds a header override; the name is lower-cased.
	///
	/// The `authorization` header always reflects the stored token, so overriding it has no
	/// effect.
	pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
		self.headers.insert(name.to_ascii_lowercase(), value.into());

		self
	}
}

/// Builds the outgoing request for `path`.
///
/// `token` must be read from the credential store right before the call so a retry after a
/// refresh picks up the new value. The `authorization` header is present iff `token` is `Some`.
/// Caller overrides win over builder-provided headers, except `authorization`, which only the
/// token controls.
pub fn build_request(
	base: &Url,
	path: &str,
	options: &RequestOptions,
	token: Option<&AccessToken>,
) -> Result<HttpRequest> {
	let url = resolve_url(base, path)?;
	let mut headers = BTreeMap::new();

	if let Some(token) = token {
		headers.insert(AUTHORIZATION.to_owned(), token.bearer());
	}

	let body = match &options.body {
		RequestBody::Empty => None,
		RequestBody::Json(value) => {
			let bytes =
				serde_json::to_vec(value).map_err(|source| ConfigError::InvalidBody { source })?;

			headers.insert(CONTENT_TYPE.to_owned(), JSON_CONTENT_TYPE.to_owned());

			Some(bytes)
		},
		RequestBody::Text(text) => Some(text.clone().into_bytes()),
		RequestBody::Bytes { data, content_type } => {
			if let Some(content_type) = content_type {
				headers.insert(CONTENT_TYPE.to_owned(), content_type.clone());
			}

			Some(data.clone())
		},
	};

	for (name, value) in &options.headers {
		let name = name.to_ascii_lowercase();

		if name == AUTHORIZATION {
			continue;
		}

		headers.insert(name, value.clone());
	}

	Ok(HttpRequest {
		method: options.method,
		url,
		headers,
		body,
		credentials: CredentialsMode::Include,
	})
}

/// Resolves `path` against `base`; absolute `http(s)` URLs are used unchanged.
pub fn resolve_url(base: &Url, path: &str) -> Result<Url, ConfigError> {
	if let Some(url) =
		Url::parse(path).ok().filter(|url| matches!(url.scheme(), "http" | "https"))
	{
		return Ok(url);
	}

	base.join(path).map_err(|source| ConfigError::InvalidPath { path: path.to_owned(), source })
}
