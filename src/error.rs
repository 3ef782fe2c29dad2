//! Client-level error types shared across the session pipeline, stores, and transports.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by every public call.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Server answered with a non-success status.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Credential persistence failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// A successful response could not be decoded into the requested type.
	#[error(transparent)]
	Decode(#[from] DecodeError),
}
impl Error {
	/// Returns the classified HTTP failure, if this error carries one.
	pub fn as_api(&self) -> Option<&ApiError> {
		match self {
			Self::Api(err) => Some(err),
			_ => None,
		}
	}

	/// HTTP status attached to the failure, when the server produced one.
	pub fn status(&self) -> Option<u16> {
		self.as_api().map(|err| err.status)
	}
}

/// Classified HTTP failure handed back to callers.
///
/// The shape is stable regardless of where the message came from: `status` always mirrors the
/// response, and `body` holds the parsed JSON payload, the raw text when the payload is not JSON,
/// or `null` when the response had no body.
#[derive(Clone, Debug, PartialEq, ThisError)]
#[error("{message}")]
pub struct ApiError {
	/// Human-readable failure description.
	pub message: String,
	/// HTTP status code returned by the server.
	pub status: u16,
	/// Parsed response payload.
	pub body: Value,
}
impl ApiError {
	/// Stable error name shared by every classified failure.
	pub const NAME: &'static str = "ApiError";

	/// Creates a new classified failure.
	pub fn new(status: u16, message: impl Into<String>, body: Value) -> Self {
		Self { message: message.into(), status, body }
	}

	/// Returns [`ApiError::NAME`].
	pub fn name(&self) -> &'static str {
		Self::NAME
	}

	/// Whether the server rejected the session credentials.
	pub fn is_unauthorized(&self) -> bool {
		self.status == 401
	}
}

/// Configuration and request-construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Session configuration failed validation.
	#[error(transparent)]
	Session(#[from] crate::config::SessionConfigError),
	/// Request path cannot be resolved against the base URL.
	#[error("Request path `{path}` cannot be resolved against the base URL.")]
	InvalidPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be serialized as JSON.
	#[error("Request body could not be serialized as JSON.")]
	InvalidBody {
		/// Underlying serialization failure.
		#[source]
		source: serde_json::Error,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures; never retried and never treated as a 401.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request did not complete within the configured deadline.
	#[error("Request timed out.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// The transport refused to encode the request (bad header name or value).
	#[error("Request could not be encoded by the transport.")]
	InvalidRequest {
		/// Transport-specific encoding error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() {
			Self::timeout(e)
		} else if e.is_builder() {
			Self::InvalidRequest { source: Box::new(e) }
		} else {
			Self::network(e)
		}
	}
}

/// Failures decoding a response payload the server reported as successful.
#[derive(Debug, ThisError)]
pub enum DecodeError {
	/// Response declared JSON but the payload is malformed.
	#[error("Response with status {status} declared JSON but the body is malformed.")]
	Json {
		/// HTTP status code of the response.
		status: u16,
		/// Underlying parsing failure.
		#[source]
		source: serde_json::Error,
	},
	/// Payload does not match the requested type.
	#[error("Response with status {status} does not match the expected shape.")]
	Shape {
		/// HTTP status code of the response.
		status: u16,
		/// Structured parsing failure including the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A required field was present but empty.
	#[error("Response with status {status} carries an empty `{field}` field.")]
	EmptyField {
		/// HTTP status code of the response.
		status: u16,
		/// Field name.
		field: &'static str,
	},
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn api_error_exposes_stable_shape() {
		let err = ApiError::new(422, "Roster is full", serde_json::json!({ "message": "Roster is full" }));

		assert_eq!(err.name(), "ApiError");
		assert_eq!(err.to_string(), "Roster is full");
		assert!(!err.is_unauthorized());

		let wrapped = Error::from(err.clone());

		assert_eq!(wrapped.status(), Some(422));
		assert_eq!(wrapped.as_api(), Some(&err));
	}

	#[test]
	fn store_error_converts_with_source() {
		let store_error = crate::store::StoreError::Backend { message: "disk unplugged".into() };
		let err: Error = store_error.clone().into();

		assert!(matches!(err, Error::Storage(_)));
		assert!(err.status().is_none());

		let source = StdError::source(&err).expect("Storage errors should expose their source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
