//! Response classification and [`ApiError`] construction.
//!
//! [`classify`] is pure: it inspects status, headers, and the buffered body exactly once and
//! never touches session state. The session client decides what an
//! [`Classification::Unauthorized`] means for a given path.

// self
use crate::{
	_prelude::*,
	error::{ApiError, DecodeError},
	http::{HttpResponse, UNAUTHORIZED},
};

/// Parsed body of a successful response.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
	/// Body declared as JSON.
	Json(Value),
	/// Any other body, kept as text.
	Text(String),
}
impl Payload {
	/// Converts the payload into a JSON value; text becomes a JSON string.
	pub fn into_value(self) -> Value {
		match self {
			Self::Json(value) => value,
			Self::Text(text) => Value::String(text),
		}
	}
}

/// Outcome of inspecting one response.
#[derive(Clone, Debug, PartialEq)]
pub enum Classification {
	/// Success without a body (`204`, `205`, or an empty `2xx` body).
	Empty {
		/// HTTP status code.
		status: u16,
	},
	/// Success with a parsed body.
	Success {
		/// HTTP status code.
		status: u16,
		/// Parsed body.
		body: Payload,
	},
	/// The server rejected the session (`401`).
	Unauthorized(ApiError),
	/// Any other non-success status.
	Failure(ApiError),
}
impl Classification {
	/// HTTP status code of the classified response.
	pub fn status(&self) -> u16 {
		match self {
			Self::Empty { status } | Self::Success { status, .. } => *status,
			Self::Unauthorized(err) | Self::Failure(err) => err.status,
		}
	}

	/// Turns failures into errors and returns the payload, `None` for empty successes.
	pub fn into_result(self) -> Result<Option<Payload>> {
		match self {
			Self::Empty { .. } => Ok(None),
			Self::Success { body, .. } => Ok(Some(body)),
			Self::Unauthorized(err) | Self::Failure(err) => Err(err.into()),
		}
	}

	/// Decodes the payload into `T`; empty successes decode from JSON `null`.
	pub fn decode<T>(self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let status = self.status();
		let value = self.into_result()?.map(Payload::into_value).unwrap_or(Value::Null);

		serde_path_to_error::deserialize(value)
			.map_err(|source| DecodeError::Shape { status, source }.into())
	}
}

/// Classifies a buffered response.
///
/// Fails only when a success response declares JSON but carries a malformed body.
pub fn classify(response: HttpResponse) -> Result<Classification> {
	let status = response.status;

	if status == UNAUTHORIZED {
		return Ok(Classification::Unauthorized(api_error(&response)));
	}
	if !response.is_success() {
		return Ok(Classification::Failure(api_error(&response)));
	}
	if matches!(status, 204 | 205) || response.body.is_empty() {
		return Ok(Classification::Empty { status });
	}

	let body = if response.is_json() {
		let value = serde_json::from_slice(&response.body)
			.map_err(|source| DecodeError::Json { status, source })?;

		Payload::Json(value)
	} else {
		Payload::Text(response.text().into_owned())
	};

	Ok(Classification::Success { status, body })
}

/// Builds the classified failure for a non-success response.
///
/// The message comes from, in order: a non-empty `message` string in a JSON body, the
/// non-empty status text, then `Request failed with status <status>`.
pub fn api_error(response: &HttpResponse) -> ApiError {
	let body = error_body(response);
	let message = body
		.get("message")
		.and_then(Value::as_str)
		.filter(|message| !message.is_empty())
		.map(str::to_owned)
		.or_else(|| {
			let text = response.status_text.trim();

			(!text.is_empty()).then(|| text.to_owned())
		})
		.unwrap_or_else(|| format!("Request failed with status {}", response.status));

	ApiError::new(response.status, message, body)
}

fn error_body(response: &HttpResponse) -> Value {
	if response.body.is_empty() {
		return Value::Null;
	}
	if response.is_json() {
		if let Ok(value) = serde_json::from_slice(&response.body) {
			return value;
		}
	}

	Value::String(response.text().into_owned())
}
