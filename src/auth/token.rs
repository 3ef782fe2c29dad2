//! Access token wrapper that keeps bearer material out of logs.

// self
use crate::_prelude::*;

/// Opaque bearer credential attached to every outgoing request.
///
/// `Debug` and `Display` redact the value; call [`AccessToken::expose`] only when the raw string
/// must leave the crate (header construction, persistence).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);
impl AccessToken {
	/// Wraps a token string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the raw token. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Renders the `Authorization` header value for this token.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}

	pub(crate) fn is_blank(&self) -> bool {
		self.0.trim().is_empty()
	}
}
impl AsRef<str> for AccessToken {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl From<String> for AccessToken {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl From<&str> for AccessToken {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("AccessToken").field(&"<redacted>").finish()
	}
}
impl Display for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn token_formatters_redact() {
		let token = AccessToken::new("super-secret");

		assert_eq!(format!("{token:?}"), "AccessToken(\"<redacted>\")");
		assert_eq!(format!("{token}"), "<redacted>");
		assert_eq!(token.bearer(), "Bearer super-secret");
	}

	#[test]
	fn blank_tokens_are_detected() {
		assert!(AccessToken::new("  ").is_blank());
		assert!(!AccessToken::from("abc").is_blank());
	}
}
