//! Session client configuration and its validating builder.

// self
use crate::{_prelude::*, store::CredentialKeys};

/// Default session-refresh endpoint.
pub const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh";
/// Default marker identifying the authentication surface.
pub const DEFAULT_EXEMPT_PATH_MARKER: &str = "/auth/";
/// Default location handed to the expiry handler.
pub const DEFAULT_LOGIN_LOCATION: &str = "/login?expired=true";
/// Default per-request transport deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while validating a [`SessionConfig`].
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum SessionConfigError {
	/// Base URL must speak HTTP.
	#[error("Base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Base URL that failed validation.
		url: String,
	},
	/// Base URL must accept relative paths.
	#[error("Base URL cannot be used as a base for request paths: {url}.")]
	CannotBeABase {
		/// Base URL that failed validation.
		url: String,
	},
	/// Refresh path must be absolute.
	#[error("Refresh path must start with `/`: {path}.")]
	InvalidRefreshPath {
		/// Path that failed validation.
		path: String,
	},
	/// An empty marker would exempt every path.
	#[error("Exempt path marker must not be empty.")]
	EmptyExemptMarker,
	/// Expiry handlers need somewhere to send the user.
	#[error("Login location must not be empty.")]
	EmptyLoginLocation,
	/// Token and profile must live under distinct, non-empty keys.
	#[error("Credential keys must be non-empty and distinct.")]
	InvalidCredentialKeys,
	/// A zero deadline would fail every request.
	#[error("Request timeout must be greater than zero.")]
	ZeroTimeout,
}

/// Immutable configuration consumed by the session client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
	/// Base URL request paths are resolved against.
	pub base_url: Url,
	/// Session-refresh endpoint path.
	pub refresh_path: String,
	/// Paths containing this marker are the authentication surface; their 401s never refresh.
	pub exempt_path_marker: String,
	/// Location handed to the expiry handler on unrecoverable authentication failure.
	pub login_location: String,
	/// Keys the credential pair is stored under.
	pub credential_keys: CredentialKeys,
	/// Per-request deadline applied by the built-in reqwest transport.
	pub request_timeout: Option<Duration>,
}
impl SessionConfig {
	/// Creates a builder rooted at `base_url`.
	pub fn builder(base_url: Url) -> SessionConfigBuilder {
		SessionConfigBuilder::new(base_url)
	}

	/// Whether a 401 from `path` must be surfaced instead of triggering a refresh.
	pub fn is_exempt(&self, path: &str) -> bool {
		path.contains(&self.exempt_path_marker) || strip_query(path).ends_with(&self.refresh_path)
	}

	fn validate(&self) -> Result<(), SessionConfigError> {
		if !matches!(self.base_url.scheme(), "http" | "https") {
			return Err(SessionConfigError::UnsupportedScheme { url: self.base_url.to_string() });
		}
		if self.base_url.cannot_be_a_base() {
			return Err(SessionConfigError::CannotBeABase { url: self.base_url.to_string() });
		}
		if !self.refresh_path.starts_with('/') {
			return Err(SessionConfigError::InvalidRefreshPath { path: self.refresh_path.clone() });
		}
		if self.exempt_path_marker.is_empty() {
			return Err(SessionConfigError::EmptyExemptMarker);
		}
		if self.login_location.trim().is_empty() {
			return Err(SessionConfigError::EmptyLoginLocation);
		}

		let keys = &self.credential_keys;

		if keys.token.is_empty() || keys.user.is_empty() || keys.token == keys.user {
			return Err(SessionConfigError::InvalidCredentialKeys);
		}
		if self.request_timeout.is_some_and(|timeout| timeout.is_zero()) {
			return Err(SessionConfigError::ZeroTimeout);
		}

		Ok(())
	}
}

/// Builder for [`SessionConfig`] values.
#[derive(Debug)]
pub struct SessionConfigBuilder {
	/// Base URL request paths are resolved against.
	pub base_url: Url,
	/// Session-refresh endpoint path.
	pub refresh_path: String,
	/// Marker identifying the authentication surface.
	pub exempt_path_marker: String,
	/// Location handed to the expiry handler.
	pub login_location: String,
	/// Keys the credential pair is stored under.
	pub credential_keys: CredentialKeys,
	/// Per-request deadline.
	pub request_timeout: Option<Duration>,
}
impl SessionConfigBuilder {
	/// Creates a builder seeded with the crate defaults.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			refresh_path: DEFAULT_REFRESH_PATH.into(),
			exempt_path_marker: DEFAULT_EXEMPT_PATH_MARKER.into(),
			login_location: DEFAULT_LOGIN_LOCATION.into(),
			credential_keys: CredentialKeys::default(),
			request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
		}
	}

	/// Overrides the session-refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.refresh_path = path.into();

		self
	}

	/// Overrides the authentication-surface marker.
	pub fn exempt_path_marker(mut self, marker: impl Into<String>) -> Self {
		self.exempt_path_marker = marker.into();

		self
	}

	/// Overrides the login location.
	pub fn login_location(mut self, location: impl Into<String>) -> Self {
		self.login_location = location.into();

		self
	}

	/// Overrides the credential keys.
	pub fn credential_keys(mut self, keys: CredentialKeys) -> Self {
		self.credential_keys = keys;

		self
	}

	/// Overrides the per-request deadline; `None` disables it.
	pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Consumes the builder and validates the resulting config.
	pub fn build(self) -> Result<SessionConfig, SessionConfigError> {
		let config = SessionConfig {
			base_url: self.base_url,
			refresh_path: self.refresh_path,
			exempt_path_marker: self.exempt_path_marker,
			login_location: self.login_location,
			credential_keys: self.credential_keys,
			request_timeout: self.request_timeout,
		};

		config.validate()?;

		Ok(config)
	}
}

fn strip_query(path: &str) -> &str {
	path.split(['?', '#']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse URL fixture.")
	}

	#[test]
	fn defaults_match_the_session_contract() {
		let config =
			SessionConfig::builder(url("https://app.example.com")).build().expect("Defaults should build.");

		assert_eq!(config.refresh_path, "/api/auth/refresh");
		assert_eq!(config.login_location, "/login?expired=true");
		assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
		assert_eq!(config.credential_keys, CredentialKeys::default());
	}

	#[test]
	fn authentication_surface_is_exempt() {
		let config = SessionConfig::builder(url("https://app.example.com"))
			.refresh_path("/session/renew")
			.build()
			.expect("Config should build.");

		assert!(config.is_exempt("/api/auth/login"));
		assert!(config.is_exempt("/session/renew"));
		assert!(config.is_exempt("/session/renew?source=tab"));
		assert!(!config.is_exempt("/api/teams"));
		assert!(!config.is_exempt("/api/authors"));
	}

	#[test]
	fn builder_rejects_invalid_settings() {
		let base = || SessionConfig::builder(url("https://app.example.com"));

		assert_eq!(
			SessionConfig::builder(url("ftp://files.example.com")).build(),
			Err(SessionConfigError::UnsupportedScheme { url: "ftp://files.example.com/".into() })
		);
		assert_eq!(
			base().refresh_path("api/auth/refresh").build(),
			Err(SessionConfigError::InvalidRefreshPath { path: "api/auth/refresh".into() })
		);
		assert_eq!(base().exempt_path_marker("").build(), Err(SessionConfigError::EmptyExemptMarker));
		assert_eq!(base().login_location(" ").build(), Err(SessionConfigError::EmptyLoginLocation));
		assert_eq!(
			base()
				.credential_keys(CredentialKeys { token: "same".into(), user: "same".into() })
				.build(),
			Err(SessionConfigError::InvalidCredentialKeys)
		);
		assert_eq!(
			base().request_timeout(Some(Duration::ZERO)).build(),
			Err(SessionConfigError::ZeroTimeout)
		);
		assert!(base().request_timeout(None).build().is_ok());
	}
}
