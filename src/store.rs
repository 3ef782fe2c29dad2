//! Credential persistence: a synchronous key/value contract, built-in backends, and the
//! [`CredentialStore`] wrapper that owns the access token + cached user profile pair.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::AccessToken};

/// Storage backend contract (`getItem`/`setItem`/`removeItem` style).
///
/// Calls happen on the request path, so implementations must not perform network I/O.
pub trait KeyValueStore
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`.
	fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Stores `value` under `key`, replacing any previous value.
	fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

	/// Removes `key`; removing a missing key is not an error.
	fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

/// Error type produced by [`KeyValueStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend or the cached profile.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Logical keys the credential pair is stored under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialKeys {
	/// Key holding the access token.
	pub token: String,
	/// Key holding the cached user profile (JSON text).
	pub user: String,
}
impl Default for CredentialKeys {
	fn default() -> Self {
		Self { token: "accessToken".into(), user: "user".into() }
	}
}

/// Thin wrapper over a [`KeyValueStore`] holding the session's token and cached profile.
///
/// No validation happens here; the session client decides when values change.
#[derive(Clone)]
pub struct CredentialStore {
	backend: Arc<dyn KeyValueStore>,
	keys: CredentialKeys,
}
impl CredentialStore {
	/// Wraps a backend using the default [`CredentialKeys`].
	pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
		Self { backend, keys: CredentialKeys::default() }
	}

	/// Overrides the logical keys.
	pub fn with_keys(mut self, keys: CredentialKeys) -> Self {
		self.keys = keys;

		self
	}

	/// Returns the logical keys in use.
	pub fn keys(&self) -> &CredentialKeys {
		&self.keys
	}

	/// Reads the current access token.
	pub fn token(&self) -> Result<Option<AccessToken>, StoreError> {
		Ok(self.backend.get_item(&self.keys.token)?.map(AccessToken::from))
	}

	/// Writes (or removes, when `None`) the access token.
	pub fn set_token(&self, token: Option<&AccessToken>) -> Result<(), StoreError> {
		match token {
			Some(token) => self.backend.set_item(&self.keys.token, token.expose()),
			None => self.backend.remove_item(&self.keys.token),
		}
	}

	/// Reads the cached profile as raw JSON.
	pub fn user_value(&self) -> Result<Option<Value>, StoreError> {
		self.backend
			.get_item(&self.keys.user)?
			.map(|raw| {
				serde_json::from_str(&raw).map_err(|e| StoreError::Serialization {
					message: format!("Failed to parse cached user profile: {e}"),
				})
			})
			.transpose()
	}

	/// Reads the cached profile decoded into `T`.
	pub fn user<T>(&self) -> Result<Option<T>, StoreError>
	where
		T: DeserializeOwned,
	{
		self.user_value()?
			.map(|value| {
				serde_json::from_value(value).map_err(|e| StoreError::Serialization {
					message: format!("Failed to decode cached user profile: {e}"),
				})
			})
			.transpose()
	}

	/// Writes (or removes, when `None`) the cached profile.
	pub fn set_user(&self, user: Option<&Value>) -> Result<(), StoreError> {
		match user {
			Some(user) => self.backend.set_item(&self.keys.user, &user.to_string()),
			None => self.backend.remove_item(&self.keys.user),
		}
	}

	/// Removes both the token and the cached profile.
	///
	/// Both removals are attempted even if the first one fails; the first failure is returned.
	pub fn clear(&self) -> Result<(), StoreError> {
		let token = self.backend.remove_item(&self.keys.token);
		let user = self.backend.remove_item(&self.keys.user);

		token.and(user)
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialStore").field("keys", &self.keys).finish()
	}
}
