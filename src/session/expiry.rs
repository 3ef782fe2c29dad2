//! Hook invoked when the session cannot be recovered.

/// Receives the login location once credentials have been wiped.
///
/// The surrounding application decides what "redirect" means (navigate a webview, print a
/// prompt, emit an event). The hook runs synchronously on the request path, so keep it short.
pub trait SessionExpiryHandler
where
	Self: Send + Sync,
{
	/// Called after an unrecoverable authentication failure.
	fn on_session_expired(&self, login_location: &str);
}
impl<F> SessionExpiryHandler for F
where
	F: Send + Sync + Fn(&str),
{
	fn on_session_expired(&self, login_location: &str) {
		self(login_location)
	}
}

/// Handler that does nothing; the caller still observes the rejected request.
#[derive(Clone, Copy, Debug, Default)]
pub struct IgnoreExpiry;
impl SessionExpiryHandler for IgnoreExpiry {
	fn on_session_expired(&self, _login_location: &str) {}
}
