//! Demonstrates two concurrent requests hitting an expired session: both observe a `401`, a
//! single refresh call renews the token, and each request is retried once with the new bearer.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::{Value, json};
use url::Url;
// self
use session_broker::{
	config::SessionConfig,
	session::ReqwestSessionClient,
	store::{KeyValueStore, MemoryStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;

	for path in ["/api/teams", "/api/players"] {
		server
			.mock_async(|when, then| {
				when.method(GET).path(path).header("authorization", "Bearer expired-token");
				then.status(401)
					.header("content-type", "application/json")
					.json_body(json!({ "message": "Token expired" }));
			})
			.await;
		server
			.mock_async(|when, then| {
				when.method(GET).path(path).header("authorization", "Bearer renewed-token");
				then.status(200)
					.header("content-type", "application/json")
					.json_body(json!({ "path": path, "items": [] }));
			})
			.await;
	}

	let refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh");
			then.status(200)
				.delay(Duration::from_millis(150))
				.header("content-type", "application/json")
				.json_body(json!({
					"accessToken": "renewed-token",
					"user": { "id": 1, "email": "coach@example.com" }
				}));
		})
		.await;
	let config = SessionConfig::builder(Url::parse(&server.base_url())?)
		.request_timeout(Some(Duration::from_secs(5)))
		.build()?;
	let store = Arc::new(MemoryStore::default());
	let client = ReqwestSessionClient::new(config, store.clone())?.with_expiry_handler(Arc::new(
		|location: &str| println!("Session expired; redirecting to {location}."),
	));

	client.set_access_token(Some("expired-token".into()))?;

	let (teams, players) =
		tokio::join!(client.get::<Value>("/api/teams"), client.get::<Value>("/api/players"));

	println!("Teams: {}", teams?);
	println!("Players: {}", players?);
	println!("Refresh calls: {}", refresh_mock.calls_async().await);
	println!("Stored token: {:?}", store.get_item("accessToken")?);
	println!("Cached user: {:?}", client.user::<Value>()?);

	Ok(())
}
