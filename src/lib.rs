//! Bearer-session HTTP client for back-office APIs: single-flight token refresh with an ordered
//! waiter queue, pluggable session stores, and transport-aware observability in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod refresh;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::Session,
		client::AuthenticatedClient,
		config::ClientConfig,
		http::ReqwestTransport,
		store::{MemorySessionStore, SessionStore},
	};

	/// Client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = AuthenticatedClient<ReqwestTransport>;

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// Builds a session from raw token strings.
	pub fn test_session(access_token: &str, refresh_token: Option<&str>) -> Session {
		let builder = Session::builder().access_token(access_token);
		let builder = match refresh_token {
			Some(refresh_token) => builder.refresh_token(refresh_token),
			None => builder,
		};

		builder.build().expect("Test session should be valid.")
	}

	/// Constructs an [`AuthenticatedClient`] for `base_url` backed by an in-memory store seeded
	/// with `session` and the reqwest transport used across integration tests.
	pub fn build_reqwest_test_client(
		base_url: &str,
		session: Option<Session>,
	) -> (ReqwestTestClient, Arc<MemorySessionStore>) {
		let config =
			ClientConfig::builder(base_url).build().expect("Test base URL should be valid.");

		build_reqwest_test_client_with(config, session)
	}

	/// Same as [`build_reqwest_test_client`] with an explicit configuration.
	pub fn build_reqwest_test_client_with(
		config: ClientConfig,
		session: Option<Session>,
	) -> (ReqwestTestClient, Arc<MemorySessionStore>) {
		let store_backend = Arc::new(MemorySessionStore::with_session(session));
		let store: Arc<dyn SessionStore> = store_backend.clone();
		let client = AuthenticatedClient::with_transport(config, store, test_reqwest_transport());

		(client, store_backend)
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
		time::Duration,
	};

	pub use async_lock::OnceCell as AsyncOnceCell;
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
