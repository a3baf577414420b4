//! Authenticated API client consumed by the rest of the application.
//!
//! [`AuthenticatedClient::request`] attaches the stored access token to every outbound call and
//! recovers from an expired token by asking the shared [`RefreshCoordinator`] for a fresh one and
//! replaying the original request exactly once. Everything else (typed JSON helpers, login,
//! logout, bootstrap) is layered on top of that one path.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{Identity, Session, TokenSecret},
	config::ClientConfig,
	http::{ApiRequest, ApiResponse, Method, Transport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::RefreshCoordinator,
	store::SessionStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestAuthenticatedClient = AuthenticatedClient<ReqwestTransport>;

/// Wraps a [`Transport`] with credential attachment and single-flight session refresh.
///
/// The client owns the transport, the session store handle, and the refresh coordinator so
/// every clone shares one refresh cycle. It reads the store and triggers refreshes but never
/// writes the session while serving a request; only the coordinator does.
pub struct AuthenticatedClient<T>
where
	T: ?Sized + Transport,
{
	transport: Arc<T>,
	store: Arc<dyn SessionStore>,
	config: ClientConfig,
	coordinator: RefreshCoordinator<T>,
	bootstrap: Arc<AsyncOnceCell<()>>,
}
impl<T> AuthenticatedClient<T>
where
	T: ?Sized + Transport,
{
	/// Creates a client that reuses the caller-provided transport.
	pub fn with_transport(
		config: ClientConfig,
		store: Arc<dyn SessionStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self::with_coordinator(RefreshCoordinator::new(transport.into(), store, config))
	}

	/// Creates a client around an existing coordinator, sharing its transport, store, and
	/// configuration.
	///
	/// Clients built from clones of one coordinator never run overlapping refresh cycles.
	pub fn with_coordinator(coordinator: RefreshCoordinator<T>) -> Self {
		Self {
			transport: Arc::clone(coordinator.transport()),
			store: Arc::clone(coordinator.store()),
			config: coordinator.config().clone(),
			coordinator,
			bootstrap: Default::default(),
		}
	}

	/// Sends `request`, refreshing the session and replaying once on an authorization failure.
	///
	/// Every HTTP response is returned as-is, including a second 401 after a replay; only
	/// transport failures, timeouts, and refresh failures surface as errors.
	pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "request");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.request_with_refresh(request)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Sends `request` and converts non-2xx responses into [`Error::Status`].
	pub async fn fetch(&self, request: ApiRequest) -> Result<ApiResponse> {
		self.request(request).await?.error_for_status()
	}

	/// Sends a `GET` and decodes the JSON response.
	pub async fn get_json<R>(&self, path: &str) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.fetch(ApiRequest::get(path)).await?.json()
	}

	/// Sends `body` as JSON with `method` and decodes the JSON response.
	pub async fn send_json<B, R>(&self, method: Method, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		let request = ApiRequest::new(method, path).json(body)?;

		self.fetch(request).await?.json()
	}

	/// Stores a freshly issued session (e.g. after a successful login form submission).
	pub fn login(&self, session: Session) {
		self.store.set(session);
	}

	/// Ends the session.
	///
	/// When a refresh token is stored, the backend is asked to revoke it first. That
	/// notification is best-effort: the local session is cleared whatever its outcome.
	pub async fn logout(&self) {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "logout");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		span.instrument(async {
			let refresh_token = self.store.get().and_then(|session| session.refresh_token);

			if let Some(refresh_token) = refresh_token {
				let notified = match ApiRequest::post(self.config.endpoints.logout.as_str())
					.json(&serde_json::json!({ "refresh_token": refresh_token.expose() }))
				{
					Ok(request) => self.fetch(request).await.map(|_| ()),
					Err(e) => Err(e.into()),
				};

				if let Err(e) = notified {
					obs::logout_notify_failed(&e);
				}
			}

			self.store.clear();
		})
		.await;
		obs::record_flow_outcome(KIND, FlowOutcome::Success);
	}

	/// Validates a restored session once per client and reports whether one is active.
	///
	/// The identity endpoint is fetched through [`request`](Self::request), so an expired access
	/// token is refreshed on the way, and the returned record replaces the stored identity.
	/// Concurrent callers share one validation run. A completed run is cached; a run that fails
	/// with a transport or status error is not, so the next call tries again. The returned flag
	/// always reflects the store at the time of the call, so a later login or logout is seen.
	pub async fn bootstrap(&self) -> Result<bool> {
		const KIND: FlowKind = FlowKind::Bootstrap;

		let span = FlowSpan::new(KIND, "bootstrap");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				if self.is_logged_in() {
					self.bootstrap.get_or_try_init(|| self.validate_session()).await?;
				}

				Ok::<_, Error>(self.is_logged_in())
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Returns `true` when a session is stored.
	pub fn is_logged_in(&self) -> bool {
		self.store.get().is_some()
	}

	/// Returns the current access token, if any.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.store.get().map(|session| session.access_token)
	}

	/// Returns the identity of the current session, if any.
	pub fn identity(&self) -> Option<Identity> {
		self.store.get().map(|session| session.identity)
	}

	/// Returns the session store shared with the coordinator.
	pub fn store(&self) -> &Arc<dyn SessionStore> {
		&self.store
	}

	/// Returns the validated configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Returns the refresh coordinator shared by every clone of this client.
	pub fn coordinator(&self) -> &RefreshCoordinator<T> {
		&self.coordinator
	}

	async fn request_with_refresh(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		let token = self.access_token();
		let response = self.execute(&request, token.as_ref()).await?;

		if !response.is_unauthorized() || request.is_retry() {
			return Ok(response);
		}

		request.mark_retried();

		let fresh = self.coordinator.ensure_fresh_token(&request, token.as_ref()).await?;

		obs::request_replayed(&request.label());

		self.execute(&request, Some(&fresh)).await
	}

	async fn execute(&self, request: &ApiRequest, token: Option<&TokenSecret>) -> Result<ApiResponse> {
		let prepared = request.prepare(&self.config, token)?;
		let call = self.transport.execute(prepared);
		let response = match self.config.timeouts.request {
			Some(after) => tokio::time::timeout(after, call)
				.await
				.map_err(|_| Error::Timeout { operation: "request", after })?,
			None => call.await,
		}?;

		Ok(response)
	}

	async fn validate_session(&self) -> Result<()> {
		match self.get_json::<serde_json::Value>(&self.config.endpoints.identity).await {
			Ok(identity) => {
				if let Some(session) = self.store.get() {
					let expected = session.access_token.clone();

					self.store
						.compare_and_swap(&expected, Some(Session { identity: identity.into(), ..session }));
				}

				Ok(())
			},
			Err(e) if e.is_session_ended() => Ok(()),
			Err(e) => Err(e),
		}
	}
}
#[cfg(feature = "reqwest")]
impl AuthenticatedClient<ReqwestTransport> {
	/// Creates a new client backed by its own reqwest transport.
	pub fn new(config: ClientConfig, store: Arc<dyn SessionStore>) -> Self {
		Self::with_transport(config, store, ReqwestTransport::default())
	}
}
impl<T> Clone for AuthenticatedClient<T>
where
	T: ?Sized + Transport,
{
	fn clone(&self) -> Self {
		Self {
			transport: Arc::clone(&self.transport),
			store: Arc::clone(&self.store),
			config: self.config.clone(),
			coordinator: self.coordinator.clone(),
			bootstrap: Arc::clone(&self.bootstrap),
		}
	}
}
impl<T> Debug for AuthenticatedClient<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticatedClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("logged_in", &self.is_logged_in())
			.field("coordinator", &self.coordinator)
			.finish()
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// crates.io
	use httpmock::prelude::*;
	// self
	use super::*;
	use crate::{
		_preludet::{build_reqwest_test_client, test_session},
		error::RefreshError,
	};

	#[tokio::test]
	async fn anonymous_authorization_failure_ends_without_refresh() {
		let server = MockServer::start_async().await;
		let denied = server
			.mock_async(|when, then| {
				when.method(GET).path("/api/aduanas");
				then.status(401);
			})
			.await;
		let (client, _store) = build_reqwest_test_client(&server.url("/api"), None);
		let err = client
			.request(ApiRequest::get("aduanas"))
			.await
			.expect_err("A 401 without a session should end the session.");

		assert!(matches!(err, Error::Refresh(RefreshError::NoRefreshToken)));
		assert_eq!(client.coordinator().metrics().exchanges(), 0);
		denied.assert_async().await;
	}

	#[tokio::test]
	async fn clones_share_the_session_and_redact_it() {
		let server = MockServer::start_async().await;
		let (client, store) =
			build_reqwest_test_client(&server.url("/api"), Some(test_session("A1", Some("R1"))));
		let clone = client.clone();

		assert_eq!(clone.access_token().map(|token| token.expose().to_owned()), Some("A1".into()));
		assert!(!format!("{client:?}").contains("A1"));

		store.clear();

		assert!(!clone.is_logged_in());
		assert!(clone.identity().is_none());
	}
}
