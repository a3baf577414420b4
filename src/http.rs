//! Transport primitives for authenticated API calls.
//!
//! The module exposes [`Transport`] alongside the request/response shapes it exchanges so
//! downstream crates can plug in their own HTTP stack. [`ApiRequest`] is the path-relative
//! descriptor callers build; the client resolves it against the configured base URL, attaches
//! credentials, and hands the resulting [`HttpRequest`] to the transport.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::ClientConfig,
	error::{ConfigError, TransportError},
};

/// Boxed future returned by [`Transport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Name of the credential header attached to authenticated requests.
pub const AUTHORIZATION: &str = "Authorization";

/// Abstraction over HTTP stacks capable of performing a single request/response exchange.
///
/// The trait is the client's only dependency on an HTTP stack. Implementations must be
/// `Send + Sync + 'static` because the refresh cycle runs on a detached task that keeps its own
/// handle to the transport. Every HTTP response, including 4xx/5xx, is an `Ok`; `Err` is
/// reserved for exchanges that produced no response at all.
pub trait Transport
where
	Self: 'static + Send + Sync,
{
	/// Performs one exchange.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// HTTP methods used by back-office API calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the canonical method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
#[cfg(feature = "reqwest")]
impl From<Method> for reqwest::Method {
	fn from(method: Method) -> Self {
		match method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
		}
	}
}

/// Path-relative description of an application request.
///
/// The descriptor also tracks whether it has already been replayed after an authorization
/// failure; a replayed descriptor is never refreshed again.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path relative to the configured base URL (leading `/` is ignored).
	pub path: String,
	/// Query pairs appended in order.
	pub query: Vec<(String, String)>,
	/// Extra headers; any caller-supplied `Authorization` header is replaced by the session's.
	pub headers: Vec<(String, String)>,
	/// Raw request body.
	pub body: Option<Vec<u8>>,
	retried: bool,
}
impl ApiRequest {
	/// Creates a descriptor for `method` + `path`.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			headers: Vec::new(),
			body: None,
			retried: false,
		}
	}

	/// Shorthand for a `GET` descriptor.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// Shorthand for a `POST` descriptor.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// Shorthand for a `PUT` descriptor.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::Put, path)
	}

	/// Shorthand for a `DELETE` descriptor.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Appends a query pair.
	pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Appends a header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Sets a raw body with the provided content type.
	pub fn body(mut self, body: impl Into<Vec<u8>>, content_type: &str) -> Self {
		self.body = Some(body.into());

		self.header("Content-Type", content_type)
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<B>(self, body: &B) -> Result<Self, ConfigError>
	where
		B: ?Sized + Serialize,
	{
		let bytes =
			serde_json::to_vec(body).map_err(|source| ConfigError::InvalidBody { source })?;

		Ok(self.body(bytes, "application/json"))
	}

	/// Returns `true` once the descriptor has been replayed after an authorization failure.
	pub fn is_retry(&self) -> bool {
		self.retried
	}

	/// Marks the descriptor as already replayed, disabling the refresh-and-replay path for it.
	pub fn mark_retried(&mut self) {
		self.retried = true;
	}

	/// Returns a `METHOD path` label suitable for logs.
	pub fn label(&self) -> String {
		format!("{} {}", self.method, self.path)
	}

	/// Resolves the descriptor into a transport request, attaching `token` as a bearer
	/// credential when present.
	pub fn prepare(
		&self,
		config: &ClientConfig,
		token: Option<&TokenSecret>,
	) -> Result<HttpRequest, ConfigError> {
		let mut url = config.resolve(&self.path)?;

		if !self.query.is_empty() {
			url.query_pairs_mut().extend_pairs(self.query.iter());
		}

		let mut headers: Vec<(String, String)> = self
			.headers
			.iter()
			.filter(|(name, _)| !name.eq_ignore_ascii_case(AUTHORIZATION))
			.cloned()
			.collect();

		if let Some(token) = token {
			headers.push((AUTHORIZATION.into(), token.bearer()));
		}

		Ok(HttpRequest { method: self.method, url, headers, body: self.body.clone() })
	}
}

/// Fully resolved request handed to a [`Transport`].
#[derive(Clone)]
pub struct HttpRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute URL.
	pub url: Url,
	/// Header pairs, including `Authorization` for authenticated requests.
	pub headers: Vec<(String, String)>,
	/// Raw request body.
	pub body: Option<Vec<u8>>,
}
impl HttpRequest {
	/// Returns the first header value matching `name` case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}

	/// Returns the bearer token attached to the request, if any.
	pub fn bearer_token(&self) -> Option<&str> {
		self.header(AUTHORIZATION).and_then(|value| value.strip_prefix("Bearer "))
	}
}
impl Debug for HttpRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let headers: Vec<_> = self
			.headers
			.iter()
			.map(|(name, value)| {
				if name.eq_ignore_ascii_case(AUTHORIZATION) {
					(name.as_str(), "<redacted>")
				} else {
					(name.as_str(), value.as_str())
				}
			})
			.collect();

		f.debug_struct("HttpRequest")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("headers", &headers)
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.finish()
	}
}

/// Response returned by a [`Transport`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response header pairs.
	pub headers: Vec<(String, String)>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	const MESSAGE_PREVIEW: usize = 256;

	/// Creates an empty response with the given status.
	pub fn new(status: u16) -> Self {
		Self { status, headers: Vec::new(), body: Vec::new() }
	}

	/// Replaces the body with the JSON encoding of `value`.
	pub fn with_json(mut self, value: &serde_json::Value) -> Self {
		self.body = value.to_string().into_bytes();
		self.headers.push(("Content-Type".into(), "application/json".into()));

		self
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns `true` when the response signals an authorization failure.
	pub fn is_unauthorized(&self) -> bool {
		self.status == 401
	}

	/// Returns the first header value matching `name` case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}

	/// Returns the body as UTF-8, replacing invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Decodes the body as JSON, reporting the path of the first mismatch.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		Ok(serde_path_to_error::deserialize(&mut de)?)
	}

	/// Extracts the backend's `{"error": ...}` message, falling back to a body preview.
	pub fn error_message(&self) -> String {
		#[derive(Deserialize)]
		struct ErrorBody {
			error: String,
		}

		if let Ok(ErrorBody { error }) = serde_json::from_slice::<ErrorBody>(&self.body) {
			return error;
		}

		let mut preview = self.text();

		if preview.len() > Self::MESSAGE_PREVIEW {
			let mut cut = Self::MESSAGE_PREVIEW;

			while !preview.is_char_boundary(cut) {
				cut -= 1;
			}

			preview.truncate(cut);
		}

		preview
	}

	/// Converts non-2xx responses into [`Error::Status`].
	pub fn error_for_status(self) -> Result<Self> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(Error::Status { status: self.status, message: self.error_message() })
		}
	}
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
	headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Transport for ReqwestTransport {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let HttpRequest { method, url, headers, body } = request;
			let mut builder = self.0.request(method.into(), url);

			for (name, value) in &headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn config() -> ClientConfig {
		ClientConfig::builder("http://localhost:5000/api")
			.build()
			.expect("Test configuration should be valid.")
	}

	#[test]
	fn prepare_resolves_path_query_and_bearer() {
		let request = ApiRequest::get("/aduanas")
			.query("page", "2")
			.query("search", "carrier 7")
			.header("authorization", "Bearer stale")
			.header("X-Request-Id", "abc");
		let token = TokenSecret::new("A1");
		let prepared =
			request.prepare(&config(), Some(&token)).expect("Request should resolve.");

		assert_eq!(
			prepared.url.as_str(),
			"http://localhost:5000/api/aduanas?page=2&search=carrier+7"
		);
		assert_eq!(prepared.bearer_token(), Some("A1"));
		assert_eq!(prepared.header("x-request-id"), Some("abc"));
		assert_eq!(
			prepared.headers.iter().filter(|(name, _)| name.eq_ignore_ascii_case("authorization")).count(),
			1
		);
		assert!(!format!("{prepared:?}").contains("A1"));
	}

	#[test]
	fn prepare_without_session_sends_no_credentials() {
		let prepared = ApiRequest::post("carriers")
			.json(&serde_json::json!({ "name": "DHL" }))
			.expect("JSON body should serialize.")
			.prepare(&config(), None)
			.expect("Request should resolve.");

		assert_eq!(prepared.header(AUTHORIZATION), None);
		assert_eq!(prepared.header("content-type"), Some("application/json"));
		assert_eq!(prepared.body.as_deref(), Some(br#"{"name":"DHL"}"#.as_slice()));
	}

	#[test]
	fn prepare_refuses_foreign_hosts() {
		let token = TokenSecret::new("A1");
		let err = ApiRequest::get("https://other.host/collect")
			.prepare(&config(), Some(&token))
			.expect_err("A request to another host should not be prepared.");

		assert!(matches!(err, ConfigError::InvalidPath { ref path, source: None } if path == "https://other.host/collect"));
	}

	#[test]
	fn error_message_prefers_backend_error_field() {
		let response =
			ApiResponse::new(400).with_json(&serde_json::json!({ "error": "Datos invalidos" }));

		assert_eq!(response.error_message(), "Datos invalidos");

		let mut plain = ApiResponse::new(502);

		plain.body = "é".repeat(300).into_bytes();

		assert!(plain.error_message().len() <= 256);

		let err = plain.error_for_status().expect_err("502 should be reported as an error.");

		assert!(matches!(err, Error::Status { status: 502, .. }));
	}

	#[test]
	fn json_decoding_reports_the_failing_path() {
		#[derive(Debug, Deserialize)]
		#[allow(dead_code)]
		struct Page {
			items: Vec<u32>,
		}

		let response = ApiResponse::new(200).with_json(&serde_json::json!({ "items": [1, "x"] }));
		let err = response.json::<Page>().expect_err("Mismatched body should fail to decode.");

		match err {
			Error::Decode(inner) => assert_eq!(inner.path().to_string(), "items[1]"),
			other => panic!("Unexpected error variant: {other:?}."),
		}
	}
}
