//! Client configuration consumed by the authenticated client and the refresh coordinator.
//!
//! Values are validated once by [`ClientConfigBuilder::build`]; afterwards every path is
//! resolved relative to the normalized base URL.

/// Builder API for assembling client configurations.
pub mod builder;

pub use builder::*;

// self
use crate::{_prelude::*, error::ConfigError};

/// How the coordinator treats refresh responses that omit a new refresh token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
	#[default]
	/// Keep using the previous refresh token when the response omits one.
	Reuse,
	/// Treat an omitted refresh token as a failed refresh.
	Require,
}

/// Endpoint paths, relative to the base URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEndpoints {
	/// Refresh exchange (`POST`).
	pub refresh: String,
	/// Logout notification (`POST`).
	pub logout: String,
	/// Current identity lookup (`GET`).
	pub identity: String,
}
impl Default for ClientEndpoints {
	fn default() -> Self {
		Self {
			refresh: ClientConfig::DEFAULT_REFRESH_PATH.into(),
			logout: ClientConfig::DEFAULT_LOGOUT_PATH.into(),
			identity: ClientConfig::DEFAULT_IDENTITY_PATH.into(),
		}
	}
}

/// Bounds on the client's suspension points. `None` waits indefinitely.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTimeouts {
	/// Bound on each application request exchange.
	pub request: Option<Duration>,
	/// Bound on a caller's wait for an in-flight refresh cycle.
	pub wait: Option<Duration>,
	/// Bound on the refresh exchange itself.
	pub refresh: Option<Duration>,
}

/// Immutable, validated client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Base URL every path is appended to; always ends with `/`.
	pub base_url: Url,
	/// Session endpoint paths.
	pub endpoints: ClientEndpoints,
	/// Suspension bounds.
	pub timeouts: ClientTimeouts,
	/// Refresh-token rotation policy.
	pub rotation: RotationPolicy,
}
impl ClientConfig {
	/// Default refresh endpoint path.
	pub const DEFAULT_REFRESH_PATH: &'static str = "auth/refresh";
	/// Default logout endpoint path.
	pub const DEFAULT_LOGOUT_PATH: &'static str = "auth/logout";
	/// Default identity endpoint path.
	pub const DEFAULT_IDENTITY_PATH: &'static str = "auth/me";

	/// Creates a new builder for the provided base URL.
	pub fn builder(base_url: impl AsRef<str>) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// Joins `path` onto the base URL, ignoring any leading `/` so the base path is preserved.
	///
	/// Paths that land on another origin or outside the base path (absolute URLs, `..`
	/// segments) are rejected, so the bearer token only ever goes to the configured API.
	pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
		let relative = path.trim_start_matches('/');
		let url = self.base_url.join(relative).map_err(|source| ConfigError::InvalidPath {
			path: path.to_owned(),
			source: Some(source),
		})?;

		if url.origin() != self.base_url.origin() || !url.path().starts_with(self.base_url.path()) {
			return Err(ConfigError::InvalidPath { path: path.to_owned(), source: None });
		}

		Ok(url)
	}

	/// Absolute refresh endpoint.
	pub fn refresh_url(&self) -> Result<Url, ConfigError> {
		self.resolve(&self.endpoints.refresh)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn resolve_keeps_the_base_path() {
		let config = ClientConfig::builder("http://localhost:5000/api")
			.build()
			.expect("Configuration should be valid.");

		assert_eq!(config.base_url.as_str(), "http://localhost:5000/api/");
		assert_eq!(
			config.refresh_url().expect("Refresh path should resolve.").as_str(),
			"http://localhost:5000/api/auth/refresh"
		);
		assert_eq!(
			config.resolve("/usuarios/3").expect("Absolute-looking path should resolve.").as_str(),
			"http://localhost:5000/api/usuarios/3"
		);
	}

	#[test]
	fn resolve_rejects_paths_leaving_the_base_url() {
		let config = ClientConfig::builder("http://localhost:5000/api")
			.build()
			.expect("Configuration should be valid.");

		for path in ["https://other.host/x", "http://localhost:5001/api/x", "../admin", "a/../../admin"] {
			let err = config.resolve(path).expect_err("Path outside the base URL should be rejected.");

			assert!(matches!(err, ConfigError::InvalidPath { source: None, .. }), "{path}: {err:?}");
		}

		assert_eq!(
			config.resolve("aduanas/../carriers").expect("Path inside the base should resolve.").as_str(),
			"http://localhost:5000/api/carriers"
		);
	}

	#[test]
	fn config_round_trips_through_json() {
		let config = ClientConfig::builder("https://backoffice.example.com/api/")
			.wait_timeout(Duration::from_secs(10))
			.rotation(RotationPolicy::Require)
			.build()
			.expect("Configuration should be valid.");
		let payload = serde_json::to_string(&config).expect("Configuration should serialize.");
		let decoded: ClientConfig =
			serde_json::from_str(&payload).expect("Configuration should deserialize.");

		assert_eq!(decoded, config);
		assert!(payload.contains("\"require\""));
	}
}
