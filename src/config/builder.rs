// self
use crate::{
	_prelude::*,
	config::{ClientConfig, ClientEndpoints, ClientTimeouts, RotationPolicy},
	error::ConfigError,
};

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	/// Raw base URL string.
	pub base_url: String,
	/// Session endpoint paths.
	pub endpoints: ClientEndpoints,
	/// Suspension bounds.
	pub timeouts: ClientTimeouts,
	/// Refresh-token rotation policy.
	pub rotation: RotationPolicy,
}
impl ClientConfigBuilder {
	/// Creates a new builder seeded with the provided base URL and default endpoints.
	pub fn new(base_url: impl AsRef<str>) -> Self {
		Self {
			base_url: base_url.as_ref().to_owned(),
			endpoints: ClientEndpoints::default(),
			timeouts: ClientTimeouts::default(),
			rotation: RotationPolicy::default(),
		}
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.endpoints.refresh = path.into();

		self
	}

	/// Overrides the logout endpoint path.
	pub fn logout_path(mut self, path: impl Into<String>) -> Self {
		self.endpoints.logout = path.into();

		self
	}

	/// Overrides the identity endpoint path.
	pub fn identity_path(mut self, path: impl Into<String>) -> Self {
		self.endpoints.identity = path.into();

		self
	}

	/// Bounds every application request exchange.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.timeouts.request = Some(timeout);

		self
	}

	/// Bounds how long a caller waits for an in-flight refresh cycle.
	pub fn wait_timeout(mut self, timeout: Duration) -> Self {
		self.timeouts.wait = Some(timeout);

		self
	}

	/// Bounds the refresh exchange itself.
	pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
		self.timeouts.refresh = Some(timeout);

		self
	}

	/// Overrides the refresh-token rotation policy.
	pub fn rotation(mut self, policy: RotationPolicy) -> Self {
		self.rotation = policy;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		let mut base_url =
			Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidBaseUrl { source })?;

		if !matches!(base_url.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { url: base_url.to_string() });
		}
		if base_url.cannot_be_a_base() {
			return Err(ConfigError::CannotBeABase { url: base_url.to_string() });
		}
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());

			base_url.set_path(&path);
		}

		let config = ClientConfig {
			base_url,
			endpoints: self.endpoints,
			timeouts: self.timeouts,
			rotation: self.rotation,
		};

		config.validate()?;

		Ok(config)
	}
}

impl ClientConfig {
	/// Validates invariants for the configuration.
	fn validate(&self) -> Result<(), ConfigError> {
		validate_path("refresh", &self.endpoints.refresh)?;
		validate_path("logout", &self.endpoints.logout)?;
		validate_path("identity", &self.endpoints.identity)?;
		validate_timeout("request", self.timeouts.request)?;
		validate_timeout("wait", self.timeouts.wait)?;
		validate_timeout("refresh", self.timeouts.refresh)?;

		self.refresh_url()?;

		Ok(())
	}
}

fn validate_path(name: &'static str, path: &str) -> Result<(), ConfigError> {
	if path.trim_matches('/').trim().is_empty() {
		Err(ConfigError::EmptyPath { endpoint: name })
	} else {
		Ok(())
	}
}

fn validate_timeout(name: &'static str, timeout: Option<Duration>) -> Result<(), ConfigError> {
	if timeout.is_some_and(|value| value.is_zero()) {
		Err(ConfigError::ZeroTimeout { timeout: name })
	} else {
		Ok(())
	}
}
