//! Client-level error types shared across the session store, coordinator, and transport.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Session refresh could not produce a usable access token.
	#[error(transparent)]
	Refresh(#[from] RefreshError),
	/// Transport failure unrelated to authorization (DNS, TCP, TLS, IO).
	#[error(transparent)]
	Request(#[from] TransportError),
	/// A bounded wait expired before the operation resolved.
	#[error("Timed out after {after:?} while waiting for the {operation}.")]
	Timeout {
		/// Operation the caller was suspended on.
		operation: &'static str,
		/// Configured bound that elapsed.
		after: Duration,
	},
	/// Upstream answered with a non-success status where a success was required.
	#[error("Request failed with HTTP {status}: {message}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Backend-supplied error message or a body preview.
		message: String,
	},
	/// Response body did not match the expected shape.
	#[error("Response body could not be decoded.")]
	Decode(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Session persistence failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
}
impl Error {
	/// Returns `true` when the error means the session is gone and the user must log in again.
	pub fn is_session_ended(&self) -> bool {
		matches!(self, Self::Refresh(_))
	}
}

/// Outcome of a failed attempt to obtain a fresh access token.
///
/// The same value is delivered to every caller queued behind one refresh cycle, hence `Clone`.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshError {
	/// No refresh token is stored, so the session cannot be renewed.
	#[error("No refresh token is available; the session has ended.")]
	NoRefreshToken,
	/// The refresh exchange itself failed.
	#[error("Session refresh failed: {0}")]
	Failed(RefreshFailure),
}

/// Reasons a refresh exchange can fail.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshFailure {
	/// Refresh endpoint answered with a non-success status.
	#[error("refresh endpoint rejected the token with HTTP {status} ({message}).")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Backend-supplied error message, when present.
		message: String,
	},
	/// Refresh call never produced a response.
	#[error("network error while calling the refresh endpoint ({message}).")]
	Network {
		/// Transport error rendered to a string so it can be fanned out.
		message: String,
	},
	/// Refresh endpoint returned a body without a usable access token.
	#[error("refresh endpoint returned a malformed body ({message}).")]
	MalformedResponse {
		/// Parsing failure description.
		message: String,
	},
	/// Refresh endpoint omitted a rotated refresh token while rotation is mandatory.
	#[error("refresh endpoint did not rotate the refresh token.")]
	RotationRequired,
	/// Refresh exchange exceeded the configured bound.
	#[error("refresh exchange timed out after {after:?}.")]
	TimedOut {
		/// Configured bound that elapsed.
		after: Duration,
	},
	/// Refresh request could not be built from the configuration.
	#[error("refresh request could not be built ({message}).")]
	Misconfigured {
		/// Configuration failure description.
		message: String,
	},
	/// Refresh cycle stopped before resolving.
	#[error("refresh cycle was interrupted before it resolved.")]
	Interrupted,
}

/// Configuration and validation failures raised by the client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL uses a scheme other than http or https.
	#[error("Base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Offending URL.
		url: String,
	},
	/// Base URL cannot have relative paths appended to it.
	#[error("Base URL cannot be used as a base: {url}.")]
	CannotBeABase {
		/// Offending URL.
		url: String,
	},
	/// Base URL string could not be parsed.
	#[error("Base URL is invalid.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A request path could not be joined onto the base URL or resolved outside of it.
	#[error("Path `{path}` does not resolve inside the base URL.")]
	InvalidPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure, absent when the path parsed but left the base URL.
		#[source]
		source: Option<url::ParseError>,
	},
	/// A configured endpoint path is empty.
	#[error("The {endpoint} path must not be empty.")]
	EmptyPath {
		/// Which endpoint failed validation.
		endpoint: &'static str,
	},
	/// A configured timeout is zero.
	#[error("The {timeout} timeout must be greater than zero.")]
	ZeroTimeout {
		/// Which timeout failed validation.
		timeout: &'static str,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	InvalidBody {
		/// Serialization failure.
		#[source]
		source: serde_json::Error,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn refresh_errors_mark_the_session_as_ended() {
		let err = Error::from(RefreshError::NoRefreshToken);

		assert!(err.is_session_ended());

		let err = Error::from(RefreshError::Failed(RefreshFailure::Rejected {
			status: 401,
			message: "Refresh token invalido".into(),
		}));

		assert!(err.is_session_ended());
		assert!(err.to_string().contains("HTTP 401"));
	}

	#[test]
	fn transport_errors_do_not_end_the_session() {
		let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
		let err = Error::from(TransportError::from(io));

		assert!(!err.is_session_ended());
		assert!(
			StdError::source(&err).is_some(),
			"Transport errors should expose their IO source."
		);
	}
}
