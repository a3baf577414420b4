//! Session model: the credential pair plus the opaque identity it belongs to.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Errors produced by [`SessionBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum SessionBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when the access token is empty or whitespace.
	#[error("Access token must not be empty.")]
	EmptyAccessToken,
}

/// Opaque user record attached to a session.
///
/// The client never inspects it; it is carried across refreshes and replaced when the
/// identity endpoint is fetched during bootstrap.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(pub serde_json::Value);
impl Identity {
	/// Wraps an arbitrary JSON value.
	pub fn new(value: serde_json::Value) -> Self {
		Self(value)
	}

	/// Returns `true` when no identity has been recorded.
	pub fn is_unknown(&self) -> bool {
		self.0.is_null()
	}

	/// Borrows the underlying JSON value.
	pub fn as_value(&self) -> &serde_json::Value {
		&self.0
	}
}
impl From<serde_json::Value> for Identity {
	fn from(value: serde_json::Value) -> Self {
		Self(value)
	}
}

/// Authenticated session.
///
/// A stored session always carries a non-empty access token; "logged out" is modeled as the
/// absence of a session rather than a session with empty fields. The refresh token is optional
/// because some backends issue non-refreshable tokens.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
	/// Short-lived bearer credential; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Long-lived credential used solely to renew the access token.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// Opaque user record.
	#[serde(default)]
	pub identity: Identity,
}
impl Session {
	/// Returns a builder for constructing validated sessions.
	pub fn builder() -> SessionBuilder {
		SessionBuilder::default()
	}

	/// Returns `true` when the session can be renewed.
	pub fn is_refreshable(&self) -> bool {
		self.refresh_token.as_ref().is_some_and(|secret| !secret.is_blank())
	}

	/// Returns `true` when the session satisfies the non-empty access token invariant.
	pub fn is_valid(&self) -> bool {
		!self.access_token.is_blank()
	}

	/// Produces the session that results from a successful refresh.
	///
	/// The identity is carried over; `refresh_token` replaces the stored one only when present.
	pub fn renewed(&self, access_token: TokenSecret, refresh_token: Option<TokenSecret>) -> Self {
		Self {
			access_token,
			refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
			identity: self.identity.clone(),
		}
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("access_token", &"<redacted>")
			.field("refresh_token_set", &self.refresh_token.is_some())
			.field("identity", &self.identity)
			.finish()
	}
}

/// Builder for [`Session`] values.
#[derive(Debug, Default)]
pub struct SessionBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	identity: Identity,
}
impl SessionBuilder {
	/// Sets the access token.
	pub fn access_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.access_token = Some(token.into());

		self
	}

	/// Sets the refresh token.
	pub fn refresh_token(mut self, token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(token.into());

		self
	}

	/// Sets the identity record.
	pub fn identity(mut self, identity: impl Into<Identity>) -> Self {
		self.identity = identity.into();

		self
	}

	/// Consumes the builder and validates the resulting session.
	pub fn build(self) -> Result<Session, SessionBuilderError> {
		let access_token = self.access_token.ok_or(SessionBuilderError::MissingAccessToken)?;

		if access_token.is_blank() {
			return Err(SessionBuilderError::EmptyAccessToken);
		}

		let refresh_token = self.refresh_token.filter(|secret| !secret.is_blank());

		Ok(Session { access_token, refresh_token, identity: self.identity })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn builder_rejects_missing_or_blank_access_tokens() {
		assert_eq!(Session::builder().build(), Err(SessionBuilderError::MissingAccessToken));
		assert_eq!(
			Session::builder().access_token("  ").build(),
			Err(SessionBuilderError::EmptyAccessToken)
		);
	}

	#[test]
	fn blank_refresh_tokens_are_dropped() {
		let session = Session::builder()
			.access_token("A1")
			.refresh_token("")
			.build()
			.expect("Session with a blank refresh token should still build.");

		assert!(session.refresh_token.is_none());
		assert!(!session.is_refreshable());
	}

	#[test]
	fn renewed_session_falls_back_to_the_previous_refresh_token() {
		let session = Session::builder()
			.access_token("A1")
			.refresh_token("R1")
			.identity(json!({ "usuario": "admin" }))
			.build()
			.expect("Session fixture should build.");
		let renewed = session.renewed(TokenSecret::new("A2"), None);

		assert_eq!(renewed.access_token.expose(), "A2");
		assert_eq!(renewed.refresh_token.as_ref().map(TokenSecret::expose), Some("R1"));
		assert_eq!(renewed.identity, session.identity);

		let rotated = session.renewed(TokenSecret::new("A3"), Some(TokenSecret::new("R3")));

		assert_eq!(rotated.refresh_token.as_ref().map(TokenSecret::expose), Some("R3"));
	}

	#[test]
	fn persisted_shape_matches_the_session_record() {
		let session = Session::builder()
			.access_token("A1")
			.refresh_token("R1")
			.identity(json!({ "id": 7 }))
			.build()
			.expect("Session fixture should build.");
		let value = serde_json::to_value(&session).expect("Session should serialize to JSON.");

		assert_eq!(
			value,
			json!({ "access_token": "A1", "refresh_token": "R1", "identity": { "id": 7 } })
		);
		assert!(!format!("{session:?}").contains("A1"));
	}
}
