//! Wire format of the refresh endpoint.

// self
use crate::{
	_prelude::*,
	auth::{Session, TokenSecret},
	config::{ClientConfig, RotationPolicy},
	error::{RefreshFailure, TransportError},
	http::{ApiRequest, Transport},
};

#[derive(Deserialize)]
struct RefreshResponse {
	access_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
}

/// Posts `refresh_token` to the refresh endpoint and derives the renewed session.
pub(super) async fn refresh<T>(
	transport: &T,
	config: &ClientConfig,
	session: &Session,
	refresh_token: &TokenSecret,
) -> Result<Session, RefreshFailure>
where
	T: ?Sized + Transport,
{
	let request = ApiRequest::post(config.endpoints.refresh.as_str())
		.json(&serde_json::json!({ "refresh_token": refresh_token.expose() }))
		.and_then(|request| request.prepare(config, None))
		.map_err(|e| RefreshFailure::Misconfigured { message: e.to_string() })?;
	let call = transport.execute(request);
	let response = match config.timeouts.refresh {
		Some(after) => tokio::time::timeout(after, call)
			.await
			.map_err(|_| RefreshFailure::TimedOut { after })?,
		None => call.await,
	}
	.map_err(|e| RefreshFailure::Network { message: describe(&e) })?;

	if !response.is_success() {
		return Err(RefreshFailure::Rejected {
			status: response.status,
			message: response.error_message(),
		});
	}

	let mut de = serde_json::Deserializer::from_slice(&response.body);
	let body: RefreshResponse = serde_path_to_error::deserialize(&mut de)
		.map_err(|e| RefreshFailure::MalformedResponse { message: e.to_string() })?;
	let access_token = TokenSecret::new(body.access_token);

	if access_token.is_blank() {
		return Err(RefreshFailure::MalformedResponse {
			message: "access_token is empty".into(),
		});
	}

	let rotated = body.refresh_token.map(TokenSecret::new).filter(|secret| !secret.is_blank());

	if rotated.is_none() && config.rotation == RotationPolicy::Require {
		return Err(RefreshFailure::RotationRequired);
	}

	Ok(session.renewed(access_token, rotated))
}

fn describe(error: &TransportError) -> String {
	let mut message = error.to_string();
	let mut source = StdError::source(error);

	while let Some(inner) = source {
		message.push_str(": ");
		message.push_str(&inner.to_string());

		source = inner.source();
	}

	message
}
