// std
use std::path::Path;
// self
use crate::{
	_prelude::*,
	error::RefreshError,
	obs::FlowKind,
	store::{CompareAndSwapOutcome, StoreError},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by client flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("session_broker.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

pub(crate) fn refresh_cycle_started(cycle: u64, origin: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(cycle, origin, "refresh cycle started");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (cycle, origin);
	}
}

pub(crate) fn refresh_cycle_finished(cycle: u64, waiters: usize, failure: Option<&RefreshError>) {
	#[cfg(feature = "tracing")]
	{
		match failure {
			None => tracing::debug!(cycle, waiters, "refresh cycle succeeded"),
			Some(failure) => tracing::warn!(cycle, waiters, %failure, "refresh cycle failed"),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (cycle, waiters, failure);
	}
}

pub(crate) fn refresh_outcome_discarded(cycle: u64, outcome: CompareAndSwapOutcome) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(cycle, ?outcome, "session changed during refresh; store left untouched");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (cycle, outcome);
	}
}

pub(crate) fn waiter_queued(cycle: u64, origin: &str, position: usize) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(cycle, origin, position, "caller queued behind refresh cycle");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (cycle, origin, position);
	}
}

pub(crate) fn waiter_abandoned(cycle: u64, waiter: u64) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(cycle, waiter, "queued caller left before the refresh cycle resolved");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (cycle, waiter);
	}
}

pub(crate) fn request_replayed(origin: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(origin, "replaying request with refreshed credentials");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = origin;
	}
}

pub(crate) fn logout_notify_failed(error: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(%error, "logout notification failed; clearing the local session anyway");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}

pub(crate) fn store_write_failed(path: &Path, action: &'static str, error: &StoreError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(path = %path.display(), action, %error, "session snapshot write failed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (path, action, error);
	}
}
