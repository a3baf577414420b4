//! Thread-safe in-memory [`SessionStore`] implementation.

// crates.io
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	auth::{Session, TokenSecret},
	store::{CompareAndSwapOutcome, SessionReceiver, SessionStore},
};

/// In-process session store whose changes can be observed through [`subscribe`](Self::subscribe).
///
/// Reads borrow the current value for the duration of a clone; writes swap it in one step, so
/// readers never observe a partially written session.
#[derive(Clone, Debug)]
pub struct MemorySessionStore(Arc<watch::Sender<Option<Session>>>);
impl MemorySessionStore {
	/// Creates a store seeded with `session`.
	pub fn with_session(session: Option<Session>) -> Self {
		let session = session.filter(Session::is_valid);

		Self(Arc::new(watch::Sender::new(session)))
	}

	/// Returns a receiver notified on every `set` or `clear`.
	pub fn subscribe(&self) -> SessionReceiver {
		self.0.subscribe()
	}

	/// Returns `true` when a session is stored.
	pub fn is_logged_in(&self) -> bool {
		self.0.borrow().is_some()
	}

	pub(crate) fn replace(&self, session: Option<Session>) -> Option<Session> {
		self.0.send_replace(session)
	}
}
impl Default for MemorySessionStore {
	fn default() -> Self {
		Self::with_session(None)
	}
}
impl SessionStore for MemorySessionStore {
	fn get(&self) -> Option<Session> {
		self.0.borrow().clone()
	}

	fn set(&self, session: Session) {
		if !session.is_valid() {
			self.replace(None);

			return;
		}

		self.replace(Some(session));
	}

	fn clear(&self) {
		self.replace(None);
	}

	fn compare_and_swap(
		&self,
		expected: &TokenSecret,
		replacement: Option<Session>,
	) -> CompareAndSwapOutcome {
		let replacement = replacement.filter(Session::is_valid);
		let mut outcome = CompareAndSwapOutcome::Missing;

		self.0.send_if_modified(|current| {
			outcome = match current.as_ref() {
				None => CompareAndSwapOutcome::Missing,
				Some(session) if session.access_token != *expected =>
					CompareAndSwapOutcome::TokenMismatch,
				Some(_) => CompareAndSwapOutcome::Updated,
			};

			if outcome != CompareAndSwapOutcome::Updated {
				return false;
			}

			*current = replacement;

			true
		});

		outcome
	}
}
