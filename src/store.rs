//! Session storage contract and built-in store implementations.

pub mod file;
pub mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

// crates.io
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	auth::{Session, TokenSecret},
};

/// Receiver that observes every session replacement or removal.
pub type SessionReceiver = watch::Receiver<Option<Session>>;

/// Storage contract for the single current session.
///
/// All operations are in-memory and infallible. Durable implementations persist as a side effect
/// of [`set`](SessionStore::set) and [`clear`](SessionStore::clear) and must not let persistence
/// failures change what [`get`](SessionStore::get) observes.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Returns a snapshot of the current session, if any.
	fn get(&self) -> Option<Session>;

	/// Atomically replaces the stored session.
	fn set(&self, session: Session);

	/// Atomically removes the stored session.
	fn clear(&self);

	/// Replaces the session with `replacement` (or removes it when `None`) only while the
	/// stored access token still equals `expected`; check and write are one atomic step.
	fn compare_and_swap(
		&self,
		expected: &TokenSecret,
		replacement: Option<Session>,
	) -> CompareAndSwapOutcome;
}

/// Result of an access-token compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The stored access token matched and the session was replaced.
	Updated,
	/// A different session is stored; nothing changed.
	TokenMismatch,
	/// No session is stored; nothing changed.
	Missing,
}

/// Error type produced when opening durable stores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
