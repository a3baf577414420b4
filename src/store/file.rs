//! File-backed [`SessionStore`] for hosts that keep the session across restarts.

// std
use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{Session, TokenSecret},
	obs,
	store::{CompareAndSwapOutcome, MemorySessionStore, SessionReceiver, SessionStore, StoreError},
};

/// Persists the session to a JSON file after each mutation.
///
/// The in-memory copy is authoritative: a failed write is logged and the new session still
/// takes effect for every reader.
#[derive(Clone, Debug)]
pub struct FileSessionStore {
	path: PathBuf,
	inner: MemorySessionStore,
	write_guard: Arc<Mutex<()>>,
}
impl FileSessionStore {
	/// Opens (or creates) a store at the provided path, eagerly loading an existing session.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let session = Self::load_snapshot(&path)?;

		Ok(Self {
			path,
			inner: MemorySessionStore::with_session(session),
			write_guard: Default::default(),
		})
	}

	/// Returns the snapshot location.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Returns a receiver notified on every `set` or `clear`.
	pub fn subscribe(&self) -> SessionReceiver {
		self.inner.subscribe()
	}

	fn load_snapshot(path: &Path) -> Result<Option<Session>, StoreError> {
		let bytes = match fs::read(path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
			Err(e) =>
				return Err(StoreError::Backend {
					message: format!("Failed to read {}: {e}", path.display()),
				}),
		};

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(None);
		}

		let session: Option<Session> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(session.filter(Session::is_valid))
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}
		Ok(())
	}

	fn persist(&self, session: &Session) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(session).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize session snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn remove(&self) -> Result<(), StoreError> {
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StoreError::Backend {
				message: format!("Failed to remove {}: {e}", self.path.display()),
			}),
		}
	}
}
impl SessionStore for FileSessionStore {
	fn get(&self) -> Option<Session> {
		self.inner.get()
	}

	fn set(&self, session: Session) {
		if !session.is_valid() {
			self.clear();

			return;
		}

		let _guard = self.write_guard.lock();
		let result = self.persist(&session);

		self.inner.replace(Some(session));

		if let Err(e) = result {
			obs::store_write_failed(&self.path, "persist", &e);
		}
	}

	fn clear(&self) {
		let _guard = self.write_guard.lock();

		self.inner.replace(None);

		if let Err(e) = self.remove() {
			obs::store_write_failed(&self.path, "remove", &e);
		}
	}

	fn compare_and_swap(
		&self,
		expected: &TokenSecret,
		replacement: Option<Session>,
	) -> CompareAndSwapOutcome {
		let replacement = replacement.filter(Session::is_valid);
		let _guard = self.write_guard.lock();
		let outcome = self.inner.compare_and_swap(expected, replacement.clone());

		if outcome == CompareAndSwapOutcome::Updated {
			let (action, result) = match &replacement {
				Some(session) => ("persist", self.persist(session)),
				None => ("remove", self.remove()),
			};

			if let Err(e) = result {
				obs::store_write_failed(&self.path, action, &e);
			}
		}

		outcome
	}
}
