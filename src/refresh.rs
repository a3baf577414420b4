//! Single-flight session refresh shared by every request that hits an authorization failure.
//!
//! [`RefreshCoordinator::ensure_fresh_token`] is the only way to renew the session. The first
//! caller that observes an idle coordinator flips it to refreshing and starts a refresh cycle on
//! a detached task; every caller that arrives while the cycle is in flight is queued behind it.
//! When the cycle resolves, the coordinator returns to idle and hands the same outcome (new
//! access token or failure) to each queued caller in arrival order, exactly once.
//!
//! The decision to queue or to start a cycle happens under one mutex acquisition, so two callers
//! can never both observe an idle coordinator and issue two exchanges. Queued callers wait on
//! their own oneshot channel; a caller that times out or is dropped removes only its own entry
//! and never disturbs the cycle.

mod exchange;
mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::collections::VecDeque;
// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{Session, TokenSecret},
	config::ClientConfig,
	error::{RefreshError, RefreshFailure},
	http::{ApiRequest, Transport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{CompareAndSwapOutcome, SessionStore},
};

type RefreshResult = Result<TokenSecret, RefreshError>;

/// Coordinates refresh cycles for one session store.
///
/// The coordinator is a cheap handle; clones share the same state, queue, and metrics.
pub struct RefreshCoordinator<T>
where
	T: ?Sized + Transport,
{
	shared: Arc<Shared<T>>,
}
impl<T> RefreshCoordinator<T>
where
	T: ?Sized + Transport,
{
	/// Creates an idle coordinator that refreshes `store` through `transport`.
	pub fn new(transport: Arc<T>, store: Arc<dyn SessionStore>, config: ClientConfig) -> Self {
		Self {
			shared: Arc::new(Shared {
				transport,
				store,
				config,
				metrics: Default::default(),
				state: Mutex::new(CoordinatorState {
					phase: RefreshState::Idle,
					next_cycle: 1,
					next_waiter: 1,
				}),
			}),
		}
	}

	/// Returns an access token that supersedes `rejected`, refreshing the session if needed.
	///
	/// `origin` is the request that hit the authorization failure and `rejected` the token it was
	/// sent with. If the stored token already differs from `rejected`, another cycle has renewed
	/// the session and the current token is returned without a new exchange.
	///
	/// # Panics
	///
	/// Starting a cycle spawns a Tokio task, so this must be polled inside a Tokio runtime.
	pub async fn ensure_fresh_token(
		&self,
		origin: &ApiRequest,
		rejected: Option<&TokenSecret>,
	) -> Result<TokenSecret> {
		let (ticket, rx) = match self.enter(origin.label(), rejected)? {
			Entry::Ready(token) => return Ok(token),
			Entry::Queued(ticket, rx) => (ticket, rx),
		};
		let received = match self.shared.config.timeouts.wait {
			Some(after) => match tokio::time::timeout(after, rx).await {
				Ok(received) => received,
				Err(_) => {
					self.shared.metrics.record_timeout();

					return Err(Error::Timeout { operation: "session refresh", after });
				},
			},
			None => rx.await,
		};

		ticket.disarm();

		received
			.unwrap_or(Err(RefreshError::Failed(RefreshFailure::Interrupted)))
			.map_err(Error::from)
	}

	/// Returns `true` while a refresh cycle is in flight.
	pub fn is_refreshing(&self) -> bool {
		matches!(self.shared.state.lock().phase, RefreshState::Refreshing { .. })
	}

	/// Returns the number of callers waiting on the in-flight cycle, initiator included.
	pub fn queued(&self) -> usize {
		match &self.shared.state.lock().phase {
			RefreshState::Idle => 0,
			RefreshState::Refreshing { waiters, .. } => waiters.len(),
		}
	}

	/// Returns the shared refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.shared.metrics
	}

	/// Returns the transport refresh exchanges go through.
	pub fn transport(&self) -> &Arc<T> {
		&self.shared.transport
	}

	/// Returns the store the coordinator renews and clears.
	pub fn store(&self) -> &Arc<dyn SessionStore> {
		&self.shared.store
	}

	/// Returns the configuration refresh exchanges are built from.
	pub fn config(&self) -> &ClientConfig {
		&self.shared.config
	}

	fn enter(
		&self,
		origin: String,
		rejected: Option<&TokenSecret>,
	) -> Result<Entry<'_, T>, RefreshError> {
		let shared = &self.shared;
		let mut guard = shared.state.lock();
		let state = &mut *guard;
		let waiter = state.next_waiter;

		if let RefreshState::Refreshing { cycle, waiters } = &mut state.phase {
			let (tx, rx) = oneshot::channel();
			let cycle = *cycle;

			obs::waiter_queued(cycle, &origin, waiters.len() + 1);
			waiters.push_back(PendingRequest { id: waiter, tx });
			state.next_waiter += 1;
			shared.metrics.record_waiter();

			return Ok(Entry::Queued(WaitTicket::new(shared, cycle, waiter), rx));
		}

		let Some(session) = shared.store.get() else {
			return Err(RefreshError::NoRefreshToken);
		};

		if rejected != Some(&session.access_token) {
			return Ok(Entry::Ready(session.access_token));
		}

		let Some(refresh_token) = session.refresh_token.clone().filter(|secret| !secret.is_blank())
		else {
			drop(guard);
			shared.store.compare_and_swap(&session.access_token, None);

			return Err(RefreshError::NoRefreshToken);
		};
		let (tx, rx) = oneshot::channel();
		let cycle = state.next_cycle;

		state.next_cycle += 1;
		state.next_waiter += 1;
		state.phase = RefreshState::Refreshing {
			cycle,
			waiters: VecDeque::from([PendingRequest { id: waiter, tx }]),
		};
		shared.metrics.record_exchange();
		shared.metrics.record_waiter();
		obs::refresh_cycle_started(cycle, &origin);
		tokio::spawn(run_cycle(Arc::clone(shared), cycle, session, refresh_token));

		Ok(Entry::Queued(WaitTicket::new(shared, cycle, waiter), rx))
	}
}
impl<T> Clone for RefreshCoordinator<T>
where
	T: ?Sized + Transport,
{
	fn clone(&self) -> Self {
		Self { shared: Arc::clone(&self.shared) }
	}
}
impl<T> Debug for RefreshCoordinator<T>
where
	T: ?Sized + Transport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("refreshing", &self.is_refreshing())
			.field("queued", &self.queued())
			.field("metrics", &self.shared.metrics)
			.finish()
	}
}

struct Shared<T>
where
	T: ?Sized + Transport,
{
	transport: Arc<T>,
	store: Arc<dyn SessionStore>,
	config: ClientConfig,
	metrics: RefreshMetrics,
	state: Mutex<CoordinatorState>,
}
impl<T> Shared<T>
where
	T: ?Sized + Transport,
{
	/// Returns the coordinator to idle and delivers `result` to every waiter of `cycle`.
	fn release(&self, cycle: u64, result: RefreshResult) {
		let waiters = {
			let mut state = self.state.lock();

			match &state.phase {
				RefreshState::Refreshing { cycle: current, .. } if *current == cycle => {},
				_ => return,
			}

			match std::mem::replace(&mut state.phase, RefreshState::Idle) {
				RefreshState::Refreshing { waiters, .. } => waiters,
				RefreshState::Idle => VecDeque::new(),
			}
		};

		obs::refresh_cycle_finished(cycle, waiters.len(), result.as_ref().err());

		for waiter in waiters {
			let _ = waiter.tx.send(result.clone());
		}
	}
}

struct CoordinatorState {
	phase: RefreshState,
	next_cycle: u64,
	next_waiter: u64,
}

enum RefreshState {
	Idle,
	Refreshing { cycle: u64, waiters: VecDeque<PendingRequest> },
}

struct PendingRequest {
	id: u64,
	tx: oneshot::Sender<RefreshResult>,
}

enum Entry<'a, T>
where
	T: ?Sized + Transport,
{
	Ready(TokenSecret),
	Queued(WaitTicket<'a, T>, oneshot::Receiver<RefreshResult>),
}

/// Removes its waiter from the queue when the caller stops waiting before delivery.
struct WaitTicket<'a, T>
where
	T: ?Sized + Transport,
{
	shared: &'a Shared<T>,
	cycle: u64,
	waiter: u64,
	armed: bool,
}
impl<'a, T> WaitTicket<'a, T>
where
	T: ?Sized + Transport,
{
	fn new(shared: &'a Shared<T>, cycle: u64, waiter: u64) -> Self {
		Self { shared, cycle, waiter, armed: true }
	}

	fn disarm(mut self) {
		self.armed = false;
	}
}
impl<T> Drop for WaitTicket<'_, T>
where
	T: ?Sized + Transport,
{
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		let mut state = self.shared.state.lock();

		if let RefreshState::Refreshing { cycle, waiters } = &mut state.phase {
			if *cycle != self.cycle {
				return;
			}
			if let Some(position) = waiters.iter().position(|pending| pending.id == self.waiter) {
				waiters.remove(position);
				obs::waiter_abandoned(self.cycle, self.waiter);
			}
		}
	}
}

/// Resolves the cycle with [`RefreshFailure::Interrupted`] if the task ends without resolving it.
struct CycleGuard<T>
where
	T: ?Sized + Transport,
{
	shared: Arc<Shared<T>>,
	cycle: u64,
	resolved: bool,
}
impl<T> CycleGuard<T>
where
	T: ?Sized + Transport,
{
	fn resolve(mut self, result: RefreshResult) {
		self.resolved = true;
		self.shared.release(self.cycle, result);
	}
}
impl<T> Drop for CycleGuard<T>
where
	T: ?Sized + Transport,
{
	fn drop(&mut self) {
		if !self.resolved {
			self.shared.release(self.cycle, Err(RefreshError::Failed(RefreshFailure::Interrupted)));
		}
	}
}

async fn run_cycle<T>(
	shared: Arc<Shared<T>>,
	cycle: u64,
	session: Session,
	refresh_token: TokenSecret,
) where
	T: ?Sized + Transport,
{
	const KIND: FlowKind = FlowKind::Refresh;

	let guard = CycleGuard { shared: Arc::clone(&shared), cycle, resolved: false };
	let span = FlowSpan::new(KIND, "refresh_cycle");

	obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

	let outcome = span
		.instrument(exchange::refresh(
			shared.transport.as_ref(),
			&shared.config,
			&session,
			&refresh_token,
		))
		.await;
	let result = match outcome {
		Ok(renewed) => {
			let token = renewed.access_token.clone();

			commit(&shared, cycle, &session, Some(renewed));
			shared.metrics.record_success();
			obs::record_flow_outcome(KIND, FlowOutcome::Success);

			Ok(token)
		},
		Err(failure) => {
			commit(&shared, cycle, &session, None);
			shared.metrics.record_failure();
			obs::record_flow_outcome(KIND, FlowOutcome::Failure);

			Err(RefreshError::Failed(failure))
		},
	};

	guard.resolve(result);
}

/// Writes the cycle's outcome unless the session it started from was replaced meanwhile
/// (logout, login of another session).
fn commit<T>(shared: &Shared<T>, cycle: u64, started_from: &Session, replacement: Option<Session>)
where
	T: ?Sized + Transport,
{
	let outcome = shared.store.compare_and_swap(&started_from.access_token, replacement);

	if outcome != CompareAndSwapOutcome::Updated {
		obs::refresh_outcome_discarded(cycle, outcome);
	}
}
