//! Single-flight refresh state machine.
//!
//! The coordinator only tracks who leads the current cycle and who waits on it; the client
//! performs the exchange and hands the outcome back through [`LeaderTicket::release`]. The
//! leader check and the switch to `Refreshing` happen under one lock acquisition, so two
//! concurrent authorization failures can never both become leaders.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::sync::oneshot;
// self
use crate::{_prelude::*, error::ExchangeError, token::TokenPair};

/// Outcome shared with every request waiting on a cycle.
pub(crate) type CycleOutcome = Result<Arc<TokenPair>, Arc<ExchangeError>>;

#[derive(Default)]
enum RefreshState {
	#[default]
	Idle,
	Refreshing {
		cycle: u64,
		queue: VecDeque<PendingRequest>,
	},
}

struct PendingRequest {
	id: u64,
	completion: oneshot::Sender<CycleOutcome>,
}

/// Tracks whether a refresh cycle is running and which requests wait for it.
#[derive(Default)]
pub struct RefreshCoordinator {
	state: Mutex<RefreshState>,
	next_id: AtomicU64,
}
impl RefreshCoordinator {
	/// Returns `true` while a cycle is in flight.
	pub fn is_refreshing(&self) -> bool {
		matches!(*self.state.lock(), RefreshState::Refreshing { .. })
	}

	/// Number of requests currently waiting on the in-flight cycle.
	pub fn queued(&self) -> usize {
		match &*self.state.lock() {
			RefreshState::Refreshing { queue, .. } => queue.len(),
			RefreshState::Idle => 0,
		}
	}

	/// Becomes the leader of a new cycle, or enqueues behind the running one.
	pub(crate) fn join(&self) -> Role<'_> {
		let mut state = self.state.lock();
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);

		if let RefreshState::Refreshing { cycle, queue } = &mut *state {
			let (completion, receiver) = oneshot::channel();

			queue.push_back(PendingRequest { id, completion });

			return Role::Follower(Waiter {
				coordinator: self,
				cycle: *cycle,
				id,
				receiver,
				settled: false,
			});
		}

		*state = RefreshState::Refreshing { cycle: id, queue: VecDeque::new() };

		Role::Leader(LeaderTicket { coordinator: self, cycle: id, settled: false })
	}

	/// Returns to `Idle` and hands back the queue, if `cycle` is still the running one.
	fn finish(&self, cycle: u64) -> VecDeque<PendingRequest> {
		let mut state = self.state.lock();

		match &*state {
			RefreshState::Refreshing { cycle: current, .. } if *current == cycle => {},
			_ => return VecDeque::new(),
		}

		match std::mem::take(&mut *state) {
			RefreshState::Refreshing { queue, .. } => queue,
			RefreshState::Idle => VecDeque::new(),
		}
	}

	fn withdraw(&self, cycle: u64, id: u64) {
		match &mut *self.state.lock() {
			RefreshState::Refreshing { cycle: current, queue } if *current == cycle =>
				queue.retain(|pending| pending.id != id),
			_ => {},
		}
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("refreshing", &self.is_refreshing())
			.field("queued", &self.queued())
			.finish()
	}
}

/// Role assigned to an authorization failure.
pub(crate) enum Role<'a> {
	/// First failure of the cycle; performs the exchange.
	Leader(LeaderTicket<'a>),
	/// Failure observed while the cycle runs; waits for its outcome.
	Follower(Waiter<'a>),
}

/// Proof of leadership for one cycle.
///
/// Dropping an unreleased ticket abandons the cycle: the state returns to `Idle` and every
/// waiter observes a closed channel.
pub(crate) struct LeaderTicket<'a> {
	coordinator: &'a RefreshCoordinator,
	cycle: u64,
	settled: bool,
}
impl LeaderTicket<'_> {
	/// Ends the cycle and releases every queued request, in arrival order, with `outcome`.
	///
	/// Returns how many requests were released.
	pub(crate) fn release(mut self, outcome: CycleOutcome) -> usize {
		self.settled = true;

		let queue = self.coordinator.finish(self.cycle);
		let released = queue.len();

		for pending in queue {
			// The waiter may have been cancelled between dequeue and send.
			let _ = pending.completion.send(outcome.clone());
		}

		released
	}
}
impl Drop for LeaderTicket<'_> {
	fn drop(&mut self) {
		if !self.settled {
			drop(self.coordinator.finish(self.cycle));
		}
	}
}

/// A queued request's handle on the running cycle.
///
/// Dropping a waiter before the cycle settles removes its queue entry.
pub(crate) struct Waiter<'a> {
	coordinator: &'a RefreshCoordinator,
	cycle: u64,
	id: u64,
	receiver: oneshot::Receiver<CycleOutcome>,
	settled: bool,
}
impl Waiter<'_> {
	/// Waits at most `timeout` for the cycle outcome.
	pub(crate) async fn wait(mut self, timeout: std::time::Duration) -> Result<Arc<TokenPair>> {
		match tokio::time::timeout(timeout, &mut self.receiver).await {
			Ok(received) => {
				self.settled = true;

				match received {
					Ok(Ok(pair)) => Ok(pair),
					Ok(Err(err)) => Err(Error::Exchange(err)),
					Err(_) => Err(Error::RefreshAbandoned),
				}
			},
			Err(_) => Err(Error::RefreshTimeout { waited: timeout }),
		}
	}
}
impl Drop for Waiter<'_> {
	fn drop(&mut self) {
		if !self.settled {
			self.coordinator.withdraw(self.cycle, self.id);
		}
	}
}
