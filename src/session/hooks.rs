//! Ordered subscriber lists for session events.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::_prelude::*;

// Shared by every list so a handle issued by one session never matches another's entries.
static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(0);

/// Event stream a [`Subscription`] belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
	/// Fired after every token write.
	Refresh,
	/// Fired once per failed refresh cycle.
	Expiry,
}

/// Handle returned when registering a callback; pass it back to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
	pub(crate) id: u64,
	pub(crate) kind: HookKind,
}
impl Subscription {
	/// Event stream this subscription listens to.
	pub fn kind(&self) -> HookKind {
		self.kind
	}
}

/// Registration-ordered callbacks of one kind.
pub(crate) struct HookList<H>
where
	H: ?Sized,
{
	entries: RwLock<Vec<(u64, Arc<H>)>>,
}
impl<H> HookList<H>
where
	H: ?Sized,
{
	pub(crate) fn push(&self, hook: Arc<H>) -> u64 {
		let id = NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed);

		self.entries.write().push((id, hook));

		id
	}

	pub(crate) fn remove(&self, id: u64) -> bool {
		let mut entries = self.entries.write();
		let before = entries.len();

		entries.retain(|(entry_id, _)| *entry_id != id);

		entries.len() != before
	}

	/// Clones the current list so callbacks run without holding the lock.
	pub(crate) fn snapshot(&self) -> Vec<Arc<H>> {
		self.entries.read().iter().map(|(_, hook)| hook.clone()).collect()
	}

	pub(crate) fn len(&self) -> usize {
		self.entries.read().len()
	}
}
impl<H> Default for HookList<H>
where
	H: ?Sized,
{
	fn default() -> Self {
		Self { entries: RwLock::new(Vec::new()) }
	}
}
