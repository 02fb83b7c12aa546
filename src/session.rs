//! Token holder shared by every request a client sends.
//!
//! A [`Session`] is an explicitly owned object: clients receive it by injection, so several
//! independent sessions can coexist in one process. Reads hand out `Arc<TokenPair>` snapshots,
//! and [`Session::set_token`] swaps the pair wholesale before notifying refresh subscribers.

mod hooks;

pub use hooks::*;

// self
use crate::{
	_prelude::*,
	error::ExchangeError,
	session::hooks::HookList,
	token::{TokenPair, TokenSecret},
};

/// Holder of the current token pair plus the refresh/expiry subscriber lists.
#[derive(Default)]
pub struct Session {
	current: RwLock<Option<Arc<TokenPair>>>,
	refresh_hooks: HookList<dyn Fn(&TokenPair) + Send + Sync>,
	expiry_hooks: HookList<dyn Fn(&ExchangeError) + Send + Sync>,
}
impl Session {
	/// Creates an empty session; requests fall back to the API key until a token is set.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a session that already holds `pair`. No subscriber exists yet, so none fires.
	pub fn with_token(pair: TokenPair) -> Self {
		let session = Self::default();

		*session.current.write() = Some(Arc::new(pair));

		session
	}

	/// Returns a snapshot of the held pair.
	pub fn token(&self) -> Option<Arc<TokenPair>> {
		self.current.read().clone()
	}

	/// Returns the held access token.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.current.read().as_ref().map(|pair| pair.access_token().clone())
	}

	/// Returns the held refresh credential.
	pub fn refresh_token(&self) -> Option<TokenSecret> {
		self.current.read().as_ref().and_then(|pair| pair.refresh_token().cloned())
	}

	/// Replaces the held pair, then synchronously notifies every refresh subscriber.
	///
	/// The write completes before any subscriber runs, so a subscriber (or any request
	/// started afterwards) always observes the new pair.
	pub fn set_token(&self, pair: TokenPair) -> Arc<TokenPair> {
		let pair = Arc::new(pair);

		*self.current.write() = Some(pair.clone());

		for hook in self.refresh_hooks.snapshot() {
			hook(&pair);
		}

		pair
	}

	/// Drops the held pair without notifying anyone.
	pub fn clear(&self) -> Option<Arc<TokenPair>> {
		self.current.write().take()
	}

	/// Subscribes to every successful token write.
	pub fn on_refresh<F>(&self, callback: F) -> Subscription
	where
		F: 'static + Send + Sync + Fn(&TokenPair),
	{
		Subscription { id: self.refresh_hooks.push(Arc::new(callback)), kind: HookKind::Refresh }
	}

	/// Subscribes to failed refresh cycles.
	pub fn on_expiry<F>(&self, callback: F) -> Subscription
	where
		F: 'static + Send + Sync + Fn(&ExchangeError),
	{
		Subscription { id: self.expiry_hooks.push(Arc::new(callback)), kind: HookKind::Expiry }
	}

	/// Removes a subscriber; returns `false` when it was already gone.
	pub fn unsubscribe(&self, subscription: Subscription) -> bool {
		match subscription.kind {
			HookKind::Refresh => self.refresh_hooks.remove(subscription.id),
			HookKind::Expiry => self.expiry_hooks.remove(subscription.id),
		}
	}

	pub(crate) fn notify_expiry(&self, err: &ExchangeError) {
		for hook in self.expiry_hooks.snapshot() {
			hook(err);
		}
	}
}
impl Debug for Session {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("token", &self.current.read())
			.field("refresh_hooks", &self.refresh_hooks.len())
			.field("expiry_hooks", &self.expiry_hooks.len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{error::TransportError, exchange::GrantKind};

	#[test]
	fn set_token_replaces_pair_and_notifies_in_order() {
		let session = Arc::new(Session::new());
		let seen = Arc::new(Mutex::new(Vec::new()));

		for label in ["first", "second"] {
			let seen = seen.clone();

			session.on_refresh(move |pair| {
				seen.lock().push(format!("{label}:{}", pair.access_token().expose()));
			});
		}

		session.set_token(TokenPair::new("T1").with_refresh_token("RT1"));
		session.set_token(TokenPair::new("T2"));

		assert_eq!(*seen.lock(), ["first:T1", "second:T1", "first:T2", "second:T2"]);
		assert_eq!(session.access_token().map(|token| token.expose().to_owned()), Some("T2".into()));
		assert!(session.refresh_token().is_none());
	}

	#[test]
	fn subscribers_observe_the_new_pair_through_the_session() {
		let session = Arc::new(Session::with_token(TokenPair::new("old")));
		let observed = Arc::new(Mutex::new(None));
		let hook_session = session.clone();
		let hook_observed = observed.clone();

		session.on_refresh(move |_| {
			*hook_observed.lock() = hook_session.access_token().map(|t| t.expose().to_owned());
		});
		session.set_token(TokenPair::new("new"));

		assert_eq!(observed.lock().as_deref(), Some("new"));
	}

	#[test]
	fn unsubscribe_stops_notifications() {
		let session = Session::new();
		let count = Arc::new(AtomicUsize::new(0));
		let counter = count.clone();
		let subscription = session.on_refresh(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		session.set_token(TokenPair::new("T1"));

		assert!(session.unsubscribe(subscription));
		assert!(!session.unsubscribe(subscription));

		session.set_token(TokenPair::new("T2"));

		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn foreign_subscriptions_do_not_unsubscribe() {
		let a = Session::new();
		let b = Session::new();
		let count = Arc::new(AtomicUsize::new(0));
		let counter = count.clone();
		let from_a = a.on_refresh(|_| {});

		b.on_refresh(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		assert!(!b.unsubscribe(from_a));

		b.set_token(TokenPair::new("T1"));

		assert_eq!(count.load(Ordering::SeqCst), 1);
		assert!(a.unsubscribe(from_a));
	}

	#[test]
	fn expiry_subscribers_receive_the_error() {
		let session = Session::new();
		let messages = Arc::new(Mutex::new(Vec::new()));
		let sink = messages.clone();

		session.on_expiry(move |err| sink.lock().push(err.to_string()));
		session.notify_expiry(&ExchangeError::MissingRefreshToken { grant: GrantKind::RefreshToken });
		session.notify_expiry(&TransportError::Other { message: "down".into() }.into());

		assert_eq!(messages.lock().len(), 2);
	}

	#[test]
	fn clear_does_not_fire_refresh_hooks() {
		let session = Session::with_token(TokenPair::new("T1"));
		let fired = Arc::new(AtomicUsize::new(0));
		let counter = fired.clone();

		session.on_refresh(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		assert!(session.clear().is_some());
		assert!(session.token().is_none());
		assert_eq!(fired.load(Ordering::SeqCst), 0);
	}
}
