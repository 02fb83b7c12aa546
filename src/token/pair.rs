//! Immutable access/refresh token pair.

// self
use crate::{_prelude::*, token::TokenSecret};

/// Access token plus the optional refresh credential issued alongside it.
///
/// Pairs are never edited in place: the session swaps in a new `Arc<TokenPair>` on every
/// write, so any snapshot a request reads stays consistent for that request.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenPair {
	access_token: TokenSecret,
	refresh_token: Option<TokenSecret>,
	received_at: OffsetDateTime,
	expires_at: Option<OffsetDateTime>,
}
impl TokenPair {
	/// Creates a pair holding only an access token, stamped with the current instant.
	pub fn new(access_token: impl Into<TokenSecret>) -> Self {
		Self {
			access_token: access_token.into(),
			refresh_token: None,
			received_at: OffsetDateTime::now_utc(),
			expires_at: None,
		}
	}

	/// Attaches the refresh credential.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<TokenSecret>) -> Self {
		self.refresh_token = Some(refresh_token.into());

		self
	}

	/// Records the provider-reported lifetime. Informational only; expiry is never enforced.
	pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
		self.expires_at = Some(self.received_at + expires_in);

		self
	}

	/// Access token sent as the bearer credential.
	pub fn access_token(&self) -> &TokenSecret {
		&self.access_token
	}

	/// Refresh credential, if the identity provider issued one.
	pub fn refresh_token(&self) -> Option<&TokenSecret> {
		self.refresh_token.as_ref()
	}

	/// Instant the pair was constructed.
	pub fn received_at(&self) -> OffsetDateTime {
		self.received_at
	}

	/// Provider-reported expiry instant, if known.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_at
	}
}
impl Debug for TokenPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPair")
			.field("access_token", &self.access_token)
			.field("refresh_token_set", &self.refresh_token.is_some())
			.field("received_at", &self.received_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
