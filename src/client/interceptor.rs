//! Request and response interception.
//!
//! [`authorize`] runs on every attempt against a fresh clone of the caller's request, and
//! [`is_authorization_failure`] decides which responses enter the refresh path.

// crates.io
use oauth2::http::{HeaderName, HeaderValue, StatusCode, header::AUTHORIZATION};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	http::ApiRequest,
	session::Session,
	token::{TokenPair, TokenSecret},
};

/// Header carrying the static API key while no token is held.
pub const API_KEY_HEADER: &str = "apikey";

/// Credential attached to one outbound attempt.
#[derive(Clone, Debug)]
pub enum Credential {
	/// `Authorization: Bearer <token>`.
	Bearer(TokenSecret),
	/// `apikey: <key>`.
	ApiKey(HeaderValue),
	/// Neither a token nor a key is available; the request goes out unauthenticated.
	Anonymous,
}
impl Credential {
	/// Picks the credential for an attempt.
	///
	/// A token pinned by a replay wins, then the session's access token, then the API key.
	pub fn select(
		pinned: Option<&TokenSecret>,
		session: &Session,
		api_key: Option<&HeaderValue>,
	) -> Self {
		if let Some(token) = pinned {
			return Self::Bearer(token.clone());
		}
		if let Some(token) = session.access_token() {
			return Self::Bearer(token);
		}

		match api_key {
			Some(key) => Self::ApiKey(key.clone()),
			None => Self::Anonymous,
		}
	}
}

/// Request descriptor plus its retry state.
#[derive(Clone, Debug)]
pub struct RetryableRequest {
	request: ApiRequest,
	retried: bool,
	pinned: Option<TokenSecret>,
}
impl RetryableRequest {
	/// Wraps a caller's request for its first attempt.
	pub fn new(request: ApiRequest) -> Self {
		Self { request, retried: false, pinned: None }
	}

	/// The caller's request, untouched by interception.
	pub fn request(&self) -> &ApiRequest {
		&self.request
	}

	/// Whether this request already went through a refresh cycle.
	pub fn retried(&self) -> bool {
		self.retried
	}

	/// Token a replay must carry regardless of later session writes.
	pub fn pinned_token(&self) -> Option<&TokenSecret> {
		self.pinned.as_ref()
	}

	/// Marks the request as retried and pins the cycle's access token.
	pub fn into_replay(self, pair: &TokenPair) -> Self {
		Self { request: self.request, retried: true, pinned: Some(pair.access_token().clone()) }
	}
}

/// Writes `credential` into `request`'s headers.
pub fn authorize(request: &mut ApiRequest, credential: &Credential) -> Result<(), ConfigError> {
	match credential {
		Credential::Bearer(token) => {
			request.headers.insert(AUTHORIZATION, token.bearer_header()?);
		},
		Credential::ApiKey(key) => {
			request.headers.insert(HeaderName::from_static(API_KEY_HEADER), key.clone());
		},
		Credential::Anonymous => {},
	}

	Ok(())
}

/// Returns `true` for the statuses that trigger a refresh cycle.
pub fn is_authorization_failure(status: StatusCode) -> bool {
	matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn request() -> ApiRequest {
		let url = Url::parse("https://api.example.com/prompt-sets").expect("Failed to parse URL.");

		ApiRequest::get(url)
	}

	fn key() -> HeaderValue {
		HeaderValue::from_static("k-123")
	}

	#[test]
	fn session_token_wins_over_api_key() {
		let session = Session::with_token(TokenPair::new("T1"));
		let credential = Credential::select(None, &session, Some(&key()));
		let mut outbound = request();

		authorize(&mut outbound, &credential).expect("Bearer header should apply.");

		assert_eq!(
			outbound.headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok()),
			Some("Bearer T1")
		);
		assert!(outbound.headers.get(API_KEY_HEADER).is_none());
	}

	#[test]
	fn api_key_is_used_without_a_token() {
		let credential = Credential::select(None, &Session::new(), Some(&key()));
		let mut outbound = request();

		authorize(&mut outbound, &credential).expect("API key header should apply.");

		assert_eq!(outbound.headers.get(API_KEY_HEADER), Some(&key()));
		assert!(outbound.headers.get(AUTHORIZATION).is_none());
	}

	#[test]
	fn nothing_is_attached_without_credentials() {
		let credential = Credential::select(None, &Session::new(), None);
		let mut outbound = request();

		authorize(&mut outbound, &credential).expect("Anonymous requests should pass.");

		assert!(outbound.headers.is_empty());
	}

	#[test]
	fn replays_carry_the_pinned_token() {
		let session = Session::with_token(TokenPair::new("T1"));
		let replay = RetryableRequest::new(request()).into_replay(&TokenPair::new("T2"));

		session.set_token(TokenPair::new("T3"));

		let credential = Credential::select(replay.pinned_token(), &session, None);

		assert!(replay.retried());
		assert!(matches!(credential, Credential::Bearer(token) if token.expose() == "T2"));
	}

	#[test]
	fn only_401_and_403_trigger_refresh() {
		assert!(is_authorization_failure(StatusCode::UNAUTHORIZED));
		assert!(is_authorization_failure(StatusCode::FORBIDDEN));
		assert!(!is_authorization_failure(StatusCode::NOT_FOUND));
		assert!(!is_authorization_failure(StatusCode::INTERNAL_SERVER_ERROR));
	}
}
