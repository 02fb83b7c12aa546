//! Client-level error types shared by the interceptors, the coordinator, and the exchanger.

// self
use crate::{_prelude::*, exchange::GrantKind};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure while calling the protected API.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The identity provider failed the credential exchange for the current refresh cycle.
	///
	/// Every request that waited on the failed cycle receives the same shared error.
	#[error("Credential exchange failed: {0}")]
	Exchange(Arc<ExchangeError>),

	/// A request replayed with a refreshed token was rejected again.
	#[error("Request was rejected with HTTP {status} after being replayed with a refreshed token.")]
	RetryExhausted {
		/// Status returned by the replay.
		status: u16,
	},
	/// A queued request gave up waiting for the in-flight refresh.
	#[error("Timed out after {waited:?} while waiting for the in-flight token refresh.")]
	RefreshTimeout {
		/// How long the request waited.
		waited: std::time::Duration,
	},
	/// The request leading the refresh cycle was dropped before the exchange completed.
	#[error("The in-flight token refresh was abandoned before it completed.")]
	RefreshAbandoned,
	/// The API answered with a non-success status (JSON helpers only).
	#[error("API returned HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Response body decoded lossily as UTF-8.
		body: String,
	},
	/// The API response body could not be decoded (JSON helpers only).
	#[error("API response body could not be decoded.")]
	Decode(#[from] serde_path_to_error::Error<serde_json::Error>),
}
impl Error {
	/// Returns the shared exchange failure, if this error came from a failed refresh cycle.
	pub fn as_exchange(&self) -> Option<&ExchangeError> {
		match self {
			Self::Exchange(err) => Some(err),
			_ => None,
		}
	}
}
impl From<ExchangeError> for Error {
	fn from(e: ExchangeError) -> Self {
		Self::Exchange(Arc::new(e))
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A required setting was not supplied.
	#[error("Missing required setting `{name}`.")]
	Missing {
		/// Setting or environment variable name.
		name: &'static str,
	},
	/// A setting holds an empty or whitespace-only value.
	#[error("Setting `{name}` must not be empty.")]
	Empty {
		/// Setting name.
		name: &'static str,
	},
	/// A URL setting could not be parsed.
	#[error("Setting `{name}` is not a valid URL.")]
	InvalidUrl {
		/// Setting name.
		name: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A URL uses a scheme other than `http` or `https`.
	#[error("Setting `{name}` must use http or https: {url}.")]
	UnsupportedScheme {
		/// Setting name.
		name: &'static str,
		/// Offending URL.
		url: String,
	},
	/// A credential cannot be encoded as an HTTP header value.
	#[error("The `{name}` header value contains invalid characters.")]
	InvalidHeaderValue {
		/// Header name.
		name: &'static str,
	},
	/// A request body could not be serialized.
	#[error("Request body could not be serialized.")]
	Serialize(#[from] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, request construction).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure (DNS, TCP, TLS, timeout).
	#[error("Network error occurred while sending the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[from] std::io::Error),
	/// The request descriptor could not be converted into an HTTP request.
	#[error("HTTP request could not be constructed.")]
	InvalidRequest(#[from] oauth2::http::Error),
	/// Transport reported a failure without a structured cause.
	#[error("HTTP client error: {message}.")]
	Other {
		/// Transport-supplied message.
		message: String,
	},
}

/// Failures of a single credential exchange against the identity provider.
#[derive(Debug, ThisError)]
pub enum ExchangeError {
	/// The refresh-token grant was requested but the session holds no refresh token.
	#[error("No refresh token is held; the {grant} grant cannot run.")]
	MissingRefreshToken {
		/// Grant that needed the refresh token.
		grant: GrantKind,
	},
	/// The token endpoint URL could not be constructed.
	#[error("Token endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// The identity provider answered with an OAuth error response.
	#[error("Identity provider rejected the {grant} grant: {reason}.")]
	Rejected {
		/// Grant that was rejected.
		grant: GrantKind,
		/// OAuth error code plus description, when supplied.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The identity provider returned a body that is not a valid token response.
	#[error("Identity provider returned a malformed token response.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The identity provider returned an unexpected response.
	#[error("Identity provider returned an unexpected response: {message}.")]
	UnexpectedResponse {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The identity provider did not answer within the exchange timeout.
	#[error("Identity provider did not answer the {grant} grant within {waited:?}.")]
	TimedOut {
		/// Grant that was running.
		grant: GrantKind,
		/// Configured exchange timeout.
		waited: std::time::Duration,
	},
	/// The identity provider could not be reached.
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl ExchangeError {
	/// Returns the HTTP status the identity provider answered with, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. }
			| Self::Parse { status, .. }
			| Self::UnexpectedResponse { status, .. } => *status,
			_ => None,
		}
	}
}
