//! Token-aware HTTP client with single-flight refresh and replay.
//!
//! [`AuthClient::send`] runs every request through the same pipeline:
//!
//! 1. Clone the caller's [`ApiRequest`] and attach a credential (pinned replay token, then the
//!    session's access token, then the `apikey` header).
//! 2. Dispatch it through the [`HttpTransport`].
//! 3. Hand any status other than `401`/`403` back untouched.
//! 4. On `401`/`403`, join the [`RefreshCoordinator`]. The first failure of a cycle leads it and
//!    runs the credential exchange. Every failure observed while the exchange runs waits in
//!    FIFO order for its outcome.
//! 5. Replay each request exactly once with the new access token. A replay that is rejected
//!    again surfaces [`Error::RetryExhausted`].
//!
//! A failed exchange rejects every request of the cycle with the same shared error and fires
//! the session's expiry subscribers once.

pub mod coordinator;
pub mod interceptor;

mod metrics;

pub use coordinator::RefreshCoordinator;
pub use interceptor::{Credential, RetryableRequest};
pub use metrics::RefreshMetrics;

// crates.io
use oauth2::http::HeaderValue;
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	client::coordinator::{LeaderTicket, Role},
	config::ClientConfig,
	error::{ConfigError, ExchangeError},
	exchange::CredentialExchanger,
	http::{self, ApiRequest, AsyncHttpClient, HttpResponse, HttpTransport, ResponseMetadataSlot},
	obs::{self, FlowKind, FlowOutcome, FlowSpan, debug_event, warn_event},
	session::{Session, Subscription},
	token::TokenPair,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Client specialized for the crate's default reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestAuthClient = AuthClient<ReqwestHttpClient>;

/// HTTP client that keeps requests alive across token expiry.
///
/// Clones share the transport, the session, and the refresh coordinator, so a refresh
/// triggered through one clone is observed by all of them.
pub struct AuthClient<C>
where
	C: HttpTransport,
{
	transport: Arc<C>,
	session: Arc<Session>,
	exchanger: Arc<CredentialExchanger<C>>,
	coordinator: Arc<RefreshCoordinator>,
	metrics: Arc<RefreshMetrics>,
	config: Arc<ClientConfig>,
	api_key: Option<HeaderValue>,
}
impl<C> AuthClient<C>
where
	C: HttpTransport,
{
	/// Creates a client that dispatches every request (API and token endpoint) via `transport`.
	pub fn with_transport(config: ClientConfig, transport: impl Into<Arc<C>>) -> Result<Self> {
		config.validate()?;
		config
			.identity
			.token_endpoint()
			.map_err(|source| ConfigError::InvalidUrl { name: "identity.host", source })?;

		let api_key = config.api_key.as_deref().map(api_key_header).transpose()?;
		let transport = transport.into();
		let exchanger = CredentialExchanger::new(&config.identity, config.grant, transport.clone())?;

		Ok(Self {
			transport,
			session: Default::default(),
			exchanger: Arc::new(exchanger),
			coordinator: Default::default(),
			metrics: Default::default(),
			config: Arc::new(config),
			api_key,
		})
	}

	/// Replaces the token holder, e.g. to share one session between clients.
	pub fn with_session(mut self, session: Arc<Session>) -> Self {
		self.session = session;

		self
	}

	/// Token holder backing this client.
	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}

	/// Validated configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Refresh cycle counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Exchanger used by refresh cycles.
	pub fn exchanger(&self) -> &CredentialExchanger<C> {
		&self.exchanger
	}

	/// Returns `true` while a refresh cycle is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.coordinator.is_refreshing()
	}

	/// Stores `pair` in the session and notifies refresh subscribers.
	pub fn set_token(&self, pair: TokenPair) -> Arc<TokenPair> {
		self.session.set_token(pair)
	}

	/// Subscribes to every token write, including writes made by refresh cycles.
	pub fn on_token_refresh<F>(&self, callback: F) -> Subscription
	where
		F: 'static + Send + Sync + Fn(&TokenPair),
	{
		self.session.on_refresh(callback)
	}

	/// Subscribes to failed refresh cycles; each failed cycle fires once.
	pub fn on_token_expiry<F>(&self, callback: F) -> Subscription
	where
		F: 'static + Send + Sync + Fn(&ExchangeError),
	{
		self.session.on_expiry(callback)
	}

	/// Joins `path` onto the configured base URL.
	pub fn endpoint(&self, path: &str) -> Result<Url> {
		Ok(self.config.endpoint(path)?)
	}

	/// Sends `request`, refreshing the token and replaying once on `401`/`403`.
	///
	/// Non-authorization failures, including `5xx` statuses, come back as regular responses.
	pub async fn send(&self, request: ApiRequest) -> Result<HttpResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.dispatch(RetryableRequest::new(request))).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Runs a refresh cycle without a failing request, or joins the one in flight.
	///
	/// With [`GrantKind::ClientCredentials`](crate::exchange::GrantKind::ClientCredentials) this
	/// doubles as the initial login.
	pub async fn renew_token(&self) -> Result<Arc<TokenPair>> {
		let span = FlowSpan::new(FlowKind::RefreshCycle, "renew_token");

		span.instrument(self.refreshed_token()).await
	}

	/// Sends `request` and decodes a successful JSON response.
	pub async fn send_json<T>(&self, request: ApiRequest) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let response = self.send(request.accept_json()).await?;

		decode_json(&response)
	}

	/// `GET`s `path` relative to the base URL and decodes the JSON response.
	pub async fn get_json<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.send_json(ApiRequest::get(self.endpoint(path)?)).await
	}

	/// `POST`s `body` as JSON to `path` relative to the base URL and decodes the JSON response.
	pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		let request = ApiRequest::post(self.endpoint(path)?).with_json(body)?;

		self.send_json(request).await
	}

	async fn dispatch(&self, request: RetryableRequest) -> Result<HttpResponse> {
		let mut request = request;

		loop {
			let response = self.execute(&request).await?;
			let status = response.status();

			if !interceptor::is_authorization_failure(status) {
				return Ok(response);
			}
			if request.retried() {
				self.metrics.record_retry_exhausted();

				warn_event!(
					status = status.as_u16(),
					url = %request.request().url,
					"replayed request was rejected again"
				);

				return Err(Error::RetryExhausted { status: status.as_u16() });
			}

			debug_event!(
				status = status.as_u16(),
				url = %request.request().url,
				"authorization failure, joining refresh cycle"
			);

			let pair = self.refreshed_token().await?;

			request = request.into_replay(&pair);
		}
	}

	async fn execute(&self, request: &RetryableRequest) -> Result<HttpResponse> {
		let credential =
			Credential::select(request.pinned_token(), &self.session, self.api_key.as_ref());
		let mut outbound = request.request().clone();

		interceptor::authorize(&mut outbound, &credential)?;

		let http_request = outbound.to_http()?;
		let handle = self.transport.with_metadata(ResponseMetadataSlot::default());

		handle.call(http_request).await.map_err(|err| http::map_client_error(err).into())
	}

	async fn refreshed_token(&self) -> Result<Arc<TokenPair>> {
		match self.coordinator.join() {
			Role::Leader(ticket) => self.lead(ticket).await,
			Role::Follower(waiter) => {
				self.metrics.record_queued();

				debug_event!(queued = self.coordinator.queued(), "waiting on in-flight refresh");

				let result = waiter.wait(self.config.refresh_timeout).await;

				if let Err(Error::RefreshTimeout { waited }) = &result {
					self.metrics.record_timeout();

					warn_event!(waited = ?waited, "gave up waiting on in-flight refresh");
				}

				result
			},
		}
	}

	async fn lead(&self, ticket: LeaderTicket<'_>) -> Result<Arc<TokenPair>> {
		const KIND: FlowKind = FlowKind::RefreshCycle;

		let span = FlowSpan::new(KIND, "lead");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_cycle();

		let refresh_token = self.session.refresh_token();
		let waited = self.config.exchange_timeout;
		let exchange = self.exchanger.exchange(refresh_token.as_ref());
		let outcome = span
			.instrument(tokio::time::timeout(waited, exchange))
			.await
			.unwrap_or_else(|_| Err(ExchangeError::TimedOut { grant: self.exchanger.grant(), waited }));

		match outcome {
			Ok(pair) => {
				let pair = self.session.set_token(pair);
				let released = ticket.release(Ok(pair.clone()));

				self.metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				debug_event!(released, "refresh cycle succeeded");

				Ok(pair)
			},
			Err(err) => {
				let err = Arc::new(err);
				let released = ticket.release(Err(err.clone()));

				self.metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				warn_event!(released, error = %err, "refresh cycle failed");

				self.session.notify_expiry(&err);

				Err(Error::Exchange(err))
			},
		}
	}
}
#[cfg(feature = "reqwest")]
impl AuthClient<ReqwestHttpClient> {
	/// Creates a client backed by a default reqwest transport.
	pub fn new(config: ClientConfig) -> Result<Self> {
		Self::with_transport(config, ReqwestHttpClient::default())
	}
}
impl<C> Clone for AuthClient<C>
where
	C: HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			session: self.session.clone(),
			exchanger: self.exchanger.clone(),
			coordinator: self.coordinator.clone(),
			metrics: self.metrics.clone(),
			config: self.config.clone(),
			api_key: self.api_key.clone(),
		}
	}
}
impl<C> Debug for AuthClient<C>
where
	C: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthClient")
			.field("config", &self.config)
			.field("session", &self.session)
			.field("coordinator", &self.coordinator)
			.field("exchanger", &self.exchanger)
			.finish()
	}
}

fn api_key_header(key: &str) -> Result<HeaderValue, ConfigError> {
	let mut value = HeaderValue::from_str(key.trim())
		.map_err(|_| ConfigError::InvalidHeaderValue { name: "apikey" })?;

	value.set_sensitive(true);

	Ok(value)
}

fn decode_json<T>(response: &HttpResponse) -> Result<T>
where
	T: DeserializeOwned,
{
	let status = response.status();

	if !status.is_success() {
		return Err(Error::Status {
			status: status.as_u16(),
			body: String::from_utf8_lossy(response.body()).into_owned(),
		});
	}

	let mut deserializer = serde_json::Deserializer::from_slice(response.body());

	Ok(serde_path_to_error::deserialize(&mut deserializer)?)
}
