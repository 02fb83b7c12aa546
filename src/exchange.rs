//! Credential exchanges against the identity provider's token endpoint.
//!
//! [`CredentialExchanger`] performs exactly one round trip per call and never retries: the
//! refresh coordinator decides what a failed exchange means for the requests waiting on it.
//! Client credentials travel in the form body (`client_id`, `client_secret`), next to
//! `grant_type` and, for the refresh grant, `refresh_token`.

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError, RefreshToken,
	RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	config::IdentityProviderConfig,
	error::ExchangeError,
	http::{self, HttpTransport, ResponseMetadata, ResponseMetadataSlot},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	token::{TokenPair, TokenSecret},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Grant used to obtain a fresh token pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
	/// Exchange the held refresh token (interactive/user clients).
	#[default]
	RefreshToken,
	/// Authenticate as the client itself (service-to-service clients).
	ClientCredentials,
}
impl GrantKind {
	/// Returns the `grant_type` form value.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantKind::RefreshToken => "refresh_token",
			GrantKind::ClientCredentials => "client_credentials",
		}
	}

	/// Flow label used for spans and metrics.
	pub const fn flow(self) -> FlowKind {
		match self {
			GrantKind::RefreshToken => FlowKind::RefreshToken,
			GrantKind::ClientCredentials => FlowKind::ClientCredentials,
		}
	}
}
impl Display for GrantKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Stateless token-endpoint client bound to one grant kind.
pub struct CredentialExchanger<C>
where
	C: HttpTransport,
{
	oauth_client: ConfiguredBasicClient,
	http_client: Arc<C>,
	grant: GrantKind,
	token_url: Url,
}
impl<C> CredentialExchanger<C>
where
	C: HttpTransport,
{
	/// Builds an exchanger for the identity provider described by `config`.
	pub fn new(
		config: &IdentityProviderConfig,
		grant: GrantKind,
		http_client: impl Into<Arc<C>>,
	) -> Result<Self, ExchangeError> {
		let token_url = config
			.token_endpoint()
			.map_err(|source| ExchangeError::InvalidEndpoint { source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(config.client_id.clone()))
			.set_token_uri(TokenUrl::from_url(token_url.clone()))
			.set_auth_type(AuthType::RequestBody);

		if let Some(secret) = &config.client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.clone()));
		}

		Ok(Self { oauth_client, http_client: http_client.into(), grant, token_url })
	}

	/// Grant this exchanger performs.
	pub fn grant(&self) -> GrantKind {
		self.grant
	}

	/// Token endpoint every exchange posts to.
	pub fn token_url(&self) -> &Url {
		&self.token_url
	}

	/// Runs the configured grant.
	///
	/// `refresh_token` is required for [`GrantKind::RefreshToken`] and ignored otherwise.
	pub async fn exchange(
		&self,
		refresh_token: Option<&TokenSecret>,
	) -> Result<TokenPair, ExchangeError> {
		let kind = self.grant.flow();
		let span = FlowSpan::new(kind, "exchange");

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				match self.grant {
					GrantKind::RefreshToken => {
						let refresh = refresh_token
							.ok_or(ExchangeError::MissingRefreshToken { grant: self.grant })?;

						self.refresh(refresh).await
					},
					GrantKind::ClientCredentials => self.client_credentials().await,
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
		}

		result
	}

	async fn refresh(&self, refresh_token: &TokenSecret) -> Result<TokenPair, ExchangeError> {
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let secret = RefreshToken::new(refresh_token.expose().to_owned());
		let response = self
			.oauth_client
			.exchange_refresh_token(&secret)
			.request_async(&handle)
			.await
			.map_err(|err| map_request_error(GrantKind::RefreshToken, meta.take(), err))?;

		Ok(map_token_response(response))
	}

	async fn client_credentials(&self) -> Result<TokenPair, ExchangeError> {
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let response = self
			.oauth_client
			.exchange_client_credentials()
			.request_async(&handle)
			.await
			.map_err(|err| map_request_error(GrantKind::ClientCredentials, meta.take(), err))?;

		Ok(map_token_response(response))
	}
}
impl<C> Debug for CredentialExchanger<C>
where
	C: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialExchanger")
			.field("token_url", &self.token_url.as_str())
			.field("grant", &self.grant)
			.finish()
	}
}

fn map_token_response(response: BasicTokenResponse) -> TokenPair {
	let mut pair = TokenPair::new(response.access_token().secret().to_owned());

	if let Some(refresh) = response.refresh_token() {
		pair = pair.with_refresh_token(refresh.secret().to_owned());
	}
	if let Some(expires_in) = response.expires_in().and_then(|value| Duration::try_from(value).ok())
	{
		pair = pair.with_expires_in(expires_in);
	}

	pair
}

fn map_request_error<E>(
	grant: GrantKind,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
) -> ExchangeError
where
	E: 'static + Send + Sync + StdError,
{
	let status = meta.and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(grant, response, status),
		RequestTokenError::Request(error) => http::map_client_error(error).into(),
		RequestTokenError::Parse(source, _body) => ExchangeError::Parse { source, status },
		RequestTokenError::Other(message) => ExchangeError::UnexpectedResponse { message, status },
	}
}

fn map_server_response_error(
	grant: GrantKind,
	response: BasicErrorResponse,
	status: Option<u16>,
) -> ExchangeError {
	let reason = match response.error_description() {
		Some(description) => format!("{} ({description})", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	ExchangeError::Rejected { grant, reason, status }
}
