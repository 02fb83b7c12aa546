//! Client configuration: API coordinates, fallback credential, and identity-provider settings.
//!
//! Configuration is supplied once, at construction time. It can be assembled with
//! [`ClientConfig::builder`], deserialized with serde, or read from the process environment
//! via [`ClientConfig::from_env`]:
//!
//! | Variable                 | Setting                                             |
//! |--------------------------|-----------------------------------------------------|
//! | `PROMPTSTORE_BASE_URL`   | [`ClientConfig::base_url`] (required)               |
//! | `PROMPTSTORE_API_KEY`    | [`ClientConfig::api_key`]                           |
//! | `KEYCLOAK_HOST`          | [`IdentityProviderConfig::host`] (required)         |
//! | `KEYCLOAK_REALM`         | [`IdentityProviderConfig::realm`] (required)        |
//! | `KEYCLOAK_CLIENT_ID`     | [`IdentityProviderConfig::client_id`] (required)    |
//! | `KEYCLOAK_CLIENT_SECRET` | [`IdentityProviderConfig::client_secret`]           |
//! | `AUTH_METHOD`            | `oauth` selects [`GrantKind::ClientCredentials`]    |

// self
use crate::{_prelude::*, error::ConfigError, exchange::GrantKind};

const DEFAULT_REFRESH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
const DEFAULT_EXCHANGE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Coordinates of the identity provider that issues bearer tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityProviderConfig {
	/// Identity-provider base URL, e.g. `https://id.example.com`.
	pub host: Url,
	/// Realm that owns the client.
	pub realm: String,
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret for confidential clients.
	#[serde(default)]
	pub client_secret: Option<String>,
}
impl IdentityProviderConfig {
	/// Creates settings for a public client; attach a secret with
	/// [`IdentityProviderConfig::with_client_secret`].
	pub fn new(host: Url, realm: impl Into<String>, client_id: impl Into<String>) -> Self {
		Self { host, realm: realm.into(), client_id: client_id.into(), client_secret: None }
	}

	/// Sets the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Returns `{host}/realms/{realm}/protocol/openid-connect/token`.
	pub fn token_endpoint(&self) -> Result<Url, url::ParseError> {
		let host = self.host.as_str().trim_end_matches('/');

		Url::parse(&format!("{host}/realms/{}/protocol/openid-connect/token", self.realm))
	}

	fn validate(&self) -> Result<(), ConfigError> {
		validate_scheme("identity.host", &self.host)?;
		validate_non_empty("identity.realm", &self.realm)?;
		validate_non_empty("identity.client_id", &self.client_id)?;

		Ok(())
	}
}
impl Debug for IdentityProviderConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityProviderConfig")
			.field("host", &self.host.as_str())
			.field("realm", &self.realm)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.finish()
	}
}

/// Everything an [`AuthClient`](crate::client::AuthClient) needs from its environment.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Base URL of the protected API.
	pub base_url: Url,
	/// Static key sent as the `apikey` header while no token is held.
	#[serde(default)]
	pub api_key: Option<String>,
	/// Identity provider used for credential exchanges.
	pub identity: IdentityProviderConfig,
	/// Grant used whenever a refresh cycle runs.
	#[serde(default)]
	pub grant: GrantKind,
	/// Upper bound on how long a queued request waits for the in-flight refresh.
	#[serde(default = "default_refresh_timeout")]
	pub refresh_timeout: std::time::Duration,
	/// Upper bound on one credential exchange; an exchange that overruns fails the cycle.
	#[serde(default = "default_exchange_timeout")]
	pub exchange_timeout: std::time::Duration,
}
impl ClientConfig {
	/// Starts a builder with the two required settings.
	pub fn builder(base_url: Url, identity: IdentityProviderConfig) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url, identity)
	}

	/// Reads the configuration from process environment variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Reads the configuration through `lookup`, which maps variable names to values.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let required = |name: &'static str| {
			lookup(name).filter(|value| !value.trim().is_empty()).ok_or(ConfigError::Missing { name })
		};
		let optional = |name: &'static str| lookup(name).filter(|value| !value.trim().is_empty());
		let base_url = parse_url("PROMPTSTORE_BASE_URL", &required("PROMPTSTORE_BASE_URL")?)?;
		let host = parse_url("KEYCLOAK_HOST", &required("KEYCLOAK_HOST")?)?;
		let mut identity = IdentityProviderConfig::new(
			host,
			required("KEYCLOAK_REALM")?,
			required("KEYCLOAK_CLIENT_ID")?,
		);

		identity.client_secret = optional("KEYCLOAK_CLIENT_SECRET");

		let grant = match optional("AUTH_METHOD") {
			Some(method) if method.eq_ignore_ascii_case("oauth") => GrantKind::ClientCredentials,
			_ => GrantKind::RefreshToken,
		};
		let mut builder = Self::builder(base_url, identity).grant(grant);

		if let Some(key) = optional("PROMPTSTORE_API_KEY") {
			builder = builder.api_key(key);
		}

		builder.build()
	}

	/// Joins `path` onto the base URL, keeping any path prefix the base URL carries.
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		let base = self.base_url.as_str().trim_end_matches('/');

		parse_url("base_url", &format!("{base}/{}", path.trim_start_matches('/')))
	}

	/// Checks the invariants the builder enforces; useful after deserializing.
	pub fn validate(&self) -> Result<(), ConfigError> {
		validate_scheme("base_url", &self.base_url)?;

		if let Some(key) = &self.api_key {
			validate_non_empty("api_key", key)?;
		}

		self.identity.validate()
	}
}
impl Debug for ClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientConfig")
			.field("base_url", &self.base_url.as_str())
			.field("api_key_set", &self.api_key.is_some())
			.field("identity", &self.identity)
			.field("grant", &self.grant)
			.field("refresh_timeout", &self.refresh_timeout)
			.field("exchange_timeout", &self.exchange_timeout)
			.finish()
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	config: ClientConfig,
}
impl ClientConfigBuilder {
	/// Creates a builder seeded with the required settings and defaults for the rest.
	pub fn new(base_url: Url, identity: IdentityProviderConfig) -> Self {
		Self {
			config: ClientConfig {
				base_url,
				api_key: None,
				identity,
				grant: GrantKind::default(),
				refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
				exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
			},
		}
	}

	/// Sets the fallback API key.
	pub fn api_key(mut self, key: impl Into<String>) -> Self {
		self.config.api_key = Some(key.into());

		self
	}

	/// Selects the grant used by refresh cycles.
	pub fn grant(mut self, grant: GrantKind) -> Self {
		self.config.grant = grant;

		self
	}

	/// Overrides how long queued requests wait for the in-flight refresh (defaults to 30 s).
	pub fn refresh_timeout(mut self, timeout: std::time::Duration) -> Self {
		self.config.refresh_timeout = timeout;

		self
	}

	/// Overrides how long the leader waits on the identity provider (defaults to 30 s).
	pub fn exchange_timeout(mut self, timeout: std::time::Duration) -> Self {
		self.config.exchange_timeout = timeout;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		self.config.validate()?;

		Ok(self.config)
	}
}

fn default_refresh_timeout() -> std::time::Duration {
	DEFAULT_REFRESH_TIMEOUT
}

fn default_exchange_timeout() -> std::time::Duration {
	DEFAULT_EXCHANGE_TIMEOUT
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn validate_scheme(name: &'static str, url: &Url) -> Result<(), ConfigError> {
	match url.scheme() {
		"http" | "https" => Ok(()),
		_ => Err(ConfigError::UnsupportedScheme { name, url: url.to_string() }),
	}
}

fn validate_non_empty(name: &'static str, value: &str) -> Result<(), ConfigError> {
	if value.trim().is_empty() { Err(ConfigError::Empty { name }) } else { Ok(()) }
}
