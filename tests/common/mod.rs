//! Shared fixtures for integration tests.

#![allow(dead_code)]

// std
use std::{
	future::Future,
	pin::Pin,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use parking_lot::Mutex;
// self
use bearer_relay::{
	config::{ClientConfig, IdentityProviderConfig},
	exchange::GrantKind,
	http::{
		AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse, HttpTransport,
		ResponseMetadata, ResponseMetadataSlot,
	},
	oauth2::http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
	url::Url,
};

pub const REALM: &str = "relay";
pub const CLIENT_ID: &str = "relay-client";
pub const CLIENT_SECRET: &str = "relay-secret";
pub const TOKEN_PATH: &str = "/realms/relay/protocol/openid-connect/token";

pub fn token_body(access: &str, refresh: &str) -> String {
	format!(
		"{{\"access_token\":\"{access}\",\"refresh_token\":\"{refresh}\",\"token_type\":\"Bearer\",\"expires_in\":300}}"
	)
}

pub fn identity(host: &str) -> IdentityProviderConfig {
	IdentityProviderConfig::new(
		Url::parse(host).expect("Failed to parse identity provider host."),
		REALM,
		CLIENT_ID,
	)
	.with_client_secret(CLIENT_SECRET)
}

pub fn config(base_url: &str, host: &str, grant: GrantKind) -> ClientConfig {
	let base_url = Url::parse(base_url).expect("Failed to parse API base URL.");

	ClientConfig::builder(base_url, identity(host))
		.grant(grant)
		.build()
		.expect("Client configuration should validate.")
}

/// Counts hook invocations.
#[derive(Clone, Debug, Default)]
pub struct Counter(Arc<AtomicUsize>);
impl Counter {
	pub fn bump(&self) {
		self.0.fetch_add(1, Ordering::SeqCst);
	}

	pub fn get(&self) -> usize {
		self.0.load(Ordering::SeqCst)
	}
}

/// A request as observed by [`ScriptedTransport`].
#[derive(Clone, Debug)]
pub struct RecordedCall {
	pub method: String,
	pub path: String,
	pub query: Option<String>,
	pub authorization: Option<String>,
	pub api_key: Option<String>,
	pub body: String,
}
impl RecordedCall {
	fn from_request(request: &HttpRequest) -> Self {
		let header = |name: &str| {
			request.headers().get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
		};

		Self {
			method: request.method().to_string(),
			path: request.uri().path().to_owned(),
			query: request.uri().query().map(str::to_owned),
			authorization: header("authorization"),
			api_key: header("apikey"),
			body: String::from_utf8_lossy(request.body()).into_owned(),
		}
	}

	pub fn is_token_call(&self) -> bool {
		self.path == TOKEN_PATH
	}

	/// Decoded `application/x-www-form-urlencoded` body fields.
	pub fn form(&self) -> Vec<(String, String)> {
		bearer_relay::url::form_urlencoded::parse(self.body.as_bytes()).into_owned().collect()
	}

	pub fn form_value(&self, name: &str) -> Option<String> {
		self.form().into_iter().find(|(key, _)| key == name).map(|(_, value)| value)
	}
}

/// Canned response produced by a [`ScriptedTransport`] responder.
#[derive(Clone, Debug)]
pub struct Reply {
	status: u16,
	body: String,
	delay: Duration,
}
impl Reply {
	pub fn status(status: u16) -> Self {
		Self { status, body: String::new(), delay: Duration::ZERO }
	}

	pub fn json(status: u16, body: impl Into<String>) -> Self {
		Self { status, body: body.into(), delay: Duration::ZERO }
	}

	pub fn after(mut self, delay: Duration) -> Self {
		self.delay = delay;

		self
	}
}

type Responder = dyn Fn(&RecordedCall) -> Reply + Send + Sync;

struct ScriptedInner {
	responder: Box<Responder>,
	calls: Mutex<Vec<RecordedCall>>,
}

/// In-process transport that answers every request through a responder closure.
#[derive(Clone)]
pub struct ScriptedTransport(Arc<ScriptedInner>);
impl ScriptedTransport {
	pub fn new<F>(responder: F) -> Self
	where
		F: 'static + Send + Sync + Fn(&RecordedCall) -> Reply,
	{
		let inner = ScriptedInner { responder: Box::new(responder), calls: Mutex::new(Vec::new()) };

		Self(Arc::new(inner))
	}

	pub fn calls(&self) -> Vec<RecordedCall> {
		self.0.calls.lock().clone()
	}

	pub fn token_calls(&self) -> Vec<RecordedCall> {
		self.calls().into_iter().filter(RecordedCall::is_token_call).collect()
	}

	pub fn api_calls(&self) -> Vec<RecordedCall> {
		self.calls().into_iter().filter(|call| !call.is_token_call()).collect()
	}
}
impl HttpTransport for ScriptedTransport {
	type Handle = ScriptedHandle;
	type TransportError = std::io::Error;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ScriptedHandle { transport: self.clone(), slot }
	}
}

pub struct ScriptedHandle {
	transport: ScriptedTransport,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
	type Error = HttpClientError<std::io::Error>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let call = RecordedCall::from_request(&request);
			let reply = (self.transport.0.responder)(&call);

			self.transport.0.calls.lock().push(call);

			if !reply.delay.is_zero() {
				tokio::time::sleep(reply.delay).await;
			}

			self.slot.store(ResponseMetadata { status: Some(reply.status) });

			let mut response = HttpResponse::new(reply.body.into_bytes());

			*response.status_mut() =
				StatusCode::from_u16(reply.status).expect("Scripted status should be valid.");
			response
				.headers_mut()
				.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

			Ok(response)
		})
	}
}

/// Answers the API with `401` unless the request carries `Bearer <fresh>`.
pub fn api_accepting(fresh: &'static str) -> impl Fn(&RecordedCall) -> Reply + Send + Sync {
	let expected = format!("Bearer {fresh}");

	move |call| {
		if call.authorization.as_deref() == Some(expected.as_str()) {
			Reply::json(200, "{\"ok\":true}")
		} else {
			Reply::status(401)
		}
	}
}
