//! Logs in with the client-credentials grant against a mocked Keycloak realm, then calls the
//! API with the issued bearer token.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::Value;
// self
use bearer_relay::{
	client::ReqwestAuthClient,
	config::{ClientConfig, IdentityProviderConfig},
	exchange::GrantKind,
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/realms/demo/protocol/openid-connect/token")
				.body_includes("grant_type=client_credentials");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/prompt-sets").header("authorization", "Bearer demo-access");
			then.status(200)
				.header("content-type", "application/json")
				.body("[{\"id\":1,\"name\":\"support\"}]");
		})
		.await;
	let identity = IdentityProviderConfig::new(Url::parse(&server.base_url())?, "demo", "svc-router")
		.with_client_secret("super-secret");
	let config = ClientConfig::builder(Url::parse(&server.base_url())?, identity)
		.grant(GrantKind::ClientCredentials)
		.build()?;
	let client = ReqwestAuthClient::new(config)?;
	let pair = client.renew_token().await?;

	println!("Service token issued: {}.", pair.access_token().expose());

	let sets: Vec<Value> = client.get_json("/prompt-sets").await?;

	println!("Prompt sets visible to the service: {}.", sets.len());

	token_mock.assert_async().await;
	api_mock.assert_async().await;

	Ok(())
}
