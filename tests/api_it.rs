mod common;

// crates.io
use serde_json::{Value, json};
// self
use bearer_relay::{
	AuthClient, TokenPair,
	api::{ChatMessage, PromptStore},
	exchange::GrantKind,
};
use common::{Reply, ScriptedTransport, config, token_body};

const API: &str = "https://api.example.com/v1";
const IDP: &str = "https://sso.example.com";

fn store(transport: &ScriptedTransport) -> PromptStore<ScriptedTransport> {
	let config = config(API, IDP, GrantKind::RefreshToken);
	let client = AuthClient::with_transport(config, transport.clone())
		.expect("Client should build from a valid configuration.");

	client.set_token(TokenPair::new("T1").with_refresh_token("RT1"));

	PromptStore::new(client).with_workspace_id("w1")
}

fn body_of(transport: &ScriptedTransport, index: usize) -> Value {
	serde_json::from_str(&transport.api_calls()[index].body).expect("Recorded body should be JSON.")
}

#[tokio::test]
async fn execute_posts_args_params_and_workspace() {
	let transport = ScriptedTransport::new(|call| match call.path.as_str() {
		"/v1/executions/summarize" => Reply::json(200, r#"{"content":"short","usage":{"tokens":3}}"#),
		_ => Reply::status(404),
	});
	let store = store(&transport);
	let result = store
		.execute("summarize", &json!({ "text": "long text" }), &json!({ "maxTokens": 10 }))
		.await
		.expect("Execution should succeed.");

	assert_eq!(result["content"], json!("short"));
	assert_eq!(
		body_of(&transport, 0),
		json!({
			"args": { "text": "long text" },
			"params": { "maxTokens": 10 },
			"workspaceId": "w1"
		})
	);

	let calls = transport.api_calls();

	assert_eq!(calls[0].method, "POST");
	assert_eq!(calls[0].authorization.as_deref(), Some("Bearer T1"));
}

#[tokio::test]
async fn registered_functions_merge_stripped_overrides() {
	let transport = ScriptedTransport::new(|_| Reply::json(200, r#"{"content":"short"}"#));
	let mut store = store(&transport);
	let defaults = json!({ "model": "m1", "temperature": 0.2 });

	store.add_function(
		"summarize",
		defaults.as_object().cloned().expect("Defaults fixture should be an object."),
		true,
	);

	let overrides = json!({ "model": "", "temperature": 0.5 });
	let content = store
		.call("summarize", &json!({ "text": "hi" }), Some(&overrides))
		.await
		.expect("Registered function should run.");

	assert_eq!(content, json!("short"));
	assert_eq!(body_of(&transport, 0)["params"], json!({ "model": "m1", "temperature": 0.5 }));
}

#[tokio::test]
async fn listing_endpoints_use_escaped_paths() {
	let transport = ScriptedTransport::new(|call| match call.path.as_str() {
		"/v1/prompt-sets" => Reply::json(200, r#"[{"id":1}]"#),
		"/v1/workspaces/w%202/prompt-sets" => Reply::json(200, r#"[{"id":2}]"#),
		"/v1/functions/tags/nlp" => Reply::json(200, r#"[{"name":"summarize"}]"#),
		_ => Reply::status(404),
	});
	let store = store(&transport);

	assert_eq!(store.prompt_sets().await.expect("Prompt sets should list."), json!([{ "id": 1 }]));
	assert_eq!(
		store.workspace_prompt_sets("w 2").await.expect("Workspace prompt sets should list."),
		json!([{ "id": 2 }])
	);
	assert_eq!(
		store.functions_by_tag("nlp").await.expect("Functions should list."),
		json!([{ "name": "summarize" }])
	);
}

#[tokio::test]
async fn prompt_sets_by_skill_fall_back_to_an_empty_list() {
	let transport = ScriptedTransport::new(|call| match call.query.as_deref() {
		Some("skill=writing") => Reply::json(200, r#"[{"id":7}]"#),
		_ => Reply::json(500, r#"{"error":"boom"}"#),
	});
	let store = store(&transport);

	assert_eq!(store.workspace_prompt_sets_by_skill("w1", "writing").await, [json!({ "id": 7 })]);
	assert!(store.workspace_prompt_sets_by_skill("w1", "drawing").await.is_empty());
	assert_eq!(transport.api_calls()[0].path, "/v1/workspaces/w1/prompt-sets");
}

#[tokio::test]
async fn wrappers_recover_through_the_refresh_cycle() {
	let transport = ScriptedTransport::new(|call| {
		if call.is_token_call() {
			return Reply::json(200, token_body("T2", "RT2"));
		}

		match call.authorization.as_deref() {
			Some("Bearer T2") => Reply::json(200, r#"{"choices":[]}"#),
			_ => Reply::status(401),
		}
	});
	let store = store(&transport);
	let result = store
		.chat_completion(&[ChatMessage::new("user", "hello")], "gpt-4o", Some(64))
		.await
		.expect("Chat completion should succeed after a refresh.");

	assert_eq!(result, json!({ "choices": [] }));
	assert_eq!(transport.token_calls().len(), 1);
	assert_eq!(
		body_of(&transport, 1),
		json!({
			"messages": [{ "role": "user", "content": "hello" }],
			"model": "gpt-4o",
			"maxTokens": 64
		})
	);
}
