//! Prompt-store API calls layered on [`AuthClient`].
//!
//! Every call goes through [`AuthClient::send`], so the wrappers inherit credential injection
//! and the refresh-and-replay behavior without any handling of their own.

// std
use std::collections::HashMap;
// crates.io
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	client::AuthClient,
	error::ConfigError,
	http::{ApiRequest, HttpTransport},
	obs::debug_event,
};

/// One chat turn sent to the completion endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
	/// Speaker role, e.g. `user` or `assistant`.
	pub role: String,
	/// Message text.
	pub content: String,
}
impl ChatMessage {
	/// Creates a message.
	pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
		Self { role: role.into(), content: content.into() }
	}
}

#[derive(Clone, Debug, Default)]
struct FunctionBinding {
	params: Map<String, Value>,
	content_only: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionBody<'a> {
	args: &'a Value,
	params: &'a Value,
	#[serde(skip_serializing_if = "Option::is_none")]
	workspace_id: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatBody<'a> {
	messages: &'a [ChatMessage],
	model: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	max_tokens: Option<u32>,
}

/// Prompt-store endpoints bound to one client and an optional workspace.
pub struct PromptStore<C>
where
	C: HttpTransport,
{
	client: AuthClient<C>,
	workspace_id: Option<String>,
	functions: HashMap<String, FunctionBinding>,
}
impl<C> PromptStore<C>
where
	C: HttpTransport,
{
	/// Wraps `client`.
	pub fn new(client: AuthClient<C>) -> Self {
		Self { client, workspace_id: None, functions: HashMap::new() }
	}

	/// Sends `workspace_id` with every execution.
	pub fn with_workspace_id(mut self, workspace_id: impl Into<String>) -> Self {
		self.workspace_id = Some(workspace_id.into());

		self
	}

	/// Underlying client.
	pub fn client(&self) -> &AuthClient<C> {
		&self.client
	}

	/// Registers a named prompt function with default parameters.
	///
	/// With `content_only`, [`PromptStore::call`] returns just the `content` field of the
	/// execution result.
	pub fn add_function(
		&mut self,
		name: impl Into<String>,
		params: Map<String, Value>,
		content_only: bool,
	) -> &mut Self {
		self.functions.insert(name.into(), FunctionBinding { params, content_only });

		self
	}

	/// Runs a function registered with [`PromptStore::add_function`].
	///
	/// Non-empty `overrides` are merged over the registered parameters. Unregistered names run
	/// with no default parameters.
	pub async fn call(
		&self,
		name: &str,
		args: &Value,
		overrides: Option<&Value>,
	) -> Result<Value> {
		let binding = self.functions.get(name).cloned().unwrap_or_default();
		let mut params = binding.params;

		if let Some(Value::Object(overrides)) = overrides.cloned().and_then(strip_empty) {
			params.extend(overrides);
		}

		let result = self.execute(name, args, &Value::Object(params)).await?;

		if binding.content_only { Ok(content_of(result)) } else { Ok(result) }
	}

	/// Executes the prompt function `name`.
	pub async fn execute(&self, name: &str, args: &Value, params: &Value) -> Result<Value> {
		let body = ExecutionBody { args, params, workspace_id: self.workspace_id.as_deref() };
		let request = ApiRequest::post(self.endpoint(&["executions", name])?).with_json(&body)?;

		self.client.send_json(request).await
	}

	/// Executes `name` and returns only the `content` field of the result.
	pub async fn execute_content(
		&self,
		name: &str,
		args: &Value,
		params: &Value,
	) -> Result<Value> {
		self.execute(name, args, params).await.map(content_of)
	}

	/// Runs a chat completion.
	pub async fn chat_completion(
		&self,
		messages: &[ChatMessage],
		model: &str,
		max_tokens: Option<u32>,
	) -> Result<Value> {
		let body = ChatBody { messages, model, max_tokens };
		let request = ApiRequest::post(self.endpoint(&["chat"])?).with_json(&body)?;

		self.client.send_json(request).await
	}

	/// Lists the functions carrying `tag`.
	pub async fn functions_by_tag(&self, tag: &str) -> Result<Value> {
		self.client.send_json(ApiRequest::get(self.endpoint(&["functions", "tags", tag])?)).await
	}

	/// Lists every prompt set.
	pub async fn prompt_sets(&self) -> Result<Value> {
		self.client.send_json(ApiRequest::get(self.endpoint(&["prompt-sets"])?)).await
	}

	/// Lists the prompt sets of one workspace.
	pub async fn workspace_prompt_sets(&self, workspace_id: &str) -> Result<Value> {
		let url = self.endpoint(&["workspaces", workspace_id, "prompt-sets"])?;

		self.client.send_json(ApiRequest::get(url)).await
	}

	/// Lists the prompt sets of one workspace that serve `skill`.
	///
	/// Any failure, including a failed refresh, yields an empty list.
	pub async fn workspace_prompt_sets_by_skill(&self, workspace_id: &str, skill: &str) -> Vec<Value> {
		let result: Result<Vec<Value>> = async {
			let mut url = self.endpoint(&["workspaces", workspace_id, "prompt-sets"])?;

			url.query_pairs_mut().append_pair("skill", skill);

			self.client.send_json::<Vec<Value>>(ApiRequest::get(url)).await
		}
		.await;

		match result {
			Ok(sets) => sets,
			Err(err) => {
				debug_event!(workspace_id, skill, error = %err, "prompt set lookup failed");

				Vec::new()
			},
		}
	}

	fn endpoint(&self, segments: &[&str]) -> Result<Url> {
		let mut url = self.client.config().base_url.clone();

		url.path_segments_mut()
			.map_err(|_| ConfigError::UnsupportedScheme {
				name: "base_url",
				url: self.client.config().base_url.to_string(),
			})?
			.pop_if_empty()
			.extend(segments);

		Ok(url)
	}
}
impl<C> Debug for PromptStore<C>
where
	C: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PromptStore")
			.field("client", &self.client)
			.field("workspace_id", &self.workspace_id)
			.field("functions", &self.functions.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// Recursively removes `null`, empty strings, empty arrays and empty objects.
///
/// Returns `None` when nothing survives. Numbers and booleans are always kept, including `0`
/// and `false`.
pub fn strip_empty(value: Value) -> Option<Value> {
	match value {
		Value::Null => None,
		Value::String(text) if text.is_empty() => None,
		Value::Array(items) => {
			let items = items.into_iter().filter_map(strip_empty).collect::<Vec<_>>();

			if items.is_empty() { None } else { Some(Value::Array(items)) }
		},
		Value::Object(entries) => {
			let entries = entries
				.into_iter()
				.filter_map(|(key, value)| strip_empty(value).map(|value| (key, value)))
				.collect::<Map<_, _>>();

			if entries.is_empty() { None } else { Some(Value::Object(entries)) }
		},
		other => Some(other),
	}
}

fn content_of(mut result: Value) -> Value {
	result.get_mut("content").map(Value::take).unwrap_or(Value::Null)
}
