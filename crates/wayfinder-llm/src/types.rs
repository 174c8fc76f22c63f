//! Request and response types for chat completion calls.
//!
//! These mirror the OpenAI chat completion wire format, including the
//! `response_format` field used to request JSON-schema structured output.

use serde::{Deserialize, Serialize};

/// A message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// The role of the message author ("system", "user" or "assistant").
    pub role: String,

    /// The content of the message. Some providers send `null` for refusals.
    #[serde(default)]
    pub content: Option<String>,

    /// Set by some providers when the model refuses a structured request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
}

impl ChatMessage {
    /// Create a simple message with role and content.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            refusal: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// The `response_format` field of a chat request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free-form JSON object.
    JsonObject,
    /// JSON constrained by a schema.
    JsonSchema {
        /// The schema and its name.
        json_schema: JsonSchemaSpec,
    },
}

impl ResponseFormat {
    /// A strict JSON-schema response format.
    pub fn json_schema(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self::JsonSchema {
            json_schema: JsonSchemaSpec {
                name: name.into(),
                strict: true,
                schema,
            },
        }
    }
}

/// Named JSON schema for structured output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonSchemaSpec {
    pub name: String,
    pub strict: bool,
    pub schema: serde_json::Value,
}

/// A chat completion request sent to an LLM provider.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// The model identifier (e.g. "gpt-4o-mini").
    pub model: String,

    /// The conversation messages.
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature (0.0 = deterministic, 2.0 = creative).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// Structured-output constraint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ChatRequest {
    /// Create a minimal chat request with a model and messages.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            response_format: None,
        }
    }

    /// Builder: set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Builder: constrain the output format.
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }
}

/// A chat completion response from an LLM provider (OpenAI format).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatResponse {
    /// Unique identifier for this completion.
    pub id: String,

    /// The list of completion choices.
    pub choices: Vec<Choice>,

    /// Token usage statistics for this request, if available.
    #[serde(default)]
    pub usage: Option<Usage>,

    /// The model that generated the response.
    pub model: String,
}

impl ChatResponse {
    /// Content of the first choice, if any.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
    }
}

/// A single completion choice within a response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Choice {
    /// The index of this choice in the list.
    pub index: i32,

    /// The assistant's response message.
    pub message: ChatMessage,

    /// Why generation stopped (e.g. "stop", "length").
    pub finish_reason: Option<String>,
}

/// Token usage statistics for a completion request.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Usage {
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub total_tokens: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_new_helpers() {
        let sys = ChatMessage::system("You are helpful.");
        assert_eq!(sys.role, "system");
        assert_eq!(sys.content.as_deref(), Some("You are helpful."));

        assert_eq!(ChatMessage::user("Hello").role, "user");
        assert_eq!(ChatMessage::assistant("Hi").role, "assistant");
    }

    #[test]
    fn chat_message_skips_refusal_when_absent() {
        let json = serde_json::to_string(&ChatMessage::user("Hi")).unwrap();
        assert!(!json.contains("refusal"));
    }

    #[test]
    fn chat_request_minimal_serialization() {
        let req = ChatRequest::new("gpt-4o-mini", vec![ChatMessage::user("Hi")]);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""model":"gpt-4o-mini""#));
        assert!(!json.contains("response_format"));
        assert!(!json.contains("temperature"));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["messages", "model"]);
    }

    #[test]
    fn json_schema_format_wire_shape() {
        let schema = serde_json::json!({"type": "object", "properties": {}});
        let req = ChatRequest::new("m", vec![])
            .with_temperature(0.7)
            .with_response_format(ResponseFormat::json_schema("route_list", schema.clone()));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["response_format"]["type"], "json_schema");
        assert_eq!(value["response_format"]["json_schema"]["name"], "route_list");
        assert_eq!(value["response_format"]["json_schema"]["strict"], true);
        assert_eq!(value["response_format"]["json_schema"]["schema"], schema);
        assert_eq!(value["temperature"], 0.7);
    }

    #[test]
    fn json_object_format_wire_shape() {
        let value = serde_json::to_value(ResponseFormat::JsonObject).unwrap();
        assert_eq!(value, serde_json::json!({"type": "json_object"}));
    }

    #[test]
    fn chat_response_first_content() {
        let json = r#"{
            "id": "chatcmpl-abc123",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "{\"routes\": []}"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15},
            "model": "gpt-4o-mini"
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.first_content(), Some(r#"{"routes": []}"#));
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn chat_response_null_content_and_missing_usage() {
        let json = r#"{
            "id": "resp-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": null, "refusal": "no"},
                "finish_reason": null
            }],
            "model": "test-model"
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(resp.usage.is_none());
        assert!(resp.first_content().is_none());
        assert_eq!(resp.choices[0].message.refusal.as_deref(), Some("no"));
    }
}
