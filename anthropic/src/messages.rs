//! Messages API request and response types

use crate::types::{ContentBlock, Message, Role, StopReason, Tool, ToolChoice, Usage};
use serde::{Deserialize, Serialize};

/// Default model used when a request does not override it
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// Request to create a message
#[derive(Clone, Debug, Serialize)]
pub struct MessagesRequest {
    /// Model to use (e.g., "claude-sonnet-4-5-20250929")
    pub model: String,
    /// Conversation history
    pub messages: Vec<Message>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// System prompt (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Sampling temperature (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Available tools (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// Tool selection constraint (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

impl MessagesRequest {
    /// Create a basic request with sensible defaults
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            messages,
            max_tokens: 4096,
            system: None,
            temperature: None,
            tools: None,
            tool_choice: None,
        }
    }

    /// Builder: Set model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Builder: Set max tokens
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Builder: Set system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Builder: Set temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Builder: Force the model to answer through `tool`
    #[must_use]
    pub fn with_forced_tool(mut self, tool: Tool) -> Self {
        self.tool_choice = Some(ToolChoice::Tool {
            name: tool.name.clone(),
        });
        self.tools = Some(vec![tool]);
        self
    }
}

/// Response from creating a message
#[derive(Clone, Debug, Deserialize)]
pub struct MessagesResponse {
    /// Unique identifier for this message
    pub id: String,
    /// Model that generated the response
    pub model: String,
    /// Role (always "assistant" for responses)
    pub role: Role,
    /// Content blocks in the response
    pub content: Vec<ContentBlock>,
    /// Why the model stopped generating
    pub stop_reason: Option<StopReason>,
    /// Token usage statistics
    #[serde(default)]
    pub usage: Usage,
}

impl MessagesResponse {
    /// Concatenate all text blocks in the response
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::ToolUse { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Input of the first call to the named tool, if any
    #[must_use]
    pub fn tool_input(&self, tool_name: &str) -> Option<&serde_json::Value> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::ToolUse { name, input, .. } if name == tool_name => Some(input),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content: Vec<ContentBlock>) -> MessagesResponse {
        MessagesResponse {
            id: "msg_1".to_string(),
            model: DEFAULT_MODEL.to_string(),
            role: Role::Assistant,
            content,
            stop_reason: Some(StopReason::EndTurn),
            usage: Usage::default(),
        }
    }

    #[test]
    fn test_messages_request_builder() {
        let req = MessagesRequest::new(vec![Message::user("Hello")])
            .with_model("claude-3-opus-20240229")
            .with_max_tokens(1000)
            .with_system("You are helpful")
            .with_temperature(0.2);

        assert_eq!(req.model, "claude-3-opus-20240229");
        assert_eq!(req.max_tokens, 1000);
        assert_eq!(req.system.as_deref(), Some("You are helpful"));
        assert_eq!(req.temperature, Some(0.2));
    }

    #[test]
    fn test_messages_request_defaults() {
        let req = MessagesRequest::new(vec![Message::user("Test")]);

        assert_eq!(req.model, DEFAULT_MODEL);
        assert_eq!(req.max_tokens, 4096);
        assert_eq!(req.system, None);
        assert_eq!(req.tools, None);
        assert_eq!(req.tool_choice, None);
    }

    #[test]
    #[allow(clippy::unwrap_used)] // Test code
    fn test_forced_tool_serialization() {
        let tool = Tool {
            name: "record".to_string(),
            description: "Record a result".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        };
        let req = MessagesRequest::new(vec![Message::user("Go")]).with_forced_tool(tool);

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["tool_choice"], serde_json::json!({"type": "tool", "name": "record"}));
        assert_eq!(json["tools"][0]["name"], "record");
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_response_text_joins_text_blocks() {
        let resp = response(vec![
            ContentBlock::Text { text: "first".to_string() },
            ContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "record".to_string(),
                input: serde_json::json!({}),
            },
            ContentBlock::Text { text: "second".to_string() },
        ]);

        assert_eq!(resp.text(), "first\nsecond");
    }

    #[test]
    fn test_response_tool_input_by_name() {
        let resp = response(vec![ContentBlock::ToolUse {
            id: "t1".to_string(),
            name: "record".to_string(),
            input: serde_json::json!({"score": 4}),
        }]);

        assert_eq!(resp.tool_input("record"), Some(&serde_json::json!({"score": 4})));
        assert_eq!(resp.tool_input("other"), None);
    }
}
