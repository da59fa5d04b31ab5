//! Data types shared by the accumulator, extractor and orchestrator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use conduit_mcp::CallToolResult;

// ─────────────────────────────────────────────────────────────────────────────
// Model Input
// ─────────────────────────────────────────────────────────────────────────────

/// One partial tool call as streamed by a chat-completion API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    /// Position of the call within the current run.
    pub index: u32,
    /// Call id, usually only on the first fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name, usually only on the first fragment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Slice of the JSON argument string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolCallFragment {
    /// Fragment for `index` with nothing set.
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// Set the call id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the tool name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the argument chunk.
    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

/// One event from a streaming model response.
///
/// Serialized externally tagged, so a recorded stream reads as
/// `{"content": "..."}` / `{"tool_call_delta": {...}}` lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelEvent {
    /// Plain text.
    Content(String),
    /// A piece of a structured tool call.
    ToolCallDelta(ToolCallFragment),
}

impl ModelEvent {
    /// Create a content event.
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content(text.into())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolved Calls
// ─────────────────────────────────────────────────────────────────────────────

/// How a tool call reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallChannel {
    /// Structured tool-call deltas.
    ExplicitDelta,
    /// JSON written inside plain text.
    EmbeddedText,
}

/// A complete, validated tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Call id, used to pair the result.
    pub id: String,
    /// Tool name as the model wrote it.
    pub name: String,
    /// Parsed argument object.
    pub arguments: Map<String, Value>,
    /// Where the call came from.
    pub channel: CallChannel,
}

/// A call that could not be turned into a [`ToolCallRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedCall {
    /// Call id (given or synthesized).
    pub id: String,
    /// Tool name, if one was present.
    pub name: Option<String>,
    /// What was wrong.
    pub reason: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

/// Why a tool result is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// Unknown tool, unavailable provider, transport failure, timeout, or
    /// an error reported by the tool itself.
    InvocationFailed,
    /// The call's arguments or name could not be parsed.
    MalformedCall,
}

/// Outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool ran.
    Success {
        /// Text payload.
        content: String,
    },
    /// The tool did not run, or reported an error.
    Failure {
        /// Failure category.
        kind: ToolErrorKind,
        /// Human-readable detail.
        detail: String,
    },
}

/// The result paired with one tool call by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the call this answers.
    pub call_id: String,
    /// Tool name.
    pub tool: String,
    /// What happened.
    #[serde(flatten)]
    pub outcome: ToolOutcome,
}

impl ToolResult {
    /// Create a success result.
    pub fn success(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool: tool.into(),
            outcome: ToolOutcome::Success {
                content: content.into(),
            },
        }
    }

    /// Create a failure result.
    pub fn failure(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        kind: ToolErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool: tool.into(),
            outcome: ToolOutcome::Failure {
                kind,
                detail: detail.into(),
            },
        }
    }

    /// Result for a call that could not be parsed.
    pub fn malformed(call: MalformedCall) -> Self {
        Self::failure(
            call.id,
            call.name.unwrap_or_default(),
            ToolErrorKind::MalformedCall,
            call.reason,
        )
    }

    /// Convert a provider reply. `isError` replies become failures.
    pub fn from_call_result(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        result: &CallToolResult,
    ) -> Self {
        let text = result.text().unwrap_or_else(|| {
            serde_json::to_string(&result.content).unwrap_or_default()
        });
        if result.is_error() {
            Self::failure(call_id, tool, ToolErrorKind::InvocationFailed, text)
        } else {
            Self::success(call_id, tool, text)
        }
    }

    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    /// Failure category, if any.
    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        match &self.outcome {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Text to show the model: the payload, or `Error: <detail>`.
    pub fn content_text(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { content } => content.clone(),
            ToolOutcome::Failure { detail, .. } => format!("Error: {detail}"),
        }
    }

    /// History message for OpenAI-style chat completions.
    pub fn to_openai_message(&self) -> Value {
        json!({
            "role": "tool",
            "tool_call_id": self.call_id,
            "content": self.content_text(),
        })
    }

    /// `tool_result` content block for Claude-style messages.
    pub fn to_claude_block(&self) -> Value {
        let content = match &self.outcome {
            ToolOutcome::Failure { detail, .. } if detail.is_empty() => {
                "Error occurred during tool execution.".to_string()
            }
            _ => self.content_text(),
        };
        json!({
            "type": "tool_result",
            "tool_use_id": self.call_id,
            "content": content,
            "is_error": !self.is_success(),
        })
    }

    /// Result record for prompt-mode conversations.
    pub fn to_prompt_message(&self) -> Value {
        json!({
            "tool_id": self.call_id,
            "content": self.content_text(),
            "is_error": !self.is_success(),
        })
    }
}

/// One item of a turn's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutput {
    /// Text for the user.
    Text(String),
    /// A tool finished.
    ToolResult(ToolResult),
}

impl TurnOutput {
    /// Create a text output.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_mcp::ToolContent;

    #[test]
    fn test_model_event_wire_format() {
        let event: ModelEvent = serde_json::from_str(r#"{"content": "hello"}"#).unwrap();
        assert_eq!(event, ModelEvent::content("hello"));

        let event: ModelEvent = serde_json::from_str(
            r#"{"tool_call_delta": {"index": 0, "name": "add", "arguments": "{\"a\":"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ModelEvent::ToolCallDelta(
                ToolCallFragment::new(0)
                    .with_name("add")
                    .with_arguments("{\"a\":")
            )
        );
    }

    #[test]
    fn test_from_call_result() {
        let ok = CallToolResult {
            content: vec![ToolContent::Text { text: "42".into() }],
            is_error: None,
        };
        let result = ToolResult::from_call_result("call_1", "answer", &ok);
        assert!(result.is_success());
        assert_eq!(result.content_text(), "42");

        let err = CallToolResult {
            content: vec![ToolContent::Text {
                text: "bad input".into(),
            }],
            is_error: Some(true),
        };
        let result = ToolResult::from_call_result("call_2", "answer", &err);
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvocationFailed));
        assert_eq!(result.content_text(), "Error: bad input");
    }

    #[test]
    fn test_render_openai() {
        let result = ToolResult::success("call_0", "calculate_bmi", "22.9");
        assert_eq!(
            result.to_openai_message(),
            json!({"role": "tool", "tool_call_id": "call_0", "content": "22.9"})
        );
    }

    #[test]
    fn test_render_claude() {
        let result = ToolResult::failure(
            "toolu_1",
            "search",
            ToolErrorKind::InvocationFailed,
            "Tool 'search' is not available",
        );
        let block = result.to_claude_block();
        assert_eq!(block["type"], "tool_result");
        assert_eq!(block["tool_use_id"], "toolu_1");
        assert_eq!(block["is_error"], true);
        assert_eq!(block["content"], "Error: Tool 'search' is not available");

        let empty = ToolResult::failure("toolu_2", "x", ToolErrorKind::InvocationFailed, "");
        assert_eq!(
            empty.to_claude_block()["content"],
            "Error occurred during tool execution."
        );
    }

    #[test]
    fn test_render_prompt() {
        let result = ToolResult::malformed(MalformedCall {
            id: "call_3".into(),
            name: Some("add".into()),
            reason: "arguments are not a JSON object".into(),
        });
        let msg = result.to_prompt_message();
        assert_eq!(msg["tool_id"], "call_3");
        assert_eq!(msg["is_error"], true);
        assert_eq!(result.error_kind(), Some(ToolErrorKind::MalformedCall));
    }

    #[test]
    fn test_turn_output_serialization() {
        let out = TurnOutput::ToolResult(ToolResult::success("call_0", "echo", "hi"));
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["tool_result"]["call_id"], "call_0");
        assert_eq!(v["tool_result"]["status"], "success");
        assert_eq!(v["tool_result"]["content"], "hi");

        let text = serde_json::to_value(TurnOutput::text("hello")).unwrap();
        assert_eq!(text, json!({"text": "hello"}));
    }
}
