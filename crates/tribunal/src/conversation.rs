//! Append-only conversation state for one debate run.
//!
//! Every message exchanged during a run — system context, agent output, tool
//! results — lands here in dispatch order and is never mutated or removed.
//! Message identity is `(round, role, seq)`. The prompt view for the next
//! agent call is assembled read-only from the same sequence, with tool
//! results truncated to a character cap to keep the context bounded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    Analyzer,
    Critic,
    Tool,
}

/// Chat-level role as seen by the LLM transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Model,
}

/// One rendered prompt message, the unit of the conversation view.
#[derive(Debug, Clone)]
pub struct PromptMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Json(Value),
    Text(String),
}

/// An immutable conversation record.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub round: u32,
    pub seq: usize,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    /// Completion tokens attributed to this message, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    /// Tool name for `Role::Tool` messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Whether the stored tool result was size-truncated.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// Exclusively owned by one run; sharing across runs is a bug.
#[derive(Debug, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, mut message: Message) {
        message.seq = self.messages.len();
        self.messages.push(message);
    }

    pub fn push_system(&mut self, round: u32, payload: Value) {
        self.push(Message {
            role: Role::System,
            round,
            seq: 0,
            timestamp: Utc::now(),
            payload: Payload::Json(payload),
            token_count: None,
            tool: None,
            truncated: false,
        });
    }

    pub fn push_agent(&mut self, role: Role, round: u32, payload: Value, token_count: Option<u64>) {
        debug_assert!(matches!(role, Role::Analyzer | Role::Critic));
        self.push(Message {
            role,
            round,
            seq: 0,
            timestamp: Utc::now(),
            payload: Payload::Json(payload),
            token_count,
            tool: None,
            truncated: false,
        });
    }

    pub fn push_tool(&mut self, round: u32, tool: &str, rendered: String, truncated: bool) {
        self.push(Message {
            role: Role::Tool,
            round,
            seq: 0,
            timestamp: Utc::now(),
            payload: Payload::Text(rendered),
            token_count: None,
            tool: Some(tool.to_string()),
            truncated,
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Assemble the prompt view for the next agent call.
    ///
    /// System and tool messages render as user turns (tool results prefixed
    /// with the tool name and truncated to `tool_result_char_cap`); agent
    /// messages render as model turns carrying their JSON payload.
    pub fn render_view(&self, tool_result_char_cap: usize) -> Vec<PromptMessage> {
        self.messages
            .iter()
            .map(|message| match message.role {
                Role::System => PromptMessage {
                    role: ChatRole::User,
                    content: payload_text(&message.payload),
                },
                Role::Analyzer | Role::Critic => PromptMessage {
                    role: ChatRole::Model,
                    content: payload_text(&message.payload),
                },
                Role::Tool => {
                    let mut body = payload_text(&message.payload);
                    if body.len() > tool_result_char_cap {
                        body.truncate(floor_char_boundary(&body, tool_result_char_cap));
                        body.push_str("... (truncated)");
                    }
                    PromptMessage {
                        role: ChatRole::User,
                        content: format!(
                            "Tool '{}' returned: {body}",
                            message.tool.as_deref().unwrap_or("unknown")
                        ),
                    }
                }
            })
            .collect()
    }

    /// Export the full ordered transcript for audit/replay.
    pub fn to_transcript(&self) -> Value {
        serde_json::json!({
            "messages": self.messages,
            "message_count": self.messages.len(),
        })
    }
}

fn payload_text(payload: &Payload) -> String {
    match payload {
        Payload::Text(text) => text.clone(),
        Payload::Json(value) => value.to_string(),
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sequence_numbers_follow_append_order() {
        let mut state = ConversationState::new();
        state.push_system(0, json!({"context": "summary"}));
        state.push_agent(Role::Analyzer, 1, json!({"root_cause": "leak"}), Some(42));
        state.push_tool(1, "grep_source", "no matches".into(), false);
        state.push_agent(Role::Critic, 1, json!({"verdict": "confirmed"}), None);

        let seqs: Vec<usize> = state.messages().iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
        assert_eq!(state.messages()[1].round, 1);
        assert_eq!(state.messages()[1].token_count, Some(42));
    }

    #[test]
    fn view_maps_roles_to_chat_roles() {
        let mut state = ConversationState::new();
        state.push_system(0, json!({"context": "summary"}));
        state.push_agent(Role::Analyzer, 1, json!({"a": 1}), None);
        state.push_tool(1, "filter_logs", "three lines".into(), false);

        let view = state.render_view(1_000);
        assert_eq!(view.len(), 3);
        assert_eq!(view[0].role, ChatRole::User);
        assert_eq!(view[1].role, ChatRole::Model);
        assert_eq!(view[2].role, ChatRole::User);
        assert!(view[2].content.starts_with("Tool 'filter_logs' returned:"));
    }

    #[test]
    fn tool_results_truncated_in_view_only() {
        let mut state = ConversationState::new();
        let long = "x".repeat(500);
        state.push_tool(1, "grep_source", long.clone(), false);

        let view = state.render_view(100);
        assert!(view[0].content.contains("... (truncated)"));
        assert!(view[0].content.len() < 200);
        // the stored message keeps the full text
        match &state.messages()[0].payload {
            Payload::Text(text) => assert_eq!(text.len(), 500),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut state = ConversationState::new();
        state.push_tool(1, "grep_source", "héllo wörld".repeat(40), false);
        // must not panic on a multi-byte boundary
        let _ = state.render_view(7);
    }

    #[test]
    fn transcript_preserves_order_and_count() {
        let mut state = ConversationState::new();
        state.push_system(0, json!({"s": 1}));
        state.push_agent(Role::Analyzer, 1, json!({"a": 1}), None);
        let transcript = state.to_transcript();
        assert_eq!(transcript["message_count"], 2);
        assert_eq!(transcript["messages"][0]["role"], "system");
        assert_eq!(transcript["messages"][1]["role"], "analyzer");
    }
}
