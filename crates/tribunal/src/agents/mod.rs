//! Agent roles for the incident debate.
//!
//! Each role pairs a preamble with a strict response schema; the `Agent`
//! wrapper renders the conversation view into a generation request for the
//! shared LLM capability. Response parsing lives in [`crate::contracts`] —
//! agents produce raw model output, the engine validates it fail-closed.

pub mod analyzer;
pub mod critic;

use std::sync::Arc;

use serde_json::Value;

use crate::conversation::{ChatRole, PromptMessage};
use crate::gemini::{GenerateRequest, GenerateResponse, LlmClient, LlmError};

/// The two debating roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Analyzer,
    Critic,
}

impl AgentRole {
    pub fn name(self) -> &'static str {
        match self {
            Self::Analyzer => "analyzer",
            Self::Critic => "critic",
        }
    }

    pub fn preamble(self) -> &'static str {
        match self {
            Self::Analyzer => analyzer::preamble(),
            Self::Critic => critic::preamble(),
        }
    }

    pub fn response_schema(self) -> Value {
        match self {
            Self::Analyzer => analyzer::response_schema(),
            Self::Critic => critic::response_schema(),
        }
    }
}

/// A role bound to the run's LLM capability.
pub struct Agent {
    role: AgentRole,
    client: Arc<dyn LlmClient>,
}

impl Agent {
    pub fn new(role: AgentRole, client: Arc<dyn LlmClient>) -> Self {
        Self { role, client }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Call the model with the current conversation view.
    ///
    /// The role preamble leads the request; `corrective` carries the
    /// violation list when this is the bounded schema-retry call.
    pub async fn call(
        &self,
        view: &[PromptMessage],
        tool_declarations: Vec<Value>,
        corrective: Option<&str>,
    ) -> Result<GenerateResponse, LlmError> {
        let mut messages = Vec::with_capacity(view.len() + 2);
        messages.push(PromptMessage {
            role: ChatRole::User,
            content: self.role.preamble().to_string(),
        });
        messages.extend(view.iter().cloned());
        if let Some(instruction) = corrective {
            messages.push(PromptMessage {
                role: ChatRole::User,
                content: instruction.to_string(),
            });
        }

        self.client
            .generate(GenerateRequest {
                messages,
                response_schema: Some(self.role.response_schema()),
                tool_declarations,
            })
            .await
    }
}
