//! Engine error taxonomy with retry classification.
//!
//! Every failure mode of a debate run is represented here. Callers can query
//! `retry_category()` / `is_retriable()` without string matching.
//!
//! ## Retry categories
//!
//! | Category          | Retriable | Handling                                  |
//! |-------------------|-----------|-------------------------------------------|
//! | Transient         | yes       | backoff inside the LLM client             |
//! | RateLimit         | yes       | backoff inside the LLM client             |
//! | ProtocolViolation | yes       | one corrective retry per agent turn       |
//! | ToolFailure       | no        | captured as a tool message, debate continues |
//! | InputError        | no        | fail fast before any LLM call             |
//! | BudgetExhausted   | no        | forced termination, not a failure         |
//! | Cancelled         | no        | flush partial state, terminal             |

use std::fmt;

use thiserror::Error;

use crate::gemini::LlmError;

/// Classification used by the controller to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Transient transport / backend error — retried with backoff.
    Transient,
    /// API rate limit — retried with exponential backoff.
    RateLimit,
    /// Agent response failed schema validation — one corrective retry.
    ProtocolViolation,
    /// A deterministic tool rejected the call — reported to the agent, not retried.
    ToolFailure,
    /// Missing or unreadable input — terminal before the debate starts.
    InputError,
    /// Round budget consumed without confirmation — forced-terminal, not an error.
    BudgetExhausted,
    /// Explicitly cancelled by the caller — terminal.
    Cancelled,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::Transient | Self::RateLimit | Self::ProtocolViolation
        )
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::ProtocolViolation => write!(f, "protocol_violation"),
            Self::ToolFailure => write!(f, "tool_failure"),
            Self::InputError => write!(f, "input_error"),
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Unified error type for the debate engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or unreadable log / code file.
    #[error("input error: {0}")]
    Input(String),

    /// Configuration is invalid or a required environment variable is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The LLM capability failed after exhausting its retry budget.
    #[error("capability failure: {0}")]
    Capability(#[from] LlmError),

    /// An agent response failed contract validation after the corrective retry.
    #[error("protocol violation from {role}: {}", violations.join("; "))]
    Protocol {
        role: &'static str,
        violations: Vec<String>,
    },

    /// The run was cancelled between turns.
    #[error("run cancelled")]
    Cancelled,

    /// The controller attempted an illegal state transition (a bug, not a
    /// recoverable condition).
    #[error("illegal state transition: {0}")]
    State(#[from] crate::state_machine::IllegalTransition),

    /// Filesystem error while writing artifacts.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Input(_) | Self::Configuration(_) => RetryCategory::InputError,
            Self::Capability(e) => match e {
                LlmError::RateLimited { .. } => RetryCategory::RateLimit,
                _ => RetryCategory::Transient,
            },
            Self::Protocol { .. } => RetryCategory::ProtocolViolation,
            Self::Cancelled => RetryCategory::Cancelled,
            Self::State(_) => RetryCategory::InputError,
            Self::Io(_) => RetryCategory::InputError,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }
}

/// Terminal status of a run, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Debate confirmed a root cause within the round budget.
    Completed,
    /// Report produced but flagged (low confidence or forced termination).
    CompletedWithWarnings,
    /// Run ended early: input error, capability exhaustion, or cancellation.
    Failed,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::CompletedWithWarnings => 2,
            Self::Failed => 1,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithWarnings => write!(f, "completed_with_warnings"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
