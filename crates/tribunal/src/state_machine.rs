//! Debate state machine — explicit states and legal transition guards.
//!
//! The controller loop calls `advance()` to move between states. Each call
//! validates that the transition is legal and records it in the transition
//! log, so a transcript can be replayed against the exact state sequence
//! and the round bound stays independently testable.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The set of debate states.
///
/// Every run starts at `Init` and ends at `Terminated`. The tool states are
/// skipped when a turn requested no tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateState {
    /// Assembling the initial context from the redacted log chunk and code.
    Init,
    /// Analyzer turn: produce or revise the hypothesis.
    Analyzing,
    /// Executing the Analyzer's requested tool calls.
    ToolingAnalyzer,
    /// Critic turn: challenge the hypothesis, confirm or revise.
    Critiquing,
    /// Executing the Critic's requested tool calls.
    ToolingCritic,
    /// Terminal: confirmed, forced, failed, or cancelled.
    Terminated,
}

impl DebateState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for DebateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "Init"),
            Self::Analyzing => write!(f, "Analyzing"),
            Self::ToolingAnalyzer => write!(f, "ToolingAnalyzer"),
            Self::Critiquing => write!(f, "Critiquing"),
            Self::ToolingCritic => write!(f, "ToolingCritic"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Legal transitions:
/// ```text
/// Init            → Analyzing
/// Analyzing       → ToolingAnalyzer | Critiquing
/// ToolingAnalyzer → Critiquing
/// Critiquing      → ToolingCritic | Analyzing
/// ToolingCritic   → Analyzing
/// any non-terminal → Terminated
/// ```
fn is_legal_transition(from: DebateState, to: DebateState) -> bool {
    use DebateState::*;

    if to == Terminated && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Init, Analyzing)
            | (Analyzing, ToolingAnalyzer)
            | (Analyzing, Critiquing)
            | (ToolingAnalyzer, Critiquing)
            // Critic sends the debate into the next round
            | (Critiquing, ToolingCritic)
            | (Critiquing, Analyzing)
            | (ToolingCritic, Analyzing)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: DebateState,
    pub to: DebateState,
    /// Round number at the time of transition (0 before the first round).
    pub round: u32,
    /// Milliseconds since the state machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: DebateState,
    pub to: DebateState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal state transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks the current state, enforces legal transitions, and keeps the
/// complete transition log for replay and diagnostics.
pub struct DebateStateMachine {
    current: DebateState,
    round: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl DebateStateMachine {
    pub fn new() -> Self {
        Self {
            current: DebateState::Init,
            round: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> DebateState {
        self.current
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn set_round(&mut self, round: u32) {
        self.round = round;
    }

    /// Attempt to advance to the next state.
    pub fn advance(
        &mut self,
        to: DebateState,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            round: self.round,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            round = self.round,
            "state transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    /// Terminate from any non-terminal state.
    pub fn terminate(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(DebateState::Terminated, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }
}

impl Default for DebateStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let sm = DebateStateMachine::new();
        assert_eq!(sm.current(), DebateState::Init);
        assert!(!sm.is_terminal());
        assert_eq!(sm.transitions().len(), 0);
    }

    #[test]
    fn test_single_round_confirmation_path() {
        let mut sm = DebateStateMachine::new();
        sm.set_round(1);
        sm.advance(DebateState::Analyzing, None).unwrap();
        sm.advance(DebateState::ToolingAnalyzer, Some("2 tool calls"))
            .unwrap();
        sm.advance(DebateState::Critiquing, None).unwrap();
        sm.terminate("confirmed at round 1").unwrap();

        assert!(sm.is_terminal());
        assert_eq!(sm.transitions().len(), 4);
    }

    #[test]
    fn test_multi_round_loop() {
        let mut sm = DebateStateMachine::new();
        sm.set_round(1);
        sm.advance(DebateState::Analyzing, None).unwrap();
        sm.advance(DebateState::Critiquing, None).unwrap();
        // revised → next round
        sm.set_round(2);
        sm.advance(DebateState::Analyzing, Some("verdict revised"))
            .unwrap();
        sm.advance(DebateState::Critiquing, None).unwrap();
        sm.terminate("confirmed at round 2").unwrap();
        assert!(sm.is_terminal());
    }

    #[test]
    fn test_tool_states_skippable() {
        let mut sm = DebateStateMachine::new();
        sm.advance(DebateState::Analyzing, None).unwrap();
        // no tool calls requested: straight to the critic
        sm.advance(DebateState::Critiquing, None).unwrap();
        assert_eq!(sm.current(), DebateState::Critiquing);
    }

    #[test]
    fn test_critic_tooling_feeds_next_round() {
        let mut sm = DebateStateMachine::new();
        sm.advance(DebateState::Analyzing, None).unwrap();
        sm.advance(DebateState::Critiquing, None).unwrap();
        sm.advance(DebateState::ToolingCritic, None).unwrap();
        sm.advance(DebateState::Analyzing, None).unwrap();
        assert_eq!(sm.current(), DebateState::Analyzing);
    }

    #[test]
    fn test_termination_from_any_state() {
        for state in [
            DebateState::Init,
            DebateState::Analyzing,
            DebateState::ToolingAnalyzer,
            DebateState::Critiquing,
            DebateState::ToolingCritic,
        ] {
            let mut sm = DebateStateMachine {
                current: state,
                round: 0,
                created_at: Instant::now(),
                transitions: Vec::new(),
            };
            assert!(sm.terminate("capability failure").is_ok());
            assert!(sm.is_terminal());
        }
    }

    #[test]
    fn test_cannot_leave_terminal_state() {
        let mut sm = DebateStateMachine::new();
        sm.advance(DebateState::Analyzing, None).unwrap();
        sm.terminate("failed").unwrap();

        let err = sm.advance(DebateState::Analyzing, None).unwrap_err();
        assert_eq!(err.from, DebateState::Terminated);
        assert!(sm.terminate("again").is_err());
    }

    #[test]
    fn test_illegal_skip_rejected() {
        let mut sm = DebateStateMachine::new();
        // cannot jump straight to the critic without an analyzer turn
        assert!(sm.advance(DebateState::Critiquing, None).is_err());
    }

    #[test]
    fn test_illegal_backward_transition_rejected() {
        let mut sm = DebateStateMachine::new();
        sm.advance(DebateState::Analyzing, None).unwrap();
        assert!(sm.advance(DebateState::Init, None).is_err());
    }

    #[test]
    fn test_transition_record_carries_round_and_reason() {
        let mut sm = DebateStateMachine::new();
        sm.set_round(1);
        sm.advance(DebateState::Analyzing, Some("round 1 start"))
            .unwrap();
        let record = &sm.transitions()[0];
        assert_eq!(record.from, DebateState::Init);
        assert_eq!(record.to, DebateState::Analyzing);
        assert_eq!(record.round, 1);
        assert_eq!(record.reason.as_deref(), Some("round 1 start"));
    }

    #[test]
    fn test_transition_record_serde_roundtrip() {
        let record = TransitionRecord {
            from: DebateState::Critiquing,
            to: DebateState::Terminated,
            round: 3,
            elapsed_ms: 4520,
            reason: Some("round budget exhausted".into()),
        };
        let json = serde_json::to_string(&record).unwrap();
        let restored: TransitionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.from, DebateState::Critiquing);
        assert_eq!(restored.to, DebateState::Terminated);
        assert_eq!(restored.round, 3);
    }
}
