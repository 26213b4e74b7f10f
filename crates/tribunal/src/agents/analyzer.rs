//! Analyzer role: proposes the root-cause hypothesis.

use serde_json::Value;

use crate::contracts::{self, ContractViolation, Hypothesis};
use crate::prompts;

pub fn preamble() -> &'static str {
    prompts::ANALYZER_PREAMBLE
}

pub fn response_schema() -> Value {
    contracts::hypothesis_response_schema()
}

/// Parse raw Analyzer output into a validated Hypothesis.
///
/// `round` enforces the first-round confidence cap. Fail-closed: the
/// violation list drives the corrective retry.
pub fn parse_response(raw: &str, round: u32) -> Result<(Hypothesis, Value), ContractViolation> {
    contracts::parse_hypothesis(raw, round)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_response_parses() {
        let raw = json!({
            "root_cause": "Connection pool exhausted by leaked connections",
            "assumptions": ["pool size is fixed", "no recent deploy changed the pool"],
            "questions_for_critic": ["is the pool shared with the batch job?"],
            "confidence": 0.6
        })
        .to_string();
        let (hypothesis, _) = parse_response(&raw, 1).unwrap();
        assert_eq!(hypothesis.assumptions.len(), 2);
        assert!(hypothesis.tool_calls.is_empty());
    }

    #[test]
    fn overconfident_first_round_rejected() {
        let raw = json!({
            "root_cause": "Connection pool exhausted",
            "assumptions": ["a", "b"],
            "questions_for_critic": ["q"],
            "confidence": 0.9
        })
        .to_string();
        assert!(parse_response(&raw, 1).is_err());
        assert!(parse_response(&raw, 3).is_ok());
    }
}
