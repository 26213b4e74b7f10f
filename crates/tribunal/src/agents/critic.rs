//! Critic role: challenges the hypothesis and writes the report body.

use serde_json::Value;

use crate::contracts::{self, ContractViolation, Verdict};
use crate::prompts;

pub fn preamble() -> &'static str {
    prompts::CRITIC_PREAMBLE
}

pub fn response_schema() -> Value {
    contracts::verdict_response_schema()
}

/// Parse raw Critic output into a validated Verdict. Fail-closed.
pub fn parse_response(raw: &str) -> Result<(Verdict, Value), ContractViolation> {
    contracts::parse_verdict(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::VerdictKind;
    use serde_json::json;

    #[test]
    fn valid_response_parses() {
        let raw = json!({
            "verdict": "revised",
            "open_issues": ["pool size unverified"],
            "final_report": "## Draft\nThe hypothesis needs the pool size verified before \
                             it can be confirmed as the root cause.",
            "remaining_risks": [],
            "confidence_score": 0.5
        })
        .to_string();
        let (verdict, _) = parse_response(&raw).unwrap();
        assert_eq!(verdict.verdict, VerdictKind::Revised);
        assert!(!verdict.is_clean_confirmation());
    }
}
