//! Structured agent response contracts and fail-closed validation.
//!
//! Both agents must answer in strict JSON. The engine parses raw model
//! output into a typed contract before consuming it; a malformed response is
//! rejected with the list of violations (which becomes the corrective retry
//! instruction), never an unchecked field access.
//!
//! ## Contract schema
//!
//! ```text
//! Hypothesis {                      Verdict {
//!     root_cause: String,               verdict: confirmed | revised,
//!     assumptions: [String; >=2],       issues_found: Vec<String>,
//!     questions_for_critic: >=1,        open_issues: Vec<String>,
//!     evidence: Vec<String>,            assumptions_challenged: Vec<String>,
//!     suspect_files: Vec<String>,       final_report: String (50..=5000),
//!     fix_suggestion: String,           remaining_risks: Vec<String>,
//!     confidence: 0..=1 (<=0.8 r1),     confidence_score: 0..=1,
//!     tool_calls: Vec<ToolCall>,        tool_calls: Vec<ToolCall>,
//! }                                 }
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum confidence the Analyzer may report on its first hypothesis.
pub const ROUND_ONE_CONFIDENCE_CAP: f64 = 0.8;
/// Bounds on the Critic's rendered report body, in characters.
pub const FINAL_REPORT_MIN_CHARS: usize = 50;
pub const FINAL_REPORT_MAX_CHARS: usize = 5_000;

/// A structured request for deterministic evidence, issued by either agent.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Analyzer output: a root-cause hypothesis plus the material the Critic
/// needs to attack it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Hypothesis {
    pub root_cause: String,
    pub assumptions: Vec<String>,
    pub questions_for_critic: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub suspect_files: Vec<String>,
    #[serde(default)]
    pub fix_suggestion: String,
    pub confidence: f64,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Confirmed,
    Revised,
}

impl std::fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirmed => write!(f, "confirmed"),
            Self::Revised => write!(f, "revised"),
        }
    }
}

/// Critic output: the challenge result and, on confirmation, the report body.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Verdict {
    pub verdict: VerdictKind,
    #[serde(default)]
    pub issues_found: Vec<String>,
    #[serde(default)]
    pub open_issues: Vec<String>,
    #[serde(default)]
    pub assumptions_challenged: Vec<String>,
    pub final_report: String,
    pub remaining_risks: Vec<String>,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Verdict {
    /// A verdict only counts as confirmed when no issues remain open.
    pub fn is_clean_confirmation(&self) -> bool {
        self.verdict == VerdictKind::Confirmed && self.open_issues.is_empty()
    }
}

/// A rejected agent response: the violation list feeds the corrective retry.
#[derive(Debug, Clone)]
pub struct ContractViolation {
    pub role: &'static str,
    pub violations: Vec<String>,
    pub raw: String,
}

impl std::fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.role, self.violations.join("; "))
    }
}

/// Try to extract a JSON object from a response that may carry surrounding
/// prose or a fenced code block.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return Some(text[json_start..json_start + end].trim());
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

fn parse_object(role: &'static str, raw: &str) -> Result<Value, ContractViolation> {
    let candidate = extract_json_block(raw).unwrap_or(raw);
    match serde_json::from_str::<Value>(candidate) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(ContractViolation {
            role,
            violations: vec!["response must be a JSON object".into()],
            raw: raw.to_string(),
        }),
        Err(e) => Err(ContractViolation {
            role,
            violations: vec![format!("response is not valid JSON: {e}")],
            raw: raw.to_string(),
        }),
    }
}

fn check_required(value: &Value, fields: &[&str], violations: &mut Vec<String>) {
    for field in fields {
        if value.get(field).is_none() {
            violations.push(format!("missing required field `{field}`"));
        }
    }
}

fn check_string_list(value: &Value, field: &str, violations: &mut Vec<String>) {
    if let Some(v) = value.get(field) {
        match v.as_array() {
            Some(items) => {
                if items.iter().any(|item| !item.is_string()) {
                    violations.push(format!("`{field}` must be a list of strings"));
                }
            }
            None => violations.push(format!("`{field}` must be a list")),
        }
    }
}

fn check_confidence(value: &Value, field: &str, violations: &mut Vec<String>) {
    if let Some(v) = value.get(field) {
        match v.as_f64() {
            Some(c) if (0.0..=1.0).contains(&c) => {}
            Some(c) => violations.push(format!("`{field}` must be within [0, 1], got {c}")),
            None => violations.push(format!("`{field}` must be a number")),
        }
    }
}

/// Validate an Analyzer response object against the Hypothesis contract.
pub fn validate_hypothesis_value(value: &Value, round: u32) -> Vec<String> {
    let mut violations = Vec::new();
    check_required(
        value,
        &[
            "root_cause",
            "assumptions",
            "questions_for_critic",
            "confidence",
        ],
        &mut violations,
    );
    for field in ["assumptions", "questions_for_critic", "evidence", "suspect_files"] {
        check_string_list(value, field, &mut violations);
    }
    check_confidence(value, "confidence", &mut violations);

    if let Some(items) = value.get("assumptions").and_then(Value::as_array) {
        if items.len() < 2 {
            violations.push("`assumptions` must list at least 2 entries".into());
        }
    }
    if let Some(items) = value.get("questions_for_critic").and_then(Value::as_array) {
        if items.is_empty() {
            violations.push("`questions_for_critic` must list at least 1 entry".into());
        }
    }
    if round == 1 {
        if let Some(c) = value.get("confidence").and_then(Value::as_f64) {
            if c > ROUND_ONE_CONFIDENCE_CAP {
                violations.push(format!(
                    "`confidence` may not exceed {ROUND_ONE_CONFIDENCE_CAP} on the first round, got {c}"
                ));
            }
        }
    }
    violations
}

/// Validate a Critic response object against the Verdict contract.
pub fn validate_verdict_value(value: &Value) -> Vec<String> {
    let mut violations = Vec::new();
    check_required(
        value,
        &["verdict", "final_report", "remaining_risks"],
        &mut violations,
    );

    if let Some(v) = value.get("verdict") {
        match v.as_str() {
            Some("confirmed") | Some("revised") => {}
            Some(other) => {
                violations.push(format!("`verdict` must be `confirmed` or `revised`, got `{other}`"))
            }
            None => violations.push("`verdict` must be a string".into()),
        }
    }
    for field in ["issues_found", "open_issues", "assumptions_challenged", "remaining_risks"] {
        check_string_list(value, field, &mut violations);
    }
    check_confidence(value, "confidence_score", &mut violations);

    if let Some(report) = value.get("final_report") {
        match report.as_str() {
            Some(text) if text.len() < FINAL_REPORT_MIN_CHARS => {
                violations.push(format!(
                    "`final_report` is too brief ({} chars, minimum {FINAL_REPORT_MIN_CHARS})",
                    text.len()
                ));
            }
            Some(text) if text.len() > FINAL_REPORT_MAX_CHARS => {
                violations.push(format!(
                    "`final_report` exceeds {FINAL_REPORT_MAX_CHARS} chars ({})",
                    text.len()
                ));
            }
            Some(_) => {}
            None => violations.push("`final_report` must be a string".into()),
        }
    }
    violations
}

/// Parse and validate an Analyzer response. Fail-closed: any violation
/// rejects the whole response.
pub fn parse_hypothesis(raw: &str, round: u32) -> Result<(Hypothesis, Value), ContractViolation> {
    let value = parse_object("analyzer", raw)?;
    let violations = validate_hypothesis_value(&value, round);
    if !violations.is_empty() {
        return Err(ContractViolation {
            role: "analyzer",
            violations,
            raw: raw.to_string(),
        });
    }
    let hypothesis: Hypothesis =
        serde_json::from_value(value.clone()).map_err(|e| ContractViolation {
            role: "analyzer",
            violations: vec![format!("response does not match the hypothesis schema: {e}")],
            raw: raw.to_string(),
        })?;
    Ok((hypothesis, value))
}

/// Parse and validate a Critic response.
pub fn parse_verdict(raw: &str) -> Result<(Verdict, Value), ContractViolation> {
    let value = parse_object("critic", raw)?;
    let violations = validate_verdict_value(&value);
    if !violations.is_empty() {
        return Err(ContractViolation {
            role: "critic",
            violations,
            raw: raw.to_string(),
        });
    }
    let verdict: Verdict = serde_json::from_value(value.clone()).map_err(|e| ContractViolation {
        role: "critic",
        violations: vec![format!("response does not match the verdict schema: {e}")],
        raw: raw.to_string(),
    })?;
    Ok((verdict, value))
}

/// Gemini `responseSchema` for the Analyzer role (OpenAPI subset).
pub fn hypothesis_response_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "root_cause": {"type": "string"},
            "assumptions": {"type": "array", "items": {"type": "string"}},
            "questions_for_critic": {"type": "array", "items": {"type": "string"}},
            "evidence": {"type": "array", "items": {"type": "string"}},
            "suspect_files": {"type": "array", "items": {"type": "string"}},
            "fix_suggestion": {"type": "string"},
            "confidence": {"type": "number"},
            "tool_calls": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "arguments": {"type": "object"}
                    },
                    "required": ["name"]
                }
            }
        },
        "required": ["root_cause", "assumptions", "questions_for_critic", "confidence"]
    })
}

/// Gemini `responseSchema` for the Critic role.
pub fn verdict_response_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "verdict": {"type": "string", "enum": ["confirmed", "revised"]},
            "issues_found": {"type": "array", "items": {"type": "string"}},
            "open_issues": {"type": "array", "items": {"type": "string"}},
            "assumptions_challenged": {"type": "array", "items": {"type": "string"}},
            "final_report": {"type": "string"},
            "remaining_risks": {"type": "array", "items": {"type": "string"}},
            "confidence_score": {"type": "number"},
            "tool_calls": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "arguments": {"type": "object"}
                    },
                    "required": ["name"]
                }
            }
        },
        "required": ["verdict", "final_report", "remaining_risks"]
    })
}
