//! The terminal incident report artifact.

use serde::{Deserialize, Serialize};

/// Built once at termination from the last Hypothesis and Verdict, plus run
/// metadata. Immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReport {
    pub title: String,
    pub summary: String,
    pub root_cause: String,
    pub evidence: Vec<String>,
    pub fix: String,
    pub impact: String,
    pub remaining_risks: Vec<String>,
    /// The Critic's markdown report body.
    pub body: String,
    pub rounds_used: u32,
    pub confidence: f64,
    pub forced_termination: bool,
    pub low_confidence: bool,
    pub failed: bool,
    pub transcript_path: String,
}

impl IncidentReport {
    /// Render the report markdown, capped at `word_cap` words.
    pub fn to_markdown(&self, word_cap: usize) -> String {
        let mut out = format!("# {}\n\n", self.title);

        let mut flags = Vec::new();
        if self.failed {
            flags.push("**RUN FAILED** — this is a partial report");
        }
        if self.forced_termination {
            flags.push("**forced termination** — round budget reached without confirmation");
        }
        if self.low_confidence {
            flags.push("**low confidence** — flagged for human review");
        }
        if !flags.is_empty() {
            out.push_str(&format!("> {}\n\n", flags.join(" · ")));
        }

        out.push_str(&self.body);
        out.push_str("\n\n---\n\n");
        out.push_str(&format!("**Root cause:** {}\n\n", self.root_cause));
        out.push_str(&format!("**Fix:** {}\n\n", self.fix));
        if !self.evidence.is_empty() {
            out.push_str("**Evidence:**\n");
            for item in &self.evidence {
                out.push_str(&format!("- {item}\n"));
            }
            out.push('\n');
        }
        if !self.remaining_risks.is_empty() {
            out.push_str("**Remaining risks:**\n");
            for risk in &self.remaining_risks {
                out.push_str(&format!("- {risk}\n"));
            }
            out.push('\n');
        }
        out.push_str(&format!(
            "_Rounds: {} · Confidence: {:.2} · Transcript: {}_\n",
            self.rounds_used, self.confidence, self.transcript_path
        ));

        cap_words(&out, word_cap)
    }
}

/// Truncate at a word boundary once `word_cap` words have been emitted.
fn cap_words(text: &str, word_cap: usize) -> String {
    let mut words = 0usize;
    let mut in_word = false;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_word = false;
        } else if !in_word {
            in_word = true;
            words += 1;
            if words > word_cap {
                let mut out = text[..idx].trim_end().to_string();
                out.push_str("\n\n_(report truncated at word budget)_\n");
                return out;
            }
        }
    }
    text.to_string()
}

/// Validate a finished report; returns the list of problems (empty = ok).
pub fn validate_report(report: &IncidentReport) -> Vec<String> {
    let mut errors = Vec::new();

    if report.title.is_empty() {
        errors.push("title must not be empty".into());
    } else if !report.title.to_lowercase().contains("incident") {
        errors.push("title should mention the incident".into());
    }
    if !report.failed && report.root_cause.len() < 20 {
        errors.push("root cause description is too brief".into());
    }
    if !report.failed && report.evidence.is_empty() {
        errors.push("at least one piece of evidence is required".into());
    }
    for item in &report.evidence {
        let lower = item.to_lowercase();
        let looks_redacted = item.contains("_REDACTED]");
        if !looks_redacted
            && ["password", "secret", "api key"]
                .iter()
                .any(|p| lower.contains(p))
        {
            let preview: String = item.chars().take(50).collect();
            errors.push(format!("evidence may contain sensitive data: {preview}..."));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> IncidentReport {
        IncidentReport {
            title: "Incident Analysis - connection pool exhaustion".into(),
            summary: "Connections leak in UserService".into(),
            root_cause: "Connections acquired in UserService.getConnection are never closed"
                .into(),
            evidence: vec!["47 acquisition failures in app.log".into()],
            fix: "Close the connection in a finally block".into(),
            impact: "All requests needing the database failed for 12 minutes".into(),
            remaining_risks: vec!["slow queries can still saturate the pool".into()],
            body: "## Root Cause\nConnection leak.\n## Fix\nClose connections.".into(),
            rounds_used: 2,
            confidence: 0.85,
            forced_termination: false,
            low_confidence: false,
            failed: false,
            transcript_path: "reports/conversation_x.json".into(),
        }
    }

    #[test]
    fn markdown_contains_sections_and_metadata() {
        let md = sample_report().to_markdown(1_000);
        assert!(md.starts_with("# Incident Analysis"));
        assert!(md.contains("**Root cause:**"));
        assert!(md.contains("47 acquisition failures"));
        assert!(md.contains("Rounds: 2"));
    }

    #[test]
    fn flags_rendered_when_set() {
        let mut report = sample_report();
        report.forced_termination = true;
        report.low_confidence = true;
        let md = report.to_markdown(1_000);
        assert!(md.contains("forced termination"));
        assert!(md.contains("low confidence"));
    }

    #[test]
    fn failed_flag_marks_partial_report() {
        let mut report = sample_report();
        report.failed = true;
        let md = report.to_markdown(1_000);
        assert!(md.contains("RUN FAILED"));
    }

    #[test]
    fn word_cap_truncates_at_boundary() {
        let report = sample_report();
        let md = report.to_markdown(10);
        assert!(md.contains("truncated at word budget"));
        assert!(md.len() < report.to_markdown(10_000).len());
    }

    #[test]
    fn word_cap_no_op_for_short_reports() {
        let report = sample_report();
        let md = report.to_markdown(100_000);
        assert!(!md.contains("truncated at word budget"));
    }

    #[test]
    fn valid_report_passes_validation() {
        assert!(validate_report(&sample_report()).is_empty());
    }

    #[test]
    fn brief_root_cause_flagged() {
        let mut report = sample_report();
        report.root_cause = "leak".into();
        assert!(!validate_report(&report).is_empty());
    }

    #[test]
    fn sensitive_evidence_flagged_unless_redacted() {
        let mut report = sample_report();
        report.evidence = vec!["password=hunter2 found in config".into()];
        assert!(!validate_report(&report).is_empty());

        report.evidence = vec!["[SECRET_REDACTED] found in config".into()];
        assert!(validate_report(&report).is_empty());
    }

    #[test]
    fn failed_partial_report_skips_completeness_checks() {
        let mut report = sample_report();
        report.failed = true;
        report.evidence = vec![];
        report.root_cause = "unknown".into();
        assert!(validate_report(&report).is_empty());
    }
}
