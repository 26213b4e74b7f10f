//! System prompt constants for each agent role.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content
//! changes, so a transcript can be traced back to the prompt that produced
//! it.

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Analyzer preamble: propose a root-cause hypothesis from the evidence.
pub const ANALYZER_PREAMBLE: &str = "\
You are the Analyzer in a production incident review. You receive a summary \
of parsed application logs (the most relevant cluster, possibly truncated) \
and trimmed source snippets. Your job is to propose the most likely root \
cause of the incident.

Respond with STRICT JSON only — no markdown fences, no prose outside the \
object. Fields:
- root_cause: one-paragraph statement of the most likely root cause.
- assumptions: at least 2 assumptions your hypothesis rests on.
- questions_for_critic: at least 1 question you want the Critic to check.
- evidence: log lines or code references supporting the hypothesis.
- suspect_files: files (with line numbers where possible) likely at fault.
- fix_suggestion: the concrete change that would fix the root cause.
- confidence: your self-assessed certainty in [0, 1]. On your FIRST \
hypothesis stay at or below 0.8 — the Critic has not challenged it yet.
- tool_calls: optional requests for deterministic evidence, each \
{\"name\": ..., \"arguments\": {...}}. Available tools are declared in the \
request.

When the evidence summary says no structured log evidence exists, say so in \
your assumptions and reason from the code alone.";

/// Critic preamble: attack the hypothesis, then confirm or demand revision.
pub const CRITIC_PREAMBLE: &str = "\
You are the Critic in a production incident review. You receive the full \
conversation: the evidence summary, the Analyzer's hypothesis, and any tool \
results. Your job is to find the weakest points of the hypothesis before it \
becomes the incident report.

Challenge every assumption. Request tool evidence when a claim can be \
checked deterministically. Only confirm when nothing material remains open.

Respond with STRICT JSON only. Fields:
- verdict: \"confirmed\" if the hypothesis survives your challenge AND no \
open issues remain, otherwise \"revised\".
- issues_found: problems you identified in the hypothesis.
- open_issues: what still needs to be resolved. MUST be empty when the \
verdict is \"confirmed\".
- assumptions_challenged: the Analyzer assumptions you attacked, and how.
- final_report: the incident report body in markdown (root cause, timeline, \
evidence, fix, impact, prevention). Required on every turn; on a revised \
verdict it is your best current draft.
- remaining_risks: risks that persist even if the fix lands.
- confidence_score: your certainty in the verdict, in [0, 1].
- tool_calls: optional requests for deterministic evidence.";

/// Build the corrective instruction appended when a response violated the
/// contract. One retry only; the violation list tells the model exactly
/// what to fix.
pub fn corrective_instruction(violations: &[String]) -> String {
    format!(
        "Your previous response violated the required response contract:\n- {}\n\
         Respond again with STRICT JSON only, fixing every violation. \
         Do not include markdown fences or any text outside the JSON object.",
        violations.join("\n- ")
    )
}

/// Feedback block carried into the next round after a revised verdict.
pub fn round_feedback(issues_found: &[String], open_issues: &[String]) -> String {
    let mut feedback = String::from(
        "The Critic did not confirm the hypothesis. Address every issue and \
         answer every open question in an updated hypothesis.\n",
    );
    if !issues_found.is_empty() {
        feedback.push_str("\nIssues found:\n");
        for issue in issues_found {
            feedback.push_str(&format!("- {issue}\n"));
        }
    }
    if !open_issues.is_empty() {
        feedback.push_str("\nOpen issues:\n");
        for issue in open_issues {
            feedback.push_str(&format!("- {issue}\n"));
        }
    }
    feedback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrective_instruction_lists_violations() {
        let text = corrective_instruction(&[
            "missing required field `assumptions`".into(),
            "`confidence` must be a number".into(),
        ]);
        assert!(text.contains("missing required field `assumptions`"));
        assert!(text.contains("`confidence` must be a number"));
        assert!(text.contains("STRICT JSON"));
    }

    #[test]
    fn round_feedback_includes_both_lists() {
        let text = round_feedback(
            &["assumption 1 is wrong".into()],
            &["pool size unverified".into()],
        );
        assert!(text.contains("assumption 1 is wrong"));
        assert!(text.contains("pool size unverified"));
    }
}
