//! Debate controller: the round loop and everything around it.
//!
//! ## Lifecycle
//!
//! ```text
//! run(input)
//!   → read inputs (fail fast on missing files)
//!   → parse / cluster / select chunk / redact   — evidence preparation
//!   → loop round = 1..=max_rounds:
//!       Analyzer turn  (schema violation → one corrective retry)
//!       tool calls     (sequential, in request order)
//!       Critic turn    (same retry policy; dirty confirm → revised)
//!       terminate on (confirmed && round >= min_rounds) or round == max_rounds
//!   → write report / metrics / transcript artifacts
//! ```
//!
//! Failures after the debate has started never bubble out as errors: the run
//! terminates with whatever hypothesis/verdict exist so far, flagged
//! `failed`, and the artifacts are still flushed. Only input and
//! configuration problems before the first LLM call are returned as `Err`.
//! Cancellation is observed between turns only, so a tool result is never
//! left unattributed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agents::{analyzer, critic, Agent, AgentRole};
use crate::cluster::{self, ContextChunk};
use crate::config::DebateConfig;
use crate::contracts::{Hypothesis, ToolCallRequest, Verdict, VerdictKind};
use crate::conversation::{ConversationState, Role};
use crate::error::{EngineError, RunStatus};
use crate::gemini::LlmClient;
use crate::logparse::{self, LogEntry, LogSummary};
use crate::metrics::{MetricsAccumulator, RunFlags, RunMetrics, StageTiming};
use crate::prompts;
use crate::redact;
use crate::report::{self, IncidentReport};
use crate::state_machine::{DebateState, DebateStateMachine};
use crate::tools::filter_logs::FilterLogsTool;
use crate::tools::grep_source::GrepSourceTool;
use crate::tools::{RegisteredTool, ToolRouter};

/// Progress events — the run's only UI surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Event {
    LogsParsed {
        total_lines: usize,
        error_count: usize,
        warn_count: usize,
    },
    ChunkSelected {
        selected: usize,
        source: String,
        truncated: bool,
    },
    AgentTurn {
        role: &'static str,
        round: u32,
        retried: bool,
    },
    ToolResult {
        tool: String,
        round: u32,
        ok: bool,
        truncated: bool,
    },
    RoundComplete {
        round: u32,
        verdict: String,
        open_issues: usize,
    },
    Completed {
        status: RunStatus,
        rounds: u32,
    },
}

pub type EventSink = dyn Fn(&Event) + Send + Sync;

/// The files a run operates on.
#[derive(Debug, Clone)]
pub struct RunInput {
    pub log_path: PathBuf,
    pub code_paths: Vec<PathBuf>,
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub report: Option<IncidentReport>,
    pub report_path: Option<PathBuf>,
    pub metrics: RunMetrics,
    pub metrics_path: PathBuf,
    pub transcript_path: PathBuf,
}

/// What the debate loop accumulated before it terminated.
#[derive(Default)]
struct DebateTally {
    hypothesis: Option<Hypothesis>,
    verdict: Option<Verdict>,
    rounds_used: u32,
    forced: bool,
    failure: Option<String>,
    cancelled: bool,
}

/// One validated agent turn plus its raw payload for the transcript.
struct Turn<T> {
    parsed: T,
    raw: Value,
    completion_tokens: u64,
    retried: bool,
}

/// Drives one debate run. Owns nothing shared with other runs.
pub struct DebateEngine {
    config: DebateConfig,
    client: Arc<dyn LlmClient>,
    cancel: CancellationToken,
    on_event: Box<EventSink>,
}

impl DebateEngine {
    pub fn new(config: DebateConfig, client: Arc<dyn LlmClient>) -> Self {
        Self {
            config,
            client,
            cancel: CancellationToken::new(),
            on_event: Box::new(|_| {}),
        }
    }

    /// Observe this token between turns; cancelling it flushes partial state.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_event_sink(mut self, sink: Box<EventSink>) -> Self {
        self.on_event = sink;
        self
    }

    fn emit(&self, event: Event) {
        (self.on_event)(&event);
    }

    /// Run the full pipeline: evidence preparation, the debate loop, and
    /// artifact emission.
    pub async fn run(&self, input: &RunInput) -> Result<RunOutcome, EngineError> {
        let mut metrics = MetricsAccumulator::new();

        // ---- evidence preparation (input errors fail fast) ----
        let stage = Instant::now();
        let raw_logs = read_input(&input.log_path)?;
        let mut code_files = Vec::with_capacity(input.code_paths.len());
        for path in &input.code_paths {
            code_files.push((path.display().to_string(), read_input(path)?));
        }
        metrics.record_stage("read_inputs", stage.elapsed());

        let stage = Instant::now();
        let entries = logparse::parse(&raw_logs);
        let summary = logparse::summarize(&entries);
        self.emit(Event::LogsParsed {
            total_lines: summary.total_lines,
            error_count: summary.error_count,
            warn_count: summary.warn_count,
        });
        info!(
            total_lines = summary.total_lines,
            error_count = summary.error_count,
            "parsed log file"
        );

        let clusters = cluster::cluster(&entries);
        let chunk = cluster::select_best_chunk(
            &clusters,
            self.config.limits.log_line_cap,
            self.config.limits.log_char_cap,
        );
        let chunk = ContextChunk {
            entries: redact::redact_entries(&chunk.entries),
            ..chunk
        };
        self.emit(Event::ChunkSelected {
            selected: chunk.entries.len(),
            source: match &chunk.source {
                cluster::ChunkSource::Cluster { key, .. } => key.clone(),
                cluster::ChunkSource::Empty => "empty".into(),
            },
            truncated: chunk.truncated,
        });

        let code_snippets = trim_code_files(code_files, self.config.limits.code_char_cap);
        let redacted_entries = redact::redact_entries(&entries);
        metrics.record_stage("prepare_evidence", stage.elapsed());

        let router = ToolRouter::new(self.config.limits.tool_result_char_cap)
            .register(RegisteredTool::GrepSource(GrepSourceTool::new(
                code_snippets.clone(),
            )))
            .register(RegisteredTool::FilterLogs(FilterLogsTool::new(
                redacted_entries,
            )));

        let mut state = ConversationState::new();
        state.push_system(0, initial_context(&summary, &chunk, &code_snippets));

        // ---- debate loop ----
        let stage = Instant::now();
        let mut sm = DebateStateMachine::new();
        let tally = self
            .debate(&router, &mut state, &mut sm, &mut metrics)
            .await?;
        metrics.record_stage("debate", stage.elapsed());

        // ---- artifacts ----
        self.finalize(input, tally, chunk.truncated, state, metrics)
    }

    async fn debate(
        &self,
        router: &ToolRouter,
        state: &mut ConversationState,
        sm: &mut DebateStateMachine,
        metrics: &mut MetricsAccumulator,
    ) -> Result<DebateTally, EngineError> {
        let analyzer_agent = Agent::new(AgentRole::Analyzer, self.client.clone());
        let critic_agent = Agent::new(AgentRole::Critic, self.client.clone());
        let declarations = router.declarations();
        let mut tally = DebateTally::default();

        for round in 1..=self.config.pipeline.max_rounds {
            sm.set_round(round);

            if self.cancel.is_cancelled() {
                tally.cancelled = true;
                sm.terminate("cancelled between turns")?;
                return Ok(tally);
            }

            // -- Analyzer --
            sm.advance(DebateState::Analyzing, None)?;
            let turn = match self
                .analyzer_turn(&analyzer_agent, state, &declarations, round, metrics)
                .await
            {
                Ok(turn) => turn,
                Err(e) => {
                    error!(round, error = %e, "analyzer turn failed");
                    tally.failure = Some(e.to_string());
                    sm.terminate("analyzer failure")?;
                    return Ok(tally);
                }
            };
            state.push_agent(Role::Analyzer, round, turn.raw, Some(turn.completion_tokens));
            self.emit(Event::AgentTurn {
                role: "analyzer",
                round,
                retried: turn.retried,
            });
            let hypothesis = turn.parsed;
            info!(
                round,
                confidence = hypothesis.confidence,
                root_cause = %hypothesis.root_cause,
                "analyzer hypothesis"
            );

            if !hypothesis.tool_calls.is_empty() {
                sm.advance(
                    DebateState::ToolingAnalyzer,
                    Some(&format!("{} tool calls", hypothesis.tool_calls.len())),
                )?;
                self.execute_tools(router, state, round, &hypothesis.tool_calls, metrics);
            }
            tally.hypothesis = Some(hypothesis);

            if self.cancel.is_cancelled() {
                tally.cancelled = true;
                tally.rounds_used = round;
                sm.terminate("cancelled between turns")?;
                return Ok(tally);
            }

            // -- Critic --
            sm.advance(DebateState::Critiquing, None)?;
            let turn = match self
                .critic_turn(&critic_agent, state, &declarations, round, metrics)
                .await
            {
                Ok(turn) => turn,
                Err(e) => {
                    error!(round, error = %e, "critic turn failed");
                    tally.failure = Some(e.to_string());
                    tally.rounds_used = round;
                    sm.terminate("critic failure")?;
                    return Ok(tally);
                }
            };
            state.push_agent(Role::Critic, round, turn.raw, Some(turn.completion_tokens));
            self.emit(Event::AgentTurn {
                role: "critic",
                round,
                retried: turn.retried,
            });
            let verdict = turn.parsed;
            info!(round, verdict = %verdict.verdict, open_issues = verdict.open_issues.len(), "critic verdict");

            if !verdict.tool_calls.is_empty() {
                sm.advance(
                    DebateState::ToolingCritic,
                    Some(&format!("{} tool calls", verdict.tool_calls.len())),
                )?;
                self.execute_tools(router, state, round, &verdict.tool_calls, metrics);
            }

            self.emit(Event::RoundComplete {
                round,
                verdict: verdict.verdict.to_string(),
                open_issues: verdict.open_issues.len(),
            });
            tally.rounds_used = round;

            let clean = verdict.is_clean_confirmation();
            let issues_found = verdict.issues_found.clone();
            let open_issues = verdict.open_issues.clone();
            tally.verdict = Some(verdict);

            if clean && round >= self.config.pipeline.min_rounds {
                sm.terminate(&format!("confirmed at round {round}"))?;
                return Ok(tally);
            }
            if round == self.config.pipeline.max_rounds {
                tally.forced = !clean;
                sm.terminate("round budget exhausted")?;
                return Ok(tally);
            }

            // Carry the critic's findings into the next round.
            let reason = if clean {
                "confirmed before the minimum round count; continuing the challenge"
            } else {
                "verdict revised; address the critic's findings"
            };
            state.push_system(
                round,
                json!({
                    "critic_feedback": {
                        "issues_found": issues_found,
                        "open_issues": open_issues,
                    },
                    "instruction": prompts::round_feedback(&issues_found, &open_issues),
                    "reason": reason,
                }),
            );
        }

        Ok(tally)
    }

    async fn analyzer_turn(
        &self,
        agent: &Agent,
        state: &ConversationState,
        declarations: &[Value],
        round: u32,
        metrics: &mut MetricsAccumulator,
    ) -> Result<Turn<Hypothesis>, EngineError> {
        let view = state.render_view(self.config.limits.tool_result_char_cap);
        let stage = format!("analyzer_round_{round}");

        let response = agent.call(&view, declarations.to_vec(), None).await?;
        metrics.record_llm_call(&stage, response.latency, response.usage);

        match analyzer::parse_response(&response.content, round) {
            Ok((parsed, raw)) => Ok(Turn {
                parsed,
                raw,
                completion_tokens: response.usage.completion,
                retried: false,
            }),
            Err(violation) => {
                warn!(round, %violation, "analyzer response rejected; corrective retry");
                let corrective = prompts::corrective_instruction(&violation.violations);
                let retry = agent
                    .call(&view, declarations.to_vec(), Some(&corrective))
                    .await?;
                metrics.record_llm_call(&format!("{stage}_retry"), retry.latency, retry.usage);
                let (parsed, raw) = analyzer::parse_response(&retry.content, round).map_err(
                    |violation| EngineError::Protocol {
                        role: "analyzer",
                        violations: violation.violations,
                    },
                )?;
                Ok(Turn {
                    parsed,
                    raw,
                    completion_tokens: retry.usage.completion,
                    retried: true,
                })
            }
        }
    }

    async fn critic_turn(
        &self,
        agent: &Agent,
        state: &ConversationState,
        declarations: &[Value],
        round: u32,
        metrics: &mut MetricsAccumulator,
    ) -> Result<Turn<Verdict>, EngineError> {
        let view = state.render_view(self.config.limits.tool_result_char_cap);
        let stage = format!("critic_round_{round}");

        let response = agent.call(&view, declarations.to_vec(), None).await?;
        metrics.record_llm_call(&stage, response.latency, response.usage);

        let mut turn = match critic::parse_response(&response.content) {
            Ok((parsed, raw)) => Turn {
                parsed,
                raw,
                completion_tokens: response.usage.completion,
                retried: false,
            },
            Err(violation) => {
                warn!(round, %violation, "critic response rejected; corrective retry");
                let corrective = prompts::corrective_instruction(&violation.violations);
                let retry = agent
                    .call(&view, declarations.to_vec(), Some(&corrective))
                    .await?;
                metrics.record_llm_call(&format!("{stage}_retry"), retry.latency, retry.usage);
                let (parsed, raw) =
                    critic::parse_response(&retry.content).map_err(|violation| {
                        EngineError::Protocol {
                            role: "critic",
                            violations: violation.violations,
                        }
                    })?;
                Turn {
                    parsed,
                    raw,
                    completion_tokens: retry.usage.completion,
                    retried: true,
                }
            }
        };

        // A confirmed verdict with open issues is never accepted. Spend the
        // corrective retry if it is still available, otherwise downgrade.
        if turn.parsed.verdict == VerdictKind::Confirmed && !turn.parsed.open_issues.is_empty() {
            if !turn.retried {
                warn!(round, "confirmed verdict with open issues; corrective retry");
                let corrective = prompts::corrective_instruction(&[
                    "`verdict` is `confirmed` but `open_issues` is not empty; \
                     resolve the open issues or return `revised`"
                        .into(),
                ]);
                if let Ok(retry) = agent
                    .call(&view, declarations.to_vec(), Some(&corrective))
                    .await
                {
                    metrics.record_llm_call(&format!("{stage}_retry"), retry.latency, retry.usage);
                    if let Ok((parsed, raw)) = critic::parse_response(&retry.content) {
                        turn = Turn {
                            parsed,
                            raw,
                            completion_tokens: retry.usage.completion,
                            retried: true,
                        };
                    }
                }
            }
            if turn.parsed.verdict == VerdictKind::Confirmed && !turn.parsed.open_issues.is_empty()
            {
                warn!(round, "treating confirmed-with-open-issues as revised");
                turn.parsed.verdict = VerdictKind::Revised;
            }
        }
        Ok(turn)
    }

    /// Execute requested tool calls sequentially, in listed order. Failures
    /// are reported back to the agent as tool messages; they never abort the
    /// run.
    fn execute_tools(
        &self,
        router: &ToolRouter,
        state: &mut ConversationState,
        round: u32,
        calls: &[ToolCallRequest],
        metrics: &mut MetricsAccumulator,
    ) {
        for call in calls {
            let outcome = router.invoke(call);
            if !outcome.ok {
                warn!(tool = %outcome.name, result = %outcome.rendered, "tool call failed");
            }
            metrics.record_tool(&outcome.name, outcome.elapsed, outcome.ok, outcome.truncated);
            self.emit(Event::ToolResult {
                tool: outcome.name.clone(),
                round,
                ok: outcome.ok,
                truncated: outcome.truncated,
            });
            state.push_tool(round, &outcome.name, outcome.rendered, outcome.truncated);
        }
    }

    fn finalize(
        &self,
        input: &RunInput,
        tally: DebateTally,
        chunk_truncated: bool,
        state: ConversationState,
        metrics: MetricsAccumulator,
    ) -> Result<RunOutcome, EngineError> {
        let out_dir = PathBuf::from(&self.config.output.dir);
        std::fs::create_dir_all(&out_dir)?;
        let ts = Utc::now().format("%Y%m%d_%H%M%S").to_string();

        let transcript_path = out_dir.join(format!("conversation_{ts}.json"));
        write_json(&transcript_path, &state.to_transcript())?;

        let failed = tally.failure.is_some() || tally.cancelled;
        let analyzer_confidence = tally.hypothesis.as_ref().map(|h| h.confidence).unwrap_or(0.0);
        let critic_confidence = tally
            .verdict
            .as_ref()
            .map(|v| v.confidence_score)
            .unwrap_or(0.0);
        let low_confidence = critic_confidence < self.config.thresholds.min_confidence;
        let critical = critic_confidence < self.config.thresholds.critical_confidence;
        if critical {
            warn!(
                confidence = critic_confidence,
                threshold = self.config.thresholds.critical_confidence,
                "final confidence below the critical threshold"
            );
        }

        let (report, report_path) = match &tally.hypothesis {
            Some(hypothesis) => {
                let body = tally
                    .verdict
                    .as_ref()
                    .map(|v| v.final_report.clone())
                    .unwrap_or_else(|| {
                        "No confirming verdict was produced before the run ended.".into()
                    });
                let report = IncidentReport {
                    title: format!("Incident Analysis - {ts}"),
                    summary: hypothesis.root_cause.clone(),
                    root_cause: hypothesis.root_cause.clone(),
                    evidence: hypothesis.evidence.clone(),
                    fix: hypothesis.fix_suggestion.clone(),
                    impact: "See the report body for impact assessment.".into(),
                    remaining_risks: tally
                        .verdict
                        .as_ref()
                        .map(|v| v.remaining_risks.clone())
                        .unwrap_or_default(),
                    body,
                    rounds_used: tally.rounds_used,
                    confidence: critic_confidence,
                    forced_termination: tally.forced,
                    low_confidence,
                    failed,
                    transcript_path: transcript_path.display().to_string(),
                };
                for problem in report::validate_report(&report) {
                    warn!(%problem, "report validation issue");
                }
                let path = out_dir.join(format!("report_{ts}.md"));
                std::fs::write(&path, report.to_markdown(self.config.output.report_word_cap))?;
                info!(path = %path.display(), "report written");
                (Some(report), Some(path))
            }
            None => {
                warn!("run ended before any hypothesis; no report markdown produced");
                (None, None)
            }
        };

        let run_metrics = metrics.into_run_metrics(
            &self.config.gemini.pricing,
            RunFlags {
                rounds_used: tally.rounds_used,
                analyzer_confidence,
                critic_confidence,
                low_confidence,
                critical_confidence_warning: critical,
                forced_termination: tally.forced,
                failed,
                cancelled: tally.cancelled,
                chunk_truncated,
            },
        );
        let metrics_path = out_dir.join(format!("metrics_{ts}.json"));
        write_json(&metrics_path, &serde_json::to_value(&run_metrics).map_err(json_io)?)?;

        let status = if failed {
            RunStatus::Failed
        } else if tally.forced || low_confidence {
            RunStatus::CompletedWithWarnings
        } else {
            RunStatus::Completed
        };
        self.emit(Event::Completed {
            status,
            rounds: tally.rounds_used,
        });
        info!(
            %status,
            rounds = tally.rounds_used,
            tokens = run_metrics.token_totals.total(),
            log = %input.log_path.display(),
            "run finished"
        );

        Ok(RunOutcome {
            status,
            report,
            report_path,
            metrics: run_metrics,
            metrics_path,
            transcript_path,
        })
    }
}

/// Summary of a tools-only (no-LLM) run.
#[derive(Debug, Serialize)]
pub struct ToolsOnlySummary {
    pub parsed: LogSummary,
    pub total_clusters: usize,
    pub error_clusters: usize,
    pub chunk_entries: usize,
    pub chunk_truncated: bool,
    pub redacted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grep_check: Option<String>,
    pub timings: Vec<StageTiming>,
    pub results_path: String,
}

/// Run parser, clusterer, redactor, and tool router only — no LLM calls.
/// Deterministic: replaying identical inputs produces identical outputs,
/// which is what makes this the regression mode.
pub fn run_tools_only(
    config: &DebateConfig,
    input: &RunInput,
) -> Result<ToolsOnlySummary, EngineError> {
    let mut metrics = MetricsAccumulator::new();

    let stage = Instant::now();
    let raw_logs = read_input(&input.log_path)?;
    let mut code_files = Vec::with_capacity(input.code_paths.len());
    for path in &input.code_paths {
        code_files.push((path.display().to_string(), read_input(path)?));
    }
    metrics.record_stage("read_inputs", stage.elapsed());

    let stage = Instant::now();
    let entries = logparse::parse(&raw_logs);
    let summary = logparse::summarize(&entries);
    let clusters = cluster::cluster(&entries);
    let error_clusters = clusters
        .iter()
        .filter(|c| c.entries.iter().any(|e| e.level.is_error()))
        .count();
    let chunk = cluster::select_best_chunk(
        &clusters,
        config.limits.log_line_cap,
        config.limits.log_char_cap,
    );
    let redacted = redact::redact_entries(&chunk.entries);
    metrics.record_stage("parse_and_cluster", stage.elapsed());

    let stage = Instant::now();
    let grep_check = if code_files.is_empty() {
        None
    } else {
        let router = ToolRouter::new(config.limits.tool_result_char_cap).register(
            RegisteredTool::GrepSource(GrepSourceTool::new(
                code_files
                    .iter()
                    .map(|(name, content)| (name.clone(), redact::redact(content)))
                    .collect(),
            )),
        );
        let outcome = router.invoke(&ToolCallRequest {
            name: "grep_source".into(),
            arguments: json!({"pattern": "error|exception|null"}),
        });
        Some(
            outcome
                .rendered
                .lines()
                .next()
                .unwrap_or_default()
                .to_string(),
        )
    };
    metrics.record_stage("grep_check", stage.elapsed());

    let out_dir = PathBuf::from(&config.output.dir);
    std::fs::create_dir_all(&out_dir)?;
    let results_path = out_dir.join("tools_test_results.json");

    let summary = ToolsOnlySummary {
        parsed: summary,
        total_clusters: clusters.len(),
        error_clusters,
        chunk_entries: redacted.len(),
        chunk_truncated: chunk.truncated,
        redacted: true,
        grep_check,
        timings: metrics
            .into_run_metrics(&config.gemini.pricing, RunFlags::default())
            .stage_timings,
        results_path: results_path.display().to_string(),
    };
    write_json(&results_path, &serde_json::to_value(&summary).map_err(json_io)?)?;
    info!(path = %results_path.display(), "tools-only results written");
    Ok(summary)
}

fn read_input(path: &std::path::Path) -> Result<String, EngineError> {
    std::fs::read_to_string(path)
        .map_err(|e| EngineError::Input(format!("cannot read {}: {e}", path.display())))
}

fn write_json(path: &std::path::Path, value: &Value) -> Result<(), EngineError> {
    let text = serde_json::to_string_pretty(value).map_err(json_io)?;
    std::fs::write(path, text)?;
    Ok(())
}

fn json_io(e: serde_json::Error) -> EngineError {
    EngineError::Io(std::io::Error::other(e))
}

/// Trim code files to the total character budget, redacting each snippet.
/// Files past the budget are dropped with a warning, matching the cap's
/// contract: code evidence never exceeds `code_char_cap` characters.
fn trim_code_files(files: Vec<(String, String)>, char_cap: usize) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(files.len());
    let mut used = 0usize;
    for (name, content) in files {
        if used >= char_cap {
            warn!(file = %name, "code character budget exhausted; snippet skipped");
            continue;
        }
        let remaining = char_cap - used;
        let redacted = redact::redact(&content);
        let trimmed = if redacted.len() > remaining {
            warn!(file = %name, "code snippet truncated to fit the character budget");
            let mut cut = remaining;
            while cut > 0 && !redacted.is_char_boundary(cut) {
                cut -= 1;
            }
            redacted[..cut].to_string()
        } else {
            redacted
        };
        used += trimmed.len();
        out.push((name, trimmed));
    }
    out
}

/// The system context handed to the first Analyzer turn: entry counts,
/// sample errors, chunk metadata, and the trimmed code snippets.
fn initial_context(
    summary: &LogSummary,
    chunk: &ContextChunk,
    code_snippets: &[(String, String)],
) -> Value {
    let recent_errors: Vec<Value> = chunk
        .entries
        .iter()
        .filter(|e| e.level.is_error())
        .take(5)
        .map(|e: &LogEntry| {
            json!({
                "timestamp": e.timestamp.map(|t| t.to_rfc3339()),
                "message": e.message.chars().take(200).collect::<String>(),
            })
        })
        .collect();

    let mut log_summary = json!({
        "total_lines": summary.total_lines,
        "error_count": summary.error_count,
        "warn_count": summary.warn_count,
        "selected_chunk": {
            "entries": chunk.entries.len(),
            "source": chunk.source,
            "truncated": chunk.truncated,
            "dropped_entries": chunk.dropped_entries,
        },
        "recent_errors": recent_errors,
    });
    if chunk.is_empty() {
        log_summary["note"] =
            json!("no structured log evidence exists; reason from the code alone");
    }

    let code: serde_json::Map<String, Value> = code_snippets
        .iter()
        .map(|(name, content)| (name.clone(), Value::String(content.clone())))
        .collect();

    json!({
        "task": "production incident root-cause analysis",
        "log_summary": log_summary,
        "log_excerpt": chunk.render(),
        "code_snippets": code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_respects_total_budget() {
        let files = vec![
            ("a.java".to_string(), "x".repeat(60)),
            ("b.java".to_string(), "y".repeat(60)),
        ];
        let trimmed = trim_code_files(files, 100);
        let total: usize = trimmed.iter().map(|(_, c)| c.len()).sum();
        assert_eq!(total, 100);
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed[1].1.len(), 40);
    }

    #[test]
    fn trim_drops_files_past_budget() {
        let files = vec![
            ("a.java".to_string(), "x".repeat(100)),
            ("b.java".to_string(), "y".repeat(10)),
        ];
        let trimmed = trim_code_files(files, 100);
        assert_eq!(trimmed.len(), 1);
    }

    #[test]
    fn trim_redacts_snippets() {
        let files = vec![("cfg.java".to_string(), "password=hunter2".to_string())];
        let trimmed = trim_code_files(files, 1_000);
        assert!(!trimmed[0].1.contains("hunter2"));
    }

    #[test]
    fn initial_context_flags_missing_evidence() {
        let summary = LogSummary {
            total_lines: 0,
            error_count: 0,
            warn_count: 0,
        };
        let chunk = cluster::select_best_chunk(&[], 100, 10_000);
        let context = initial_context(&summary, &chunk, &[]);
        assert!(context["log_summary"]["note"]
            .as_str()
            .unwrap()
            .contains("no structured log evidence"));
    }

    #[test]
    fn initial_context_includes_sample_errors() {
        let entries = logparse::parse(
            "2024-03-01T10:00:00Z ERROR pool exhausted\n2024-03-01T10:00:01Z INFO ok",
        );
        let summary = logparse::summarize(&entries);
        let clusters = cluster::cluster(&entries);
        let chunk = cluster::select_best_chunk(&clusters, 100, 10_000);
        let context = initial_context(&summary, &chunk, &[]);
        let errors = context["log_summary"]["recent_errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0]["message"].as_str().unwrap().contains("pool"));
    }
}
