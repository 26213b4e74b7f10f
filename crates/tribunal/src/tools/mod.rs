//! Deterministic evidence tools and the router that dispatches to them.
//!
//! The registry is closed: one variant per known tool plus an unknown-tool
//! error, no reflection. Handlers are synchronous and deterministic — the
//! same call against the same run inputs renders the same result — which is
//! what makes tools-only regression runs replayable.
//!
//! Argument validation happens before execution: required fields are checked
//! against each tool's schemars-derived schema, and a violation is returned
//! as a `ToolError` naming the offending field. Nothing in this module
//! panics on agent-supplied input.

pub mod filter_logs;
pub mod grep_source;

use std::time::{Duration, Instant};

use schemars::schema::RootSchema;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::contracts::ToolCallRequest;
use filter_logs::FilterLogsTool;
use grep_source::GrepSourceTool;

/// Errors surfaced to the requesting agent as a tool message.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),

    #[error("invalid arguments: missing required field `{field}`")]
    MissingField { field: String },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

/// Result of one routed call, ready to append as a tool message.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub name: String,
    /// Rendered result text — the error description when `ok` is false.
    pub rendered: String,
    pub ok: bool,
    pub truncated: bool,
    pub elapsed: Duration,
}

/// A registered tool. Adding a tool means adding a variant here.
pub enum RegisteredTool {
    GrepSource(GrepSourceTool),
    FilterLogs(FilterLogsTool),
}

impl RegisteredTool {
    fn name(&self) -> &'static str {
        match self {
            Self::GrepSource(_) => GrepSourceTool::NAME,
            Self::FilterLogs(_) => FilterLogsTool::NAME,
        }
    }

    fn schema(&self) -> RootSchema {
        match self {
            Self::GrepSource(_) => schemars::schema_for!(grep_source::GrepSourceArgs),
            Self::FilterLogs(_) => schemars::schema_for!(filter_logs::FilterLogsArgs),
        }
    }

    fn declaration(&self) -> Value {
        match self {
            Self::GrepSource(_) => GrepSourceTool::declaration(),
            Self::FilterLogs(_) => FilterLogsTool::declaration(),
        }
    }

    fn run(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        match self {
            Self::GrepSource(tool) => tool.run(args),
            Self::FilterLogs(tool) => tool.run(args),
        }
    }
}

/// Maps tool names to handlers; owned by one run.
pub struct ToolRouter {
    tools: Vec<RegisteredTool>,
    result_char_cap: usize,
}

impl ToolRouter {
    pub fn new(result_char_cap: usize) -> Self {
        Self {
            tools: Vec::new(),
            result_char_cap,
        }
    }

    pub fn register(mut self, tool: RegisteredTool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Function declarations for the model's tool-calling request.
    pub fn declarations(&self) -> Vec<Value> {
        self.tools.iter().map(RegisteredTool::declaration).collect()
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.iter().map(RegisteredTool::name).collect()
    }

    /// Validate and execute a tool call. Never raises to the caller: every
    /// failure becomes a `ToolOutcome` with `ok = false` so the debate can
    /// continue.
    pub fn invoke(&self, call: &ToolCallRequest) -> ToolOutcome {
        let started = Instant::now();
        debug!(tool = %call.name, "dispatching tool call");

        let result = self.dispatch(call);
        let elapsed = started.elapsed();
        match result {
            Ok(rendered) => {
                let (rendered, truncated) = truncate_result(rendered, self.result_char_cap);
                ToolOutcome {
                    name: call.name.clone(),
                    rendered,
                    ok: true,
                    truncated,
                    elapsed,
                }
            }
            Err(e) => ToolOutcome {
                name: call.name.clone(),
                rendered: format!("tool error: {e}"),
                ok: false,
                truncated: false,
                elapsed,
            },
        }
    }

    fn dispatch(&self, call: &ToolCallRequest) -> Result<String, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        let args = coerce_arguments(&call.arguments)?;
        for field in required_fields(&tool.schema()) {
            if !args.contains_key(&field) {
                return Err(ToolError::MissingField { field });
            }
        }
        tool.run(&args)
    }
}

/// Accept an object or null (no arguments); anything else is a violation.
fn coerce_arguments(arguments: &Value) -> Result<Map<String, Value>, ToolError> {
    match arguments {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        other => Err(ToolError::InvalidArguments(format!(
            "arguments must be an object, got {other}"
        ))),
    }
}

fn required_fields(schema: &RootSchema) -> Vec<String> {
    schema
        .schema
        .object
        .as_ref()
        .map(|o| o.required.iter().cloned().collect())
        .unwrap_or_default()
}

/// Helper for typed argument extraction shared by the tools.
pub(crate) fn deserialize_args<T: serde::de::DeserializeOwned>(
    args: &Map<String, Value>,
) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args.clone()))
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn truncate_result(mut text: String, cap: usize) -> (String, bool) {
    if text.len() <= cap {
        return (text, false);
    }
    let mut cut = cap;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("... (truncated)");
    (text, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logparse::parse;
    use serde_json::json;

    fn router() -> ToolRouter {
        let entries = parse("2024-03-01T10:00:00Z ERROR pool exhausted\nINFO all good");
        ToolRouter::new(200)
            .register(RegisteredTool::GrepSource(GrepSourceTool::new(vec![(
                "src/Service.java".into(),
                "conn = pool.acquire();\nreturn conn;".into(),
            )])))
            .register(RegisteredTool::FilterLogs(FilterLogsTool::new(entries)))
    }

    fn call(name: &str, args: Value) -> ToolCallRequest {
        ToolCallRequest {
            name: name.into(),
            arguments: args,
        }
    }

    #[test]
    fn unknown_tool_is_an_error_outcome_not_a_panic() {
        let outcome = router().invoke(&call("launch_missiles", json!({})));
        assert!(!outcome.ok);
        assert!(outcome.rendered.contains("unknown tool"));
    }

    #[test]
    fn missing_required_field_names_the_field() {
        let outcome = router().invoke(&call("grep_source", json!({})));
        assert!(!outcome.ok);
        assert!(outcome.rendered.contains("missing required field `pattern`"));
    }

    #[test]
    fn non_object_arguments_rejected() {
        let outcome = router().invoke(&call("grep_source", json!("pattern")));
        assert!(!outcome.ok);
        assert!(outcome.rendered.contains("must be an object"));
    }

    #[test]
    fn null_arguments_allowed_for_optional_only_tools() {
        let outcome = router().invoke(&call("filter_logs", Value::Null));
        assert!(outcome.ok, "{}", outcome.rendered);
    }

    #[test]
    fn successful_call_renders_result() {
        let outcome = router().invoke(&call("grep_source", json!({"pattern": "acquire"})));
        assert!(outcome.ok);
        assert!(outcome.rendered.contains("Service.java"));
    }

    #[test]
    fn oversized_results_truncated_with_flag() {
        let entries = parse(
            &(0..100)
                .map(|i| format!("2024-03-01T10:00:00Z ERROR failure number {i}"))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        let router = ToolRouter::new(150)
            .register(RegisteredTool::FilterLogs(FilterLogsTool::new(entries)));
        let outcome = router.invoke(&call("filter_logs", json!({"level": "ERROR"})));
        assert!(outcome.ok);
        assert!(outcome.truncated);
        assert!(outcome.rendered.ends_with("... (truncated)"));
    }

    #[test]
    fn replay_is_deterministic() {
        let router = router();
        let request = call("grep_source", json!({"pattern": "pool", "max_results": 5}));
        let a = router.invoke(&request);
        let b = router.invoke(&request);
        assert_eq!(a.rendered, b.rendered);
        assert_eq!(a.ok, b.ok);
    }

    #[test]
    fn declarations_cover_all_registered_tools() {
        let decls = router().declarations();
        assert_eq!(decls.len(), 2);
        let names: Vec<&str> = decls
            .iter()
            .filter_map(|d| d.get("name").and_then(Value::as_str))
            .collect();
        assert!(names.contains(&"grep_source"));
        assert!(names.contains(&"filter_logs"));
        for decl in &decls {
            assert_eq!(decl["parameters"]["type"], "object");
        }
    }
}
