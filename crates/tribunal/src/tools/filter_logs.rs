//! Deterministic queries over the run's parsed log entries.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{deserialize_args, ToolError};
use crate::logparse::{LogEntry, LogLevel};

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FilterLogsArgs {
    /// Keep only entries at this level (DEBUG/INFO/WARN/ERROR/FATAL/UNKNOWN).
    pub level: Option<String>,
    /// Keep only entries whose message contains this text (case-insensitive).
    pub contains: Option<String>,
    /// Keep only entries with this request id.
    pub request_id: Option<String>,
    /// Maximum entries to return (default 50).
    pub limit: Option<usize>,
}

/// Query the already-parsed (and redacted) entries of this run. Pure
/// function of the run inputs — no filesystem, no re-parsing.
pub struct FilterLogsTool {
    entries: Vec<LogEntry>,
}

impl FilterLogsTool {
    pub const NAME: &'static str = "filter_logs";

    pub fn new(entries: Vec<LogEntry>) -> Self {
        Self { entries }
    }

    pub fn declaration() -> Value {
        serde_json::json!({
            "name": Self::NAME,
            "description": "Filter the incident's parsed log entries by level, substring, \
                            or request id. Returns matching lines in log order.",
            "parameters": {
                "type": "object",
                "properties": {
                    "level": {
                        "type": "string",
                        "description": "Keep only entries at this level (e.g. ERROR)"
                    },
                    "contains": {
                        "type": "string",
                        "description": "Keep only entries containing this text (case-insensitive)"
                    },
                    "request_id": {
                        "type": "string",
                        "description": "Keep only entries with this request id"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Maximum entries to return (default 50)"
                    }
                }
            }
        })
    }

    pub fn run(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let args: FilterLogsArgs = deserialize_args(args)?;
        let limit = args.limit.unwrap_or(DEFAULT_LIMIT);

        let level = args.level.as_deref().map(LogLevel::from_token);
        if let (Some(requested), Some(LogLevel::Unknown)) = (args.level.as_deref(), level) {
            if !requested.eq_ignore_ascii_case("unknown") {
                return Err(ToolError::InvalidArguments(format!(
                    "unknown log level `{requested}`"
                )));
            }
        }
        let needle = args.contains.as_deref().map(str::to_lowercase);

        let matched: Vec<&LogEntry> = self
            .entries
            .iter()
            .filter(|e| level.map_or(true, |l| e.level == l))
            .filter(|e| {
                needle
                    .as_deref()
                    .map_or(true, |n| e.message.to_lowercase().contains(n))
            })
            .filter(|e| {
                args.request_id
                    .as_deref()
                    .map_or(true, |id| e.request_id.as_deref() == Some(id))
            })
            .collect();

        let total = matched.len();
        let mut out = format!("{total} of {} entries matched\n", self.entries.len());
        for entry in matched.into_iter().take(limit) {
            let ts = entry
                .timestamp
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".into());
            let req = entry
                .request_id
                .as_deref()
                .map(|id| format!(" ({id})"))
                .unwrap_or_default();
            out.push_str(&format!(
                "{ts} [{}]{req} {}\n",
                entry.level.as_str(),
                entry.message
            ));
        }
        if total > limit {
            out.push_str(&format!("... {} more not shown\n", total - limit));
        }
        Ok(out)
    }
}
