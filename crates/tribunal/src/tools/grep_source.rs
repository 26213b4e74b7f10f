//! Regex search over the run's source snippets.

use regex::RegexBuilder;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{deserialize_args, ToolError};

const DEFAULT_MAX_RESULTS: usize = 20;
/// Context lines shown on each side of a match.
const CONTEXT_LINES: usize = 2;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GrepSourceArgs {
    /// The regex pattern to search for (case-insensitive).
    pub pattern: String,
    /// Restrict the search to these file names (default: all provided files).
    pub files: Option<Vec<String>>,
    /// Maximum number of matches to return (default 20).
    pub max_results: Option<usize>,
}

/// Search the code files provided to this run. The tool never touches the
/// filesystem — contents are preloaded (and already redacted), so a call is
/// a pure function of the run inputs.
pub struct GrepSourceTool {
    files: Vec<(String, String)>,
}

impl GrepSourceTool {
    pub const NAME: &'static str = "grep_source";

    pub fn new(files: Vec<(String, String)>) -> Self {
        Self { files }
    }

    pub fn declaration() -> Value {
        serde_json::json!({
            "name": Self::NAME,
            "description": "Search the incident's source files for a regex pattern. \
                            Returns matching lines as `file:line` with surrounding context.",
            "parameters": {
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "The regex pattern to search for (case-insensitive)"
                    },
                    "files": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Restrict the search to these file names"
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of matches to return (default 20)"
                    }
                },
                "required": ["pattern"]
            }
        })
    }

    pub fn run(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let args: GrepSourceArgs = deserialize_args(args)?;
        let max_results = args.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

        let pattern = RegexBuilder::new(&args.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ToolError::InvalidPattern(e.to_string()))?;

        let wanted = |name: &str| {
            args.files
                .as_ref()
                .map(|filter| filter.iter().any(|f| name.ends_with(f.as_str())))
                .unwrap_or(true)
        };

        let mut sections: Vec<String> = Vec::new();
        let mut total_matches = 0usize;

        if let Some(filter) = &args.files {
            for requested in filter {
                if !self.files.iter().any(|(name, _)| name.ends_with(requested.as_str())) {
                    sections.push(format!("{requested}: file not provided to this run"));
                }
            }
        }

        'files: for (name, content) in &self.files {
            if !wanted(name) {
                continue;
            }
            let lines: Vec<&str> = content.lines().collect();
            for (idx, line) in lines.iter().enumerate() {
                if !pattern.is_match(line) {
                    continue;
                }
                total_matches += 1;
                let start = idx.saturating_sub(CONTEXT_LINES);
                let end = (idx + CONTEXT_LINES + 1).min(lines.len());
                let mut block = vec![format!("{name}:{}", idx + 1)];
                for ctx in start..end {
                    let marker = if ctx == idx { ">>>" } else { "   " };
                    block.push(format!("{:4} {marker} {}", ctx + 1, lines[ctx]));
                }
                sections.push(block.join("\n"));
                if total_matches >= max_results {
                    break 'files;
                }
            }
        }

        if total_matches == 0 && sections.is_empty() {
            return Ok("No matches found".into());
        }
        let mut out = format!("{total_matches} match(es)\n");
        out.push_str(&sections.join("\n\n"));
        Ok(out)
    }
}
