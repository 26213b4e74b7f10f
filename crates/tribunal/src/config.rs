//! Runtime configuration for a debate run.
//!
//! Loaded from a TOML file; every table has a `Default` so a missing file or
//! a partial file still yields a usable configuration. The Gemini API key is
//! never stored in the file — only the name of the environment variable that
//! holds it.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Values in the TOML file
//! 2. Built-in defaults

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Which Gemini transport to use. There is no official Rust SDK, so `sdk`
/// is accepted for compatibility and aliased onto the REST transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sdk,
    Rest,
}

/// Token pricing used for the cost estimate in the metrics artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub input_per_1k_tokens: f64,
    pub output_per_1k_tokens: f64,
    pub currency: String,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            input_per_1k_tokens: 0.00015,
            output_per_1k_tokens: 0.0006,
            currency: "USD".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub backend: Backend,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Per-request timeout. No LLM call may block past this.
    pub request_timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub pricing: PricingConfig,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Rest,
            model: "gemini-2.0-flash".into(),
            temperature: 0.2,
            max_tokens: 4096,
            request_timeout_secs: 60,
            api_key_env: "GEMINI_API_KEY".into(),
            pricing: PricingConfig::default(),
        }
    }
}

impl GeminiConfig {
    /// Resolve the API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> Result<String, EngineError> {
        std::env::var(&self.api_key_env).map_err(|_| {
            EngineError::Configuration(format!(
                "missing environment variable `{}`",
                self.api_key_env
            ))
        })
    }
}

/// Retry policy for the LLM transport (429 / 5xx / network failures).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 2000,
        }
    }
}

/// Round bounds for the Analyzer ↔ Critic loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// A confirmed verdict before this round does not terminate the run.
    pub min_rounds: u32,
    /// Hard upper bound on Analyzer/Critic pairs.
    pub max_rounds: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_rounds: 2,
            max_rounds: 3,
        }
    }
}

/// Size caps applied before anything reaches the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum log entries in the selected context chunk.
    pub log_line_cap: usize,
    /// Character budget for the serialized context chunk.
    pub log_char_cap: usize,
    /// Total character budget across all code snippets.
    pub code_char_cap: usize,
    /// Character cap on a single tool result inside the prompt view.
    pub tool_result_char_cap: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            log_line_cap: 120,
            log_char_cap: 16_000,
            code_char_cap: 8_000,
            tool_result_char_cap: 1_500,
        }
    }
}

/// Confidence gates applied to the final verdict. Neither blocks report
/// emission; they only annotate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Below this the report is flagged for human review.
    pub min_confidence: f64,
    /// Below this an additional warning is recorded in run metrics.
    pub critical_confidence: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            critical_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for report / metrics / transcript artifacts.
    pub dir: String,
    /// Word cap applied when rendering the report markdown.
    pub report_word_cap: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "reports".into(),
            report_word_cap: 1_000,
        }
    }
}

/// Top-level configuration, read-only after load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    pub gemini: GeminiConfig,
    pub retry: RetryConfig,
    pub pipeline: PipelineConfig,
    pub limits: LimitsConfig,
    pub thresholds: ThresholdConfig,
    pub output: OutputConfig,
}

impl DebateConfig {
    /// Load from a TOML file. A missing path yields the defaults; a present
    /// but malformed file is a configuration error.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| {
            EngineError::Configuration(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.pipeline.max_rounds == 0 {
            return Err(EngineError::Configuration(
                "pipeline.max_rounds must be at least 1".into(),
            ));
        }
        if self.pipeline.min_rounds > self.pipeline.max_rounds {
            return Err(EngineError::Configuration(format!(
                "pipeline.min_rounds ({}) exceeds pipeline.max_rounds ({})",
                self.pipeline.min_rounds, self.pipeline.max_rounds
            )));
        }
        for (name, value) in [
            ("thresholds.min_confidence", self.thresholds.min_confidence),
            (
                "thresholds.critical_confidence",
                self.thresholds.critical_confidence,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Configuration(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}
