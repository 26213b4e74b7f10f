//! Run metrics: stage timings, per-call token counts, and the cost estimate.
//!
//! The accumulator only ever observes the run — it never mutates
//! conversation content. Its summary is serialized as the metrics artifact
//! at report time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PricingConfig;

/// Prompt/completion token counts for one or more LLM calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt += rhs.prompt;
        self.completion += rhs.completion;
    }
}

/// One LLM call, attributed to a pipeline stage like `analyzer_round_2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMetric {
    pub stage: String,
    pub latency_ms: u64,
    pub usage: TokenUsage,
}

/// One tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetric {
    pub tool: String,
    pub elapsed_ms: u64,
    pub ok: bool,
    pub truncated: bool,
}

/// A named pipeline stage duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub elapsed_ms: u64,
}

/// Cost = Σ tokens × configured price per unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEstimate {
    pub amount: f64,
    pub currency: String,
}

/// Accumulates timings and token counts as the run progresses.
#[derive(Debug, Default)]
pub struct MetricsAccumulator {
    calls: Vec<CallMetric>,
    tools: Vec<ToolMetric>,
    stages: Vec<StageTiming>,
    totals: TokenUsage,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_llm_call(&mut self, stage: &str, latency: Duration, usage: TokenUsage) {
        self.calls.push(CallMetric {
            stage: stage.to_string(),
            latency_ms: latency.as_millis() as u64,
            usage,
        });
        self.totals += usage;
    }

    pub fn record_tool(&mut self, tool: &str, elapsed: Duration, ok: bool, truncated: bool) {
        self.tools.push(ToolMetric {
            tool: tool.to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
            ok,
            truncated,
        });
    }

    pub fn record_stage(&mut self, stage: &str, elapsed: Duration) {
        self.stages.push(StageTiming {
            stage: stage.to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }

    pub fn totals(&self) -> TokenUsage {
        self.totals
    }

    pub fn llm_call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn estimate_cost(&self, pricing: &PricingConfig) -> CostEstimate {
        let amount = (self.totals.prompt as f64 / 1000.0) * pricing.input_per_1k_tokens
            + (self.totals.completion as f64 / 1000.0) * pricing.output_per_1k_tokens;
        CostEstimate {
            amount: (amount * 10_000.0).round() / 10_000.0,
            currency: pricing.currency.clone(),
        }
    }

    /// Freeze the accumulator into the serializable metrics artifact.
    pub fn into_run_metrics(self, pricing: &PricingConfig, flags: RunFlags) -> RunMetrics {
        let estimated_cost = self.estimate_cost(pricing);
        let warning = if flags.critical_confidence_warning {
            Some(format!(
                "critical confidence: final score {:.2} is below the critical threshold",
                flags.critic_confidence
            ))
        } else {
            None
        };
        RunMetrics {
            rounds_used: flags.rounds_used,
            calls: self.calls,
            tools: self.tools,
            stage_timings: self.stages,
            token_totals: self.totals,
            estimated_cost,
            analyzer_confidence: flags.analyzer_confidence,
            critic_confidence: flags.critic_confidence,
            low_confidence: flags.low_confidence,
            critical_confidence_warning: flags.critical_confidence_warning,
            forced_termination: flags.forced_termination,
            failed: flags.failed,
            cancelled: flags.cancelled,
            chunk_truncated: flags.chunk_truncated,
            warning,
        }
    }
}

/// Terminal flags folded into the metrics artifact.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFlags {
    pub rounds_used: u32,
    pub analyzer_confidence: f64,
    pub critic_confidence: f64,
    pub low_confidence: bool,
    pub critical_confidence_warning: bool,
    pub forced_termination: bool,
    pub failed: bool,
    pub cancelled: bool,
    pub chunk_truncated: bool,
}

/// The metrics artifact, serialized once at report time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetrics {
    pub rounds_used: u32,
    pub calls: Vec<CallMetric>,
    pub tools: Vec<ToolMetric>,
    pub stage_timings: Vec<StageTiming>,
    pub token_totals: TokenUsage,
    pub estimated_cost: CostEstimate,
    pub analyzer_confidence: f64,
    pub critic_confidence: f64,
    pub low_confidence: bool,
    pub critical_confidence_warning: bool,
    pub forced_termination: bool,
    pub failed: bool,
    pub cancelled: bool,
    pub chunk_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_totals_accumulate() {
        let mut acc = MetricsAccumulator::new();
        acc.record_llm_call(
            "analyzer_round_1",
            Duration::from_millis(1200),
            TokenUsage {
                prompt: 1000,
                completion: 200,
            },
        );
        acc.record_llm_call(
            "critic_round_1",
            Duration::from_millis(900),
            TokenUsage {
                prompt: 1500,
                completion: 300,
            },
        );
        assert_eq!(acc.totals().prompt, 2500);
        assert_eq!(acc.totals().completion, 500);
        assert_eq!(acc.totals().total(), 3000);
        assert_eq!(acc.llm_call_count(), 2);
    }

    #[test]
    fn cost_estimate_uses_both_rates() {
        let mut acc = MetricsAccumulator::new();
        acc.record_llm_call(
            "analyzer_round_1",
            Duration::from_millis(100),
            TokenUsage {
                prompt: 10_000,
                completion: 2_000,
            },
        );
        let pricing = PricingConfig {
            input_per_1k_tokens: 0.1,
            output_per_1k_tokens: 0.4,
            currency: "USD".into(),
        };
        let cost = acc.estimate_cost(&pricing);
        // 10 * 0.1 + 2 * 0.4 = 1.8
        assert!((cost.amount - 1.8).abs() < 1e-9);
        assert_eq!(cost.currency, "USD");
    }

    #[test]
    fn critical_warning_surfaces_in_metrics() {
        let acc = MetricsAccumulator::new();
        let metrics = acc.into_run_metrics(
            &PricingConfig::default(),
            RunFlags {
                rounds_used: 1,
                critic_confidence: 0.4,
                low_confidence: true,
                critical_confidence_warning: true,
                ..RunFlags::default()
            },
        );
        assert!(metrics.warning.is_some());
        assert!(metrics.low_confidence);
    }

    #[test]
    fn no_warning_when_confidence_acceptable() {
        let acc = MetricsAccumulator::new();
        let metrics = acc.into_run_metrics(
            &PricingConfig::default(),
            RunFlags {
                rounds_used: 2,
                critic_confidence: 0.9,
                ..RunFlags::default()
            },
        );
        assert!(metrics.warning.is_none());
        assert!(!metrics.failed);
    }
}
