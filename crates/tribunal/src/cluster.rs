//! Log clustering and context-chunk selection.
//!
//! Entries are grouped by request id when one is present, otherwise by a
//! normalized error-message signature (embedded identifiers scrubbed).
//! Scoring is a pure function of the entries — no wall-clock recency — so
//! the same input always selects the same chunk.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::logparse::{LogEntry, LogLevel};

/// Keywords that mark a cluster as diagnostically interesting.
const SIGNAL_KEYWORDS: &[&str] = &[
    "exception",
    "timeout",
    "refused",
    "unable",
    "failed",
    "panic",
    "leak",
    "out of memory",
    "deadlock",
    "overflow",
];

/// How a cluster was keyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ClusterKey {
    RequestId(String),
    /// Short blake3 hash of the normalized message template.
    Signature {
        hash: String,
        template: String,
    },
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestId(id) => write!(f, "request:{id}"),
            Self::Signature { hash, .. } => write!(f, "signature:{hash}"),
        }
    }
}

/// A scored group of related entries, recomputed per run.
#[derive(Debug, Clone, Serialize)]
pub struct LogCluster {
    pub key: ClusterKey,
    pub entries: Vec<LogEntry>,
    pub score: i64,
    pub first_timestamp: Option<DateTime<Utc>>,
}

static UUID_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}")
        .expect("uuid pattern must compile")
});
static HEX_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-f0-9]{8,}\b").expect("hex pattern must compile"));
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digit pattern must compile"));
static WS_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws pattern must compile"));

/// Collapse a message into a stable template: identifiers scrubbed,
/// whitespace collapsed, lowercased, capped in length.
pub fn normalize_signature(message: &str) -> String {
    let text = message.to_lowercase();
    let text = UUID_RUN.replace_all(&text, "#");
    let text = HEX_RUN.replace_all(&text, "#");
    let text = DIGIT_RUN.replace_all(&text, "#");
    let text = WS_RUN.replace_all(&text, " ");
    let mut template: String = text.trim().to_string();
    if template.len() > 80 {
        template.truncate(80);
    }
    template
}

fn signature_key(message: &str) -> ClusterKey {
    let template = normalize_signature(message);
    let hash = blake3::hash(template.as_bytes()).to_hex().to_string();
    ClusterKey::Signature {
        hash: hash[..12].to_string(),
        template,
    }
}

fn score_entries(entries: &[LogEntry]) -> i64 {
    let errors = entries.iter().filter(|e| e.level.is_error()).count() as i64;
    let warns = entries
        .iter()
        .filter(|e| e.level == LogLevel::Warn)
        .count() as i64;
    let keyword_hits = entries
        .iter()
        .filter(|e| {
            let lower = e.message.to_lowercase();
            SIGNAL_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .count() as i64;
    3 * errors + warns + 2 * keyword_hits.min(10) + (entries.len() as i64).min(10)
}

/// Group entries into scored clusters, best first. Ties break by earliest
/// first timestamp (timestampless clusters sort last), then by key.
pub fn cluster(entries: &[LogEntry]) -> Vec<LogCluster> {
    // BTreeMap keeps grouping order independent of hash state.
    let mut by_request: BTreeMap<String, Vec<LogEntry>> = BTreeMap::new();
    let mut by_signature: BTreeMap<String, (ClusterKey, Vec<LogEntry>)> = BTreeMap::new();

    for entry in entries {
        if let Some(id) = &entry.request_id {
            by_request.entry(id.clone()).or_default().push(entry.clone());
        } else {
            let key = signature_key(&entry.message);
            let slot_key = key.to_string();
            by_signature
                .entry(slot_key)
                .or_insert_with(|| (key, Vec::new()))
                .1
                .push(entry.clone());
        }
    }

    let mut clusters: Vec<LogCluster> = Vec::new();
    for (id, group) in by_request {
        let first_timestamp = group.iter().filter_map(|e| e.timestamp).min();
        clusters.push(LogCluster {
            key: ClusterKey::RequestId(id),
            score: score_entries(&group),
            entries: group,
            first_timestamp,
        });
    }
    for (_, (key, group)) in by_signature {
        let first_timestamp = group.iter().filter_map(|e| e.timestamp).min();
        clusters.push(LogCluster {
            key,
            score: score_entries(&group),
            entries: group,
            first_timestamp,
        });
    }

    clusters.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| match (a.first_timestamp, b.first_timestamp) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.key.to_string().cmp(&b.key.to_string()))
    });
    clusters
}

/// Where a chunk's entries came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum ChunkSource {
    /// Selected from one or more scored clusters; `key` names the best one.
    Cluster { key: String, total_clusters: usize },
    /// No entries at all — the agents are told no structured evidence exists.
    Empty,
}

/// The bounded evidence handed to the first Analyzer turn.
#[derive(Debug, Clone, Serialize)]
pub struct ContextChunk {
    pub entries: Vec<LogEntry>,
    pub source: ChunkSource,
    /// True when the best cluster had to be cut to fit the budget.
    pub truncated: bool,
    /// Entries dropped from the oldest end of the best cluster.
    pub dropped_entries: usize,
}

impl ContextChunk {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize entries for prompt context: `TIMESTAMP [LEVEL] message`.
    pub fn render(&self) -> String {
        render_entries(&self.entries)
    }
}

fn render_entries(entries: &[LogEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            let ts = e
                .timestamp
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".into());
            format!("{ts} [{}] {}", e.level.as_str(), e.message)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Greedily select the highest-scoring cluster(s) that fit `line_cap` entries
/// and `char_budget` serialized characters. An oversized best cluster is
/// truncated oldest-first with the cut recorded in the chunk metadata.
pub fn select_best_chunk(
    clusters: &[LogCluster],
    line_cap: usize,
    char_budget: usize,
) -> ContextChunk {
    let Some(best) = clusters.first() else {
        return ContextChunk {
            entries: Vec::new(),
            source: ChunkSource::Empty,
            truncated: false,
            dropped_entries: 0,
        };
    };

    let fits = |entries: &[LogEntry]| {
        entries.len() <= line_cap && render_entries(entries).len() <= char_budget
    };

    // Best cluster first; drop oldest entries until it fits.
    let mut selected: Vec<LogEntry> = best.entries.clone();
    let mut dropped = 0usize;
    while !selected.is_empty() && !fits(&selected) {
        selected.remove(0);
        dropped += 1;
    }
    let truncated = dropped > 0;

    // Append further whole clusters while they still fit.
    if !truncated {
        for cluster in &clusters[1..] {
            let mut candidate = selected.clone();
            candidate.extend(cluster.entries.iter().cloned());
            if fits(&candidate) {
                selected = candidate;
            } else {
                break;
            }
        }
    }

    ContextChunk {
        entries: selected,
        source: ChunkSource::Cluster {
            key: best.key.to_string(),
            total_clusters: clusters.len(),
        },
        truncated,
        dropped_entries: dropped,
    }
}
