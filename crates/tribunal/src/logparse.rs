//! Structured log parsing.
//!
//! Line-oriented: blank lines are skipped (documented policy), every other
//! input line becomes exactly one [`LogEntry`]. A line with no recognizable
//! level token is kept at [`LogLevel::Unknown`] with its raw text preserved —
//! nothing is dropped silently, and re-parsing the same text yields the same
//! entries (no wall-clock fallbacks).

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Severity extracted from a log line. `TRACE` maps to `Debug`, `WARNING`
/// to `Warn`; a line with no level token is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Unknown,
}

impl LogLevel {
    pub fn from_token(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "TRACE" | "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "WARN" | "WARNING" => Self::Warn,
            "ERROR" => Self::Error,
            "FATAL" => Self::Fatal,
            _ => Self::Unknown,
        }
    }

    /// ERROR or FATAL.
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error | Self::Fatal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// One parsed log line. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// `None` when the line carried no parseable timestamp.
    pub timestamp: Option<DateTime<Utc>>,
    pub level: LogLevel,
    pub request_id: Option<String>,
    /// The line with timestamp and level tokens stripped.
    pub message: String,
    /// The original line, verbatim.
    pub raw_line: String,
}

/// Aggregate counts over a parsed entry sequence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LogSummary {
    pub total_lines: usize,
    pub error_count: usize,
    pub warn_count: usize,
}

static TIMESTAMP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // ISO-8601, with optional fractional seconds and offset
        r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
        // Apache common log format
        r"\d{2}/\w{3}/\d{4}:\d{2}:\d{2}:\d{2}",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("timestamp pattern must compile"))
    .collect()
});

static LEVEL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(ERROR|WARN|WARNING|INFO|DEBUG|TRACE|FATAL)\b")
        .expect("level pattern must compile")
});

static REQUEST_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // labelled ids: request_id=..., req-id: ..., trace_id ...
        r"(?i)(?:request[_-]?id|req[_-]?id|trace[_-]?id)[^\w-]*([A-Za-z0-9_-]+)",
        // bare UUIDs
        r"([a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12})",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("request-id pattern must compile"))
    .collect()
});

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%b/%Y:%H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

fn parse_line(line: &str) -> LogEntry {
    let mut timestamp = None;
    let mut timestamp_span: Option<(usize, usize)> = None;
    for pattern in TIMESTAMP_PATTERNS.iter() {
        if let Some(m) = pattern.find(line) {
            timestamp = parse_timestamp(m.as_str());
            timestamp_span = Some((m.start(), m.end()));
            break;
        }
    }

    let level_match = LEVEL_PATTERN.find(line);
    let level = level_match
        .map(|m| LogLevel::from_token(m.as_str()))
        .unwrap_or(LogLevel::Unknown);

    let mut request_id = None;
    for pattern in REQUEST_ID_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(line) {
            request_id = caps.get(1).map(|m| m.as_str().to_string());
            break;
        }
    }

    // Message = the line minus the timestamp and the first level token.
    let mut message = String::with_capacity(line.len());
    let ts_span = timestamp_span.unwrap_or((0, 0));
    let level_span = level_match.map(|m| (m.start(), m.end())).unwrap_or((0, 0));
    for (idx, ch) in line.char_indices() {
        let in_ts = timestamp_span.is_some() && idx >= ts_span.0 && idx < ts_span.1;
        let in_level = level_match.is_some() && idx >= level_span.0 && idx < level_span.1;
        if !in_ts && !in_level {
            message.push(ch);
        }
    }
    let message = message
        .trim()
        .trim_start_matches(['-', ':', '[', ']', '|'])
        .trim()
        .to_string();

    LogEntry {
        timestamp,
        level,
        request_id,
        message,
        raw_line: line.to_string(),
    }
}

/// Parse raw log text into structured entries, one per non-blank line.
pub fn parse(raw: &str) -> Vec<LogEntry> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(parse_line)
        .collect()
}

/// Count totals over a parsed entry sequence.
pub fn summarize(entries: &[LogEntry]) -> LogSummary {
    LogSummary {
        total_lines: entries.len(),
        error_count: entries.iter().filter(|e| e.level.is_error()).count(),
        warn_count: entries
            .iter()
            .filter(|e| e.level == LogLevel::Warn)
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
2024-03-01T10:15:00Z ERROR request_id=ab12cd34 Unable to acquire connection from pool
2024-03-01T10:15:01Z INFO request_id=ab12cd34 retrying
2024-03-01 10:15:02 WARN pool usage at 98%
not a structured line at all
    at com.example.UserService.getConnection(UserService.java:42)
";

    #[test]
    fn one_entry_per_non_blank_line() {
        let entries = parse(SAMPLE);
        assert_eq!(entries.len(), 5);
    }

    #[test]
    fn blank_lines_skipped() {
        let entries = parse("a line\n\n   \nanother line\n");
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn reparse_is_idempotent() {
        let first = parse(SAMPLE);
        let second = parse(SAMPLE);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.level, b.level);
            assert_eq!(a.message, b.message);
        }
    }

    #[test]
    fn levels_extracted() {
        let entries = parse(SAMPLE);
        assert_eq!(entries[0].level, LogLevel::Error);
        assert_eq!(entries[1].level, LogLevel::Info);
        assert_eq!(entries[2].level, LogLevel::Warn);
    }

    #[test]
    fn unparseable_lines_become_unknown_with_raw_preserved() {
        let entries = parse(SAMPLE);
        assert_eq!(entries[3].level, LogLevel::Unknown);
        assert_eq!(entries[3].raw_line, "not a structured line at all");
        // stack-trace continuation lines are their own Unknown entries
        assert_eq!(entries[4].level, LogLevel::Unknown);
        assert!(entries[4].raw_line.contains("UserService.java:42"));
    }

    #[test]
    fn request_id_extracted_from_label() {
        let entries = parse(SAMPLE);
        assert_eq!(entries[0].request_id.as_deref(), Some("ab12cd34"));
    }

    #[test]
    fn request_id_extracted_from_bare_uuid() {
        let entries = parse("ERROR 9f8b4a21-1234-4cde-9abc-0123456789ab boom");
        assert_eq!(
            entries[0].request_id.as_deref(),
            Some("9f8b4a21-1234-4cde-9abc-0123456789ab")
        );
    }

    #[test]
    fn iso_timestamp_parsed_to_utc() {
        let entries = parse("2024-03-01T10:15:00Z ERROR boom");
        let ts = entries[0].timestamp.expect("timestamp should parse");
        assert_eq!(ts.to_rfc3339(), "2024-03-01T10:15:00+00:00");
    }

    #[test]
    fn unparseable_timestamp_stays_none() {
        let entries = parse("yesterday ERROR boom");
        assert!(entries[0].timestamp.is_none());
    }

    #[test]
    fn message_strips_timestamp_and_level() {
        let entries = parse("2024-03-01T10:15:00Z ERROR Unable to acquire connection");
        assert_eq!(entries[0].message, "Unable to acquire connection");
    }

    #[test]
    fn warning_token_maps_to_warn() {
        assert_eq!(LogLevel::from_token("WARNING"), LogLevel::Warn);
        assert_eq!(LogLevel::from_token("trace"), LogLevel::Debug);
    }

    #[test]
    fn summary_counts() {
        let entries = parse(SAMPLE);
        let summary = summarize(&entries);
        assert_eq!(summary.total_lines, 5);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.warn_count, 1);
    }

    #[test]
    fn empty_input_yields_no_entries() {
        assert!(parse("").is_empty());
        let summary = summarize(&[]);
        assert_eq!(summary.total_lines, 0);
    }
}
