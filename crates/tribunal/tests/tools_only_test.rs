//! Deterministic no-LLM regression runs: parser, clusterer, redactor, and
//! tool router only.

use std::path::PathBuf;

use tempfile::TempDir;

use tribunal::config::DebateConfig;
use tribunal::engine::{run_tools_only, RunInput};

struct Fixture {
    _dir: TempDir,
    config: DebateConfig,
    out_dir: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    let mut config = DebateConfig::default();
    config.output.dir = out_dir.display().to_string();
    Fixture {
        config,
        out_dir,
        _dir: dir,
    }
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn pool_exhaustion_scenario_groups_one_error_cluster() {
    let fx = fixture();
    let log: String = (0..47)
        .map(|i| {
            format!(
                "2024-03-01T10:15:{:02}Z ERROR Unable to acquire connection from pool (worker {i})\n",
                i % 60
            )
        })
        .collect();
    let log_path = write(&fx._dir, "app.log", &log);
    let code_path = write(
        &fx._dir,
        "UserService.java",
        "public Connection getConnection() {\n\
         \x20   Connection conn = pool.acquire();\n\
         \x20   return conn; // never closed\n\
         }\n",
    );

    let summary = run_tools_only(
        &fx.config,
        &RunInput {
            log_path,
            code_paths: vec![code_path],
        },
    )
    .unwrap();

    assert_eq!(summary.parsed.total_lines, 47);
    assert_eq!(summary.parsed.error_count, 47);
    // no request ids → one shared error-signature cluster
    assert_eq!(summary.total_clusters, 1);
    assert_eq!(summary.error_clusters, 1);
    assert_eq!(summary.chunk_entries, 47);
    assert!(summary.grep_check.is_some());
    assert!(PathBuf::from(&summary.results_path).exists());
}

#[test]
fn zero_error_log_reports_zero_error_clusters_without_crashing() {
    let fx = fixture();
    let log_path = write(
        &fx._dir,
        "quiet.log",
        "2024-03-01T10:00:00Z INFO started\n\
         2024-03-01T10:00:01Z INFO listening on :8080\n\
         2024-03-01T10:00:02Z INFO health check ok\n",
    );

    let summary = run_tools_only(
        &fx.config,
        &RunInput {
            log_path,
            code_paths: vec![],
        },
    )
    .unwrap();

    assert_eq!(summary.parsed.error_count, 0);
    assert_eq!(summary.error_clusters, 0);
    assert!(summary.grep_check.is_none());

    // only the tools summary is written — never a report markdown
    let reports: Vec<_> = std::fs::read_dir(&fx.out_dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("report_"))
        .collect();
    assert!(reports.is_empty());
    assert!(fx.out_dir.join("tools_test_results.json").exists());
}

#[test]
fn empty_log_is_a_degenerate_run_not_an_error() {
    let fx = fixture();
    let log_path = write(&fx._dir, "empty.log", "");

    let summary = run_tools_only(
        &fx.config,
        &RunInput {
            log_path,
            code_paths: vec![],
        },
    )
    .unwrap();

    assert_eq!(summary.parsed.total_lines, 0);
    assert_eq!(summary.total_clusters, 0);
    assert_eq!(summary.chunk_entries, 0);
    assert!(!summary.chunk_truncated);
}

#[test]
fn replaying_identical_inputs_is_deterministic() {
    let fx = fixture();
    let log_path = write(
        &fx._dir,
        "app.log",
        "2024-03-01T10:00:00Z ERROR NullPointerException in handler\n\
         2024-03-01T10:00:01Z WARN retry scheduled\n",
    );
    let input = RunInput {
        log_path,
        code_paths: vec![],
    };

    let first = run_tools_only(&fx.config, &input).unwrap();
    let second = run_tools_only(&fx.config, &input).unwrap();
    assert_eq!(first.parsed.total_lines, second.parsed.total_lines);
    assert_eq!(first.total_clusters, second.total_clusters);
    assert_eq!(first.error_clusters, second.error_clusters);
    assert_eq!(first.chunk_entries, second.chunk_entries);
}

#[test]
fn grep_check_runs_over_provided_code() {
    let fx = fixture();
    let log_path = write(&fx._dir, "app.log", "2024-03-01T10:00:00Z ERROR boom\n");
    let code_path = write(
        &fx._dir,
        "handler.java",
        "try { run(); } catch (Exception error) { log(error); }\n",
    );

    let summary = run_tools_only(
        &fx.config,
        &RunInput {
            log_path,
            code_paths: vec![code_path],
        },
    )
    .unwrap();

    let grep = summary.grep_check.unwrap();
    assert!(grep.contains("match(es)"), "unexpected grep summary: {grep}");
}
