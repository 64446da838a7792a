use aspectra_process::{
    run_command, run_command_filtered, CancellationToken, LineFilter, RunOptions, Stream,
};
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

fn helper() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_aspectra_process_test_helper"))
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn truncates_large_stdout() {
    let opts = RunOptions {
        timeout: Some(Duration::from_secs(2)),
        max_bytes: 1024,
        ..RunOptions::default()
    };

    let result = run_command(
        Path::new("."),
        &helper(),
        &args(&["--stdout-bytes", "1048576"]),
        opts,
    )
    .unwrap();

    assert!(result.status.success());
    assert!(!result.timed_out);
    assert!(result.output.truncated);
    assert_eq!(result.output.stdout.len(), 1024);
}

#[test]
fn non_zero_exit_is_reported_not_raised() {
    let result = run_command(
        Path::new("."),
        &helper(),
        &args(&["--stderr-line", "ERROR: build failed", "--exit-code", "1"]),
        RunOptions::default(),
    )
    .unwrap();

    assert_eq!(result.status.code(), Some(1));
    assert_eq!(result.output.stderr.trim_end(), "ERROR: build failed");
}

#[test]
fn filtered_stderr_keeps_matching_lines_only() {
    let filter: LineFilter = Box::new(|line: &str| {
        line.strip_prefix(">>>")
            .filter(|path| path.ends_with(".aspectra-info.json"))
            .map(str::to_string)
    });

    let result = run_command_filtered(
        Path::new("."),
        &helper(),
        &args(&[
            "--stderr-line",
            "INFO: Analyzed 3 targets",
            "--stderr-line",
            ">>>/out/a/a.aspectra-info.json",
            "--stderr-line",
            ">>>/out/a/a.jar",
            "--stdout-line",
            ">>>/out/ignored.aspectra-info.json",
            "--stderr-line",
            ">>>/out/b/b.aspectra-info.json",
            "--exit-code",
            "1",
        ]),
        RunOptions::default(),
        Stream::Stderr,
        filter,
    )
    .unwrap();

    assert!(!result.status.success());
    assert_eq!(
        result.filtered_lines,
        vec![
            "/out/a/a.aspectra-info.json".to_string(),
            "/out/b/b.aspectra-info.json".to_string(),
        ]
    );
    assert!(result.output.stderr.is_empty());
    assert!(result.output.stdout.contains("ignored"));
}

#[test]
fn filtered_stream_is_drained_past_pipe_capacity() {
    let filter: LineFilter = Box::new(|_: &str| None);

    let result = run_command_filtered(
        Path::new("."),
        &helper(),
        &args(&["--stderr-bytes", "4194304"]),
        RunOptions {
            timeout: Some(Duration::from_secs(10)),
            ..RunOptions::default()
        },
        Stream::Stderr,
        filter,
    )
    .unwrap();

    assert!(result.status.success());
    assert!(!result.timed_out);
    assert!(result.filtered_lines.is_empty());
}

#[test]
fn timeout_kills_child() {
    let opts = RunOptions {
        timeout: Some(Duration::from_millis(50)),
        max_bytes: 1024,
        ..RunOptions::default()
    };

    let result = run_command(
        Path::new("."),
        &helper(),
        &args(&["--sleep-ms", "5000"]),
        opts,
    )
    .unwrap();

    assert!(result.timed_out);
}

#[test]
fn timeout_kills_process_tree() {
    let opts = RunOptions {
        timeout: Some(Duration::from_millis(50)),
        max_bytes: 1024,
        ..RunOptions::default()
    };

    let start = Instant::now();
    let result = run_command(
        Path::new("."),
        &helper(),
        &args(&["--spawn-child-sleep-ms", "5000", "--sleep-ms", "5000"]),
        opts,
    )
    .unwrap();

    assert!(result.timed_out);
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "expected timeout kill to return promptly, took {:?}",
        start.elapsed()
    );
}

#[test]
fn cancellation_kills_process_tree() {
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();

    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        canceller.cancel();
    });

    let opts = RunOptions {
        timeout: None,
        max_bytes: 1024,
        cancellation: Some(cancel),
        ..RunOptions::default()
    };

    let start = Instant::now();
    let result = run_command(
        Path::new("."),
        &helper(),
        &args(&["--spawn-child-sleep-ms", "5000", "--sleep-ms", "5000"]),
        opts,
    )
    .unwrap();

    assert!(result.cancelled);
    assert!(!result.timed_out);
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "expected cancellation kill to return promptly, took {:?}",
        start.elapsed()
    );
}
