//! End-to-end tests for parsing, pipelines and redirection, driving the
//! compiled shell over piped stdio.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::process::{Command, Stdio};

fn run_shell(lines: &[&str]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_solosh"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn solosh");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
        writeln!(stdin, "exit").expect("write exit");
    }

    child.wait_with_output().expect("wait output")
}

#[test]
fn external_command_runs_and_prints() {
    let output = run_shell(&["echo hello"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hello"), "stdout was: {stdout}");
    assert!(output.status.success(), "shell did not exit cleanly");
}

#[test]
fn two_stage_pipeline_connects_stdout_to_stdin() {
    let output = run_shell(&["echo pipe_marker | tr a-z A-Z"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("PIPE_MARKER"), "stdout was: {stdout}");
}

#[test]
fn three_stage_pipeline_passes_data_through() {
    let output = run_shell(&["echo three_stages | cat | tr a-z A-Z"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("THREE_STAGES"), "stdout was: {stdout}");
}

#[test]
fn pipeline_without_spaces_still_splits() {
    let output = run_shell(&["echo nospace_marker|cat"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("nospace_marker"), "stdout was: {stdout}");
}

#[test]
fn redirection_round_trips_a_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("in.txt");
    let output_path = dir.path().join("out.txt");
    std::fs::write(&input, "line one\nline two\n").expect("write input");

    let cmd = format!("cat < {} > {}", input.display(), output_path.display());
    let output = run_shell(&[cmd.as_str()]);
    assert!(output.status.success());

    let copied = std::fs::read_to_string(&output_path).expect("read output");
    assert_eq!(copied, "line one\nline two\n");
}

#[test]
fn output_redirect_creates_file_with_0600() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("perm.txt");

    let cmd = format!("echo perms > {}", path.display());
    let output = run_shell(&[cmd.as_str()]);
    assert!(output.status.success());

    let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o600, "mode was {mode:o}");
}

#[test]
fn output_redirect_truncates_existing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("trunc.txt");
    std::fs::write(&path, "old contents that should vanish\n").expect("seed file");

    let cmd = format!("echo fresh > {}", path.display());
    run_shell(&[cmd.as_str()]);

    let contents = std::fs::read_to_string(&path).expect("read output");
    assert_eq!(contents, "fresh\n");
}

#[test]
fn missing_redirect_target_falls_back_to_default_stdio() {
    // `>` with no filename: the open fails, the error is reported, and the
    // command still runs with its normal stdout.
    let output = run_shell(&["echo fallback_marker >"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stdout.contains("fallback_marker"), "stdout was: {stdout}");
    assert!(stderr.contains("solosh:"), "stderr was: {stderr}");
    assert!(output.status.success());
}

#[test]
fn unknown_command_reports_and_continues() {
    let output = run_shell(&["solosh_no_such_binary_404", "echo still_alive"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("command not found"),
        "stderr was: {stderr}"
    );
    assert!(stdout.contains("still_alive"), "stdout was: {stdout}");
    assert!(output.status.success());
}

#[test]
fn glued_ampersand_is_part_of_the_command_name() {
    // `foo&` is one token, not a background launch of `foo`.
    let output = run_shell(&["solosh_no_such_binary_404&"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("solosh_no_such_binary_404&"),
        "stderr was: {stderr}"
    );
}

#[test]
fn empty_and_whitespace_lines_are_ignored() {
    let output = run_shell(&["", "   ", "\t", "echo after_blanks"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("after_blanks"), "stdout was: {stdout}");
    assert!(output.status.success());
}

#[test]
fn empty_pipeline_stage_is_a_parse_error() {
    let output = run_shell(&["ls | | wc", "echo recovered"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("syntax error"), "stderr was: {stderr}");
    assert!(stdout.contains("recovered"), "stdout was: {stdout}");
}

// ── Command-line modes ──

#[test]
fn version_flag_prints_banner_and_exits_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_solosh"))
        .arg("--version")
        .output()
        .expect("run solosh --version");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("SoloSH"), "stdout was: {stdout}");
    assert!(output.status.success());
}

#[test]
fn command_flag_runs_one_job_and_exits() {
    let output = Command::new(env!("CARGO_BIN_EXE_solosh"))
        .args(["-c", "echo one_shot_marker"])
        .output()
        .expect("run solosh -c");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("one_shot_marker"), "stdout was: {stdout}");
    // No banner and no prompt in -c mode.
    assert!(!stdout.contains("SoloSH"), "stdout was: {stdout}");
    assert!(!stdout.contains("@ "), "stdout was: {stdout}");
    assert!(output.status.success());
}

#[test]
fn script_mode_reads_commands_from_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("script.slsh");
    std::fs::write(&script, "echo from_script\necho second_line\n").expect("write script");

    let output = Command::new(env!("CARGO_BIN_EXE_solosh"))
        .arg(script.as_os_str())
        .output()
        .expect("run script");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("from_script"), "stdout was: {stdout}");
    assert!(stdout.contains("second_line"), "stdout was: {stdout}");
    // Script mode suppresses the banner and the prompt.
    assert!(!stdout.contains("SoloSH"), "stdout was: {stdout}");
    assert!(!stdout.contains("@ "), "stdout was: {stdout}");
    assert!(output.status.success());
}

#[test]
fn missing_script_is_a_startup_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_solosh"))
        .arg("/no/such/script/file")
        .output()
        .expect("run solosh");
    assert_eq!(output.status.code(), Some(255));
}

#[test]
fn too_many_arguments_is_an_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_solosh"))
        .args(["one", "two"])
        .output()
        .expect("run solosh");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Too many arguments."), "stdout was: {stdout}");
    assert_eq!(output.status.code(), Some(255));
}
