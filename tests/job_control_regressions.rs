//! End-to-end tests for background jobs, the registry, and the job-control
//! builtins.

use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

fn spawn_shell() -> Child {
    Command::new(env!("CARGO_BIN_EXE_solosh"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn solosh")
}

fn feed(shell: &mut Child, line: &str) {
    let stdin = shell.stdin.as_mut().expect("stdin");
    writeln!(stdin, "{line}").expect("write line");
}

fn run_shell(lines: &[&str]) -> std::process::Output {
    let mut shell = spawn_shell();
    for line in lines {
        feed(&mut shell, line);
    }
    feed(&mut shell, "exit");
    shell.wait_with_output().expect("wait output")
}

#[test]
fn background_job_is_listed_then_disappears_after_completion() {
    let mut shell = spawn_shell();
    // Redirect to /dev/null so the orphan never holds our stdout pipe open.
    feed(&mut shell, "sleep 1 > /dev/null &");
    feed(&mut shell, "jobs");
    // Let the child finish; its SIGCHLD interrupts the shell's read and the
    // drain at the re-prompt removes the job.
    std::thread::sleep(Duration::from_millis(1600));
    feed(&mut shell, "jobs");
    feed(&mut shell, "exit");

    let output = shell.wait_with_output().expect("wait output");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.matches("[0] sleep 1").count(),
        1,
        "job should be listed exactly once; stdout was: {stdout}"
    );
    assert!(output.status.success());
}

#[test]
fn jobs_shows_the_original_command_text() {
    let output = run_shell(&["sleep 1 > /dev/null &", "jobs"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("[0] sleep 1 > /dev/null &"),
        "stdout was: {stdout}"
    );
}

#[test]
fn background_launch_returns_to_the_prompt_immediately() {
    let start = std::time::Instant::now();
    let mut shell = spawn_shell();
    feed(&mut shell, "sleep 3 > /dev/null &");
    feed(&mut shell, "echo prompt_back");
    feed(&mut shell, "exit");

    // Read stdout to EOF and reap the shell itself; the orphaned sleep must
    // not delay either (its stdout is /dev/null, and the shell does not
    // wait for background jobs on exit).
    let mut stdout = String::new();
    use std::io::Read;
    shell
        .stdout
        .take()
        .expect("stdout")
        .read_to_string(&mut stdout)
        .expect("read stdout");
    let status = shell.wait().expect("wait");

    assert!(stdout.contains("prompt_back"), "stdout was: {stdout}");
    assert!(status.success());
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "shell waited on a background job"
    );
}

#[test]
fn fg_waits_for_the_background_job_and_clears_it() {
    let output = run_shell(&["sleep 1 > /dev/null &", "fg", "jobs"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        !stdout.contains("No such job."),
        "fg should have found the job; stdout was: {stdout}"
    );
    // The post-fg `jobs` must print nothing: the job completed in the
    // foreground and left the registry.
    assert!(!stdout.contains("[0]"), "stdout was: {stdout}");
    assert!(output.status.success());
}

#[test]
fn fg_with_no_jobs_reports_no_such_job() {
    let output = run_shell(&["fg"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No such job."), "stdout was: {stdout}");
}

#[test]
fn bg_with_invalid_id_reports_no_such_job() {
    let output = run_shell(&["bg 42", "bg notanumber"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.matches("No such job.").count(),
        2,
        "stdout was: {stdout}"
    );
}

#[test]
fn cd_changes_directory_and_updates_pwd() {
    let dir = tempfile::tempdir().expect("tempdir");
    let canonical = dir.path().canonicalize().expect("canonicalize");

    // Script mode keeps prompts (which embed the cwd) out of stdout, so the
    // only places the path can appear are pwd's output and $PWD.
    let script = dir.path().join("cd.slsh");
    std::fs::write(
        &script,
        format!("cd {}\npwd\nprintenv PWD\n", dir.path().display()),
    )
    .expect("write script");

    let output = Command::new(env!("CARGO_BIN_EXE_solosh"))
        .arg(script.as_os_str())
        .output()
        .expect("run script");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let hits = stdout.matches(&canonical.display().to_string()).count();
    assert!(
        hits >= 2,
        "both pwd and PWD should show {}; stdout was: {stdout}",
        canonical.display()
    );
}

#[test]
fn cd_to_missing_directory_fails_gracefully() {
    let output = run_shell(&["cd /no/such/dir/at/all", "echo survived"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cd:"), "stderr was: {stderr}");
    assert!(stdout.contains("survived"), "stdout was: {stdout}");
}

#[test]
fn exit_stops_reading_further_commands() {
    let output = run_shell(&["exit", "echo should_not_run"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("should_not_run"), "stdout was: {stdout}");
    assert!(output.status.success());
}

#[test]
fn quit_behaves_like_exit() {
    let output = run_shell(&["quit", "echo should_not_run"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("should_not_run"), "stdout was: {stdout}");
    assert!(output.status.success());
}

#[test]
fn background_pipeline_is_tracked_as_one_job() {
    let mut shell = spawn_shell();
    feed(&mut shell, "sleep 1 | sleep 1 > /dev/null &");
    feed(&mut shell, "jobs");
    std::thread::sleep(Duration::from_millis(1800));
    feed(&mut shell, "jobs");
    feed(&mut shell, "exit");

    let output = shell.wait_with_output().expect("wait output");
    let stdout = String::from_utf8_lossy(&output.stdout);
    // One listing while both stages run, none after both were reaped.
    assert_eq!(
        stdout.matches("[0] sleep 1 | sleep 1").count(),
        1,
        "stdout was: {stdout}"
    );
    assert!(output.status.success());
}
