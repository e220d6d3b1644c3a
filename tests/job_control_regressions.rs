/// Integration tests for background job registration and the `jobs`
/// builtin. The loader only runs statically linked ELF64 executables (see
/// `src/loader.rs`), so these scripts background builtins rather than
/// external programs like `sleep` — builtins never touch the loader at all.
use std::io::Write;
use std::process::{Command, Stdio};

fn run_shell(lines: &[&str]) -> std::process::Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_minishell"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn minishell");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        for line in lines {
            writeln!(stdin, "{line}").expect("write line");
        }
        writeln!(stdin, "exit").expect("write exit");
    }

    child.wait_with_output().expect("wait output")
}

#[cfg(unix)]
#[test]
fn background_pipeline_reports_started_pgid() {
    let output = run_shell(&["echo background_marker &"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.lines().any(|l| l.starts_with("[bg] started ")),
        "expected a '[bg] started <pgid>' job announcement; stdout was: {stdout}"
    );
}

#[cfg(unix)]
#[test]
fn background_job_does_not_block_the_shell() {
    let output = run_shell(&["echo background_marker &", "echo after_marker"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("background_marker"), "stdout was: {stdout}");
    assert!(stdout.contains("after_marker"), "stdout was: {stdout}");
    assert!(output.status.success(), "shell did not exit cleanly");
}

#[cfg(unix)]
#[test]
fn successive_background_jobs_each_get_announced() {
    let output = run_shell(&["echo one &", "echo two &"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let announcements = stdout.lines().filter(|l| l.starts_with("[bg] started ")).count();
    assert_eq!(announcements, 2, "stdout was: {stdout}");
}

#[cfg(unix)]
#[test]
fn jobs_builtin_runs_without_error() {
    let output = run_shell(&["jobs"]);
    assert!(output.status.success(), "jobs builtin should exit 0");
}
