//! Turns a parsed [`Pipeline`]/[`Sequence`] into running processes.
//!
//! Grounded on the original C's `exec.c`, function for function
//! (`find_in_path`, `setup_redirs`, `launch_process`, `execute_pipeline`,
//! `execute_commands`) — but every spawn goes through [`crate::loader`]
//! instead of `execve`, and every fork is a raw `libc::fork()` rather than
//! `std::process::Command`, since the in-process loader has no executable
//! image for `Command` to exec.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use crate::ast::{Pipeline, Sequence, Stage};
use crate::builtins;
use crate::glob_expand;
use crate::job_control;
use crate::loader;
use crate::redirect::Redirection;
use crate::shell_state::ShellState;
use crate::status;

/// Glob-expand a stage's arguments (command name at position 0 always
/// preserved) before it runs, whether inline in the shell process or inside
/// a forked child.
fn expand_stage(stage: &Stage) -> Stage {
    Stage {
        argv: glob_expand::expand_argv(&stage.argv),
        redirs: stage.redirs.clone(),
    }
}

#[derive(Debug)]
pub enum ExecutionAction {
    Continue(i32),
    Exit(i32),
}

fn pipeline_text(pipeline: &Pipeline) -> String {
    let mut text = pipeline
        .stages
        .iter()
        .map(|s| s.argv.join(" "))
        .collect::<Vec<_>>()
        .join(" | ");
    if pipeline.background {
        text.push_str(" &");
    }
    text
}

/// Run every pipeline in `seq` left to right, stopping immediately (and
/// returning `Exit`) if any pipeline's last stage was `exit`.
pub fn execute_sequence(seq: &Sequence, state: &mut ShellState) -> ExecutionAction {
    let mut last = ExecutionAction::Continue(state.last_status);
    for pipeline in seq {
        last = execute_pipeline(pipeline, state);
        let code = match &last {
            ExecutionAction::Continue(c) | ExecutionAction::Exit(c) => *c,
        };
        state.last_status = code;
        if matches!(last, ExecutionAction::Exit(_)) {
            break;
        }
    }
    last
}

pub fn execute_pipeline(pipeline: &Pipeline, state: &mut ShellState) -> ExecutionAction {
    if pipeline.stages.is_empty() {
        return ExecutionAction::Continue(0);
    }

    if pipeline.stages.iter().any(|s| s.program() == "exit") && !pipeline.is_single_stage() {
        eprintln!("minishell: exit is not supported inside a pipeline");
        return ExecutionAction::Continue(1);
    }

    if pipeline.is_single_stage() && !pipeline.background {
        let stage = &pipeline.stages[0];
        if builtins::is_builtin(stage.program()) {
            let expanded = expand_stage(stage);
            return run_builtin_in_shell(&expanded, state);
        }
    }

    run_forked_pipeline(pipeline, state)
}

/// Run a builtin directly in the shell process (no fork), so that
/// state-mutating builtins like `cd`/`export`/`alias` actually affect the
/// shell itself. Any redirections are applied to the real fds and restored
/// afterward.
fn run_builtin_in_shell(stage: &Stage, state: &mut ShellState) -> ExecutionAction {
    let saved = match apply_redirs(&stage.redirs) {
        Ok(saved) => saved,
        Err(e) => {
            eprintln!("minishell: {e}");
            return ExecutionAction::Continue(1);
        }
    };

    let outcome = builtins::run(stage, state);

    restore_redirs(saved);

    match outcome {
        builtins::BuiltinOutcome::Continue(code) => ExecutionAction::Continue(code),
        builtins::BuiltinOutcome::Exit(code) => ExecutionAction::Exit(code),
    }
}

/// Apply a stage's redirections to the real fds 0/1/2, returning the
/// original fds (duplicated) so the caller can restore them afterward. Only
/// the first redirection touching a given target fd has its original saved.
fn apply_redirs(redirs: &[Redirection]) -> io::Result<Vec<(RawFd, RawFd)>> {
    let mut saved: Vec<(RawFd, RawFd)> = Vec::new();
    for redir in redirs {
        let target = redir.target_fd();
        if !saved.iter().any(|(fd, _)| *fd == target) {
            let backup = unsafe { libc::dup(target) };
            if backup < 0 {
                restore_redirs(saved);
                return Err(io::Error::last_os_error());
            }
            saved.push((target, backup));
        }

        let file = redir.open().map_err(|e| {
            restore_redirs(saved.clone());
            e
        })?;
        use std::os::unix::io::AsRawFd;
        if unsafe { libc::dup2(file.as_raw_fd(), target) } < 0 {
            let err = io::Error::last_os_error();
            restore_redirs(saved);
            return Err(err);
        }
    }
    Ok(saved)
}

fn restore_redirs(saved: Vec<(RawFd, RawFd)>) {
    for (target, backup) in saved {
        unsafe {
            libc::dup2(backup, target);
            libc::close(backup);
        }
    }
}

/// Apply a stage's redirections onto fds 0/1/2 with no restore path — used
/// in forked children that are about to exec or exit, so the originals
/// never need recovering.
fn apply_redirs_no_restore(redirs: &[Redirection]) -> Result<(), String> {
    for redir in redirs {
        let file = redir
            .open()
            .map_err(|e| format!("{}: {e}", redir.path))?;
        use std::os::unix::io::AsRawFd;
        if unsafe { libc::dup2(file.as_raw_fd(), redir.target_fd()) } < 0 {
            return Err(io::Error::last_os_error().to_string());
        }
    }
    Ok(())
}

fn find_in_path(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = Path::new(program);
        return is_executable(path).then(|| path.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(program);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else { return false };
    if !meta.is_file() {
        return false;
    }
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

fn build_argv(argv: &[String]) -> Vec<CString> {
    argv.iter()
        .map(|a| CString::new(a.as_bytes()).unwrap_or_default())
        .collect()
}

fn build_envp() -> Vec<CString> {
    std::env::vars_os()
        .filter_map(|(k, v)| {
            let mut bytes = k.as_bytes().to_vec();
            bytes.push(b'=');
            bytes.extend_from_slice(v.as_bytes());
            CString::new(bytes).ok()
        })
        .collect()
}

/// Run a stage to completion inside a forked child: if it's a builtin, run
/// it in-process (its state mutations are local to this child and vanish
/// when it exits, matching a pipeline subshell); otherwise hand off to the
/// loader. Never returns — the child always exits.
fn run_stage_as_child(stage: &Stage, state: &mut ShellState) -> ! {
    if let Err(e) = apply_redirs_no_restore(&stage.redirs) {
        eprintln!("minishell: {e}");
        std::process::exit(1);
    }

    let stage = expand_stage(stage);

    if builtins::is_builtin(stage.program()) {
        let code = match builtins::run(&stage, state) {
            builtins::BuiltinOutcome::Continue(code) | builtins::BuiltinOutcome::Exit(code) => {
                code
            }
        };
        std::process::exit(code);
    }

    let Some(path) = find_in_path(stage.program()) else {
        eprintln!("minishell: {}: command not found", stage.program());
        std::process::exit(127);
    };

    let argv = build_argv(&stage.argv);
    let envp = build_envp();
    let Some(path_str) = path.to_str() else {
        eprintln!("minishell: {}: invalid path", stage.program());
        std::process::exit(127);
    };

    match unsafe { loader::exec_in_place(path_str, &argv, &envp) } {
        Ok(()) => unreachable!("exec_in_place only returns on error"),
        Err(e) => {
            eprintln!("minishell: {}: {e}", stage.program());
            std::process::exit(127);
        }
    }
}

/// Fork and run every stage of `pipeline`, wiring stdin/stdout through pipes
/// between consecutive stages and joining every child into one process
/// group. Foreground pipelines wait for the group (handling Ctrl-Z);
/// background pipelines register the group with the job table and return
/// immediately.
fn run_forked_pipeline(pipeline: &Pipeline, state: &mut ShellState) -> ExecutionAction {
    let n = pipeline.stages.len();
    let mut pipes: Vec<(RawFd, RawFd)> = Vec::with_capacity(n.saturating_sub(1));
    for _ in 0..n.saturating_sub(1) {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            eprintln!("minishell: pipe: {}", io::Error::last_os_error());
            for (r, w) in &pipes {
                unsafe {
                    libc::close(*r);
                    libc::close(*w);
                }
            }
            return ExecutionAction::Continue(1);
        }
        pipes.push((fds[0], fds[1]));
    }

    let mut child_pids: Vec<libc::pid_t> = Vec::with_capacity(n);
    let mut pgid: libc::pid_t = 0;

    for (idx, stage) in pipeline.stages.iter().enumerate() {
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            eprintln!("minishell: fork: {}", io::Error::last_os_error());
            continue;
        }

        if pid == 0 {
            // Child: join the pipeline's process group (first stage becomes leader).
            let target_pgid = if idx == 0 { 0 } else { pgid };
            unsafe {
                libc::setpgid(0, target_pgid);
            }

            if idx > 0 {
                unsafe { libc::dup2(pipes[idx - 1].0, libc::STDIN_FILENO) };
            }
            if idx + 1 < n {
                unsafe { libc::dup2(pipes[idx].1, libc::STDOUT_FILENO) };
            }
            for (r, w) in &pipes {
                unsafe {
                    libc::close(*r);
                    libc::close(*w);
                }
            }

            let signals = [libc::SIGTSTP, libc::SIGQUIT, libc::SIGPIPE];
            for sig in signals {
                unsafe { libc::signal(sig, libc::SIG_DFL) };
            }
            unsafe { libc::signal(libc::SIGINT, libc::SIG_DFL) };

            run_stage_as_child(stage, state);
        }

        if idx == 0 {
            pgid = pid;
        }
        unsafe { libc::setpgid(pid, pgid) };
        child_pids.push(pid);
    }

    for (r, w) in &pipes {
        unsafe {
            libc::close(*r);
            libc::close(*w);
        }
    }

    if pipeline.background {
        state.jobs.add(pgid, pipeline_text(pipeline), true);
        println!("[bg] started {pgid}");
        return ExecutionAction::Continue(0);
    }

    wait_foreground_group(child_pids, pgid, pipeline, state)
}

fn wait_foreground_group(
    child_pids: Vec<libc::pid_t>,
    pgid: libc::pid_t,
    pipeline: &Pipeline,
    state: &mut ShellState,
) -> ExecutionAction {
    let terminal_guard = match job_control::ForegroundTerminalGuard::new(pgid) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("minishell: failed to move terminal to job group: {e}");
            None
        }
    };

    let last_pid = *child_pids.last().unwrap_or(&pgid);
    let mut remaining: std::collections::HashSet<libc::pid_t> = child_pids.into_iter().collect();
    let mut last_code = 0;
    let mut stopped = false;

    while !remaining.is_empty() {
        let mut raw_status: libc::c_int = 0;
        let waited = unsafe { libc::waitpid(-pgid, &mut raw_status, libc::WUNTRACED) };
        if waited < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            break;
        }
        if unsafe { libc::WIFSTOPPED(raw_status) } {
            stopped = true;
            break;
        }
        if !remaining.remove(&waited) {
            continue;
        }
        if let Some(code) = status::exit_code_from_wait_status(raw_status) {
            if waited == last_pid {
                last_code = code;
            }
        }
    }

    drop(terminal_guard);

    if stopped {
        let id = state.jobs.add(pgid, pipeline_text(pipeline), false);
        state.jobs.mark_stopped(pgid);
        println!("[{id}]  Stopped  {}", pipeline_text(pipeline));
        return ExecutionAction::Continue(0);
    }

    ExecutionAction::Continue(last_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_text_joins_stages_with_pipe() {
        let pipeline = Pipeline {
            stages: vec![
                Stage { argv: vec!["echo".into(), "hi".into()], redirs: vec![] },
                Stage { argv: vec!["grep".into(), "h".into()], redirs: vec![] },
            ],
            background: false,
        };
        assert_eq!(pipeline_text(&pipeline), "echo hi | grep h");
    }

    #[test]
    fn background_pipeline_text_has_trailing_marker() {
        let pipeline = Pipeline {
            stages: vec![Stage { argv: vec!["sleep".into(), "1".into()], redirs: vec![] }],
            background: true,
        };
        assert_eq!(pipeline_text(&pipeline), "sleep 1 &");
    }
}
