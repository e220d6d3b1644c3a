//! REPL entry point and one-shot `-c` execution mode.
//!
//! Grounded on the original C's `main.c` (`repl`, the `-c` branch, signal
//! installation) for control flow and ordering; the teacher's `main.rs`
//! contributed the `ctrlc`-handler/raw-mode-sentinel interaction pattern,
//! though here the signal dispositions themselves are installed directly
//! with `libc::sigaction` (SIGTSTP must be ignored, which the `ctrlc` crate
//! cannot express) rather than through that crate.

mod aliases;
mod ast;
mod builtins;
mod completion;
mod editor;
mod executor;
mod glob_expand;
mod history;
mod job_control;
mod jobs;
mod loader;
mod parser;
mod redirect;
mod shell_state;
mod status;

use std::io::Write as _;

use editor::LineEditor;
use executor::ExecutionAction;
use shell_state::ShellState;

/// `user@host:cwd$ `, rebuilt fresh before every prompt. Falls back to the
/// literal `user`/`host`/`?` on lookup failure, per §11.1.
fn prompt() -> String {
    format!("{}@{}:{}$ ", current_user(), current_host(), current_dir())
}

#[cfg(unix)]
fn current_user() -> String {
    unsafe {
        let pw = libc::getpwuid(libc::getuid());
        if pw.is_null() {
            return "user".to_string();
        }
        let name = std::ffi::CStr::from_ptr((*pw).pw_name);
        name.to_str().unwrap_or("user").to_string()
    }
}

#[cfg(not(unix))]
fn current_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "user".to_string())
}

#[cfg(unix)]
fn current_host() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "host".to_string();
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end]).unwrap_or("host").to_string()
}

#[cfg(not(unix))]
fn current_host() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "host".to_string())
}

fn current_dir() -> String {
    std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "?".to_string())
}

/// `SIGINT` prints a bare newline and returns (the interrupted blocking read
/// restarts transparently); `SIGTSTP` is ignored so `Ctrl-Z` at the prompt
/// does not suspend the shell. Inherited as default by every forked child
/// until the child's builtin/loader dispatch resets dispositions.
#[cfg(unix)]
fn install_signal_handlers() {
    extern "C" fn on_sigint(_sig: libc::c_int) {
        unsafe {
            libc::write(libc::STDOUT_FILENO, b"\n".as_ptr() as *const libc::c_void, 1);
        }
    }

    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_sigint as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = libc::SA_RESTART;
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());

        libc::signal(libc::SIGTSTP, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn install_signal_handlers() {}

/// Record `raw` in history (before alias expansion, matching the original),
/// expand it, parse it, and execute it. Mutates `state.last_status` and
/// `state.running`.
fn process_line(raw: &str, state: &mut ShellState) {
    let trimmed = raw.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        return;
    }

    state.history.add(trimmed);

    let expanded = state.aliases.expand(trimmed);

    let seq = match parser::parse_line(&expanded) {
        Ok(seq) => seq,
        Err(msg) => {
            eprintln!("minishell: {msg}");
            state.last_status = 1;
            return;
        }
    };

    match executor::execute_sequence(&seq, state) {
        ExecutionAction::Continue(code) => state.last_status = code,
        ExecutionAction::Exit(code) => {
            state.last_status = code;
            state.running = false;
        }
    }
}

fn run_repl(state: &mut ShellState) {
    let mut editor = LineEditor::new();

    while state.running {
        #[cfg(unix)]
        if let Err(e) = state.jobs.reap() {
            eprintln!("minishell: {e}");
        }

        let prompt_str = prompt();
        match editor.read_line(&prompt_str, &mut state.history) {
            Ok(Some(line)) => process_line(&line, state),
            Ok(None) => break,
            Err(e) => {
                eprintln!("minishell: {e}");
                break;
            }
        }
    }
}

/// `shell -c "<string>"`: alias-expand, parse, and execute once, skipping
/// the REPL and the line editor entirely.
fn run_one_shot(command: &str, state: &mut ShellState) {
    let expanded = state.aliases.expand(command);
    let seq = match parser::parse_line(&expanded) {
        Ok(seq) => seq,
        Err(msg) => {
            eprintln!("minishell: {msg}");
            state.last_status = 1;
            return;
        }
    };
    match executor::execute_sequence(&seq, state) {
        ExecutionAction::Continue(code) => state.last_status = code,
        ExecutionAction::Exit(code) => state.last_status = code,
    }
}

fn main() {
    install_signal_handlers();

    let mut state = ShellState::new();
    let args: Vec<String> = std::env::args().collect();

    if args.len() >= 3 && args[1] == "-c" {
        run_one_shot(&args[2], &mut state);
    } else {
        run_repl(&mut state);
    }

    let _ = std::io::stdout().flush();
    std::process::exit(state.last_status);
}
