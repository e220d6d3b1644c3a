//! The shell's built-in commands.
//!
//! Grounded on the original C's `builtins.c`: a fixed table of 16 names
//! dispatched by exact string match. Builtins write straight to the real
//! `stdout`/`stderr` (not through an injected `dyn Write`) — by the time one
//! runs, any redirections on its stage have already been applied to the
//! real file descriptors 0/1/2, either in a forked child about to exit, or
//! temporarily in the shell itself around the call.

use std::io::{self, BufRead, Read as _, Write as _};
use std::time::SystemTime;

use crate::ast::Stage;
use crate::shell_state::ShellState;

pub(crate) const BUILTIN_NAMES: &[&str] = &[
    "cd", "pwd", "exit", "export", "unset", "jobs", "echo", "grep", "ls", "alias", "unalias",
    "history", "touch", "mkdir", "rm", "cat",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

pub enum BuiltinOutcome {
    Continue(i32),
    Exit(i32),
}

/// Dispatch and run a builtin. Callers are responsible for ensuring the
/// stage's redirections are already in effect on fds 0/1/2.
pub fn run(stage: &Stage, state: &mut ShellState) -> BuiltinOutcome {
    let args = &stage.argv[1..];
    match stage.program() {
        "cd" => BuiltinOutcome::Continue(bi_cd(args)),
        "pwd" => BuiltinOutcome::Continue(bi_pwd()),
        "exit" => bi_exit(args, state),
        "export" => BuiltinOutcome::Continue(bi_export(args)),
        "unset" => BuiltinOutcome::Continue(bi_unset(args)),
        "jobs" => BuiltinOutcome::Continue(bi_jobs(state)),
        "echo" => BuiltinOutcome::Continue(bi_echo(args)),
        "grep" => BuiltinOutcome::Continue(bi_grep(args)),
        "ls" => BuiltinOutcome::Continue(bi_ls(args)),
        "alias" => BuiltinOutcome::Continue(bi_alias(args, state)),
        "unalias" => BuiltinOutcome::Continue(bi_unalias(args, state)),
        "history" => BuiltinOutcome::Continue(bi_history(state)),
        "touch" => BuiltinOutcome::Continue(bi_touch(args)),
        "mkdir" => BuiltinOutcome::Continue(bi_mkdir(args)),
        "rm" => BuiltinOutcome::Continue(bi_rm(args)),
        "cat" => BuiltinOutcome::Continue(bi_cat(args)),
        other => {
            eprintln!("minishell: {other}: not a builtin");
            BuiltinOutcome::Continue(127)
        }
    }
}

fn bi_cd(args: &[String]) -> i32 {
    let target = if let Some(arg) = args.first() {
        arg.clone()
    } else {
        std::env::var("HOME").unwrap_or_else(|_| "/".to_string())
    };

    match std::env::set_current_dir(&target) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("cd: {target}: {e}");
            1
        }
    }
}

fn bi_pwd() -> i32 {
    match std::env::current_dir() {
        Ok(dir) => {
            println!("{}", dir.display());
            0
        }
        Err(e) => {
            eprintln!("pwd: {e}");
            1
        }
    }
}

/// `exit [N]` ends the whole sequence immediately; `N` (or the last status
/// if omitted) becomes the process's exit code. `N` is parsed with C
/// `atoi` looseness: a non-numeric argument parses as 0 rather than erroring.
fn bi_exit(args: &[String], state: &ShellState) -> BuiltinOutcome {
    let code = match args.first() {
        Some(arg) => atoi(arg),
        None => state.last_status,
    };
    BuiltinOutcome::Exit(code)
}

/// C `atoi`-style parse: optional leading whitespace, optional sign, then
/// digits up to the first non-digit; no digits at all yields 0.
fn atoi(s: &str) -> i32 {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (bytes[i] as char).is_whitespace() {
        i += 1;
    }
    let negative = match bytes.get(i) {
        Some(b'-') => {
            i += 1;
            true
        }
        Some(b'+') => {
            i += 1;
            false
        }
        _ => false,
    };
    let mut value: i64 = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        value = value * 10 + (bytes[i] - b'0') as i64;
        i += 1;
    }
    let value = if negative { -value } else { value };
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

fn bi_export(args: &[String]) -> i32 {
    if args.is_empty() {
        let mut vars: Vec<(String, String)> = std::env::vars().collect();
        vars.sort();
        for (k, v) in vars {
            println!("export {k}={v}");
        }
        return 0;
    }

    let mut status = 0;
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => unsafe { std::env::set_var(name, value) },
            None => {
                eprintln!("export: invalid format: {arg}");
                status = 1;
            }
        }
    }
    status
}

fn bi_unset(args: &[String]) -> i32 {
    for name in args {
        unsafe {
            std::env::remove_var(name);
        }
    }
    0
}

fn bi_jobs(state: &ShellState) -> i32 {
    state.jobs.print();
    0
}

fn bi_echo(args: &[String]) -> i32 {
    let (suppress_newline, words) = match args.first() {
        Some(first) if first == "-n" => (true, &args[1..]),
        _ => (false, args),
    };
    let line = words.join(" ");
    if suppress_newline {
        print!("{line}");
        let _ = io::stdout().flush();
    } else {
        println!("{line}");
    }
    0
}

fn bi_grep(args: &[String]) -> i32 {
    let Some(pattern) = args.first() else {
        eprintln!("grep: missing pattern");
        return 2;
    };
    let files = &args[1..];

    let mut matched_any = false;

    let mut run_over = |reader: &mut dyn BufRead| {
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if line.contains(pattern.as_str()) {
                matched_any = true;
                println!("{line}");
            }
        }
    };

    if files.is_empty() {
        let stdin = io::stdin();
        let mut lock = stdin.lock();
        run_over(&mut lock);
    } else {
        for path in files {
            match std::fs::File::open(path) {
                Ok(file) => {
                    let mut reader = io::BufReader::new(file);
                    run_over(&mut reader);
                }
                Err(e) => {
                    eprintln!("grep: {path}: {e}");
                }
            }
        }
    }

    if matched_any { 0 } else { 1 }
}

/// Tolerates (and ignores) leading `-`-flag arguments instead of rejecting
/// them — `ls -la` lists the current directory rather than erroring on an
/// unrecognized flag (the listing is already one-per-line, so no flag here
/// actually changes the format).
fn bi_ls(args: &[String]) -> i32 {
    let paths: Vec<&String> = args.iter().filter(|a| !a.starts_with('-')).collect();
    let targets: Vec<&str> = if paths.is_empty() {
        vec!["."]
    } else {
        paths.iter().map(|s| s.as_str()).collect()
    };
    let multi = targets.len() > 1;

    let mut status = 0;
    let mut first = true;
    for target in targets {
        let meta = match std::fs::metadata(target) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("ls: {target}: {e}");
                status = 1;
                continue;
            }
        };

        if !meta.is_dir() {
            if !first {
                println!();
            }
            first = false;
            println!("{target}");
            continue;
        }

        let entries = match std::fs::read_dir(target) {
            Ok(entries) => entries,
            Err(e) => {
                eprintln!("ls: {target}: {e}");
                status = 1;
                continue;
            }
        };
        if !first {
            println!();
        }
        first = false;
        if multi {
            println!("{target}:");
        }
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        for name in names {
            println!("{name}");
        }
    }
    status
}

fn bi_alias(args: &[String], state: &mut ShellState) -> i32 {
    if args.is_empty() {
        for (name, value) in state.aliases.iter() {
            println!("alias {name}='{value}'");
        }
        return 0;
    }

    let mut status = 0;
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => {
                if let Err(msg) = state.aliases.set(name, value) {
                    eprint!("{msg}");
                    status = 1;
                }
            }
            None => match state.aliases.get(arg) {
                Some(value) => println!("alias {arg}='{value}'"),
                None => {
                    eprintln!("alias: {arg}: not found");
                    status = 1;
                }
            },
        }
    }
    status
}

fn bi_unalias(args: &[String], state: &mut ShellState) -> i32 {
    if args.is_empty() {
        eprintln!("unalias: usage: unalias name");
        return 1;
    }
    let mut status = 0;
    for name in args {
        if !state.aliases.unset(name) {
            eprintln!("unalias: {name}: not found");
            status = 1;
        }
    }
    status
}

fn bi_history(state: &ShellState) -> i32 {
    state.history.print();
    0
}

fn bi_touch(args: &[String]) -> i32 {
    if args.is_empty() {
        eprintln!("touch: missing file operand");
        return 1;
    }
    let mut status = 0;
    for path in args {
        let result = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .and_then(|file| file.set_modified(SystemTime::now()));
        if let Err(e) = result {
            eprintln!("touch: {path}: {e}");
            status = 1;
        }
    }
    status
}

/// `-p` is recognized only as the very first argument and makes intermediate
/// components get created, ignoring `EEXIST` at each level (the underlying
/// `create_dir_all` already has this behavior built in).
fn bi_mkdir(args: &[String]) -> i32 {
    let (recursive, paths) = match args.first().map(String::as_str) {
        Some("-p") => (true, &args[1..]),
        _ => (false, args),
    };
    if paths.is_empty() {
        eprintln!("mkdir: missing operand");
        return 1;
    }
    let mut status = 0;
    for path in paths {
        let result = if recursive {
            std::fs::create_dir_all(path)
        } else {
            std::fs::create_dir(path)
        };
        if let Err(e) = result {
            eprintln!("mkdir: {path}: {e}");
            status = 1;
        }
    }
    status
}

/// `-r`/`-R` recurses into directories, `-f` suppresses diagnostics
/// (including a missing path list). Flags may be combined (`-rf`) or given
/// as several leading `-`-prefixed arguments; the first non-flag argument
/// starts the path list.
fn bi_rm(args: &[String]) -> i32 {
    let mut recursive = false;
    let mut force = false;
    let mut idx = 0;
    while idx < args.len() {
        let arg = args[idx].as_str();
        let is_flag_word = arg.len() > 1
            && arg.starts_with('-')
            && arg[1..].chars().all(|c| matches!(c, 'r' | 'R' | 'f'));
        if !is_flag_word {
            break;
        }
        for c in arg[1..].chars() {
            match c {
                'r' | 'R' => recursive = true,
                'f' => force = true,
                _ => {}
            }
        }
        idx += 1;
    }

    let paths = &args[idx..];
    if paths.is_empty() {
        if !force {
            eprintln!("rm: missing operand");
        }
        return if force { 0 } else { 1 };
    }

    let mut status = 0;
    for path in paths {
        let result = match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() && recursive => std::fs::remove_dir_all(path),
            Ok(meta) if meta.is_dir() => Err(io::Error::other("is a directory")),
            _ => std::fs::remove_file(path),
        };
        if let Err(e) = result {
            if !force {
                eprintln!("rm: {path}: {e}");
                status = 1;
            }
        }
    }
    status
}

/// Ensures a trailing newline on whatever was printed, matching each of the
/// original's two cases: a verbatim stdin copy and a multi-file concatenation.
fn bi_cat(args: &[String]) -> i32 {
    let mut stdout = io::stdout();
    let mut last_byte: Option<u8> = None;
    let mut status = 0;

    if args.is_empty() {
        let mut buf = Vec::new();
        if io::stdin().lock().read_to_end(&mut buf).is_err() {
            eprintln!("cat: error reading stdin");
            return 1;
        }
        if !buf.is_empty() {
            let _ = stdout.write_all(&buf);
            last_byte = buf.last().copied();
        }
    } else {
        for path in args {
            match std::fs::read(path) {
                Ok(bytes) => {
                    if !bytes.is_empty() {
                        let _ = stdout.write_all(&bytes);
                        last_byte = bytes.last().copied();
                    }
                }
                Err(e) => {
                    eprintln!("cat: {path}: {e}");
                    status = 1;
                }
            }
        }
    }

    if let Some(b) = last_byte {
        if b != b'\n' {
            let _ = stdout.write_all(b"\n");
        }
    }
    status
}
