//! The shell's mutable state, threaded explicitly through the REPL and
//! builtins instead of living in globals/statics (the original C kept all
//! of this — history, aliases, jobs, last exit status — as file-scope
//! globals across `main.c`/`history.c`/`aliases.c`/`jobs.c`).

use crate::aliases::AliasTable;
use crate::history::History;
use crate::jobs::JobTable;

pub struct ShellState {
    pub history: History,
    pub aliases: AliasTable,
    pub jobs: JobTable,
    pub last_status: i32,
    pub running: bool,
}

impl ShellState {
    pub fn new() -> Self {
        ShellState {
            history: History::load(),
            aliases: AliasTable::new(),
            jobs: JobTable::new(),
            last_status: 0,
            running: true,
        }
    }
}

impl Default for ShellState {
    fn default() -> Self {
        Self::new()
    }
}
