//! Bounded command history: a ring of up to 1000 lines, persisted to
//! `$HOME/.minishell_history`, with a browse cursor for up/down recall.
//!
//! Grounded on the original C's `history.c`. `browse` follows the original's
//! cursor convention: `None` means "not currently browsing" (the live,
//! not-yet-submitted line); moving up walks toward older entries, moving
//! down walks back toward the newest and then off the end back to `None`.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

const MAX_HISTORY: usize = 1000;
const HISTORY_FILE_NAME: &str = ".minishell_history";

pub enum Direction {
    Older,
    Newer,
}

#[derive(Debug, Default)]
pub struct History {
    lines: Vec<String>,
    /// Index into `lines` counted back from the end (0 = most recent), or
    /// `None` when not browsing.
    cursor: Option<usize>,
}

fn history_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(HISTORY_FILE_NAME))
}

impl History {
    pub fn new() -> Self {
        History { lines: Vec::new(), cursor: None }
    }

    /// Load history from `$HOME/.minishell_history`, silently starting empty
    /// if the file is missing or unreadable.
    pub fn load() -> Self {
        let mut history = History::new();
        if let Some(path) = history_path() {
            if let Ok(contents) = fs::read_to_string(path) {
                for line in contents.lines() {
                    history.push_no_persist(line.to_string());
                }
            }
        }
        history
    }

    /// Rewrite the whole history file, one line per entry. Used only to
    /// re-sync the file after the in-memory ring evicts its oldest entry
    /// (appending alone can't express that truncation).
    fn rewrite_file(&self) -> std::io::Result<()> {
        let Some(path) = history_path() else {
            return Ok(());
        };
        let mut file = fs::File::create(path)?;
        for line in &self.lines {
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    fn append_line(&self, line: &str) {
        let Some(path) = history_path() else {
            return;
        };
        if let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{line}");
        }
    }

    fn push_no_persist(&mut self, line: String) -> bool {
        if line.is_empty() {
            return false;
        }
        if self.lines.last().is_some_and(|last| last == &line) {
            return false;
        }
        let evicted = self.lines.len() >= MAX_HISTORY;
        if evicted {
            self.lines.remove(0);
        }
        self.lines.push(line);
        evicted
    }

    /// Add a line to history (adjacent-duplicate and empty lines suppressed),
    /// reset the browse cursor, and on success append the line to
    /// `$HOME/.minishell_history` (rewriting the whole file instead, on the
    /// rare turn the ring evicted its oldest entry).
    pub fn add(&mut self, line: &str) {
        let before = self.lines.len();
        let evicted = self.push_no_persist(line.to_string());
        self.cursor = None;
        if self.lines.len() != before || evicted {
            if evicted {
                let _ = self.rewrite_file();
            } else {
                self.append_line(line);
            }
        }
    }

    pub fn reset_browse(&mut self) {
        self.cursor = None;
    }

    /// Whether the browse cursor currently points somewhere in history
    /// (as opposed to the live, not-yet-submitted line).
    pub fn is_browsing(&self) -> bool {
        self.cursor.is_some()
    }

    /// Move the browse cursor and return the line it now points at, or `None`
    /// if browsing moved back off the end (caller should restore the saved
    /// live buffer in that case).
    pub fn browse(&mut self, direction: Direction) -> Option<&str> {
        if self.lines.is_empty() {
            return None;
        }
        let next = match (direction, self.cursor) {
            (Direction::Older, None) => 0,
            (Direction::Older, Some(c)) => (c + 1).min(self.lines.len() - 1),
            (Direction::Newer, None) => return None,
            (Direction::Newer, Some(0)) => {
                self.cursor = None;
                return None;
            }
            (Direction::Newer, Some(c)) => c - 1,
        };
        self.cursor = Some(next);
        let idx = self.lines.len() - 1 - next;
        Some(&self.lines[idx])
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `history` builtin listing: 1-based index, right-aligned to width 5.
    pub fn print(&self) {
        for (i, line) in self.lines.iter().enumerate() {
            println!("{:5}  {}", i + 1, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_duplicates_are_suppressed() {
        let mut h = History::new();
        h.add("ls");
        h.add("ls");
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn non_adjacent_duplicates_are_kept() {
        let mut h = History::new();
        h.add("ls");
        h.add("pwd");
        h.add("ls");
        assert_eq!(h.len(), 3);
    }

    #[test]
    fn empty_lines_are_not_recorded() {
        let mut h = History::new();
        h.add("");
        assert_eq!(h.len(), 0);
    }

    #[test]
    fn ring_caps_at_max_history() {
        let mut h = History::new();
        for i in 0..(MAX_HISTORY + 10) {
            h.add(&format!("cmd{i}"));
        }
        assert_eq!(h.len(), MAX_HISTORY);
    }

    #[test]
    fn browse_walks_older_then_back_to_unset() {
        let mut h = History::new();
        h.add("first");
        h.add("second");
        assert_eq!(h.browse(Direction::Older), Some("second"));
        assert_eq!(h.browse(Direction::Older), Some("first"));
        assert_eq!(h.browse(Direction::Older), Some("first")); // clamped at oldest
        assert_eq!(h.browse(Direction::Newer), Some("second"));
        assert_eq!(h.browse(Direction::Newer), None); // back off the end
    }

    #[test]
    fn add_resets_browse_cursor() {
        let mut h = History::new();
        h.add("first");
        h.browse(Direction::Older);
        h.add("second");
        // Fresh browse from unset should start at the newest again.
        assert_eq!(h.browse(Direction::Older), Some("second"));
    }
}
