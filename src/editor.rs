//! Raw-mode line editor: edit buffer, cursor, history browsing, and
//! interactive tab completion.
//!
//! Grounded on the teacher's `editor.rs` for the crossterm raw-mode
//! event loop and its `RawModeGuard` pattern; history storage is delegated
//! to [`crate::history::History`] (shared shell state, not a private copy)
//! and tab completion to [`crate::completion`], per the "Completion cycling
//! across calls" and "Global tables" design notes — the editor owns only
//! the completion *session* (the sorted candidate snapshot and cycle
//! index), discarded on any non-tab key.

use std::io::{self, BufRead, Write};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{self, ClearType},
    tty::IsTty,
};

use crate::completion::{self, CompletionCycle};
use crate::history::{Direction, History};

// ── Raw-mode guard ─────────────────────────────────────────────────────────

/// RAII guard: enables terminal raw mode on construction and restores it on
/// every return path, including panics, so the terminal is never left in a
/// broken state — the "per-file raw-mode restoration" design note.
struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawModeGuard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

// ── Completion session ───────────────────────────────────────────────────

/// The candidate snapshot and cycle index for one run of Tab presses at one
/// buffer position; any other keystroke drops this.
struct CompletionSession {
    cycle: CompletionCycle,
    /// `[start, end)` span in `buffer` currently occupied by the last
    /// inserted candidate (initially just the word under the cursor).
    start: usize,
    end: usize,
}

// ── Line editor ───────────────────────────────────────────────────────────

/// A line editor with cursor movement, history browsing, and tab completion.
pub struct LineEditor {
    /// Current line content, stored as `char`s for Unicode-safe cursor indexing.
    buffer: Vec<char>,
    /// Cursor position within `buffer` (0 = before the first char).
    cursor: usize,
    /// Snapshot of the in-progress line, taken the moment the user first
    /// browses into history; restored when browsing returns to "unset".
    saved_buffer: String,
    /// Active tab-completion cycle, or `None` in the idle state.
    completion: Option<CompletionSession>,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl LineEditor {
    pub fn new() -> Self {
        LineEditor {
            buffer: Vec::new(),
            cursor: 0,
            saved_buffer: String::new(),
            completion: None,
        }
    }

    /// Read one line of input, displaying `prompt` to the left. `history`
    /// backs Up/Down browsing; the caller (not the editor) is responsible
    /// for committing the accepted line to it.
    ///
    /// Returns:
    /// - `Ok(Some(line))` — the user submitted a line (may be empty)
    /// - `Ok(None)` — end of input (Ctrl-D on an empty buffer, or stdin closed)
    /// - `Err(_)` — I/O error
    ///
    /// When stdin is not a TTY, falls back to a plain `read_line()` call so
    /// `-c`/piped-script invocations work without entering raw mode.
    pub fn read_line(&mut self, prompt: &str, history: &mut History) -> io::Result<Option<String>> {
        if !io::stdin().is_tty() {
            return self.read_line_fallback(prompt);
        }

        self.reset_state(history);
        let _guard = RawModeGuard::enter()?;

        // Raw mode disables echo; the prompt must be drawn explicitly.
        print!("{prompt}");
        io::stdout().flush()?;

        loop {
            let ev = match event::read() {
                Ok(ev) => ev,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };

            let Event::Key(key) = ev else {
                continue; // ignore mouse, resize, paste, focus events
            };

            if key.kind != KeyEventKind::Press && key.kind != KeyEventKind::Repeat {
                continue;
            }

            match self.handle_key(key, prompt, history)? {
                KeyAction::Submit(line) => return Ok(Some(line)),
                KeyAction::Eof => return Ok(None),
                KeyAction::Continue => {}
            }
        }
    }

    // ── Private ─────────────────────────────────────────────────────────────

    fn reset_state(&mut self, history: &mut History) {
        self.buffer.clear();
        self.cursor = 0;
        self.saved_buffer.clear();
        self.completion = None;
        history.reset_browse();
    }

    /// Non-TTY path: print prompt and delegate to `BufRead::read_line`.
    fn read_line_fallback(&mut self, prompt: &str) -> io::Result<Option<String>> {
        print!("{prompt}");
        io::stdout().flush()?;
        let stdin = io::stdin();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(line)),
            Err(e) => Err(e),
        }
    }

    fn handle_key(
        &mut self,
        key: crossterm::event::KeyEvent,
        prompt: &str,
        history: &mut History,
    ) -> io::Result<KeyAction> {
        use KeyCode::*;

        // Any non-tab keystroke resets completion-cycling state.
        if !matches!(key.code, Tab) {
            self.completion = None;
        }

        match (key.code, key.modifiers) {
            // ── Submit ──────────────────────────────────────────────────────
            (Enter, _) => {
                print!("\r\n");
                io::stdout().flush()?;
                let line: String = self.buffer.iter().collect();
                return Ok(KeyAction::Submit(line));
            }

            // ── End-of-input on an empty buffer ────────────────────────────
            (Char('d'), KeyModifiers::CONTROL) if self.buffer.is_empty() => {
                print!("\r\n");
                io::stdout().flush()?;
                return Ok(KeyAction::Eof);
            }

            // ── History navigation ─────────────────────────────────────────
            (Up, _) => {
                self.history_prev(history);
                self.redraw(prompt)?;
            }
            (Down, _) => {
                self.history_next(history);
                self.redraw(prompt)?;
            }

            // ── Cursor motion ───────────────────────────────────────────────
            (Left, _) => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.sync_cursor(prompt)?;
                }
            }
            (Right, _) => {
                if self.cursor < self.buffer.len() {
                    self.cursor += 1;
                    self.sync_cursor(prompt)?;
                }
            }

            // ── Backspace / DEL: delete the character before the cursor ───
            (Backspace, _) | (Delete, _) => {
                if self.cursor > 0 {
                    self.cursor -= 1;
                    self.buffer.remove(self.cursor);
                    self.redraw(prompt)?;
                }
            }

            // ── Tab: completion ──────────────────────────────────────────────
            (Tab, _) => {
                self.handle_tab(prompt)?;
            }

            // ── Printable 7-bit ASCII ────────────────────────────────────────
            (Char(c), _) if c.is_ascii() && (c == ' ' || c.is_ascii_graphic()) => {
                self.buffer.insert(self.cursor, c);
                self.cursor += 1;
                self.redraw(prompt)?;
            }

            // ── Everything else: ignored ─────────────────────────────────────
            _ => {}
        }

        Ok(KeyAction::Continue)
    }

    fn handle_tab(&mut self, prompt: &str) -> io::Result<()> {
        if let Some(mut session) = self.completion.take() {
            if let Some(candidate) = session.cycle.next() {
                let candidate = candidate.to_string();
                self.buffer.splice(session.start..session.end, candidate.chars());
                session.end = session.start + candidate.chars().count();
                self.cursor = session.end;
            }
            self.completion = Some(session);
            return self.redraw(prompt);
        }

        let line: String = self.buffer.iter().collect();
        let start = completion::word_start(&line, self.cursor);
        let word: String = self.buffer[start..self.cursor].iter().collect();
        let candidates = completion::candidates(&line, start, &word);

        match candidates.len() {
            0 => {
                print!("\x07");
                io::stdout().flush()?;
            }
            1 => {
                let candidate = candidates[0].clone();
                self.buffer.splice(start..self.cursor, candidate.chars());
                self.cursor = start + candidate.chars().count();
                self.redraw(prompt)?;
            }
            _ => {
                terminal::disable_raw_mode()?;
                print!("\r\n{}", completion::format_candidate_list(&candidates));
                io::stdout().flush()?;
                terminal::enable_raw_mode()?;
                self.redraw(prompt)?;
                self.completion = Some(CompletionSession {
                    cycle: CompletionCycle::new(candidates),
                    start,
                    end: self.cursor,
                });
            }
        }
        Ok(())
    }

    /// Erase the current line and redraw prompt + buffer, then reposition cursor.
    fn redraw(&self, prompt: &str) -> io::Result<()> {
        let line: String = self.buffer.iter().collect();
        let col = (prompt.chars().count() + self.cursor) as u16;
        execute!(
            io::stdout(),
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::CurrentLine),
        )?;
        print!("{prompt}{line}");
        io::stdout().flush()?;
        execute!(io::stdout(), cursor::MoveToColumn(col))?;
        Ok(())
    }

    /// Move the terminal cursor to match `self.cursor` without redrawing text.
    fn sync_cursor(&self, prompt: &str) -> io::Result<()> {
        let col = (prompt.chars().count() + self.cursor) as u16;
        execute!(io::stdout(), cursor::MoveToColumn(col))?;
        Ok(())
    }

    fn history_prev(&mut self, history: &mut History) {
        if !history.is_browsing() {
            self.saved_buffer = self.buffer.iter().collect();
        }
        if let Some(line) = history.browse(Direction::Older) {
            self.buffer = line.chars().collect();
            self.cursor = self.buffer.len();
        }
    }

    fn history_next(&mut self, history: &mut History) {
        let was_browsing = history.is_browsing();
        match history.browse(Direction::Newer) {
            Some(line) => {
                self.buffer = line.chars().collect();
                self.cursor = self.buffer.len();
            }
            None if was_browsing => {
                self.buffer = self.saved_buffer.chars().collect();
                self.cursor = self.buffer.len();
            }
            None => {}
        }
    }
}

// ── Internal return type ────────────────────────────────────────────────

enum KeyAction {
    Continue,
    Submit(String),
    Eof,
}

// ── Unit tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    fn history_with(entries: &[&str]) -> History {
        let mut h = History::new();
        for e in entries {
            h.add(e);
        }
        h
    }

    #[test]
    fn key_events_edit_buffer() {
        let mut e = LineEditor::new();
        let mut h = History::new();
        let prompt = "jsh> ";
        let k = |code: KeyCode, mods: KeyModifiers| KeyEvent::new(code, mods);

        e.handle_key(k(KeyCode::Char('h'), KeyModifiers::NONE), prompt, &mut h).unwrap();
        e.handle_key(k(KeyCode::Char('i'), KeyModifiers::NONE), prompt, &mut h).unwrap();
        e.handle_key(k(KeyCode::Left, KeyModifiers::NONE), prompt, &mut h).unwrap();
        e.handle_key(k(KeyCode::Char('i'), KeyModifiers::NONE), prompt, &mut h).unwrap();

        assert_eq!(e.buffer.iter().collect::<String>(), "hii");
    }

    #[test]
    fn backspace_deletes_before_cursor() {
        let mut e = LineEditor::new();
        let mut h = History::new();
        let prompt = "jsh> ";
        let k = |code: KeyCode, mods: KeyModifiers| KeyEvent::new(code, mods);

        e.handle_key(k(KeyCode::Char('a'), KeyModifiers::NONE), prompt, &mut h).unwrap();
        e.handle_key(k(KeyCode::Char('b'), KeyModifiers::NONE), prompt, &mut h).unwrap();
        e.handle_key(k(KeyCode::Backspace, KeyModifiers::NONE), prompt, &mut h).unwrap();

        assert_eq!(e.buffer.iter().collect::<String>(), "a");
        assert_eq!(e.cursor, 1);
    }

    #[test]
    fn history_navigation_saves_and_restores_buffer() {
        let mut e = LineEditor::new();
        let mut h = history_with(&["echo hello", "ls -la"]);
        e.buffer = "pwd".chars().collect();
        e.cursor = 3;

        e.history_prev(&mut h); // -> "ls -la"
        assert_eq!(e.buffer.iter().collect::<String>(), "ls -la");
        assert_eq!(e.saved_buffer, "pwd");

        e.history_prev(&mut h); // -> "echo hello"
        assert_eq!(e.buffer.iter().collect::<String>(), "echo hello");

        e.history_prev(&mut h); // clamped at oldest
        assert_eq!(e.buffer.iter().collect::<String>(), "echo hello");

        e.history_next(&mut h); // -> "ls -la"
        assert_eq!(e.buffer.iter().collect::<String>(), "ls -la");

        e.history_next(&mut h); // -> restore "pwd"
        assert_eq!(e.buffer.iter().collect::<String>(), "pwd");

        e.history_next(&mut h); // already unset -- no-op
        assert_eq!(e.buffer.iter().collect::<String>(), "pwd");
    }

    #[test]
    fn non_tab_key_resets_completion_session() {
        let mut e = LineEditor::new();
        let mut h = History::new();
        e.completion = Some(CompletionSession {
            cycle: CompletionCycle::new(vec!["echo".into()]),
            start: 0,
            end: 0,
        });
        let prompt = "jsh> ";
        e.handle_key(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE), prompt, &mut h)
            .unwrap();
        assert!(e.completion.is_none());
    }

}
