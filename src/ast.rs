//! The parsed command graph: a sequence of pipelines, each a sequence of stages.
//!
//! This is a straight re-shaping of the C original's singly-linked
//! `next_pipe`/`next_seq` `command_t` chain into an owned tree with no
//! back-pointers — see the "Pointer-linked command graph" design note.

use crate::redirect::Redirection;

/// One command within a pipeline: argv plus its own redirections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// `argv[0]` is the program name; never empty (parser drops empty stages).
    pub argv: Vec<String>,
    /// Applied in this order; a later redirection of the same stream wins.
    pub redirs: Vec<Redirection>,
}

impl Stage {
    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}

/// Stages joined by `|`, sharing one process group and one background flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub background: bool,
}

impl Pipeline {
    pub fn is_single_stage(&self) -> bool {
        self.stages.len() == 1
    }
}

/// One parsed input line: pipelines joined by `;` or newline, executed left to right.
pub type Sequence = Vec<Pipeline>;
