//! Hand-written left-to-right scanner: one input line → a [`Sequence`] of
//! [`Pipeline`]s of [`Stage`]s, with redirections and POSIX-ish quoting.
//!
//! A *word* is a concatenation of fragments — unquoted runs, backslash
//! escapes, single-quoted spans (fully literal), and double-quoted spans
//! (`\n \" \\` decode, other `\x` → `x`). Redirections (`<`, `>`, `>>`) may
//! appear anywhere a word could, interleaved with argument words.

use crate::ast::{Pipeline, Sequence, Stage};
use crate::redirect::{RedirectKind, Redirection};

fn is_ws(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn is_stopper(c: char) -> bool {
    matches!(c, '|' | ';' | '&')
}

/// Parse one fragment-concatenated word starting at `chars[*i]`.
///
/// Returns `None` if the cursor didn't move at all (i.e. the next byte is
/// whitespace, EOF, or a metacharacter) — callers use this to detect "no
/// word here" without confusing it with an empty-but-present quoted word
/// (`""` is a word, just an empty one; the cursor still advances past it).
fn parse_word(chars: &[char], i: &mut usize) -> Option<String> {
    let n = chars.len();
    let start = *i;
    let mut buf = String::new();

    while *i < n {
        let c = chars[*i];
        if is_ws(c) || is_stopper(c) || c == '<' || c == '>' {
            break;
        }
        match c {
            '\\' => {
                *i += 1;
                if *i < n {
                    buf.push(chars[*i]);
                    *i += 1;
                }
            }
            '\'' => {
                *i += 1;
                while *i < n && chars[*i] != '\'' {
                    buf.push(chars[*i]);
                    *i += 1;
                }
                if *i < n && chars[*i] == '\'' {
                    *i += 1;
                }
            }
            '"' => {
                *i += 1;
                while *i < n && chars[*i] != '"' {
                    let ch = chars[*i];
                    if ch == '\\' && *i + 1 < n {
                        let esc = chars[*i + 1];
                        buf.push(match esc {
                            'n' => '\n',
                            '"' => '"',
                            '\\' => '\\',
                            other => other,
                        });
                        *i += 2;
                    } else {
                        buf.push(ch);
                        *i += 1;
                    }
                }
                if *i < n && chars[*i] == '"' {
                    *i += 1;
                }
            }
            _ => {
                buf.push(c);
                *i += 1;
            }
        }
    }

    if *i == start { None } else { Some(buf) }
}

/// Parse one logical input line into a sequence of pipelines.
///
/// Returns `Err` on a syntax error (a redirection with no filename), in
/// which case the caller should diagnose and drop the line — there is no
/// partial result to recover.
pub fn parse_line(line: &str) -> Result<Sequence, String> {
    let chars: Vec<char> = line.chars().collect();
    let n = chars.len();
    let mut i = 0usize;
    let mut seq = Sequence::new();

    while i < n {
        while i < n && is_ws(chars[i]) {
            i += 1;
        }
        if i >= n {
            break;
        }

        let mut stages: Vec<Stage> = Vec::new();

        loop {
            let mut argv: Vec<String> = Vec::new();
            let mut redirs: Vec<Redirection> = Vec::new();

            loop {
                while i < n && is_ws(chars[i]) {
                    i += 1;
                }
                if i >= n || is_stopper(chars[i]) {
                    break;
                }

                if chars[i] == '<' || chars[i] == '>' {
                    let kind = if chars[i] == '<' {
                        i += 1;
                        RedirectKind::In
                    } else {
                        i += 1;
                        if i < n && chars[i] == '>' {
                            i += 1;
                            RedirectKind::Append
                        } else {
                            RedirectKind::Out
                        }
                    };
                    while i < n && is_ws(chars[i]) {
                        i += 1;
                    }
                    match parse_word(&chars, &mut i) {
                        Some(fname) => redirs.push(Redirection::new(kind, fname)),
                        None => {
                            return Err(
                                "syntax error: missing filename after redirection".to_string()
                            );
                        }
                    }
                    continue;
                }

                match parse_word(&chars, &mut i) {
                    Some(w) => argv.push(w),
                    None => break,
                }
            }

            if !argv.is_empty() {
                stages.push(Stage { argv, redirs });
            }

            while i < n && is_ws(chars[i]) {
                i += 1;
            }
            if i < n && chars[i] == '|' {
                i += 1;
                continue;
            }
            break;
        }

        let mut background = false;
        while i < n && is_ws(chars[i]) {
            i += 1;
        }
        if i < n && chars[i] == '&' {
            background = true;
            i += 1;
        }
        while i < n && is_ws(chars[i]) {
            i += 1;
        }
        if i < n && chars[i] == ';' {
            i += 1;
        }

        if !stages.is_empty() {
            seq.push(Pipeline { stages, background });
        }
    }

    Ok(seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(seq: &Sequence, pipeline: usize, stage: usize) -> &[String] {
        &seq[pipeline].stages[stage].argv
    }

    #[test]
    fn simple_command() {
        let seq = parse_line("echo hello world").unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(words(&seq, 0, 0), &["echo", "hello", "world"]);
    }

    #[test]
    fn single_quotes_are_literal() {
        let seq = parse_line("echo 'a b'").unwrap();
        assert_eq!(words(&seq, 0, 0), &["echo", "a b"]);
    }

    #[test]
    fn double_quotes_decode_escapes() {
        let seq = parse_line(r#"echo "a b""#).unwrap();
        assert_eq!(words(&seq, 0, 0), &["echo", "a b"]);

        let seq = parse_line(r#"echo "line\nbreak""#).unwrap();
        assert_eq!(seq[0].stages[0].argv[1], "line\nbreak");

        let seq = parse_line(r#"echo "a\tb""#).unwrap();
        assert_eq!(seq[0].stages[0].argv[1], "atb"); // \t is not special: decodes to literal t
    }

    #[test]
    fn backslash_escapes_one_byte() {
        let seq = parse_line(r"echo a\ b").unwrap();
        assert_eq!(words(&seq, 0, 0), &["echo", "a b"]);
    }

    #[test]
    fn fragments_concatenate() {
        let seq = parse_line(r#"echo foo"bar"'baz'"#).unwrap();
        assert_eq!(words(&seq, 0, 0), &["echo", "foobarbaz"]);
    }

    #[test]
    fn empty_quoted_word_is_preserved() {
        let seq = parse_line(r#"echo "" x"#).unwrap();
        assert_eq!(words(&seq, 0, 0), &["echo", "", "x"]);
    }

    #[test]
    fn unterminated_single_quote_is_accepted() {
        let seq = parse_line("echo 'abc").unwrap();
        assert_eq!(words(&seq, 0, 0), &["echo", "abc"]);
    }

    #[test]
    fn redirections_collected_in_parse_order() {
        let seq = parse_line("sort < in.txt > out.txt").unwrap();
        let stage = &seq[0].stages[0];
        assert_eq!(stage.argv, vec!["sort"]);
        assert_eq!(stage.redirs.len(), 2);
        assert_eq!(stage.redirs[0].kind, RedirectKind::In);
        assert_eq!(stage.redirs[0].path, "in.txt");
        assert_eq!(stage.redirs[1].kind, RedirectKind::Out);
        assert_eq!(stage.redirs[1].path, "out.txt");
    }

    #[test]
    fn append_redirection() {
        let seq = parse_line("echo hi >> out.txt").unwrap();
        assert_eq!(seq[0].stages[0].redirs[0].kind, RedirectKind::Append);
    }

    #[test]
    fn missing_redirection_target_is_syntax_error() {
        assert!(parse_line("echo hi >").is_err());
        assert!(parse_line("cat <").is_err());
    }

    #[test]
    fn pipeline_splits_on_pipe() {
        let seq = parse_line("echo hello | grep he").unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].stages.len(), 2);
        assert_eq!(words(&seq, 0, 0), &["echo", "hello"]);
        assert_eq!(words(&seq, 0, 1), &["grep", "he"]);
    }

    #[test]
    fn background_flag_applies_to_whole_pipeline() {
        let seq = parse_line("sleep 1 &").unwrap();
        assert!(seq[0].background);
    }

    #[test]
    fn semicolon_separates_sequence() {
        let seq = parse_line("echo a ; echo b").unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(words(&seq, 0, 0), &["echo", "a"]);
        assert_eq!(words(&seq, 1, 0), &["echo", "b"]);
    }

    #[test]
    fn empty_stages_are_dropped_silently() {
        let seq = parse_line(";;  ;").unwrap();
        assert!(seq.is_empty());
    }

    #[test]
    fn empty_input_yields_empty_sequence() {
        assert!(parse_line("").unwrap().is_empty());
        assert!(parse_line("   ").unwrap().is_empty());
    }
}
