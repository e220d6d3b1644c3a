//! Wildcard expansion of stage arguments against the filesystem.
//!
//! Ported from the split-on-last-slash algorithm in the original C's
//! `glob.c`, using the `glob` crate's `Pattern` matcher in place of the
//! original's `fnmatch()`.

use std::path::Path;

fn has_glob_chars(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

/// Expand a single wildcard pattern against the directory it names (or `.`),
/// returning matched entry names (directory-prefixed if the pattern had a
/// directory component), `.`/`..` excluded, in directory read order.
fn expand_pattern(pattern: &str) -> Vec<String> {
    let (dir, file_pattern) = match pattern.rfind('/') {
        Some(idx) => (&pattern[..idx], &pattern[idx + 1..]),
        None => ("", pattern),
    };

    if !has_glob_chars(file_pattern) {
        return vec![pattern.to_string()];
    }

    let dir_path = if dir.is_empty() { "." } else { dir };
    let Ok(glob_pattern) = glob::Pattern::new(file_pattern) else {
        return Vec::new();
    };
    let Ok(entries) = std::fs::read_dir(dir_path) else {
        return Vec::new();
    };

    let mut matches = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name == "." || name == ".." {
            continue;
        }
        if glob_pattern.matches(name) {
            if dir.is_empty() {
                matches.push(name.to_string());
            } else {
                matches.push(Path::new(dir).join(name).to_string_lossy().into_owned());
            }
        }
    }
    matches
}

/// Expand glob patterns in `argv[1..]`. `argv[0]` (the command name) is
/// always preserved verbatim. A pattern with zero matches is kept as its
/// original literal word, so a line with no matching pattern at all comes
/// back identical to the input.
pub fn expand_argv(argv: &[String]) -> Vec<String> {
    if argv.is_empty() {
        return argv.to_vec();
    }

    let mut expanded = vec![argv[0].clone()];

    for arg in &argv[1..] {
        if has_glob_chars(arg) {
            let matches = expand_pattern(arg);
            if matches.is_empty() {
                expanded.push(arg.clone());
            } else {
                expanded.extend(matches);
            }
        } else {
            expanded.push(arg.clone());
        }
    }

    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct TempDir(std::path::PathBuf);
    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn make_temp_dir(name: &str) -> TempDir {
        let dir = std::env::temp_dir().join(format!("minishell-glob-test-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        TempDir(dir)
    }

    #[test]
    fn command_name_is_always_preserved() {
        let argv = vec!["ls".to_string(), "*.nonexistent_ext_xyz".to_string()];
        let expanded = expand_argv(&argv);
        assert_eq!(expanded[0], "ls");
    }

    #[test]
    fn no_glob_chars_passes_through() {
        let argv = vec!["echo".to_string(), "hello".to_string()];
        assert_eq!(expand_argv(&argv), argv);
    }

    #[test]
    fn zero_matches_keeps_pattern_literal() {
        let argv = vec!["ls".to_string(), "*.definitely_not_here_xyz".to_string()];
        let expanded = expand_argv(&argv);
        assert_eq!(expanded, argv);
    }

    #[test]
    fn matches_expand_and_sort_stable_with_dir_prefix() {
        let tmp = make_temp_dir("matches");
        fs::write(tmp.0.join("a.txt"), "").unwrap();
        fs::write(tmp.0.join("b.txt"), "").unwrap();
        let pattern = format!("{}/*.txt", tmp.0.display());
        let argv = vec!["cat".to_string(), pattern];
        let expanded = expand_argv(&argv);
        assert_eq!(expanded[0], "cat");
        assert_eq!(expanded.len(), 3);
    }
}
