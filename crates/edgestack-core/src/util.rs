//! Shared helper utilities used by the installer and CLI.

use std::env;
use std::path::{Path, PathBuf};

const LOG_SNIPPET_LIMIT: usize = 512;

/// Terminal width used for operator-facing text.
pub const WRAP_WIDTH: usize = 79;

/// Resolve a program against $PATH, the way a shell would.
pub fn program_path(program: &str) -> Option<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        let path = Path::new(program);
        return path.is_file().then(|| path.to_path_buf());
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Sanitizes a log string by stripping newlines and capping length.
pub fn sanitize_log_value(value: &str, max_len: usize) -> String {
    if max_len == 0 {
        return String::new();
    }
    let mut cleaned = String::with_capacity(max_len.min(value.len()));
    let mut truncated = false;
    for (count, ch) in value.chars().enumerate() {
        if count >= max_len {
            truncated = true;
            break;
        }
        cleaned.push(if ch == '\n' || ch == '\r' { ' ' } else { ch });
    }
    let trimmed = cleaned.trim();
    if truncated {
        format!("{trimmed}...")
    } else {
        trimmed.to_string()
    }
}

/// Produces a bounded single-line snippet of command output for the log.
pub fn log_snippet(value: &str) -> String {
    sanitize_log_value(value, LOG_SNIPPET_LIMIT)
}

/// Greedy word wrap of a single paragraph. Words longer than the width are
/// left on their own line rather than split.
pub fn wrap_paragraph(text: &str, width: usize) -> Vec<String> {
    let mut words = text.split_whitespace();
    let Some(first) = words.next() else {
        return vec![String::new()];
    };
    let mut lines = Vec::new();
    let mut current = first.to_string();
    for word in words {
        if current.len() + 1 + word.len() > width {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current.push(' ');
            current.push_str(word);
        }
    }
    lines.push(current);
    lines
}

/// Wrap multi-line text: leading/trailing newlines are dropped, interior
/// newlines are preserved, and each paragraph is wrapped independently.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    text.trim_matches('\n')
        .split('\n')
        .flat_map(|para| wrap_paragraph(para, width))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_log_value_strips_newlines_and_caps() {
        assert_eq!(sanitize_log_value("ab\ncd\rEF", 5), "ab cd...");
        assert_eq!(sanitize_log_value("ok", 5), "ok");
        assert_eq!(sanitize_log_value("anything", 0), "");
    }

    #[test]
    fn wraps_at_width_without_splitting_words() {
        let lines = wrap_paragraph("one two three four", 9);
        assert_eq!(lines, vec!["one two", "three", "four"]);

        let long = wrap_paragraph("supercalifragilistic ok", 5);
        assert_eq!(long, vec!["supercalifragilistic", "ok"]);
    }

    #[test]
    fn wrap_text_keeps_interior_blank_lines() {
        let lines = wrap_text("\nfirst\n\nsecond\n", 79);
        assert_eq!(lines, vec!["first", "", "second"]);
    }

    #[test]
    fn program_path_accepts_explicit_paths() {
        assert_eq!(program_path("/definitely/not/here/kubectl"), None);
    }
}
