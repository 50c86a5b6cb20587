//! Subprocess execution with output logging.

use std::ffi::OsStr;
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use edgestack_core::log_snippet;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Run a command to completion and return its stdout. Both streams are
/// logged; a non-zero exit becomes an error carrying a stderr snippet.
pub(crate) async fn run_command<S: AsRef<OsStr>>(
    label: &str,
    program: impl AsRef<OsStr>,
    args: &[S],
    input: Option<&str>,
) -> Result<String> {
    let mut command = Command::new(program.as_ref());
    command
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    info!(label, command = %format_command(program.as_ref(), args), "running");

    let mut child = command
        .spawn()
        .with_context(|| format!("command failed to start: {label}"))?;

    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin
            .write_all(input.as_bytes())
            .await
            .with_context(|| format!("failed to write input: {label}"))?;
    }

    let output = child
        .wait_with_output()
        .await
        .with_context(|| format!("command failed to run: {label}"))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stdout.lines() {
        debug!(label, "-- {}", log_snippet(line));
    }
    for line in stderr.lines() {
        debug!(label, "!! {}", log_snippet(line));
    }

    if output.status.success() {
        Ok(stdout)
    } else {
        Err(anyhow!(
            "{label} failed ({}): {}",
            output.status,
            log_snippet(stderr.trim())
        ))
    }
}

fn format_command<S: AsRef<OsStr>>(program: &OsStr, args: &[S]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(AsRef::as_ref))
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_command_line() {
        let line = format_command(OsStr::new("kubectl"), &["get", "pods"]);
        assert_eq!(line, "kubectl get pods");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_feeds_stdin() {
        let out = run_command("cat", "cat", &[] as &[&str], Some("hello\n"))
            .await
            .expect("cat runs");
        assert_eq!(out, "hello\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let err = run_command("false", "false", &[] as &[&str], None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("false failed"));
    }
}
