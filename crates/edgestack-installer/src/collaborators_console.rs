//! Operator-facing terminal output and the browser launcher.

use std::io::{self, BufRead, Write};
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use crossterm::style::Stylize;
use crossterm::tty::IsTty;
use edgestack_core::{program_path, wrap_text, WRAP_WIDTH};
use tracing::{debug, info};

use crate::process::run_command;

pub trait Console: Send + Sync {
    /// Print one line to the operator.
    fn show(&self, line: &str);

    /// Print text wrapped to the terminal width, keeping interior newlines.
    fn show_wrapped(&self, text: &str) {
        for line in wrap_text(text, WRAP_WIDTH) {
            self.show(&line);
        }
    }

    /// Print a prompt without a trailing newline.
    fn prompt(&self, text: &str);

    /// Blocking read of one line. `None` at end of input.
    fn read_line(&self) -> io::Result<Option<String>>;

    /// Emphasised rendering of `text`, if the output supports it.
    fn bold(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Stdout console. Every shown line is also logged under the `show` target so
/// the log file holds the whole transcript.
pub struct StdConsole {
    styled: bool,
}

impl StdConsole {
    pub fn new() -> Self {
        Self {
            styled: io::stdout().is_tty(),
        }
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl Console for StdConsole {
    fn show(&self, line: &str) {
        info!(target: "show", "{line}");
        println!("{line}");
    }

    fn prompt(&self, text: &str) {
        info!(target: "show", "{text}");
        let mut stdout = io::stdout();
        let _ = write!(stdout, "{text}");
        let _ = stdout.flush();
    }

    fn read_line(&self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        Ok((read > 0).then_some(line))
    }

    fn bold(&self, text: &str) -> String {
        if self.styled {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }
}

/// Where the suggested notification address comes from.
#[async_trait]
pub trait OperatorIdentity: Send + Sync {
    async fn default_email(&self) -> Option<String>;
}

/// The operator's global git identity.
pub struct GitIdentity;

#[async_trait]
impl OperatorIdentity for GitIdentity {
    async fn default_email(&self) -> Option<String> {
        match run_command(
            "get email",
            "git",
            &["config", "--global", "user.email"],
            None,
        )
        .await
        {
            Ok(output) => Some(output.trim().to_string()).filter(|email| !email.is_empty()),
            Err(err) => {
                debug!(error = %format!("{err:#}"), "no default email from git");
                None
            }
        }
    }
}

pub trait Browser: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Hands URLs to the desktop's opener. Its output is discarded so it cannot
/// interleave with the installer transcript.
pub struct SystemBrowser;

const OPENERS: &[&str] = &["xdg-open", "open"];

impl Browser for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        let opener = OPENERS
            .iter()
            .find_map(|name| program_path(name))
            .ok_or_else(|| anyhow!("no browser opener found in PATH"))?;
        Command::new(&opener)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch {}", opener.display()))?;
        info!(url, "opened browser");
        Ok(())
    }
}
