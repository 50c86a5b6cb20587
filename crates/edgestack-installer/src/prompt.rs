//! Interactive email collection.
//!
//! The console read blocks, so it runs on its own thread and the caller races
//! it against cancellation. A cancelled read is abandoned, not joined.

use std::sync::{Arc, OnceLock};
use std::thread;

use regex::Regex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::collaborators::Console;
use crate::messages::EMAIL_QUERY_FALLBACK;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";

static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

pub fn is_valid_email(text: &str) -> bool {
    match EMAIL_REGEX.get_or_init(|| Regex::new(EMAIL_PATTERN).ok()) {
        Some(regex) => regex.is_match(text),
        None => text.contains('@'),
    }
}

/// Prompt until a valid address is entered. A blank answer accepts the
/// default; a failed or exhausted read settles for the fallback address.
pub(crate) fn read_email(console: &dyn Console, default: Option<&str>) -> String {
    let (prompt, fallback) = match default {
        Some(default) => (format!("Email address [{default}]: "), default),
        None => ("Email address: ".to_string(), EMAIL_QUERY_FALLBACK),
    };

    loop {
        console.prompt(&prompt);
        let line = match console.read_line() {
            Ok(Some(line)) => line,
            Ok(None) => {
                warn!("email query reached end of input");
                return fallback.to_string();
            }
            Err(err) => {
                warn!(error = %err, "email query failed");
                return fallback.to_string();
            }
        };

        let text = line.trim();
        match default {
            Some(default) if text.is_empty() => return default.to_string(),
            _ if is_valid_email(text) => return text.to_string(),
            _ => console.show(&format!(
                "Sorry, {text:?} does not appear to be a valid email address.  \
                 Please check it and try again."
            )),
        }
    }
}

/// `None` when the run was cancelled before an answer arrived.
pub(crate) async fn ask_email(
    console: Arc<dyn Console>,
    default: Option<String>,
    cancel: &CancellationToken,
) -> Option<String> {
    let (tx, rx) = oneshot::channel();
    thread::spawn(move || {
        let email = read_email(console.as_ref(), default.as_deref());
        let _ = tx.send(email);
    });

    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        email = rx => email.ok(),
    }
}
