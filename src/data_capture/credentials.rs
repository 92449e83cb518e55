//! Credential extraction and the truncation rules applied at the capture
//! boundary. Nothing captured from a peer leaves this module longer than the
//! limits below.

use regex::Regex;
use std::sync::LazyLock;

pub const MAX_USERNAME_LEN: usize = 50;
pub const MAX_PASSWORD_LEN: usize = 100;
pub const MAX_COMMAND_LEN: usize = 512;

/// Username recorded when data arrived but no line looked like a credential.
pub const FALLBACK_USERNAME: &str = "unknown";

const CREDENTIAL_SEPARATOR: char = ':';

// Constant pattern, compiled once.
static CREDENTIAL_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)user|pass").expect("credential hint pattern is valid"));

/// A username/password pair, already truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: truncate(username, MAX_USERNAME_LEN),
            password: truncate(password, MAX_PASSWORD_LEN),
        }
    }
}

/// Truncates to at most `max` characters, never splitting a code point.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Whether a line looks like part of a login exchange.
pub fn is_candidate_line(line: &str) -> bool {
    line.contains(CREDENTIAL_SEPARATOR) || CREDENTIAL_HINT.is_match(line)
}

/// Splits `user:pass` framed text. Only the first two `:` fields are used,
/// both trimmed. `None` when the text has no separator.
pub fn split_credential_pair(text: &str) -> Option<Credentials> {
    let mut parts = text.split(CREDENTIAL_SEPARATOR);
    let username = parts.next()?;
    let password = parts.next()?;
    Some(Credentials::new(username.trim(), password.trim()))
}

/// Scans a captured chunk line by line and returns one pair per candidate
/// line that actually splits. A hint line without a separator yields nothing.
pub fn extract_credentials(text: &str) -> Vec<Credentials> {
    text.split('\n')
        .filter(|line| is_candidate_line(line))
        .filter_map(split_credential_pair)
        .collect()
}

/// Pair recorded for data that matched no credential line.
pub fn fallback_credentials(raw: &str) -> Credentials {
    Credentials {
        username: FALLBACK_USERNAME.to_string(),
        password: truncate(raw, MAX_PASSWORD_LEN),
    }
}

/// Lossy UTF-8 rendering of captured bytes.
pub fn payload_preview(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}
