//! Code block normalization.
//!
//! The backend only ever answers with Groovy, but it is sloppy about fences:
//! sometimes no language, sometimes a different one, sometimes the word
//! `groovy` repeated as the first line of the body. Every fenced block is
//! reduced to a canonical `groovy` block with a trimmed body.

use std::sync::LazyLock;

use regex::Regex;

pub const CANONICAL_LANGUAGE: &str = "groovy";

const FENCE_MARK: &str = "```";
const NOISE_PREFIX: &str = "groovy";

/// Triple backtick, optional language token, line break, body, triple backtick.
pub(crate) static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+#.\-]*[ \t]*\r?\n.*?```").expect("fence pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    pub body: String,
}

impl CodeBlock {
    /// Fenced form used for storage, copy and export.
    pub fn serialize(&self) -> String {
        format!("{FENCE_MARK}{}\n{}\n{FENCE_MARK}", self.language, self.body)
    }
}

/// Normalize one raw fenced block (as matched by the fence scan).
pub fn normalize(raw: &str) -> CodeBlock {
    let mut body = raw.strip_prefix(FENCE_MARK).unwrap_or(raw);

    // Everything up to the first newline is the declared language, which we ignore.
    if let Some((_, rest)) = body.split_once('\n') {
        body = rest;
    }
    body = body.strip_suffix(FENCE_MARK).unwrap_or(body);

    CodeBlock {
        language: CANONICAL_LANGUAGE.to_string(),
        body: strip_noise(body).replace("\r\n", "\n"),
    }
}

fn strip_noise(mut body: &str) -> &str {
    loop {
        body = body.trim();
        match body.strip_prefix(NOISE_PREFIX) {
            Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => body = rest,
            _ => return body,
        }
    }
}

/// Rewrite every fenced block in `text` into its canonical form, leaving prose untouched.
pub fn format_code_blocks(text: &str) -> String {
    FENCE_RE
        .replace_all(text, |caps: &regex::Captures| normalize(&caps[0]).serialize())
        .into_owned()
}
