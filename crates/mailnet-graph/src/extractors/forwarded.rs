//! Forwarded header extraction.
//!
//! Scans message bodies for header blocks of forwarded or quoted mail and
//! yields the participants they name. This is a best-effort heuristic, not an
//! RFC 5322 parser:
//! - header lines are recognised anywhere in the body, after any quoting
//!   (`>`), indentation, or markdown emphasis (`**From:**`)
//! - `From:` takes the address in angle brackets if present, else the first
//!   address-shaped token; the text before it is the display name
//! - `To:` and `Cc:` take every address-shaped token on the line and on
//!   indented continuation lines that follow it
//! - no-reply style mailboxes are dropped
//!
//! Known misses: headers with the field name split across lines, and
//! non-Latin field names (`De:`, `Von:`). Indented body text directly under
//! a `To:`/`Cc:` line can be picked up as a continuation.

use once_cell::sync::Lazy;
use regex::Regex;

/// A header field line inside a body.
static HEADER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(from|to|cc)[*_]*\s*:[*_\s]*(.*)$").expect("Invalid header line regex")
});

/// Generic address-shaped token.
static ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w.+-]+@[\w.-]+\.\w+").expect("Invalid address regex"));

/// Address wrapped in angle brackets.
static ANGLE_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<\s*(?:mailto:)?([\w.+-]+@[\w.-]+\.\w+)\s*>").expect("Invalid angle address regex")
});

const NO_REPLY_PREFIXES: &[&str] = &["no-reply", "noreply", "no_reply", "donotreply", "do-not-reply"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    From,
    To,
    Cc,
}

/// One participant named in a forwarded header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCandidate {
    /// Lowercased raw address, not yet resolved.
    pub address: String,
    /// Display name from a `From:` line; empty otherwise.
    pub name: String,
    pub field: HeaderField,
}

/// Extract every header participant from `body`. Never fails; a body without
/// header lines yields an empty list.
pub fn extract_candidates(body: &str) -> Vec<HeaderCandidate> {
    let mut candidates = Vec::new();
    // Set while inside a To:/Cc: field that may continue on indented lines.
    let mut continuation: Option<HeaderField> = None;

    for raw_line in body.lines() {
        let line = strip_line_prefix(raw_line);

        if let Some(caps) = HEADER_LINE.captures(line) {
            let field = match caps[1].to_ascii_lowercase().as_str() {
                "from" => HeaderField::From,
                "to" => HeaderField::To,
                _ => HeaderField::Cc,
            };
            let rest = caps.get(2).map_or("", |m| m.as_str());

            if field == HeaderField::From {
                continuation = None;
                candidates.extend(parse_from(rest));
            } else {
                continuation = Some(field);
                candidates.extend(parse_list(rest, field));
            }
            continue;
        }

        match continuation {
            Some(field) if is_continuation(raw_line, line) => {
                candidates.extend(parse_list(line, field));
            }
            _ => continuation = None,
        }
    }

    candidates
}

/// Drop quoting, indentation and leading markdown emphasis.
fn strip_line_prefix(line: &str) -> &str {
    line.trim_start_matches(|c: char| c.is_whitespace() || c == '>' || c == '*' || c == '_')
        .trim_end()
}

fn is_continuation(raw_line: &str, stripped: &str) -> bool {
    raw_line.starts_with(|c: char| c == ' ' || c == '\t') && !stripped.is_empty()
}

fn parse_from(rest: &str) -> Option<HeaderCandidate> {
    let (address, name_part) = if let Some(caps) = ANGLE_ADDRESS.captures(rest) {
        let whole = caps.get(0)?;
        (caps.get(1)?.as_str(), &rest[..whole.start()])
    } else {
        let found = ADDRESS.find(rest)?;
        (found.as_str(), &rest[..found.start()])
    };

    let address = normalize_address(address)?;
    Some(HeaderCandidate {
        address,
        name: clean_name(name_part),
        field: HeaderField::From,
    })
}

fn parse_list(text: &str, field: HeaderField) -> Vec<HeaderCandidate> {
    ADDRESS
        .find_iter(text)
        .filter_map(|m| normalize_address(m.as_str()))
        .map(|address| HeaderCandidate {
            address,
            name: String::new(),
            field,
        })
        .collect()
}

/// Lowercase and trim trailing punctuation. Returns `None` for no-reply
/// mailboxes and anything that is no longer address-shaped.
fn normalize_address(raw: &str) -> Option<String> {
    let address = raw
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | '>' | ',' | ';' | '"' | ')' | ']'))
        .to_lowercase();

    let (local, domain) = address.split_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    if NO_REPLY_PREFIXES.iter().any(|p| local.starts_with(p)) {
        return None;
    }
    Some(address)
}

fn clean_name(raw: &str) -> String {
    let mut name = raw.trim();
    for suffix in ["mailto:", "[", "("] {
        if name.to_ascii_lowercase().ends_with(suffix) {
            name = name[..name.len() - suffix.len()].trim_end();
        }
    }
    name.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
        .to_string()
}
