//! Scrub credentials out of anything that ends up in logs.

use lazy_static::lazy_static;
use regex::Regex;

pub const REDACTED: &str = "[REDACTED]";

lazy_static! {
    /// A JSON member whose name mentions a credential, with a string, number or boolean value.
    /// Members quoted inside another JSON string (`\"password\":\"...\"`) match too.
    static ref SENSITIVE_MEMBER: Regex = Regex::new(
        r#"(?i)(\\?"[^"\\]*(?:password|token|secret|key|auth)[^"\\]*\\?"\s*:\s*)(\\"(?:[^"\\]|\\[^"])*\\"|"(?:[^"\\]|\\.)*"|-?[0-9][0-9.eE+-]*|true|false)"#
    )
    .expect("sensitive member pattern is valid");

    /// `name=value` pairs in query strings and free text.
    static ref SENSITIVE_PAIR: Regex = Regex::new(
        r"(?i)\b([a-z_]*(?:password|token|secret|key|auth)[a-z_]*=)[^&\s]+"
    )
    .expect("sensitive pair pattern is valid");
}

/// Replace the values of sensitive fields in `text` with [`REDACTED`].
///
/// Works on JSON bodies as well as on `key=value` text, so it is safe to use on any diagnostic
/// string before it is logged.
pub fn redact(text: &str) -> String {
    let text = SENSITIVE_MEMBER.replace_all(text, |caps: &regex::Captures| {
        if caps[2].starts_with('\\') {
            format!("{}\\\"{}\\\"", &caps[1], REDACTED)
        } else {
            format!("{}\"{}\"", &caps[1], REDACTED)
        }
    });
    SENSITIVE_PAIR
        .replace_all(&text, |caps: &regex::Captures| {
            format!("{}{}", &caps[1], REDACTED)
        })
        .into_owned()
}
