//! Parsing of `"Name" <email>` sender strings.
use crate::model::SenderIdentity;
use once_cell::sync::Lazy;
use regex::Regex;

static FROM_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^"([^"]+)"\s+<([^>]+)>$"#).expect("valid sender regex"));

/// Parse a sender label such as `"Newsroom" <news@example.org>`.
/// Returns `None` for anything not in exactly that form.
pub fn parse_from_label(label: &str) -> Option<SenderIdentity> {
    let caps = FROM_LABEL.captures(label.trim())?;
    SenderIdentity::new(Some(caps[1].to_string()), &caps[2])
}
