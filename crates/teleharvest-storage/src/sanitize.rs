//! Channel name to file name conversion.

use std::sync::OnceLock;

use regex::Regex;

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\-\. ]+").expect("static regex"))
}

/// Make a channel name safe to use as a file name.
///
/// Runs of characters other than word characters, `-`, `.`, and space
/// collapse to a single `_`. Leading and trailing whitespace is trimmed
/// first.
///
/// # Example
/// ```
/// use teleharvest_storage::sanitize_filename;
/// assert_eq!(sanitize_filename(" https://t.me/lobelia4cosmetics "), "https_t.me_lobelia4cosmetics");
/// assert_eq!(sanitize_filename("CheMed123"), "CheMed123");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    unsafe_chars().replace_all(name.trim(), "_").into_owned()
}
