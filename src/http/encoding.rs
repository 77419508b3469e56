//! Percent-decoding, form decoding and HTML escaping.
//!
//! Decoding never fails: a `%` that is not followed by two hex digits is
//! copied through literally, and byte sequences that are not valid UTF-8
//! are replaced rather than rejected.

use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use url::form_urlencoded;

/// Decodes `%xx` escapes in a resource path. `+` is left untouched.
pub fn percent_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

/// Parses `a=1&b=2` pairs with query rules (`+` is a space). Later
/// duplicates overwrite earlier ones and a key without `=` maps to the
/// empty string. Empty segments are skipped.
pub fn parse_urlencoded(input: &str) -> IndexMap<String, String> {
    form_urlencoded::parse(input.as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect()
}

/// Replaces `& " ' > <` with named entities. No other character is touched.
pub fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '>' => out.push_str("&gt;"),
            '<' => out.push_str("&lt;"),
            c => out.push(c),
        }
    }
    out
}
