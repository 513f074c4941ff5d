//! Literal tag scanning over server payloads.
//!
//! Servers wrap structured replies in `<name>...</name>` markers. This is not
//! an XML parser: a field is the text between the first `<name>` and the first
//! `</name>` after it, found by plain substring search. Nesting, attributes and
//! escapes are not understood, and callers rely on exactly that tie-break.

/// Whitespace removed from both ends of an extracted value.
const TRIM: [char; 4] = [' ', '\t', '\n', '\r'];

/// Return the raw text between the first `<tag>` and the first `</tag>` after it.
pub fn span<'a>(payload: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let start = payload.find(&open)? + open.len();
    let len = payload[start..].find(&close)?;
    Some(&payload[start..start + len])
}

/// Extract the trimmed content of `tag`, or `None` if the marker pair is absent.
///
/// An empty or all-whitespace body yields `Some("")`.
pub fn extract<'a>(payload: &'a str, tag: &str) -> Option<&'a str> {
    span(payload, tag).map(trim)
}

/// Trim spaces, tabs, newlines and carriage returns from both ends.
pub fn trim(value: &str) -> &str {
    value.trim_matches(&TRIM[..])
}

/// Walk successive `<tag>...</tag>` bodies in order of appearance.
///
/// Each step finds the next open marker after the cursor, then the first close
/// marker after it, and moves the cursor past that close marker. Bodies are
/// yielded untrimmed. The walk stops at the first open marker without a close.
pub fn entries<'a>(payload: &'a str, tag: &str) -> Entries<'a> {
    Entries {
        rest: payload,
        open: format!("<{}>", tag),
        close: format!("</{}>", tag),
    }
}

/// Iterator returned by [`entries`].
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    rest: &'a str,
    open: String,
    close: String,
}

impl<'a> Iterator for Entries<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.rest.find(&self.open)? + self.open.len();
        let body = &self.rest[start..];
        match body.find(&self.close) {
            Some(len) => {
                self.rest = &body[len + self.close.len()..];
                Some(&body[..len])
            }
            None => {
                self.rest = "";
                None
            }
        }
    }
}
