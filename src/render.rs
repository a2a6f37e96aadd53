use std::borrow::Cow;

use crate::value::{Params, SqlValue};

/// Driver-supplied rendering of one value as a SQL literal.
///
/// Implementations own quoting and escaping; rendered output must never be
/// interpretable beyond the literal, whatever the value contains. The MySQL
/// implementation delegates to the driver's own literal encoder.
pub trait ValueEscaper: Send + Sync {
    fn escape(&self, value: &SqlValue) -> String;
}

/// Marker that introduces a named placeholder in query templates.
pub const PLACEHOLDER_MARKER: u8 = b'@';

/// Substitute `@name` placeholders with escaped literals from the bag.
///
/// Each `@identifier` (ASCII alphanumerics and `_`) is resolved against the
/// bag: exact name first, then the `@`-prefixed key. Bound placeholders are
/// replaced with `escaper.escape(value)`; unbound ones are left verbatim.
/// That silent pass-through is long-standing behavior callers rely on for
/// MySQL user variables like `@@version` or `@prev`.
///
/// Warning: substitution is textual and applies inside quoted literals too;
/// keep the marker out of string constants that should survive untouched.
///
/// Returns a borrowed `Cow` when no substitution occurred, including when
/// the bag is `None`.
#[must_use]
pub fn render_template<'a>(
    template: &'a str,
    params: Option<&Params>,
    escaper: &dyn ValueEscaper,
) -> Cow<'a, str> {
    let Some(params) = params else {
        return Cow::Borrowed(template);
    };
    if params.is_empty() {
        return Cow::Borrowed(template);
    }

    let bytes = template.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        if bytes[idx] == PLACEHOLDER_MARKER {
            let end = scan_identifier(bytes, idx + 1);
            if end > idx + 1 {
                if let Some(value) = params.lookup(&template[idx + 1..end]) {
                    let buf = out.get_or_insert_with(String::new);
                    buf.push_str(&template[copied..idx]);
                    buf.push_str(&escaper.escape(value));
                    copied = end;
                }
                // Unbound names stay as written; the scan moves past them.
                idx = end;
                continue;
            }
        }
        idx += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&template[copied..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(template),
    }
}

/// End offset (exclusive) of the identifier starting at `start`.
fn scan_identifier(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    end
}
