use std::borrow::Cow;

use quick_xml::escape::partial_escape;

/// Escapes element text. Only `&`, `<` and `>` are replaced.
pub fn escape_text(text: &str) -> Cow<'_, str> {
    partial_escape(text)
}

/// Escapes a value for a double-quoted attribute.
pub fn escape_attr(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '<', '>', '"']) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
