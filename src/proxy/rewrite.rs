//! Textual rewriting of `/serverinfo` documents.
//!
//! Fields are located as the first `<tag>` and the first `</tag>` after it,
//! and only the text between them is replaced. Everything else in the
//! document, whitespace and formatting included, passes through untouched.

use std::ops::Range;

/// Appended to the host name so the relay is distinguishable from the host.
pub const HOSTNAME_SUFFIX: &str = " (Open)";

/// Addresses the relay reports in place of the host's own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedAddresses {
    pub local: String,
    pub external: String,
}

fn element_range(xml: &str, tag: &str) -> Option<Range<usize>> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let start = xml.find(&open)? + open.len();
    let end = start + xml[start..].find(&close)?;
    Some(start..end)
}

/// Raw text between `<tag>` and `</tag>`, without unescaping.
pub fn element_text<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    element_range(xml, tag).map(|range| &xml[range])
}

/// Replace the raw text of `<tag>`. `None` when the element is absent.
pub fn replace_element(xml: &str, tag: &str, value: &str) -> Option<String> {
    let range = element_range(xml, tag)?;

    let mut patched = String::with_capacity(xml.len() - range.len() + value.len());
    patched.push_str(&xml[..range.start]);
    patched.push_str(value);
    patched.push_str(&xml[range.end..]);
    Some(patched)
}

/// Change the first character so the relay presents as a different device:
/// `a` if it was a decimal digit, `0` otherwise.
pub fn rewrite_unique_id(unique_id: &str) -> String {
    let mut chars = unique_id.chars();
    match chars.next() {
        Some(first) => {
            let replacement = if first.is_ascii_digit() { 'a' } else { '0' };
            std::iter::once(replacement).chain(chars).collect()
        }
        None => String::new(),
    }
}

/// Apply every `/serverinfo` rewrite. Absent fields are logged and skipped.
pub fn rewrite_server_info(xml: &str, reported: &ReportedAddresses) -> String {
    let mut doc = xml.to_string();

    doc = patch(doc, "LocalIP", |_| reported.local.clone());
    doc = patch(doc, "ExternalIP", |_| reported.external.clone());
    doc = patch(doc, "hostname", |name| format!("{name}{HOSTNAME_SUFFIX}"));
    doc = patch(doc, "uniqueid", rewrite_unique_id);

    doc
}

fn patch(doc: String, tag: &str, rewrite: impl FnOnce(&str) -> String) -> String {
    let Some(current) = element_text(&doc, tag) else {
        tracing::warn!(tag, "Tag not found in server info; leaving it unchanged");
        return doc;
    };

    let value = rewrite(current);
    match replace_element(&doc, tag, &value) {
        Some(patched) => patched,
        None => doc,
    }
}
