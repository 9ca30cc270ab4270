//! XHTML serialisation of a [`Dom`] subtree.
//!
//! Output is well-formed XML: text and attribute values are escaped, void
//! elements without children are self-closed and comments are dropped.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

use super::arena::{Dom, NodeData, NodeId};
use super::is_void;

static RE_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap());

/// Escape text for use in XML content or a double-quoted attribute.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Decode character references found in attribute values and `<title>` text.
///
/// Handles numeric references and the handful of named ones that show up
/// in URLs and titles; unknown names are left as written.
pub fn unescape(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    RE_ENTITY.replace_all(s, |caps: &regex::Captures| {
        let body = &caps[1];
        let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = body.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            match body {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                "ndash" => Some('\u{2013}'),
                "mdash" => Some('\u{2014}'),
                "hellip" => Some('\u{2026}'),
                "lsquo" => Some('\u{2018}'),
                "rsquo" => Some('\u{2019}'),
                "ldquo" => Some('\u{201c}'),
                "rdquo" => Some('\u{201d}'),
                "middot" => Some('\u{b7}'),
                _ => None,
            }
        };
        match decoded {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        }
    })
}

/// Render the children of `id` (not `id` itself).
pub fn render_children(dom: &Dom, id: NodeId) -> String {
    let mut out = String::new();
    for child in dom.children(id) {
        render_node(dom, child, &mut out);
    }
    out
}

/// Render `id` and its subtree.
pub fn render(dom: &Dom, id: NodeId) -> String {
    let mut out = String::new();
    render_node(dom, id, &mut out);
    out
}

fn render_node(dom: &Dom, id: NodeId, out: &mut String) {
    match dom.data(id) {
        Some(NodeData::Text(t)) => out.push_str(&escape(t)),
        Some(NodeData::Raw(markup)) => out.push_str(markup),
        Some(NodeData::Element { name, attrs }) => {
            let tag = &*name.local;
            out.push('<');
            out.push_str(tag);
            for a in attrs {
                out.push(' ');
                out.push_str(&a.key());
                out.push_str("=\"");
                out.push_str(&escape(&a.value));
                out.push('"');
            }
            if is_void(tag) && dom.first_child(id).is_none() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in dom.children(id) {
                render_node(dom, child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        Some(NodeData::Document) => {
            for child in dom.children(id) {
                render_node(dom, child, out);
            }
        }
        Some(NodeData::Comment(_)) | Some(NodeData::Doctype) | None => {}
    }
}
