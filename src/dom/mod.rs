//! HTML parsing into an arena DOM and XHTML serialisation.
//!
//! Parsing goes through html5ever, so malformed input (unclosed tags,
//! misnested formatting, stray table content) is repaired with the same
//! algorithm browsers use.

mod arena;
mod serialize;
mod sink;

pub use arena::{Attr, Dom, Node, NodeData, NodeId};
pub use serialize::{escape, render, render_children, unescape};
pub use sink::DomSink;

use html5ever::driver::ParseOpts;
use html5ever::tendril::TendrilSink;

/// Parse a full HTML document (or fragment; html/head/body are implied).
pub fn parse_document(html: &str) -> Dom {
    html5ever::parse_document(DomSink::new(), ParseOpts::default())
        .one(html)
        .into_dom()
}

/// Elements serialised as `<tag/>` when they have no children.
pub fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "source"
            | "wbr"
    )
}
