//! HTML → EPUB XHTML sanitizer.
//!
//! [`sanitize`] turns an arbitrary HTML fragment (usually readability
//! output) into an XHTML fragment that an EPUB 3 validator accepts:
//!
//! * only codepoints legal in XML 1.0;
//! * only whitelisted elements and attributes;
//! * void elements self-closed;
//! * unique, whitespace-free `id`s, and no `href="#frag"` pointing nowhere;
//! * no remote `<img>` sources;
//! * no block content inside phrasing content;
//! * `<dl>` children in `dt`/`dd` pairs, `<figcaption>` only inside `<figure>`.
//!
//! The input is parsed with html5ever into an arena [`Dom`], rewritten in a
//! single depth-first pass and rendered back with the XHTML serializer. The
//! function is pure and never fails; it is safe to call from many threads at
//! once.

mod normalize;
mod rules;

pub use normalize::{is_xml_char, normalize_dimension, normalize_id, strip_invalid_xml_chars};
pub use rules::{
    allows_dimensions, is_allowed_attr, is_allowed_element, is_block, is_phrasing,
    is_structural_block,
};

use std::collections::HashSet;

use html5ever::local_name;

use crate::dom::{self, Attr, Dom, NodeData, NodeId};

/// Sanitize an HTML fragment into EPUB-safe XHTML.
///
/// Returns the serialized content of the parser's `<body>`, without the
/// body tags themselves. Framesets produce no body; then the rest of
/// `<html>` is cleaned and rendered instead, minus `<head>`.
pub fn sanitize(html: &str) -> String {
    let cleaned = strip_invalid_xml_chars(html);
    Sanitizer::new(dom::parse_document(&cleaned)).run()
}

/// What the parent should do with a node after it was cleaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Keep,
    Remove,
    Replace(NodeId),
}

struct Sanitizer {
    dom: Dom,
    /// `<body>`, else `<html>`, else the document node.
    body: NodeId,
    /// Normalized ids present anywhere in the input.
    known_ids: HashSet<String>,
    /// Ids already emitted, for de-duplication.
    used_ids: HashSet<String>,
}

impl Sanitizer {
    fn new(dom: Dom) -> Self {
        let body = dom
            .body()
            .or_else(|| dom.find_first(&local_name!("html")))
            .unwrap_or_else(|| dom.document());
        let known_ids = dom
            .descendants(dom.document())
            .into_iter()
            .flat_map(|n| dom.attrs(n).iter())
            .filter(|a| a.key() == "id")
            .filter_map(|a| normalize_id(&a.value))
            .collect();
        Self {
            dom,
            body,
            known_ids,
            used_ids: HashSet::new(),
        }
    }

    fn run(&mut self) -> String {
        let root = self.dom.document();
        self.clean(root);
        self.drop_dangling_fragments();
        // Without a body only elements count: text under <html> is
        // whitespace the parser kept around the frameset.
        let framed = !self.dom.is_named(self.body, &local_name!("body"));
        let mut out = String::new();
        for child in self.dom.children(self.body) {
            let skip = self.dom.is_named(child, &local_name!("head"))
                || (framed && self.dom.local_name(child).is_none());
            if !skip {
                out.push_str(&dom::render(&self.dom, child));
            }
        }
        // Character references can still decode to control characters.
        strip_invalid_xml_chars(&out)
    }

    /// Ids vanish with removed or unwrapped elements; links to them go too.
    fn drop_dangling_fragments(&mut self) {
        for node in self.dom.descendants(self.body) {
            let dangling = self
                .dom
                .attr(node, "href")
                .and_then(|h| h.strip_prefix('#'))
                .is_some_and(|frag| !frag.is_empty() && !self.used_ids.contains(frag));
            if dangling {
                let kept: Vec<Attr> = self
                    .dom
                    .attrs(node)
                    .iter()
                    .filter(|a| a.key() != "href")
                    .cloned()
                    .collect();
                self.dom.set_attrs(node, kept);
            }
        }
    }

    fn tag(&self, id: NodeId) -> Option<String> {
        self.dom.local_name(id).map(|l| l.to_string())
    }

    // ── The pass ─────────────────────────────────────────────────────────

    fn clean(&mut self, id: NodeId) -> Outcome {
        if let Some(tag) = self.tag(id) {
            match tag.as_str() {
                "video" | "audio" => return self.replace_media(id),
                "source" => return Outcome::Remove,
                "picture" => return self.collapse_picture(id),
                _ => {}
            }

            if !is_allowed_element(&tag) && !rules::is_document_wrapper(&tag) {
                return Outcome::Remove;
            }

            if tag == "img" && !self.has_local_src(id) {
                return Outcome::Remove;
            }

            self.filter_attributes(id, &tag);

            if is_phrasing(&tag) {
                self.repair_nesting(id);
            }
            if tag == "dl" {
                self.repair_dl(id);
            }
            if tag == "figcaption" {
                let in_figure = self
                    .dom
                    .parent(id)
                    .is_some_and(|p| self.dom.is_named(p, &local_name!("figure")));
                if !in_figure {
                    self.dom.rename(id, local_name!("p"));
                    self.repair_nesting(id);
                }
            }
        }

        for child in self.dom.children(id) {
            let outcome = self.clean(child);
            self.apply(child, outcome);
        }
        Outcome::Keep
    }

    fn apply(&mut self, node: NodeId, outcome: Outcome) {
        match outcome {
            Outcome::Keep => {}
            Outcome::Remove => self.dom.detach(node),
            Outcome::Replace(with) => {
                self.dom.insert_before(node, with);
                self.dom.detach(node);
            }
        }
    }

    // ── Element rules ────────────────────────────────────────────────────

    /// `<video>`/`<audio>` become a link to their source, or disappear.
    fn replace_media(&mut self, id: NodeId) -> Outcome {
        let src = self
            .dom
            .attr(id, "src")
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.dom
                    .children(id)
                    .into_iter()
                    .filter(|&c| self.dom.is_named(c, &local_name!("source")))
                    .find_map(|c| self.dom.attr(c, "src").filter(|s| !s.is_empty()))
                    .map(str::to_string)
            });
        let Some(src) = src else {
            return Outcome::Remove;
        };
        let link = self.dom.create_html_element(local_name!("a"));
        self.dom.set_attr(link, "href", src.clone());
        self.dom.append_text(link, &format!("[Media: {src}]"));
        Outcome::Replace(link)
    }

    /// `<picture>` is replaced by its first `<img>` child, cleaned in turn.
    fn collapse_picture(&mut self, id: NodeId) -> Outcome {
        let img = self
            .dom
            .children(id)
            .into_iter()
            .find(|&c| self.dom.is_named(c, &local_name!("img")));
        let Some(img) = img else {
            return Outcome::Remove;
        };
        self.dom.detach(img);
        match self.clean(img) {
            Outcome::Keep => Outcome::Replace(img),
            other => other,
        }
    }

    /// An `<img>` survives only with a non-empty, non-remote `src`.
    fn has_local_src(&self, id: NodeId) -> bool {
        let src = self
            .dom
            .attrs(id)
            .iter()
            .filter(|a| a.key() == "src")
            .map(|a| a.value.trim())
            .find(|v| !v.is_empty());
        match src {
            Some(s) => !(s.starts_with("http://") || s.starts_with("https://")),
            None => false,
        }
    }

    fn filter_attributes(&mut self, id: NodeId, tag: &str) {
        let mut kept: Vec<Attr> = Vec::with_capacity(self.dom.attrs(id).len());
        for attr in self.dom.attrs(id).to_vec() {
            let key = attr.key();
            if !is_allowed_attr(&key) {
                continue;
            }
            let value = match key.as_str() {
                "href" => {
                    let dangling = attr
                        .value
                        .strip_prefix('#')
                        .is_some_and(|frag| !frag.is_empty() && !self.known_ids.contains(frag));
                    if dangling {
                        continue;
                    }
                    attr.value
                }
                "id" => match normalize_id(&attr.value) {
                    Some(base) => self.unique_id(base),
                    None => continue,
                },
                "width" | "height" => {
                    if !allows_dimensions(tag) {
                        continue;
                    }
                    match normalize_dimension(&attr.value) {
                        Some(v) => v,
                        None => continue,
                    }
                }
                _ => attr.value,
            };
            kept.push(Attr {
                name: attr.name,
                value,
            });
        }
        self.dom.set_attrs(id, kept);
    }

    fn unique_id(&mut self, base: String) -> String {
        let mut candidate = base.clone();
        let mut n = 2;
        while self.used_ids.contains(&candidate) {
            candidate = format!("{base}-{n}");
            n += 1;
        }
        self.used_ids.insert(candidate.clone());
        candidate
    }

    /// Hoist structural blocks out of phrasing content and unwrap the rest.
    fn repair_nesting(&mut self, id: NodeId) {
        let mut cursor = self.dom.first_child(id);
        while let Some(child) = cursor {
            let next = self.dom.next_sibling(child);
            let Some(tag) = self.tag(child).filter(|t| is_block(t)) else {
                cursor = next;
                continue;
            };

            if is_structural_block(&tag) {
                let mut target = id;
                while let Some(parent) = self.dom.parent(target) {
                    match self.dom.local_name(parent) {
                        Some(l) if is_phrasing(l) => target = parent,
                        _ => break,
                    }
                }
                if self.dom.parent(target).is_none() {
                    cursor = next;
                    continue;
                }
                self.dom.insert_before(target, child);
                let outcome = self.clean(child);
                self.apply(child, outcome);
                cursor = next;
            } else {
                // Spliced children are scanned too: they may be blocks.
                let first_spliced = self.dom.first_child(child);
                for grandchild in self.dom.children(child) {
                    self.dom.insert_before(child, grandchild);
                }
                self.dom.detach(child);
                cursor = first_spliced.or(next);
            }
        }
    }

    /// Make every direct child of a `<dl>` part of a `dt`/`dd` pair.
    fn repair_dl(&mut self, dl: NodeId) {
        // Wrap loose text in dt and stray elements in dd.
        for child in self.dom.children(dl) {
            let wrapper = match self.dom.data(child) {
                Some(NodeData::Text(t)) if !t.trim().is_empty() => Some(local_name!("dt")),
                Some(NodeData::Element { name, .. })
                    if !matches!(&*name.local, "dt" | "dd" | "div") =>
                {
                    Some(local_name!("dd"))
                }
                _ => None,
            };
            if let Some(wrapper) = wrapper {
                let w = self.dom.create_html_element(wrapper);
                self.dom.insert_before(child, w);
                self.dom.append(w, child);
            }
        }

        // A dd before the first dt gets an empty dt.
        let mut seen_dt = false;
        for child in self.dom.children(dl) {
            match self.tag(child).as_deref() {
                Some("dt") => seen_dt = true,
                Some("dd") if !seen_dt => {
                    let dt = self.dom.create_html_element(local_name!("dt"));
                    self.dom.insert_before(child, dt);
                    seen_dt = true;
                }
                _ => {}
            }
        }

        // A trailing dt gets an empty dd.
        let mut last_dt = None;
        for child in self.dom.children(dl) {
            match self.tag(child).as_deref() {
                Some("dt") => last_dt = Some(child),
                Some("dd") | Some("div") => last_dt = None,
                _ => {}
            }
        }
        if let Some(dt) = last_dt {
            let dd = self.dom.create_html_element(local_name!("dd"));
            self.dom.insert_after(dt, dd);
        }

        let tags: Vec<Option<String>> = self
            .dom
            .children(dl)
            .into_iter()
            .map(|c| self.tag(c))
            .collect();
        let has_dt = tags.iter().any(|t| t.as_deref() == Some("dt"));
        let has_dd = tags
            .iter()
            .any(|t| matches!(t.as_deref(), Some("dd") | Some("div")));
        if !has_dt {
            let dt = self.dom.create_html_element(local_name!("dt"));
            match self.dom.first_child(dl) {
                Some(first) => self.dom.insert_before(first, dt),
                None => self.dom.append(dl, dt),
            }
        }
        if !has_dd {
            let dd = self.dom.create_html_element(local_name!("dd"));
            self.dom.append(dl, dd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn bodyless_frameset_is_emptied() {
        assert_eq!(sanitize(r#"<frameset><frame src="x"></frameset>"#), "");
        assert_eq!(
            sanitize(r#"<head><title>t</title></head><frameset><frame src="x"/></frameset>"#),
            ""
        );
    }

    #[test]
    fn strips_disallowed_elements_with_children() {
        assert_eq!(sanitize("<script>alert(1)</script><p>ok</p>"), "<p>ok</p>");
        assert_eq!(sanitize("<form><input/><p>in form</p></form>"), "");
    }

    #[test]
    fn attribute_filter() {
        assert_eq!(
            sanitize(r#"<p onclick="x()" data-foo="1" class="c" aria-label="l">t</p>"#),
            r#"<p class="c">t</p>"#
        );
        assert_eq!(
            sanitize(r#"<span epub:type="noteref">n</span>"#),
            r#"<span epub:type="noteref">n</span>"#
        );
    }

    #[test]
    fn ids_are_normalized_and_unique() {
        let out = sanitize(r#"<p id=" a b ">1</p><p id="a-b">2</p><p id="a-b">3</p><p id="  ">4</p>"#);
        assert_eq!(
            out,
            r#"<p id="a-b">1</p><p id="a-b-2">2</p><p id="a-b-3">3</p><p>4</p>"#
        );
    }

    #[test]
    fn broken_fragment_links_lose_href() {
        let out = sanitize(r##"<a href="#nowhere">x</a><a href="#">top</a><a href="#h">h</a><h2 id="h">H</h2>"##);
        assert_eq!(
            out,
            r##"<a>x</a><a href="#">top</a><a href="#h">h</a><h2 id="h">H</h2>"##
        );
    }

    #[test]
    fn links_to_dropped_ids_lose_href() {
        let out = sanitize(r##"<span><div id="gone">x</div></span><a href="#gone">g</a>"##);
        assert_eq!(out, "<span>x</span><a>g</a>");
        let out = sanitize(r##"<img id="pic" src="https://cdn.example/a.png"/><a href="#pic">p</a>"##);
        assert_eq!(out, "<a>p</a>");
    }

    #[test]
    fn dimensions_only_on_dimension_tags() {
        assert_eq!(
            sanitize(r#"<div width="10">d</div><img src="a.png" width="10.2px" height="0"/>"#),
            r#"<div>d</div><img src="a.png" width="10"/>"#
        );
    }

    #[test]
    fn media_become_links() {
        assert_eq!(
            sanitize(r#"<video src="v.mp4"></video>"#),
            r#"<a href="v.mp4">[Media: v.mp4]</a>"#
        );
        assert_eq!(
            sanitize(r#"<audio><source src="a.ogg"/></audio>"#),
            r#"<a href="a.ogg">[Media: a.ogg]</a>"#
        );
        assert_eq!(sanitize("<video></video><p>x</p>"), "<p>x</p>");
    }

    #[test]
    fn remote_and_missing_img_src_removed() {
        assert_eq!(sanitize(r#"<img src="http://x/a.png"/>"#), "");
        assert_eq!(sanitize(r#"<img src="  "/>"#), "");
        assert_eq!(sanitize(r#"<img alt="no src"/>"#), "");
        assert_eq!(sanitize(r#"<img src="images/a.png"/>"#), r#"<img src="images/a.png"/>"#);
    }

    #[test]
    fn picture_collapses_to_cleaned_img() {
        assert_eq!(
            sanitize(r#"<picture><source srcset="a.webp"/><img src="a.png" loading="lazy"/></picture>"#),
            r#"<img src="a.png"/>"#
        );
        assert_eq!(
            sanitize(r#"<picture><img src="https://cdn.example/a.png"/></picture>"#),
            ""
        );
        assert_eq!(sanitize(r#"<picture><source/></picture>"#), "");
    }

    #[test]
    fn wrapper_blocks_unwrapped_in_phrasing() {
        assert_eq!(sanitize("<span><div>a</div>b</span>"), "<span>ab</span>");
        assert_eq!(sanitize("<em><div><div>deep</div></div></em>"), "<em>deep</em>");
    }

    #[test]
    fn structural_blocks_hoisted_above_phrasing() {
        let out = sanitize("<p>a<code>x<table><tr><td>1</td></tr></table>y</code>b</p>");
        assert!(out.starts_with("<table>"), "{out}");
        let table_end = out.find("</table>").unwrap();
        assert!(out[table_end..].starts_with("</table><p>"), "{out}");
    }

    #[test]
    fn hoisted_blocks_are_cleaned() {
        let out = sanitize(r#"<span><ul onclick="x"><li id="i">a</li></ul></span>"#);
        assert_eq!(out, r#"<ul><li id="i">a</li></ul><span></span>"#);
    }

    #[test]
    fn dl_repairs() {
        assert_eq!(sanitize("<dl><dd>d</dd></dl>"), "<dl><dt></dt><dd>d</dd></dl>");
        assert_eq!(sanitize("<dl><dt>t</dt></dl>"), "<dl><dt>t</dt><dd></dd></dl>");
        assert_eq!(sanitize("<dl></dl>"), "<dl><dt></dt><dd></dd></dl>");
        assert_eq!(
            sanitize("<dl>term<p>def</p></dl>"),
            "<dl><dt>term</dt><dd><p>def</p></dd></dl>"
        );
    }

    #[test]
    fn figcaption_outside_figure_becomes_p() {
        assert_eq!(sanitize("<figcaption>c</figcaption>"), "<p>c</p>");
        assert_eq!(
            sanitize("<figcaption><p>c</p><ul><li>i</li></ul></figcaption>"),
            "<ul><li>i</li></ul><p>c</p>"
        );
        assert_eq!(
            sanitize("<figure><figcaption>c</figcaption></figure>"),
            "<figure><figcaption>c</figcaption></figure>"
        );
    }

    #[test]
    fn numeric_references_to_control_chars_are_dropped() {
        assert_eq!(sanitize("<p>a&#1;b</p>"), "<p>ab</p>");
    }

    #[test]
    fn valid_xhtml_is_a_fixed_point() {
        let xhtml = r##"<h2 id="s">Section</h2><p>Text with <em>emphasis</em> and <a href="#s">a link</a>.</p><ul><li>one</li><li>two</li></ul><img src="images/a.jpg" alt="a"/>"##;
        assert_eq!(sanitize(xhtml), xhtml);
    }
}
