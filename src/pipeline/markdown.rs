//! CommonMark rendering of processed articles.
//!
//! The article body is parsed into the arena [`Dom`] and walked once.
//! Block elements produce blocks separated by blank lines; everything else
//! is flattened into inline text. Embedded `data:` images have no useful
//! Markdown form and become `[Image: alt]` placeholders.

use crate::dom::{parse_document, Dom, NodeData, NodeId};
use crate::error::DeckleError;
use crate::output::Article;
use crate::pipeline::headings::extract_body_content;

/// Separator placed between articles.
pub const ARTICLE_SEPARATOR: &str = "\n\n---\n\n";

/// Convert one processed article document to Markdown.
pub fn article_to_markdown(html: &str) -> String {
    html_to_markdown(extract_body_content(html))
}

/// Join every article, separated by a thematic break.
pub fn articles_to_markdown(articles: &[Article]) -> Result<String, DeckleError> {
    let parts: Vec<String> = articles
        .iter()
        .map(|a| article_to_markdown(&a.html))
        .filter(|md| !md.is_empty())
        .collect();
    if parts.is_empty() {
        return Err(DeckleError::NoArticlesConverted {
            total: articles.len(),
        });
    }
    Ok(parts.join(ARTICLE_SEPARATOR))
}

/// Render an HTML fragment as CommonMark.
pub fn html_to_markdown(html: &str) -> String {
    let dom = parse_document(html);
    let Some(body) = dom.body() else {
        return String::new();
    };
    let writer = MarkdownWriter { dom: &dom };
    join_blocks(&writer.blocks(body))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockKind {
    List,
    Other,
}

#[derive(Debug, Clone)]
struct Block {
    text: String,
    kind: BlockKind,
}

impl Block {
    fn other(text: String) -> Self {
        Self {
            text,
            kind: BlockKind::Other,
        }
    }
}

fn join_blocks(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

struct MarkdownWriter<'a> {
    dom: &'a Dom,
}

impl MarkdownWriter<'_> {
    fn tag(&self, id: NodeId) -> Option<&str> {
        self.dom.local_name(id).map(|l| &**l)
    }

    // ── Blocks ───────────────────────────────────────────────────────────

    /// Render the children of `id` as a sequence of blocks.
    fn blocks(&self, id: NodeId) -> Vec<Block> {
        let mut out = Vec::new();
        let mut inline = String::new();

        for child in self.dom.children(id) {
            match self.dom.data(child) {
                Some(NodeData::Text(t)) => push_text(&mut inline, t),
                Some(NodeData::Element { .. }) => {
                    let tag = self.tag(child).unwrap_or("");
                    if is_skipped(tag) {
                        continue;
                    }
                    if is_block_tag(tag) {
                        flush_paragraph(&mut inline, &mut out);
                        out.extend(self.block(child, tag));
                    } else {
                        self.inline(child, &mut inline);
                    }
                }
                _ => {}
            }
        }
        flush_paragraph(&mut inline, &mut out);
        out
    }

    fn block(&self, id: NodeId, tag: &str) -> Vec<Block> {
        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag[1..].parse::<usize>().unwrap_or(1);
                let text = collapse(&self.inline_of(id)).replace('\n', " ");
                if text.is_empty() {
                    return Vec::new();
                }
                vec![Block::other(format!("{} {}", "#".repeat(level), text))]
            }
            "p" => {
                let mut out = Vec::new();
                let mut inline = String::new();
                self.inline_children(id, &mut inline);
                flush_paragraph(&mut inline, &mut out);
                out
            }
            "pre" => vec![Block::other(self.code_block(id))],
            "hr" => vec![Block::other("---".into())],
            "ul" | "ol" => {
                let list = self.list(id, tag == "ol");
                if list.is_empty() {
                    return Vec::new();
                }
                vec![Block {
                    text: list,
                    kind: BlockKind::List,
                }]
            }
            "blockquote" => {
                let inner = join_blocks(&self.blocks(id));
                if inner.is_empty() {
                    return Vec::new();
                }
                vec![Block::other(prefix_lines(&inner, "> ", ">"))]
            }
            "table" => self.table(id).map(Block::other).into_iter().collect(),
            _ => self.blocks(id),
        }
    }

    fn code_block(&self, id: NodeId) -> String {
        let code = self.dom.text_content(id);
        let code = code.strip_suffix('\n').unwrap_or(&code);
        let fence = "`".repeat(longest_run(code, '`').max(2) + 1);
        let lang = self
            .language(id)
            .or_else(|| {
                self.dom
                    .children(id)
                    .into_iter()
                    .find(|&c| self.tag(c) == Some("code"))
                    .and_then(|c| self.language(c))
            })
            .unwrap_or_default();
        format!("{fence}{lang}\n{code}\n{fence}")
    }

    /// `language-xxx` / `lang-xxx` class on a `pre` or `code` element.
    fn language(&self, id: NodeId) -> Option<String> {
        self.dom.attr(id, "class")?.split_whitespace().find_map(|c| {
            c.strip_prefix("language-")
                .or_else(|| c.strip_prefix("lang-"))
                .filter(|l| !l.is_empty())
                .map(str::to_string)
        })
    }

    fn list(&self, id: NodeId, ordered: bool) -> String {
        let mut n: i64 = if ordered {
            self.dom
                .attr(id, "start")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(1)
        } else {
            1
        };

        let mut items = Vec::new();
        for child in self.dom.children(id) {
            let blocks = match self.tag(child) {
                Some("li") => self.blocks(child),
                Some(t) if is_skipped(t) => continue,
                Some(t) if is_block_tag(t) => self.block(child, t),
                Some(_) => {
                    let mut s = String::new();
                    self.inline(child, &mut s);
                    let mut out = Vec::new();
                    flush_paragraph(&mut s, &mut out);
                    out
                }
                None => match self.dom.text(child) {
                    Some(t) if !t.trim().is_empty() => vec![Block::other(escape_text(t.trim()))],
                    _ => continue,
                },
            };

            let marker = if ordered {
                let m = format!("{n}. ");
                n += 1;
                m
            } else {
                "- ".to_string()
            };
            let indent = " ".repeat(marker.len());

            let body = join_item_blocks(&blocks);
            let mut item = String::new();
            for (i, line) in body.lines().enumerate() {
                if i == 0 {
                    item.push_str(&marker);
                    item.push_str(line);
                } else {
                    item.push('\n');
                    if !line.is_empty() {
                        item.push_str(&indent);
                        item.push_str(line);
                    }
                }
            }
            if body.is_empty() {
                item.push_str(marker.trim_end());
            }
            items.push(item);
        }
        items.join("\n")
    }

    fn table(&self, id: NodeId) -> Option<String> {
        let rows: Vec<Vec<String>> = self
            .rows(id)
            .into_iter()
            .map(|tr| {
                self.dom
                    .children(tr)
                    .into_iter()
                    .filter(|&c| matches!(self.tag(c), Some("td" | "th")))
                    .map(|c| {
                        collapse(&self.inline_of(c))
                            .replace('\n', " ")
                            .replace('|', "\\|")
                    })
                    .collect()
            })
            .filter(|r: &Vec<String>| !r.is_empty())
            .collect();

        let cols = rows.iter().map(Vec::len).max()?;
        let line = |cells: &[String]| {
            let mut s = String::from("|");
            for i in 0..cols {
                s.push(' ');
                s.push_str(cells.get(i).map(String::as_str).unwrap_or(""));
                s.push_str(" |");
            }
            s
        };

        let mut out = vec![line(&rows[0])];
        out.push(format!("|{}", " --- |".repeat(cols)));
        out.extend(rows[1..].iter().map(|r| line(r)));
        Some(out.join("\n"))
    }

    /// `tr` elements of this table, not descending into nested tables.
    fn rows(&self, table: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for child in self.dom.children(table) {
            match self.tag(child) {
                Some("tr") => out.push(child),
                Some("thead" | "tbody" | "tfoot") => out.extend(
                    self.dom
                        .children(child)
                        .into_iter()
                        .filter(|&r| self.tag(r) == Some("tr")),
                ),
                _ => {}
            }
        }
        out
    }

    // ── Inline ───────────────────────────────────────────────────────────

    fn inline_of(&self, id: NodeId) -> String {
        let mut s = String::new();
        self.inline_children(id, &mut s);
        s
    }

    fn inline_children(&self, id: NodeId, out: &mut String) {
        for child in self.dom.children(id) {
            self.inline(child, out);
        }
    }

    fn inline(&self, id: NodeId, out: &mut String) {
        match self.dom.data(id) {
            Some(NodeData::Text(t)) => {
                push_text(out, t);
                return;
            }
            Some(NodeData::Element { .. }) => {}
            _ => return,
        }
        let tag = self.tag(id).unwrap_or("");
        match tag {
            t if is_skipped(t) => {}
            "br" => out.push_str("\\\n"),
            "em" | "i" | "cite" | "dfn" | "var" => self.wrap(id, "*", out),
            "strong" | "b" => self.wrap(id, "**", out),
            "s" | "del" => self.wrap(id, "~~", out),
            "code" | "kbd" | "samp" | "tt" => push_code_span(out, &self.dom.text_content(id)),
            "a" => self.link(id, out),
            "img" => self.image(id, out),
            _ => {
                if is_block_tag(tag) && !out.is_empty() && !out.ends_with(' ') {
                    out.push(' ');
                }
                self.inline_children(id, out);
            }
        }
    }

    fn wrap(&self, id: NodeId, marker: &str, out: &mut String) {
        let inner = self.inline_of(id);
        let trimmed = inner.trim();
        if trimmed.is_empty() {
            out.push_str(&inner);
            return;
        }
        if inner.starts_with(char::is_whitespace) {
            out.push(' ');
        }
        out.push_str(marker);
        out.push_str(trimmed);
        out.push_str(marker);
        if inner.ends_with(char::is_whitespace) {
            out.push(' ');
        }
    }

    fn link(&self, id: NodeId, out: &mut String) {
        let text = collapse(&self.inline_of(id));
        let href = self.dom.attr(id, "href").map(str::trim).unwrap_or("");
        if href.is_empty() || href.starts_with("javascript:") {
            out.push_str(&text);
            return;
        }
        let label = if text.is_empty() { escape_text(href) } else { text };
        out.push('[');
        out.push_str(&label);
        out.push_str("](");
        out.push_str(&link_destination(href));
        out.push(')');
    }

    fn image(&self, id: NodeId, out: &mut String) {
        let src = self.dom.attr(id, "src").map(str::trim).unwrap_or("");
        let alt = self.dom.attr(id, "alt").map(str::trim).unwrap_or("");
        if src.starts_with("data:") {
            if !alt.is_empty() {
                out.push_str("[Image: ");
                out.push_str(alt);
                out.push(']');
            }
            return;
        }
        if src.is_empty() {
            return;
        }
        out.push_str("![");
        out.push_str(&escape_text(alt));
        out.push_str("](");
        out.push_str(&link_destination(src));
        out.push(')');
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Elements whose content never reaches the output.
fn is_skipped(tag: &str) -> bool {
    matches!(
        tag,
        "head"
            | "title"
            | "script"
            | "style"
            | "noscript"
            | "template"
            | "iframe"
            | "object"
            | "svg"
            | "math"
            | "button"
            | "input"
            | "select"
            | "textarea"
            | "source"
            | "video"
            | "audio"
    )
}

fn is_block_tag(tag: &str) -> bool {
    matches!(
        tag,
        "address"
            | "article"
            | "aside"
            | "blockquote"
            | "dd"
            | "details"
            | "div"
            | "dl"
            | "dt"
            | "fieldset"
            | "figcaption"
            | "figure"
            | "footer"
            | "form"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hr"
            | "li"
            | "main"
            | "nav"
            | "ol"
            | "p"
            | "pre"
            | "section"
            | "summary"
            | "table"
            | "ul"
    )
}

/// Append text with runs of whitespace collapsed and Markdown escaped.
fn push_text(out: &mut String, text: &str) {
    let mut prev_space = out.ends_with(' ') || out.ends_with('\n');
    for c in text.chars() {
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
            continue;
        }
        prev_space = false;
        if matches!(c, '\\' | '*' | '_' | '`' | '[' | ']' | '<' | '>' | '~') {
            out.push('\\');
        }
        out.push(c);
    }
}

fn escape_text(text: &str) -> String {
    let mut s = String::new();
    push_text(&mut s, text);
    s
}

/// Finish a paragraph: trim every line, drop a trailing hard break and
/// escape characters that would start a block construct.
fn flush_paragraph(inline: &mut String, out: &mut Vec<Block>) {
    let text = std::mem::take(inline);
    let mut lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "\\")
        .collect();
    while let Some(&last) = lines.last() {
        match last.strip_suffix('\\') {
            Some(rest) if !rest.ends_with('\\') => {
                let rest = rest.trim_end();
                lines.pop();
                if !rest.is_empty() {
                    lines.push(rest);
                    break;
                }
            }
            _ => break,
        }
    }
    if lines.is_empty() {
        return;
    }
    let joined = lines
        .iter()
        .map(|l| escape_line_start(l))
        .collect::<Vec<_>>()
        .join("\n");
    out.push(Block::other(joined));
}

fn escape_line_start(line: &str) -> String {
    if line.starts_with('#') || line.starts_with("- ") || line.starts_with("+ ") || line == "-" {
        return format!("\\{line}");
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 && matches!(line[digits..].chars().next(), Some('.' | ')')) {
        return format!("{}\\{}", &line[..digits], &line[digits..]);
    }
    line.to_string()
}

/// Collapse whitespace in already-rendered inline text, keeping hard breaks.
fn collapse(s: &str) -> String {
    s.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_code_span(out: &mut String, code: &str) {
    let code = code.split_whitespace().collect::<Vec<_>>().join(" ");
    if code.is_empty() {
        return;
    }
    let fence = "`".repeat(longest_run(&code, '`') + 1);
    let pad = code.starts_with('`') || code.ends_with('`');
    out.push_str(&fence);
    if pad {
        out.push(' ');
    }
    out.push_str(&code);
    if pad {
        out.push(' ');
    }
    out.push_str(&fence);
}

fn longest_run(s: &str, ch: char) -> usize {
    let mut best = 0;
    let mut cur = 0;
    for c in s.chars() {
        if c == ch {
            cur += 1;
            best = best.max(cur);
        } else {
            cur = 0;
        }
    }
    best
}

fn link_destination(url: &str) -> String {
    if url.contains(|c: char| c.is_whitespace() || c == '(' || c == ')' || c == '<' || c == '>') {
        format!("<{}>", url.replace('<', "%3C").replace('>', "%3E"))
    } else {
        url.to_string()
    }
}

fn prefix_lines(text: &str, prefix: &str, empty_prefix: &str) -> String {
    text.lines()
        .map(|l| {
            if l.is_empty() {
                empty_prefix.to_string()
            } else {
                format!("{prefix}{l}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// List item content: a nested list sticks to the preceding block, other
/// blocks are separated by a blank line.
fn join_item_blocks(blocks: &[Block]) -> String {
    let mut s = String::new();
    for (i, b) in blocks.iter().enumerate() {
        if i > 0 {
            s.push_str(if b.kind == BlockKind::List { "\n" } else { "\n\n" });
        }
        s.push_str(&b.text);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SourceInfo;

    fn md(html: &str) -> String {
        html_to_markdown(html)
    }

    #[test]
    fn headings_paragraphs_emphasis() {
        assert_eq!(
            md("<h2>Title</h2><p>Some <em>soft</em> and <strong>loud</strong> words.</p>"),
            "## Title\n\nSome *soft* and **loud** words."
        );
    }

    #[test]
    fn emphasis_spaces_move_outside_markers() {
        assert_eq!(md("<p>a<em> b </em>c</p>"), "a *b* c");
    }

    #[test]
    fn links_and_images() {
        assert_eq!(
            md(r#"<p><a href="https://e.com/x">here</a> <img src="https://e.com/a.png" alt="pic"></p>"#),
            "[here](https://e.com/x) ![pic](https://e.com/a.png)"
        );
    }

    #[test]
    fn data_uri_images_become_placeholders() {
        assert_eq!(
            md(r#"<p><img src="data:image/jpeg;base64,AAAA" alt="Chart"></p>"#),
            "[Image: Chart]"
        );
        assert_eq!(md(r#"<p><img src="data:image/jpeg;base64,AAAA"></p>"#), "");
    }

    #[test]
    fn lists_nest_and_number() {
        let out = md(r#"<ol start="3"><li>three</li><li>four<ul><li>inner</li></ul></li></ol>"#);
        assert_eq!(out, "3. three\n4. four\n   - inner");
    }

    #[test]
    fn blockquote_and_rule() {
        assert_eq!(
            md("<blockquote><p>one</p><p>two</p></blockquote><hr><p>after</p>"),
            "> one\n>\n> two\n\n---\n\nafter"
        );
    }

    #[test]
    fn fenced_code_with_language() {
        let out = md("<pre><code class=\"language-rust\">fn main() {\n    x();\n}\n</code></pre>");
        assert_eq!(out, "```rust\nfn main() {\n    x();\n}\n```");
    }

    #[test]
    fn inline_code_with_backticks() {
        assert_eq!(md("<p>use <code>a`b</code></p>"), "use ``a`b``");
    }

    #[test]
    fn hard_breaks() {
        assert_eq!(md("<p>line one<br>line two<br></p>"), "line one\\\nline two");
    }

    #[test]
    fn escapes_markdown_specials() {
        assert_eq!(md("<p>2 * 3 = _six_</p>"), "2 \\* 3 = \\_six\\_");
        assert_eq!(md("<p># not a heading</p>"), "\\# not a heading");
        assert_eq!(md("<p>1. not a list</p>"), "1\\. not a list");
    }

    #[test]
    fn tables_as_pipe_rows() {
        let out = md("<table><thead><tr><th>A</th><th>B</th></tr></thead>\
                      <tbody><tr><td>1</td><td>x|y</td></tr><tr><td>2</td></tr></tbody></table>");
        assert_eq!(out, "| A | B |\n| --- | --- |\n| 1 | x\\|y |\n| 2 |  |");
    }

    #[test]
    fn scripts_are_skipped() {
        assert_eq!(md("<p>keep</p><script>alert(1)</script><style>p{}</style>"), "keep");
    }

    #[test]
    fn articles_are_joined_with_rules() {
        let article = |html: &str| Article {
            index: 1,
            title: "t".into(),
            html: html.into(),
            source: SourceInfo::default(),
        };
        let out = articles_to_markdown(&[
            article("<html><body><h1>One</h1></body></html>"),
            article("<html><body><h1>Two</h1></body></html>"),
        ])
        .unwrap();
        assert_eq!(out, "# One\n\n---\n\n# Two");

        let err = articles_to_markdown(&[article("<body></body>")]).unwrap_err();
        assert!(matches!(err, DeckleError::NoArticlesConverted { total: 1 }));
    }
}
