//! Element and attribute classes for the EPUB XHTML subset.

/// Elements allowed in EPUB 3 XHTML chapter content.
pub fn is_allowed_element(tag: &str) -> bool {
    matches!(
        tag,
        // structural
        "div" | "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
            | "ul" | "ol" | "li" | "dl" | "dt" | "dd"
            | "address" | "hr" | "pre" | "blockquote"
            | "section" | "article" | "aside" | "header" | "footer" | "main"
            | "figure" | "figcaption" | "nav"
            // tables
            | "table" | "caption" | "colgroup" | "col"
            | "tbody" | "thead" | "tfoot" | "tr" | "td" | "th"
            // phrasing
            | "a" | "span" | "b" | "strong" | "i" | "em" | "small" | "s" | "u"
            | "mark" | "abbr" | "dfn" | "cite" | "code" | "var" | "samp" | "kbd"
            | "sub" | "sup" | "bdi" | "bdo" | "ruby" | "rt" | "rp"
            | "time" | "data" | "ins" | "del" | "q"
            // voids
            | "br" | "wbr" | "img"
    )
}

/// Parser-implied wrappers: walked, never emitted.
pub fn is_document_wrapper(tag: &str) -> bool {
    matches!(tag, "html" | "head" | "body")
}

/// Attribute keys kept by the attribute filter.
pub fn is_allowed_attr(key: &str) -> bool {
    matches!(
        key,
        "id" | "class" | "style" | "title" | "lang" | "dir"
            | "href" | "src" | "alt" | "width" | "height"
            | "colspan" | "rowspan" | "scope" | "headers"
            | "cite" | "datetime" | "value" | "type"
            | "rel" | "media" | "start" | "reversed"
            | "epub:type"
    )
}

/// Elements that may not contain block content. Headings and `p` count
/// here: they are leaves for block nesting.
pub fn is_phrasing(tag: &str) -> bool {
    matches!(
        tag,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "p"
            | "span" | "b" | "strong" | "i" | "em" | "a"
            | "code" | "samp" | "kbd" | "var" | "sub" | "sup"
            | "small" | "s" | "u" | "mark" | "abbr" | "dfn"
            | "cite" | "del" | "ins" | "bdi" | "bdo" | "time" | "data" | "q"
            | "ruby" | "rt" | "rp"
    )
}

pub fn is_block(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
            | "ul" | "ol" | "li" | "dl" | "dt" | "dd"
            | "blockquote" | "section" | "article" | "aside"
            | "header" | "footer" | "main" | "figure" | "figcaption" | "nav"
            | "table" | "pre" | "hr" | "address"
    )
}

/// Blocks moved out of phrasing parents intact instead of being unwrapped.
pub fn is_structural_block(tag: &str) -> bool {
    matches!(
        tag,
        "table" | "pre" | "ul" | "ol" | "dl" | "blockquote" | "figure"
    )
}

/// Elements that may carry `width` / `height`.
pub fn allows_dimensions(tag: &str) -> bool {
    matches!(tag, "img" | "td" | "th" | "col" | "colgroup" | "table")
}
