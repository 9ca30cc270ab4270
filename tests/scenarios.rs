//! Sanitizer behaviour on concrete inputs and boundary cases.

use deckle::sanitize;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Element names in document order, with the names of their open ancestors.
fn elements_with_ancestors(xhtml: &str) -> Vec<(String, Vec<String>)> {
    let wrapped = format!("<root>{xhtml}</root>");
    let mut reader = Reader::from_str(&wrapped);
    let mut stack: Vec<String> = Vec::new();
    let mut out = Vec::new();
    loop {
        match reader.read_event().expect("well-formed XML") {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                out.push((name.clone(), stack.clone()));
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                out.push((name, stack.clone()));
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    out
}

#[test]
fn control_characters_are_removed() {
    let out = sanitize("<p>Hello\u{0012}World</p>");
    assert!(out.contains("HelloWorld"), "{out}");
    assert!(!out.contains('\u{0012}'));
}

#[test]
fn remote_images_are_dropped() {
    let out = sanitize(r#"<img src="https://cdn.example.com/a.jpg" alt="x"/>"#);
    assert!(!out.contains("cdn.example.com"), "{out}");
    assert!(!out.contains("<img"), "{out}");
}

#[test]
fn picture_with_embedded_fallback_becomes_one_img() {
    let out = sanitize(
        r#"<picture><source/><source/><img src="data:image/png;base64,AAAA" alt="p"/></picture>"#,
    );
    assert_eq!(out.matches("<img").count(), 1, "{out}");
    assert!(out.contains(r#"alt="p""#), "{out}");
    assert!(!out.contains("<picture"));
    assert!(!out.contains("<source"));
}

#[test]
fn paragraph_inside_heading_is_unwrapped() {
    assert_eq!(sanitize("<h1><p>Title</p></h1>"), "<h1>Title</h1>");
}

#[test]
fn duplicate_ids_get_suffixes_and_links_survive() {
    let out = sanitize(r##"<div id="x">A</div><div id="x">B</div><a href="#x">go</a>"##);
    assert!(out.contains(r#"<div id="x">A</div>"#), "{out}");
    assert!(out.contains(r#"<div id="x-2">B</div>"#), "{out}");
    assert!(out.contains(r##"<a href="#x">go</a>"##), "{out}");
}

#[test]
fn fractional_dimensions_are_rounded() {
    let out = sanitize(r#"<img src="x.jpg" width="1.5" height="916.7" alt="t"/>"#);
    assert!(out.contains(r#"width="2""#), "{out}");
    assert!(out.contains(r#"height="917""#), "{out}");
}

// ── Boundaries ───────────────────────────────────────────────────────────

#[test]
fn empty_in_empty_out() {
    assert_eq!(sanitize(""), "");
}

#[test]
fn only_disallowed_tags_gives_nothing() {
    assert_eq!(
        sanitize("<script>a()</script><iframe src=\"x\"></iframe><style>p{}</style>"),
        ""
    );
}

#[test]
fn frameset_documents_are_still_cleaned() {
    for html in [
        r#"<frameset><frame src="x"></frameset>"#,
        r#"<frameset cols="50%,50%"><frame src="a"><frame src="b"><noframes><p>hi</p></noframes></frameset>"#,
        r#"<title>t</title><frameset><frame src="x"></frameset><p>after</p>"#,
    ] {
        let out = sanitize(html);
        assert!(!out.contains("frame"), "{html} -> {out}");
        assert!(!out.contains("<title"), "{html} -> {out}");
        elements_with_ancestors(&out);
        assert_eq!(sanitize(&out), out);
    }
}

#[test]
fn stray_dd_gets_a_dt() {
    let out = sanitize("<dl><dd>only</dd></dl>");
    let dt = out.find("<dt").expect("dt inserted");
    let dd = out.find("<dd").unwrap();
    assert!(dt < dd, "{out}");
}

#[test]
fn trailing_dt_gets_a_dd() {
    let out = sanitize("<dl><dt>a</dt><dd>b</dd><dt>c</dt></dl>");
    assert!(out.ends_with("<dt>c</dt><dd></dd></dl>"), "{out}");
}

#[test]
fn no_table_below_a_paragraph() {
    let out = sanitize("<p>before<code>x<table><tr><td>1</td></tr></table>y</code>after</p>");
    let elements = elements_with_ancestors(&out);
    assert!(elements.iter().any(|(n, _)| n == "table"), "{out}");
    for (name, ancestors) in &elements {
        if name == "table" {
            assert!(!ancestors.iter().any(|a| a == "p"), "{out}");
        }
    }
}

#[test]
fn output_is_a_fixed_point() {
    let inputs = [
        "<p>Hello\u{0012}World</p>",
        r##"<div id="x">A</div><div id="x">B</div><a href="#x">go</a>"##,
        "<dl><dd>x</dd></dl>",
        "<span><div>a</div><ul><li>b</li></ul></span>",
        r#"<picture><source srcset="a.webp"/><img src="a.png" width="3.5"/></picture>"#,
    ];
    for html in inputs {
        let once = sanitize(html);
        assert_eq!(sanitize(&once), once, "input: {html}");
    }
}
