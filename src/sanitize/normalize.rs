//! Value normalizers applied before and during the tree pass.

/// True for codepoints allowed in XML 1.0 content.
pub fn is_xml_char(c: char) -> bool {
    matches!(c as u32,
        0x9 | 0xA | 0xD
        | 0x20..=0xD7FF
        | 0xE000..=0xFFFD
        | 0x10000..=0x10FFFF)
}

/// Drop every codepoint that XML 1.0 forbids (control characters, U+FFFE, …).
pub fn strip_invalid_xml_chars(s: &str) -> String {
    s.chars().filter(|&c| is_xml_char(c)).collect()
}

/// Trim and replace whitespace with `-`. `None` when nothing is left.
pub fn normalize_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        trimmed
            .chars()
            .map(|c| if c.is_whitespace() { '-' } else { c })
            .collect(),
    )
}

/// Integer form of a `width`/`height` value: `"916.7px"` → `"917"`.
///
/// Returns `None` for unparsable, negative and zero values.
pub fn normalize_dimension(raw: &str) -> Option<String> {
    let mut v = raw.trim();
    for suffix in ["px", "rem", "em", "%", "pt"] {
        if let Some(stripped) = v.strip_suffix(suffix) {
            v = stripped.trim_end();
            break;
        }
    }
    let f: f64 = v.parse().ok()?;
    if !f.is_finite() || f < 0.0 {
        return None;
    }
    let rounded = f.round();
    if rounded == 0.0 {
        return None;
    }
    Some(format!("{}", rounded as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_filter() {
        assert_eq!(strip_invalid_xml_chars("Hello\u{12}World"), "HelloWorld");
        assert_eq!(strip_invalid_xml_chars("a\tb\nc\rd"), "a\tb\nc\rd");
        assert_eq!(strip_invalid_xml_chars("x\u{FFFE}\u{FFFF}y\u{0}"), "xy");
        assert_eq!(strip_invalid_xml_chars("emoji 😀 ok"), "emoji 😀 ok");
    }

    #[test]
    fn ids() {
        assert_eq!(normalize_id("  "), None);
        assert_eq!(normalize_id(" a b\tc "), Some("a-b-c".into()));
        assert_eq!(normalize_id("plain"), Some("plain".into()));
    }

    #[test]
    fn dimensions() {
        assert_eq!(normalize_dimension("1.5").as_deref(), Some("2"));
        assert_eq!(normalize_dimension("916.7").as_deref(), Some("917"));
        assert_eq!(normalize_dimension(" 300px ").as_deref(), Some("300"));
        assert_eq!(normalize_dimension("50%").as_deref(), Some("50"));
        assert_eq!(normalize_dimension("2rem").as_deref(), Some("2"));
        assert_eq!(normalize_dimension("12pt").as_deref(), Some("12"));
        assert_eq!(normalize_dimension("0"), None);
        assert_eq!(normalize_dimension("0.4"), None);
        assert_eq!(normalize_dimension("-5"), None);
        assert_eq!(normalize_dimension("auto"), None);
        assert_eq!(normalize_dimension("NaN"), None);
        assert_eq!(normalize_dimension(""), None);
    }
}
