use crate::dom::{Document, NodeId};

/// Maximum number of `tag:nth-child(k)` segments in a synthesized path.
pub const MAX_PATH_PARTS: usize = 5;

/// Synthesize a selector for the element: unique-id fast path, else a
/// bounded structural path.
///
/// An element with a non-empty `id` attribute gets `#<escaped-id>`. Anything
/// else gets up to [`MAX_PATH_PARTS`] levels of `tag:nth-child(k)` joined
/// with ` > `, child positions 1-based, walking up until a parentless node.
pub fn selector_for(doc: &Document, id: NodeId) -> String {
    if let Some(idv) = doc.attr(id, "id")
        && !idv.is_empty()
    {
        return format!("#{}", css_escape(idv));
    }

    let mut parts = Vec::new();
    let mut cur = id;
    while parts.len() < MAX_PATH_PARTS {
        parts.push(format!(
            "{}:nth-child({})",
            doc.tag(cur),
            doc.position_in_parent(cur)
        ));
        match doc.parent(cur) {
            Some(p) => cur = p,
            None => break,
        }
    }
    parts.reverse();
    parts.join(" > ")
}

/// First element in document order matching the selector, or `None`.
///
/// Understands exactly the two shapes [`selector_for`] emits: `#id` and
/// `tag:nth-child(k)` paths. A path matches when the element's upward
/// parent chain agrees with every segment, which also resolves truncated
/// paths whose top segment is not the root.
pub fn resolve(doc: &Document, selector: &str) -> Option<NodeId> {
    let selector = selector.trim();
    if let Some(rest) = selector.strip_prefix('#') {
        return doc.by_id(&css_unescape(rest));
    }

    let segments: Vec<(String, usize)> = selector
        .split(" > ")
        .map(parse_segment)
        .collect::<Option<_>>()?;

    doc.descendants().into_iter().find(|&n| {
        let mut cur = Some(n);
        for (tag, pos) in segments.iter().rev() {
            match cur {
                Some(id) if doc.tag(id) == tag && doc.position_in_parent(id) == *pos => {
                    cur = doc.parent(id);
                }
                _ => return false,
            }
        }
        true
    })
}

fn parse_segment(segment: &str) -> Option<(String, usize)> {
    let rest = segment.trim();
    let open = rest.find(":nth-child(")?;
    let tag = &rest[..open];
    let pos = rest[open + ":nth-child(".len()..].strip_suffix(')')?;
    if tag.is_empty() {
        return None;
    }
    Some((tag.to_string(), pos.parse().ok()?))
}

/// Escape a string for use in an id selector, matching the serialization
/// rules documents apply to identifiers.
pub fn css_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let dash_first = raw.starts_with('-');
    for (i, ch) in raw.chars().enumerate() {
        match ch {
            '\0' => out.push('\u{FFFD}'),
            '0'..='9' if i == 0 || (i == 1 && dash_first) => {
                out.push_str(&format!("\\{:x} ", ch as u32));
            }
            '-' if i == 0 && raw.len() == 1 => {
                out.push('\\');
                out.push(ch);
            }
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => out.push(ch),
            ch if ch as u32 >= 0x80 => out.push(ch),
            ch => {
                out.push('\\');
                out.push(ch);
            }
        }
    }
    out
}

/// Invert [`css_escape`]: decode hex escapes and backslash-escaped
/// characters back to the raw id.
pub fn css_unescape(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let mut hex = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_hexdigit() && hex.len() < 6 {
                hex.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if hex.is_empty() {
            if let Some(literal) = chars.next() {
                out.push(literal);
            }
        } else {
            // A space after a hex escape terminates it and is consumed.
            if chars.peek() == Some(&' ') {
                chars.next();
            }
            match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                Some(decoded) => out.push(decoded),
                None => out.push('\u{FFFD}'),
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deep_doc() -> Document {
        let mut doc = Document::new("https://ehr.example/chart");
        let body = doc.append(doc.root(), "body");
        let main = doc.append(body, "main");
        let section = doc.append(main, "section");
        let form = doc.append(section, "form");
        let div = doc.append(form, "div");
        let _spacer = doc.append(div, "span");
        let input = doc.append(div, "input");
        doc.append(doc.root(), "footer");
        let _ = input;
        doc
    }

    #[test]
    fn test_id_fast_path_with_escaping() {
        let mut doc = Document::new("https://ehr.example/chart");
        let body = doc.append(doc.root(), "body");
        let input = doc.append(body, "input");
        doc.set_attr(input, "id", "patient.name");
        assert_eq!(selector_for(&doc, input), "#patient\\.name");
        assert_eq!(resolve(&doc, "#patient\\.name"), Some(input));
    }

    #[test]
    fn test_leading_digit_id() {
        let mut doc = Document::new("https://ehr.example/chart");
        let body = doc.append(doc.root(), "body");
        let input = doc.append(body, "input");
        doc.set_attr(input, "id", "2fa-code");
        let sel = selector_for(&doc, input);
        assert_eq!(sel, "#\\32 fa-code");
        assert_eq!(resolve(&doc, &sel), Some(input));
    }

    #[test]
    fn test_empty_id_falls_back_to_path() {
        let mut doc = Document::new("https://ehr.example/chart");
        let body = doc.append(doc.root(), "body");
        let input = doc.append(body, "input");
        doc.set_attr(input, "id", "");
        let sel = selector_for(&doc, input);
        assert!(sel.starts_with("html:nth-child(1)"));
        assert!(sel.ends_with("input:nth-child(1)"));
    }

    #[test]
    fn test_path_round_trip() {
        let doc = deep_doc();
        let order = doc.descendants();
        let input = *order
            .iter()
            .find(|&&n| doc.tag(n) == "input")
            .unwrap();
        let sel = selector_for(&doc, input);
        assert_eq!(sel.split(" > ").count(), MAX_PATH_PARTS);
        assert!(sel.ends_with("input:nth-child(2)"));
        assert_eq!(resolve(&doc, &sel), Some(input));
    }

    #[test]
    fn test_shallow_path_stops_at_root() {
        let mut doc = Document::new("https://ehr.example/chart");
        let body = doc.append(doc.root(), "body");
        let input = doc.append(body, "input");
        let sel = selector_for(&doc, input);
        assert_eq!(
            sel,
            "html:nth-child(1) > body:nth-child(1) > input:nth-child(1)"
        );
        assert_eq!(resolve(&doc, &sel), Some(input));
    }

    #[test]
    fn test_resolve_misses_are_none() {
        let doc = deep_doc();
        assert_eq!(resolve(&doc, "#absent"), None);
        assert_eq!(resolve(&doc, "input:nth-child(9)"), None);
        assert_eq!(resolve(&doc, "not a selector"), None);
        assert_eq!(resolve(&doc, ""), None);
    }

    #[test]
    fn test_css_escape_unescape_round_trip() {
        for raw in ["plain", "with space", "a.b:c", "2start", "-2x", "naïve", "-"] {
            assert_eq!(css_unescape(&css_escape(raw)), raw, "raw = {raw:?}");
        }
    }
}
