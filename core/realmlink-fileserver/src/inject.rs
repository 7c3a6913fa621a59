//! Inserting a fragment into the `<head>` of an HTML document.
//!
//! A full HTML parse would re-serialize the document and escape text inside
//! `<script>` and `<style>`, so the prologue is scanned by hand instead:
//! leading comments, an optional doctype, `<html>` and `<head>` open tags.
//! Everything after the insertion point is left byte-for-byte intact.

use crate::content_type::ContentType;

/// Inserts `fragment` right after the document's `<head>` open tag.
///
/// Without a `<head>` tag the fragment goes where the prologue ends, as long
/// as what follows is another open tag or nothing at all. Any other document
/// is ambiguous and returned unchanged.
pub fn inject_html(html: &str, fragment: &str) -> String {
    match insertion_point(html) {
        Some(index) => {
            let mut out = String::with_capacity(html.len() + fragment.len());
            out.push_str(&html[..index]);
            out.push_str(fragment);
            out.push_str(&html[index..]);
            out
        }
        None => html.to_string(),
    }
}

/// Byte-level variant of [`inject_html`]. Bodies that are not UTF-8 are
/// returned unchanged.
pub fn inject_html_bytes(body: &[u8], fragment: &str) -> Vec<u8> {
    match std::str::from_utf8(body) {
        Ok(html) => inject_html(html, fragment).into_bytes(),
        Err(_) => body.to_vec(),
    }
}

/// A body rewrite applied while uploading a resource.
pub trait BodyTransform: Send + Sync {
    fn apply(&self, path: &str, body: Vec<u8>) -> Vec<u8>;
}

/// Injects a fragment into HTML resources; other resources pass through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlInjection {
    fragment: String,
}

impl HtmlInjection {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
        }
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }
}

impl BodyTransform for HtmlInjection {
    fn apply(&self, path: &str, body: Vec<u8>) -> Vec<u8> {
        if ContentType::from_path(path) != ContentType::Html {
            return body;
        }
        inject_html_bytes(&body, &self.fragment)
    }
}

fn insertion_point(html: &str) -> Option<usize> {
    let mut rest = skip_comments(html);
    rest = skip_doctype(rest);
    rest = skip_comments(rest);
    rest = skip_tag("html", rest).0;
    rest = skip_comments(rest);
    let (rest, found_head) = skip_tag("head", rest);

    let index = html.len() - rest.len();
    if found_head || rest.is_empty() || open_tag(rest).is_some() {
        Some(index)
    } else {
        None
    }
}

fn skip_comments(mut s: &str) -> &str {
    loop {
        s = s.trim_start();
        let Some(body) = s.strip_prefix("<!--") else {
            return s;
        };
        match body.find("-->") {
            Some(end) => s = &body[end + 3..],
            None => return s,
        }
    }
}

/// `<!DOCTYPE html ...>`, case-insensitive, one or more spaces before `html`.
fn skip_doctype(s: &str) -> &str {
    let s = s.trim_start();
    let Some(after) = strip_prefix_ignore_case(s, "<!doctype") else {
        return s;
    };
    let spaced = after.trim_start_matches(' ');
    if spaced.len() == after.len() {
        return s;
    }
    let Some(after_html) = strip_prefix_ignore_case(spaced, "html") else {
        return s;
    };
    match after_html.find('>') {
        Some(end) => &after_html[end + 1..],
        None => s,
    }
}

/// Skips an open tag named `tag`. Returns the remainder and whether the tag
/// was found; leading whitespace is consumed either way.
fn skip_tag<'a>(tag: &str, s: &'a str) -> (&'a str, bool) {
    let s = s.trim_start();
    match open_tag(s) {
        Some((name, len)) if name.eq_ignore_ascii_case(tag) => (&s[len..], true),
        _ => (s, false),
    }
}

/// Matches an open tag at the start of `s`, returning its name and length.
/// Quoted attribute values may contain `>`.
fn open_tag(s: &str) -> Option<(&str, usize)> {
    let after = s.strip_prefix('<')?;
    let name_len = after
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    if name_len == 0 {
        return None;
    }
    let name = &after[..name_len];

    let bytes = s.as_bytes();
    let mut i = 1 + name_len;
    while i < bytes.len() {
        match bytes[i] {
            b'>' => return Some((name, i + 1)),
            quote @ (b'"' | b'\'') => {
                let close = s[i + 1..].find(quote as char)?;
                i += close + 2;
            }
            _ => i += 1,
        }
    }
    None
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_tag_handles_quoted_gt() {
        assert_eq!(open_tag(r#"<head data-x="a>b">rest"#), Some(("head", 19)));
        assert_eq!(open_tag("<head"), None);
        assert_eq!(open_tag("</head>"), None);
        assert_eq!(open_tag("< head>"), None);
    }

    #[test]
    fn doctype_needs_a_space() {
        assert_eq!(skip_doctype("<!DOCTYPEhtml>x"), "<!DOCTYPEhtml>x");
        assert_eq!(skip_doctype("<!doctype  HTML lang>x"), "x");
    }

    #[test]
    fn unterminated_comment_stops() {
        assert_eq!(skip_comments("  <!-- open"), "<!-- open");
        assert_eq!(skip_comments("<!--a--> <!--b-->x"), "x");
    }
}
