//! Source formatting applied to published resources.

use regex_lite::{Captures, Regex};
use std::sync::LazyLock;

static EDGE_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+\n|\n\s+$").expect("valid edge pattern"));
static LEADING_TABS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\t+").expect("valid tab pattern"));
static TRAILING_SEMICOLON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m);([ \t\r]*(?://.*)?)$").expect("valid semicolon pattern")
});
static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<script>(.*?)</script>").expect("valid script pattern"));

/// Rewrites source text before it is published.
pub trait ContentFormatter: Send + Sync {
    /// Formats `code` written in `language` (a file extension such as `js`).
    fn format(&self, code: &str, language: &str) -> String;
}

/// Leaves code untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFormatter;

impl ContentFormatter for NoopFormatter {
    fn format(&self, code: &str, _language: &str) -> String {
        code.to_string()
    }
}

/// Normalizes whitespace and, optionally, statement-ending semicolons.
///
/// - blank lines at either edge are dropped
/// - leading tabs become `indent` (unless `indent` is a tab)
/// - with `semicolons` off, `;` at the end of a JavaScript line is removed,
///   outside template literals; HTML applies this inside `<script>` blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndentFormatter {
    pub indent: String,
    pub semicolons: bool,
}

impl Default for IndentFormatter {
    fn default() -> Self {
        Self {
            indent: "\t".to_string(),
            semicolons: true,
        }
    }
}

impl IndentFormatter {
    pub fn new(indent: impl Into<String>) -> Self {
        Self {
            indent: indent.into(),
            ..Self::default()
        }
    }

    pub fn with_semicolons(mut self, semicolons: bool) -> Self {
        self.semicolons = semicolons;
        self
    }

    fn indentation(&self, code: &str) -> String {
        if self.indent == "\t" {
            return code.to_string();
        }
        LEADING_TABS
            .replace_all(code, |caps: &Captures<'_>| self.indent.repeat(caps[0].len()))
            .into_owned()
    }

    fn javascript(&self, code: &str) -> String {
        if self.semicolons {
            return code.to_string();
        }
        split_template_literals(code)
            .into_iter()
            .map(|(segment, literal)| {
                if literal {
                    segment.to_string()
                } else {
                    TRAILING_SEMICOLON.replace_all(segment, "$1").into_owned()
                }
            })
            .collect()
    }

    fn html(&self, code: &str) -> String {
        SCRIPT_BLOCK
            .replace_all(code, |caps: &Captures<'_>| {
                format!("<script>{}</script>", self.javascript(&caps[1]))
            })
            .into_owned()
    }
}

impl ContentFormatter for IndentFormatter {
    fn format(&self, code: &str, language: &str) -> String {
        let code = EDGE_BLANK_LINES.replace_all(code, "");
        let code = self.indentation(&code);
        match language {
            "js" | "mjs" => self.javascript(&code),
            "html" | "yz" => self.html(&code),
            _ => code,
        }
    }
}

/// Splits `code` into alternating code and template-literal segments. The
/// flag marks literals. An unterminated literal runs to the end.
fn split_template_literals(code: &str) -> Vec<(&str, bool)> {
    let mut segments = Vec::new();
    let bytes = code.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        segments.push((&code[start..i], false));
        let open = i;
        i += 1;
        while i < bytes.len() && bytes[i] != b'`' {
            i += if bytes[i] == b'\\' { 2 } else { 1 };
        }
        let end = (i + 1).min(bytes.len());
        segments.push((&code[open..end], true));
        start = end;
        i = end;
    }
    segments.push((&code[start..], false));
    segments
}
