//! Content types inferred from resource paths.

use std::fmt;

/// Content type of a virtual resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Html,
    Css,
    JavaScript,
    Json,
    PlainText,
}

impl ContentType {
    /// Infers the content type from the path's extension. Unknown or missing
    /// extensions are plain text.
    pub fn from_path(path: &str) -> Self {
        match extension(path) {
            "html" => ContentType::Html,
            "css" => ContentType::Css,
            "js" | "mjs" => ContentType::JavaScript,
            "json" => ContentType::Json,
            _ => ContentType::PlainText,
        }
    }

    /// The MIME type.
    pub fn mime(self) -> &'static str {
        match self {
            ContentType::Html => "text/html",
            ContentType::Css => "text/css",
            ContentType::JavaScript => "text/javascript",
            ContentType::Json => "application/json",
            ContentType::PlainText => "text/plain",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// The text after the last `.` of `path`.
///
/// Empty when there is no `.` or when the candidate contains anything other
/// than ASCII letters, digits and `_`.
pub fn extension(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((_, ext)) if ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => ext,
        _ => "",
    }
}
