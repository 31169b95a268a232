//! Extension → MIME type table, grounded in `http_utils.c`'s `mime_types[]`.

const TABLE: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("json", "application/json"),
    ("map", "application/json"),
    ("txt", "text/plain"),
];

const DEFAULT_MIME: &str = "application/octet-stream";

/// Look up the MIME type for `path` by its extension, defaulting to
/// `application/octet-stream` for anything unrecognized (or extensionless).
pub fn for_path(path: &std::path::Path) -> &'static str {
    let ext = match path.extension().and_then(|e| e.to_str()) {
        Some(e) => e,
        None => return DEFAULT_MIME,
    };
    TABLE
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(ext))
        .map(|(_, v)| *v)
        .unwrap_or(DEFAULT_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn known_extension() {
        assert_eq!(for_path(Path::new("style.css")), "text/css");
    }

    #[test]
    fn unknown_extension_falls_back() {
        assert_eq!(for_path(Path::new("archive.tar.gz")), DEFAULT_MIME);
    }

    #[test]
    fn no_extension_falls_back() {
        assert_eq!(for_path(Path::new("Makefile")), DEFAULT_MIME);
    }
}
