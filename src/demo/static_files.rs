//! A static-file `Handler`, grounded in
//! `handle_static_file_middleware.c`/`http_utils.c`. Not part of the core
//! scheduler/parser library (spec.md's Non-goals keep routing and content
//! generation out of scope) — this is the demo application that makes the
//! crate runnable end to end, the way `echo.rs` does for the teacher.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::io::AsRawFd;
use std::path::{Component, Path, PathBuf};

use crate::error::Result;
use crate::handler::{ConnIo, Handler};
use crate::http::Request;

use super::mime;

pub struct StaticFileHandler {
    root: PathBuf,
}

impl StaticFileHandler {
    pub fn new(root: impl Into<PathBuf>) -> StaticFileHandler {
        StaticFileHandler { root: root.into() }
    }

    /// `None` on a `..` traversal attempt (`uri_decoder_middleware.c`
    /// rejects these with 400 before ever touching the filesystem).
    fn resolve(&self, uri: &str) -> Option<PathBuf> {
        let trimmed = uri.split('?').next().unwrap_or(uri).trim_start_matches('/');
        let rel = Path::new(trimmed);
        if rel.components().any(|c| matches!(c, Component::ParentDir)) {
            return None;
        }
        Some(self.root.join(rel))
    }
}

impl Handler for StaticFileHandler {
    fn handle(&self, req: &Request, io: &mut ConnIo) -> Result<()> {
        let keep_alive = req.keep_alive();
        let head_only = match req.method.as_str() {
            "GET" => false,
            "HEAD" => true,
            _ => return send_error(io, 405, "Method Not Allowed", keep_alive),
        };

        let path = match self.resolve(&req.uri) {
            Some(p) => p,
            None => return send_error(io, 400, "Bad Request", keep_alive),
        };

        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => {
                if !req.uri.ends_with('/') {
                    return send_redirect(io, &format!("{}/", req.uri), keep_alive);
                }
                serve_index_or_404(io, &path.join("index.html"), head_only, keep_alive)
            }
            Ok(meta) if meta.is_file() => serve_file(io, &path, meta.len(), head_only, keep_alive),
            _ => {
                // SPA fallback: an extensionless path with no matching
                // file falls back to the root index; anything with a `.`
                // is a genuinely missing asset.
                let last_segment = req.uri.rsplit('/').next().unwrap_or("");
                if last_segment.contains('.') {
                    send_error(io, 404, "Not Found", keep_alive)
                } else {
                    serve_index_or_404(io, &self.root.join("index.html"), head_only, keep_alive)
                }
            }
        }
    }
}

fn serve_index_or_404(io: &mut ConnIo, index: &Path, head_only: bool, keep_alive: bool) -> Result<()> {
    match fs::metadata(index) {
        Ok(m) if m.is_file() => serve_file(io, index, m.len(), head_only, keep_alive),
        _ => send_error(io, 404, "Not Found", keep_alive),
    }
}

fn serve_file(io: &mut ConnIo, path: &Path, len: u64, head_only: bool, keep_alive: bool) -> Result<()> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return send_error(io, 404, "Not Found", keep_alive),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return send_error(io, 403, "Forbidden", keep_alive)
        }
        Err(_) => return send_error(io, 500, "Internal Server Error", keep_alive),
    };

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n",
        mime::for_path(path),
        len,
        connection_header(keep_alive),
    );
    io.send(header.as_bytes())?;

    if head_only || len == 0 {
        return Ok(());
    }

    let mut offset: i64 = 0;
    io.sendfile(file.as_raw_fd(), &mut offset, len as usize)
}

fn send_redirect(io: &mut ConnIo, location: &str, keep_alive: bool) -> Result<()> {
    let body = format!("Redirecting to {}\n", location);
    let response = format!(
        "HTTP/1.1 301 Moved Permanently\r\nLocation: {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n{}",
        location,
        body.len(),
        connection_header(keep_alive),
        body
    );
    io.send(response.as_bytes())
}

fn send_error(io: &mut ConnIo, status: u16, reason: &str, keep_alive: bool) -> Result<()> {
    let body = format!("{}\n", reason);
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n{}",
        status,
        reason,
        body.len(),
        connection_header(keep_alive),
        body
    );
    io.send(response.as_bytes())
}

fn connection_header(keep_alive: bool) -> &'static str {
    if keep_alive {
        "keep-alive"
    } else {
        "close"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_simple_path_under_root() {
        let h = StaticFileHandler::new("/srv/www");
        assert_eq!(h.resolve("/css/app.css"), Some(PathBuf::from("/srv/www/css/app.css")));
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        let h = StaticFileHandler::new("/srv/www");
        assert_eq!(h.resolve("/../etc/passwd"), None);
        assert_eq!(h.resolve("/a/../../etc/passwd"), None);
    }

    #[test]
    fn root_resolves_to_root_dir() {
        let h = StaticFileHandler::new("/srv/www");
        assert_eq!(h.resolve("/"), Some(PathBuf::from("/srv/www")));
    }
}
