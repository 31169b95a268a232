//! The request-line + header incremental state machine, grounded in
//! `request_handler/protocol.c`'s `parse_http`/`read_line`/
//! `parse_request_line`/`parse_header_field`.

use super::uri_decode;

/// Longest line (request line or header) this parser will accept before
/// giving up. Keeps a slow-lorris client from growing the buffer forever.
const MAX_LINE_LEN: usize = 8 * 1024;

/// Most header fields a single request may carry.
const MAX_HEADERS: usize = 100;

#[derive(Debug, Eq, PartialEq)]
enum State {
    RequestLine,
    Headers,
    Done,
    Error,
}

/// A fully parsed request. The URI has already been percent/plus-decoded.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_length(&self) -> Option<usize> {
        self.header("Content-Length").and_then(|v| v.trim().parse().ok())
    }

    /// Whether the connection should stay open after this response, per
    /// HTTP/1.1 (default keep-alive) and HTTP/1.0 (default close) rules.
    pub fn keep_alive(&self) -> bool {
        match self.header("Connection").map(|v| v.to_ascii_lowercase()) {
            Some(v) if v == "close" => false,
            Some(v) if v == "keep-alive" => true,
            _ => self.version == "HTTP/1.1",
        }
    }
}

pub enum ParseOutcome {
    /// Not enough data yet; feed more bytes.
    Pending,
    /// A full request was parsed; any bytes after it stay buffered for the
    /// next request on a keep-alive connection.
    Complete(Request),
    /// The input violated the protocol; the connection must close.
    Error,
}

/// Incremental parser: feed it bytes as they arrive from `recv_async`.
pub struct RequestParser {
    buf: Vec<u8>,
    state: State,
    method: String,
    uri: String,
    version: String,
    headers: Vec<(String, String)>,
}

impl RequestParser {
    pub fn new() -> RequestParser {
        RequestParser {
            buf: Vec::new(),
            state: State::RequestLine,
            method: String::new(),
            uri: String::new(),
            version: String::new(),
            headers: Vec::new(),
        }
    }

    /// Reset parser state for the next request on a keep-alive connection.
    /// Leftover bytes already in `buf` (a pipelined request) are kept.
    pub fn reset(&mut self) {
        self.state = State::RequestLine;
        self.method.clear();
        self.uri.clear();
        self.version.clear();
        self.headers.clear();
    }

    pub fn feed(&mut self, data: &[u8]) -> ParseOutcome {
        self.buf.extend_from_slice(data);

        loop {
            if self.state == State::Error || self.state == State::Done {
                return ParseOutcome::Error;
            }

            let line = match self.take_line() {
                Some(Ok(line)) => line,
                Some(Err(())) => {
                    self.state = State::Error;
                    return ParseOutcome::Error;
                }
                None => return ParseOutcome::Pending,
            };

            let result = match self.state {
                State::RequestLine => self.parse_request_line(&line).map(|()| {
                    self.state = State::Headers;
                }),
                State::Headers => {
                    if line.is_empty() {
                        self.state = State::Done;
                        return ParseOutcome::Complete(self.finish());
                    }
                    if self.headers.len() >= MAX_HEADERS {
                        Err(())
                    } else {
                        self.parse_header_field(&line)
                    }
                }
                State::Done | State::Error => unreachable!(),
            };

            if result.is_err() {
                self.state = State::Error;
                return ParseOutcome::Error;
            }
        }
    }

    /// Pull one `\r\n`- or `\n`-terminated line out of `buf`, if a full one
    /// is present. `Some(Err(()))` means the line exceeded `MAX_LINE_LEN`
    /// before a terminator showed up.
    fn take_line(&mut self) -> Option<Result<Vec<u8>, ()>> {
        match self.buf.iter().position(|&b| b == b'\n') {
            Some(nl) => {
                let mut raw: Vec<u8> = self.buf.drain(..=nl).collect();
                raw.pop(); // trailing \n
                if raw.last() == Some(&b'\r') {
                    raw.pop();
                }
                Some(Ok(raw))
            }
            None if self.buf.len() > MAX_LINE_LEN => Some(Err(())),
            None => None,
        }
    }

    fn parse_request_line(&mut self, line: &[u8]) -> Result<(), ()> {
        let s = std::str::from_utf8(line).map_err(|_| ())?;
        let mut parts = s.splitn(3, ' ');
        let method = parts.next().filter(|s| !s.is_empty()).ok_or(())?;
        let uri = parts.next().filter(|s| !s.is_empty()).ok_or(())?;
        let version = parts.next().filter(|s| !s.is_empty()).ok_or(())?;
        if !version.starts_with("HTTP/") {
            return Err(());
        }
        self.method = method.to_string();
        self.uri = uri_decode(uri);
        self.version = version.to_string();
        Ok(())
    }

    fn parse_header_field(&mut self, line: &[u8]) -> Result<(), ()> {
        let s = std::str::from_utf8(line).map_err(|_| ())?;
        let colon = s.find(':').ok_or(())?;
        let name = s[..colon].trim();
        let value = s[colon + 1..].trim();
        if name.is_empty() {
            return Err(());
        }
        self.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn finish(&mut self) -> Request {
        Request {
            method: std::mem::take(&mut self.method),
            uri: std::mem::take(&mut self.uri),
            version: std::mem::take(&mut self.version),
            headers: std::mem::take(&mut self.headers),
        }
    }
}

impl Default for RequestParser {
    fn default() -> RequestParser {
        RequestParser::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &str) -> ParseOutcome {
        let mut p = RequestParser::new();
        p.feed(input.as_bytes())
    }

    #[test]
    fn parses_a_simple_get() {
        match parse_all("GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n") {
            ParseOutcome::Complete(req) => {
                assert_eq!(req.method, "GET");
                assert_eq!(req.uri, "/index.html");
                assert_eq!(req.version, "HTTP/1.1");
                assert_eq!(req.header("Host"), Some("example.com"));
            }
            _ => panic!("expected a complete request"),
        }
    }

    #[test]
    fn decodes_percent_encoded_uri() {
        match parse_all("GET /a%20b HTTP/1.1\r\n\r\n") {
            ParseOutcome::Complete(req) => assert_eq!(req.uri, "/a b"),
            _ => panic!("expected a complete request"),
        }
    }

    #[test]
    fn pending_on_partial_request_line() {
        let mut p = RequestParser::new();
        assert!(matches!(p.feed(b"GET /foo"), ParseOutcome::Pending));
        match p.feed(b" HTTP/1.1\r\n\r\n") {
            ParseOutcome::Complete(req) => assert_eq!(req.uri, "/foo"),
            _ => panic!("expected a complete request"),
        }
    }

    #[test]
    fn rejects_missing_http_version() {
        assert!(matches!(parse_all("GET /foo bogus\r\n\r\n"), ParseOutcome::Error));
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(matches!(
            parse_all("GET / HTTP/1.1\r\nnotaheader\r\n\r\n"),
            ParseOutcome::Error
        ));
    }

    #[test]
    fn feeding_byte_at_a_time_still_parses() {
        let mut p = RequestParser::new();
        let input = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let mut outcome = ParseOutcome::Pending;
        for &b in input {
            outcome = p.feed(&[b]);
        }
        assert!(matches!(outcome, ParseOutcome::Complete(_)));
    }

    #[test]
    fn keeps_pipelined_bytes_for_next_request() {
        let mut p = RequestParser::new();
        let outcome = p.feed(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n");
        assert!(matches!(outcome, ParseOutcome::Complete(_)));
        p.reset();
        match p.feed(b"") {
            ParseOutcome::Complete(req) => assert_eq!(req.uri, "/b"),
            _ => panic!("expected the pipelined second request"),
        }
    }

    #[test]
    fn overlong_line_without_terminator_errors() {
        let mut p = RequestParser::new();
        let junk = vec![b'a'; MAX_LINE_LEN + 1];
        assert!(matches!(p.feed(&junk), ParseOutcome::Error));
    }

    #[test]
    fn keep_alive_defaults_by_version() {
        let mut p = RequestParser::new();
        match p.feed(b"GET / HTTP/1.0\r\n\r\n") {
            ParseOutcome::Complete(req) => assert!(!req.keep_alive()),
            _ => panic!(),
        }
        let mut p = RequestParser::new();
        match p.feed(b"GET / HTTP/1.1\r\n\r\n") {
            ParseOutcome::Complete(req) => assert!(req.keep_alive()),
            _ => panic!(),
        }
    }
}
