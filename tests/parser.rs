//! Black-box coverage of the request parser through the public API.

use coro_httpd::http::{ParseOutcome, RequestParser};

#[test]
fn head_request_with_multiple_headers() {
    let mut p = RequestParser::new();
    let input = b"HEAD /a/b?c=d HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test\r\nAccept: */*\r\n\r\n";
    match p.feed(input) {
        ParseOutcome::Complete(req) => {
            assert_eq!(req.method, "HEAD");
            assert_eq!(req.uri, "/a/b?c=d");
            assert_eq!(req.headers.len(), 3);
            assert_eq!(req.header("host"), Some("example.com"));
            assert_eq!(req.header("HOST"), Some("example.com"));
        }
        _ => panic!("expected a complete request"),
    }
}

#[test]
fn content_length_is_parsed_from_headers() {
    let mut p = RequestParser::new();
    match p.feed(b"POST /submit HTTP/1.1\r\nContent-Length: 42\r\n\r\n") {
        ParseOutcome::Complete(req) => assert_eq!(req.content_length(), Some(42)),
        _ => panic!("expected a complete request"),
    }
}

#[test]
fn missing_content_length_is_none() {
    let mut p = RequestParser::new();
    match p.feed(b"GET / HTTP/1.1\r\n\r\n") {
        ParseOutcome::Complete(req) => assert_eq!(req.content_length(), None),
        _ => panic!("expected a complete request"),
    }
}

#[test]
fn connection_close_overrides_version_default() {
    let mut p = RequestParser::new();
    match p.feed(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n") {
        ParseOutcome::Complete(req) => assert!(!req.keep_alive()),
        _ => panic!("expected a complete request"),
    }
}

#[test]
fn empty_uri_is_rejected() {
    let mut p = RequestParser::new();
    assert!(matches!(p.feed(b"GET  HTTP/1.1\r\n\r\n"), ParseOutcome::Error));
}
