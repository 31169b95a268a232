//! End-to-end smoke test: start the real server with the static-file demo
//! handler, issue plain HTTP/1.1 requests over a real TCP socket, and check
//! the responses. Exercises the whole stack — acceptor thread, dispatcher,
//! worker pool, coroutine scheduler, parser, and handler — together.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use coro_httpd::demo::StaticFileHandler;
use coro_httpd::{Config, Server};

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn start_server(root: std::path::PathBuf, port: u16) {
    let mut config = Config::default();
    config.port = port;
    config.workers = 2;
    config.root = root.to_string_lossy().into_owned();

    std::thread::spawn(move || {
        let handler = StaticFileHandler::new(root);
        Server::new(config, handler).run().expect("server failed to start");
    });
}

fn connect_with_retry(port: u16) -> TcpStream {
    for _ in 0..50 {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)) {
            return stream;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("server never started listening on port {port}");
}

fn request(port: u16, raw: &str) -> String {
    let mut stream = connect_with_retry(port);
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();
    stream.shutdown(std::net::Shutdown::Write).ok();
    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    response
}

#[test]
fn serves_an_index_file() {
    let dir = std::env::temp_dir().join(format!("coro-httpd-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), "<html>hello</html>").unwrap();

    let port = free_port();
    start_server(dir.clone(), port);

    let response = request(port, "GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 200 OK"), "unexpected response: {response}");
    assert!(response.contains("Content-Type: text/html"));
    assert!(response.ends_with("<html>hello</html>"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_asset_is_404() {
    let dir = std::env::temp_dir().join(format!("coro-httpd-test-404-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), "home").unwrap();

    let port = free_port();
    start_server(dir.clone(), port);

    let response = request(
        port,
        "GET /does-not-exist.png HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    );

    assert!(response.starts_with("HTTP/1.1 404"), "unexpected response: {response}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bad_request_line_gets_400_and_connection_closes() {
    let dir = std::env::temp_dir().join(format!("coro-httpd-test-400-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.html"), "home").unwrap();

    let port = free_port();
    start_server(dir.clone(), port);

    let response = request(port, "NOT A REQUEST LINE AT ALL\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 400"), "unexpected response: {response}");

    let _ = std::fs::remove_dir_all(&dir);
}
