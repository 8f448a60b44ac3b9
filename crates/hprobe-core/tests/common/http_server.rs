//! Minimal HTTP/1.1 server for integration tests.
//!
//! Routes:
//! - `/`         200 with an HTML page, `Server`, `X-Powered-By` and `CF-Ray` headers
//! - `/plain`    200 text body, no CDN headers
//! - `/redirect` 301 to `/plain`
//! - anything else 404
//!
//! HEAD gets the same headers without a body. Every response closes the
//! connection.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

pub const INDEX_TITLE: &str = "Probe Fixture";

pub const INDEX_BODY: &str = "<!doctype html>\n<html>\n<head><title>Probe Fixture</title></head>\n\
<body><p>hello from the fixture</p></body>\n</html>\n";

pub const PLAIN_BODY: &str = "just text\nsecond line\n";

/// Starts a server in a background thread. Returns `127.0.0.1:<port>`.
/// The server runs until the process exits.
pub fn start() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || handle(stream));
        }
    });
    format!("127.0.0.1:{}", port)
}

/// An address nothing listens on.
pub fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("127.0.0.1:{}", port)
}

fn handle(mut stream: TcpStream) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    // Anything that is not text (e.g. a TLS ClientHello) just gets the socket closed.
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let mut parts = request.lines().next().unwrap_or("").split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("/");

    let (status, extra, body): (&str, &str, &str) = match path {
        "/" => (
            "200 OK",
            "Content-Type: text/html\r\nServer: nginx/1.24.0\r\nX-Powered-By: PHP/8.2.1\r\nCF-Ray: 8a1b2c3d4e5f-AMS\r\n",
            INDEX_BODY,
        ),
        "/plain" => ("200 OK", "Content-Type: text/plain\r\n", PLAIN_BODY),
        "/redirect" => ("301 Moved Permanently", "Location: /plain\r\n", ""),
        _ => ("404 Not Found", "Content-Type: text/plain\r\n", "not found\n"),
    };
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n",
        status,
        body.len(),
        extra
    );
    let _ = stream.write_all(head.as_bytes());
    if !method.eq_ignore_ascii_case("HEAD") {
        let _ = stream.write_all(body.as_bytes());
    }
}
