//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves a fixed set of paths. Responds to HEAD with Content-Length and
//! Accept-Ranges, and to GET with Range with 206 Partial Content. Options
//! simulate servers that block HEAD, ignore ranges, omit Content-Length, or
//! trickle the body slowly (for pause tests).

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// If false, HEAD returns 405 (simulates servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// If false, omit `Accept-Ranges: bytes` even if ranges work.
    pub advertise_ranges: bool,
    /// If false, omit Content-Length and close the connection after the body.
    pub send_content_length: bool,
    /// Write the body in `chunk`-byte pieces with a pause between each.
    pub throttle: Option<(usize, Duration)>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            advertise_ranges: true,
            send_content_length: true,
            throttle: None,
        }
    }
}

/// Starts a server in a background thread serving `routes` (path -> body).
/// Returns the base URL (e.g. `http://127.0.0.1:12345`). The server runs
/// until the process exits.
pub fn start(routes: Vec<(&str, Vec<u8>)>) -> String {
    start_with_options(routes, ServerOptions::default())
}

pub fn start_with_options(routes: Vec<(&str, Vec<u8>)>, opts: ServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes: Arc<HashMap<String, Vec<u8>>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, body)| (path.to_string(), body))
            .collect(),
    );
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            thread::spawn(move || handle(stream, &routes, opts));
        }
    });
    format!("http://127.0.0.1:{}", port)
}

fn handle(mut stream: TcpStream, routes: &HashMap<String, Vec<u8>>, opts: ServerOptions) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, path, range) = parse_request(request);

    let Some(body) = routes.get(&path) else {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        return;
    };
    let total = body.len() as u64;
    let accept_ranges = if opts.advertise_ranges && opts.support_ranges {
        "Accept-Ranges: bytes\r\n"
    } else {
        ""
    };

    if method.eq_ignore_ascii_case("HEAD") {
        if !opts.head_allowed {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
            return;
        }
        let response = if opts.send_content_length {
            format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}\r\n",
                total, accept_ranges
            )
        } else {
            format!("HTTP/1.1 200 OK\r\n{}Connection: close\r\n\r\n", accept_ranges)
        };
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    let (status, extra_header, slice) = match range.filter(|_| opts.support_ranges) {
        Some((start, end_incl)) => {
            let start = start.min(total);
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl {
                (
                    "416 Range Not Satisfiable",
                    format!("Content-Range: bytes */{}\r\n", total),
                    &body[0..0],
                )
            } else {
                let s = start as usize;
                let e = (end_incl + 1) as usize;
                (
                    "206 Partial Content",
                    format!("Content-Range: bytes {}-{}/{}\r\n", start, end_incl, total),
                    &body[s..e],
                )
            }
        }
        None => ("200 OK", String::new(), &body[..]),
    };

    let mut header = format!("HTTP/1.1 {}\r\n{}{}", status, accept_ranges, extra_header);
    if opts.send_content_length {
        header.push_str(&format!("Content-Length: {}\r\n", slice.len()));
    } else {
        header.push_str("Connection: close\r\n");
    }
    header.push_str("\r\n");
    if stream.write_all(header.as_bytes()).is_err() {
        return;
    }

    match opts.throttle {
        Some((chunk, delay)) => {
            for piece in slice.chunks(chunk.max(1)) {
                if stream.write_all(piece).is_err() {
                    return;
                }
                let _ = stream.flush();
                thread::sleep(delay);
            }
        }
        None => {
            let _ = stream.write_all(slice);
        }
    }
    if !opts.send_content_length {
        let _ = stream.shutdown(Shutdown::Both);
    }
}

/// Returns `(method, path, range)`; `range` is the first `bytes=a-b` pair.
fn parse_request(request: &str) -> (String, String, Option<(u64, u64)>) {
    let mut lines = request.split("\r\n");
    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("/");
    let path = target.split('?').next().unwrap_or("/").to_string();

    let mut range = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("range") {
            let value = value.trim();
            if let Some(pair) = value.strip_prefix("bytes=") {
                if let Some((a, b)) = pair.split_once('-') {
                    if let (Ok(a), Ok(b)) = (a.trim().parse(), b.trim().parse()) {
                        range = Some((a, b));
                    }
                }
            }
        }
    }
    (method, path, range)
}
