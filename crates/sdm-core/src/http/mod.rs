//! Per-task HTTP session built on the curl crate (libcurl).
//!
//! A session carries fixed browser-like default headers plus per-task extras
//! and applies them to every request, with a `Referer` derived from the
//! target origin. TLS verification is disabled on every transfer: a number of
//! origins this tool is pointed at serve self-signed certificates, and the
//! upstream behavior contract keeps verification off by default.

mod error;

pub use error::TransferError;

use curl::easy::{Easy, List};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

use crate::control::CancelFlag;

/// Fixed streaming chunk size; workers check cancellation between chunks.
pub const CHUNK_SIZE: usize = 64 * 1024;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// How a streamed GET ended when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Body fully consumed.
    Completed,
    /// Cancellation flag observed between chunks; the response was closed.
    Cancelled,
}

/// Default headers for one task, applied to every request it makes.
#[derive(Debug, Clone)]
pub struct HttpSession {
    headers: Vec<(String, String)>,
}

impl HttpSession {
    /// Session for `target_url`: browser defaults plus a `Referer` pointing
    /// at the target origin. `extra` headers (e.g. forwarded from a capture
    /// payload) override defaults of the same name.
    pub fn for_url(target_url: &str, extra: &HashMap<String, String>) -> Self {
        let mut headers: Vec<(String, String)> = vec![
            ("User-Agent".into(), USER_AGENT.into()),
            ("Accept".into(), "*/*".into()),
            ("Accept-Language".into(), "en-US,en;q=0.9".into()),
            ("Connection".into(), "keep-alive".into()),
        ];
        if let Ok(parsed) = url::Url::parse(target_url) {
            if let Some(host) = parsed.host_str() {
                let referer = match parsed.port() {
                    Some(port) => format!("{}://{}:{}/", parsed.scheme(), host, port),
                    None => format!("{}://{}/", parsed.scheme(), host),
                };
                headers.push(("Referer".into(), referer));
            }
        }
        let mut session = Self { headers };
        for (k, v) in extra {
            session.insert_header(k, v);
        }
        session
    }

    fn insert_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Build an Easy handle with session defaults applied and `extra`
    /// per-request headers merged on top (later wins).
    fn easy(&self, url: &str, extra: &[(&str, String)]) -> Result<Easy, curl::Error> {
        let mut merged = self.clone();
        for (k, v) in extra {
            merged.insert_header(k, v);
        }

        let mut easy = Easy::new();
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.ssl_verify_peer(false)?;
        easy.ssl_verify_host(false)?;
        easy.buffer_size(CHUNK_SIZE)?;

        let mut list = List::new();
        for (k, v) in &merged.headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))?;
        }
        easy.http_headers(list)?;
        Ok(easy)
    }

    /// HEAD request with redirect following. Returns the final response's
    /// status code and raw header lines.
    pub fn head(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<(u32, Vec<String>), TransferError> {
        let mut easy = self.easy(url, &[]).map_err(TransferError::Transport)?;
        easy.nobody(true).map_err(TransferError::Transport)?;
        easy.timeout(timeout).map_err(TransferError::Transport)?;

        let lines = RefCell::new(Vec::new());
        {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    collect_header_line(&lines, data);
                    true
                })
                .map_err(TransferError::Transport)?;
            transfer.perform().map_err(TransferError::Transport)?;
        }

        let code = easy.response_code().map_err(TransferError::Transport)?;
        Ok((code, lines.into_inner()))
    }

    /// Probe fallback for servers that block HEAD: GET with `Range: bytes=0-0`
    /// and `Accept-Encoding: identity`, aborting the body after the headers
    /// arrive. Returns the final response's status code and header lines.
    pub fn get_probe_headers(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<(u32, Vec<String>), TransferError> {
        let extra = [
            ("Range", "bytes=0-0".to_string()),
            ("Accept-Encoding", "identity".to_string()),
        ];
        let mut easy = self.easy(url, &extra).map_err(TransferError::Transport)?;
        easy.timeout(timeout).map_err(TransferError::Transport)?;

        let lines = RefCell::new(Vec::new());
        {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    collect_header_line(&lines, data);
                    true
                })
                .map_err(TransferError::Transport)?;
            // Headers are all we need; returning 0 aborts the body transfer.
            transfer
                .write_function(|_| Ok(0))
                .map_err(TransferError::Transport)?;
            match transfer.perform() {
                Ok(()) => {}
                Err(e) if e.is_write_error() => {}
                Err(e) => return Err(TransferError::Transport(e)),
            }
        }

        let code = easy.response_code().map_err(TransferError::Transport)?;
        Ok((code, lines.into_inner()))
    }

    /// Fetch a small UTF-8 body (playlists). Hard timeout, status must be 2xx.
    pub fn fetch_text(
        &self,
        url: &str,
        extra: &[(&str, String)],
        timeout: Duration,
    ) -> Result<String, TransferError> {
        let mut easy = self.easy(url, extra).map_err(TransferError::Transport)?;
        easy.timeout(timeout).map_err(TransferError::Transport)?;

        let body = RefCell::new(Vec::new());
        {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| {
                    body.borrow_mut().extend_from_slice(data);
                    Ok(data.len())
                })
                .map_err(TransferError::Transport)?;
            transfer.perform().map_err(TransferError::Transport)?;
        }

        let code = easy.response_code().map_err(TransferError::Transport)?;
        if !(200..300).contains(&code) {
            return Err(TransferError::Http(code));
        }
        let body = body.into_inner();
        String::from_utf8(body).map_err(|_| {
            TransferError::Storage(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "playlist is not valid UTF-8",
            ))
        })
    }

    /// Streamed GET: each body chunk is handed to `sink`; the cancellation
    /// flag is checked before every chunk. Accepts status 200 or 206.
    ///
    /// `read_timeout` is enforced as a stall timeout (no bytes for that long
    /// aborts the transfer), so long downloads are not killed by a wall clock.
    pub fn stream_get<F>(
        &self,
        url: &str,
        extra: &[(&str, String)],
        read_timeout: Duration,
        cancel: &CancelFlag,
        mut sink: F,
    ) -> Result<StreamEnd, TransferError>
    where
        F: FnMut(&[u8]) -> std::io::Result<()>,
    {
        let mut easy = self.easy(url, extra).map_err(TransferError::Transport)?;
        easy.connect_timeout(read_timeout)
            .map_err(TransferError::Transport)?;
        easy.low_speed_limit(1).map_err(TransferError::Transport)?;
        easy.low_speed_time(read_timeout)
            .map_err(TransferError::Transport)?;

        // Side channels out of the write callback: curl only reports "write
        // aborted", so the reason is recorded here.
        let status = Cell::new(0u32);
        let cancelled = Cell::new(false);
        let bad_status = Cell::new(false);
        let storage_error: RefCell<Option<std::io::Error>> = RefCell::new(None);

        let perform_result = {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    if let Ok(line) = std::str::from_utf8(data) {
                        if let Some(code) = parse_status_line(line) {
                            status.set(code);
                        }
                    }
                    true
                })
                .map_err(TransferError::Transport)?;
            transfer
                .write_function(|data| {
                    if cancel.is_set() {
                        cancelled.set(true);
                        return Ok(0);
                    }
                    let code = status.get();
                    if code != 200 && code != 206 {
                        // Do not write an error body into the output file.
                        bad_status.set(true);
                        return Ok(0);
                    }
                    match sink(data) {
                        Ok(()) => Ok(data.len()),
                        Err(e) => {
                            *storage_error.borrow_mut() = Some(e);
                            Ok(0)
                        }
                    }
                })
                .map_err(TransferError::Transport)?;
            transfer.perform()
        };

        if cancelled.get() {
            return Ok(StreamEnd::Cancelled);
        }
        if let Some(e) = storage_error.into_inner() {
            return Err(TransferError::Storage(e));
        }
        let code = easy.response_code().unwrap_or_else(|_| status.get());
        if bad_status.get() || (code != 200 && code != 206) {
            return Err(TransferError::Http(code));
        }
        if let Err(e) = perform_result {
            return Err(TransferError::Transport(e));
        }
        Ok(StreamEnd::Completed)
    }
}

/// Record a header line, resetting the buffer whenever a new status line
/// arrives so that only the final response of a redirect chain is kept.
fn collect_header_line(lines: &RefCell<Vec<String>>, data: &[u8]) {
    if let Ok(s) = std::str::from_utf8(data) {
        let s = s.trim_end();
        if s.to_ascii_uppercase().starts_with("HTTP/") {
            lines.borrow_mut().clear();
        } else if !s.is_empty() {
            lines.borrow_mut().push(s.to_string());
        }
    }
}

/// Parse the status code out of an `HTTP/x.y NNN ...` line.
fn parse_status_line(line: &str) -> Option<u32> {
    let line = line.trim();
    if !line.to_ascii_uppercase().starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_defaults_and_referer() {
        let session = HttpSession::for_url("https://files.example.com/a/b.iso", &HashMap::new());
        let referer = session
            .headers
            .iter()
            .find(|(k, _)| k == "Referer")
            .map(|(_, v)| v.as_str());
        assert_eq!(referer, Some("https://files.example.com/"));
        assert!(session.headers.iter().any(|(k, _)| k == "User-Agent"));
    }

    #[test]
    fn referer_keeps_explicit_port() {
        let session = HttpSession::for_url("http://127.0.0.1:8080/f.bin", &HashMap::new());
        let referer = session
            .headers
            .iter()
            .find(|(k, _)| k == "Referer")
            .map(|(_, v)| v.as_str());
        assert_eq!(referer, Some("http://127.0.0.1:8080/"));
    }

    #[test]
    fn extra_headers_override_defaults() {
        let mut extra = HashMap::new();
        extra.insert("user-agent".to_string(), "custom/1.0".to_string());
        extra.insert("X-Token".to_string(), "abc".to_string());
        let session = HttpSession::for_url("https://example.com/f", &extra);
        let ua: Vec<_> = session
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
            .collect();
        assert_eq!(ua.len(), 1);
        assert_eq!(ua[0].1, "custom/1.0");
        assert!(session.headers.iter().any(|(k, _)| k == "X-Token"));
    }

    #[test]
    fn status_line_parsing() {
        assert_eq!(parse_status_line("HTTP/1.1 206 Partial Content"), Some(206));
        assert_eq!(parse_status_line("HTTP/2 200"), Some(200));
        assert_eq!(parse_status_line("Content-Length: 5"), None);
    }
}
