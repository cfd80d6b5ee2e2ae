//! Transfer error type shared by probe, segment, and media fetches.

use std::fmt;

/// Error returned by a single HTTP transfer (curl failure, HTTP status, or
/// local write failure). Cancellation is not an error; see `StreamEnd`.
#[derive(Debug)]
pub enum TransferError {
    /// Curl reported an error (timeout, connection, TLS, etc.).
    Transport(curl::Error),
    /// HTTP response had a status outside the accepted set.
    Http(u32),
    /// Local file write failed (disk full, permission denied).
    Storage(std::io::Error),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Transport(e) => write!(f, "{}", e),
            TransferError::Http(code) => write!(f, "HTTP {}", code),
            TransferError::Storage(e) => write!(f, "storage: {}", e),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Transport(e) => Some(e),
            TransferError::Storage(e) => Some(e),
            TransferError::Http(_) => None,
        }
    }
}
