//! Transport error categorization for diagnostics.
//!
//! A transport error means no HTTP response was obtained. Every such attempt
//! is counted as a transport failure; the kind recorded here only enriches
//! the log line so operators can tell timeouts from refused connections.

use std::fmt;

/// Why no response could be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// Connect or read exceeded the client timeout
    Timeout,

    /// Connection refused, reset, or DNS resolution failed
    Connect,

    /// TLS handshake or certificate failure
    Tls,

    /// The status line arrived but the body could not be read
    Body,

    /// Anything else
    Other,
}

impl TransportErrorKind {
    /// Categorize a reqwest error.
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportErrorKind::Timeout
        } else if error.is_connect() {
            TransportErrorKind::Connect
        } else if error.is_body() || error.is_decode() {
            TransportErrorKind::Body
        } else {
            let error_msg = error.to_string().to_lowercase();

            if error_msg.contains("certificate")
                || error_msg.contains("tls")
                || error_msg.contains("ssl")
            {
                TransportErrorKind::Tls
            } else if error_msg.contains("timeout") || error_msg.contains("timed out") {
                TransportErrorKind::Timeout
            } else if error_msg.contains("dns")
                || error_msg.contains("resolve")
                || error_msg.contains("connect")
            {
                TransportErrorKind::Connect
            } else {
                TransportErrorKind::Other
            }
        }
    }

    /// Get the log label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Tls => "tls",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
