//! # Error Surface
//!
//! Every remote operation ends in a [`RemoteResult`]. The error half is a
//! closed set of kinds so the renderer can map them to messages without
//! inspecting transport details.

use std::fmt;

/// Terminal failure of one remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The local rate gate refused the call. Never retried.
    RateLimited,
    /// Connection refused/reset, DNS, or an HTTP error status.
    NetworkFailure,
    /// The server answered, but not with the shape we expected.
    ValidationFailure,
    /// A download crossed the transfer ceiling. Never retried.
    PayloadTooLarge,
    /// Every attempt ran past its request timeout.
    Timeout,
    /// A worker panicked or otherwise failed outside the remote call.
    InternalFailure,
}

pub type RemoteResult<T> = Result<T, ErrorKind>;

/// How loudly the renderer should present a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl ErrorKind {
    /// Short text suitable for an end user.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::RateLimited => "Too many requests, please wait a moment",
            ErrorKind::NetworkFailure => "Connection to server failed",
            ErrorKind::ValidationFailure => "Server sent an unexpected response",
            ErrorKind::PayloadTooLarge => "Download too large",
            ErrorKind::Timeout => "Server took too long to respond",
            ErrorKind::InternalFailure => "Something went wrong",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::RateLimited | ErrorKind::PayloadTooLarge => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RateLimited => write!(f, "rate limited"),
            ErrorKind::NetworkFailure => write!(f, "network failure"),
            ErrorKind::ValidationFailure => write!(f, "validation failure"),
            ErrorKind::PayloadTooLarge => write!(f, "payload too large"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::InternalFailure => write!(f, "internal failure"),
        }
    }
}

impl std::error::Error for ErrorKind {}
