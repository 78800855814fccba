// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::fmt;

/// Error code and message reported by the peer (`ERROR: <code>,<message>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCodeMessage {
    pub code: i32,
    pub message: String,
}

impl ErrorCodeMessage {
    /// Parse the `<code>,<message>` form. Whitespace around both parts is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let (code, message) = s.split_once(',')?;
        let code = code.trim().parse::<i32>().ok()?;
        Some(Self {
            code,
            message: message.trim().to_string(),
        })
    }
}

impl fmt::Display for ErrorCodeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.code, self.message)
    }
}

/// All errors that can occur in the codeless-dsps library.
///
/// The variants follow the protocol's error classes: malformed text (parse),
/// out-of-range arguments (validation), protocol violations, transport failures,
/// resource problems and duplicate requests (overflow).
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodelessError {
    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Peer error: {0}")]
    Peer(ErrorCodeMessage),

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Not connected (state: {state})")]
    NotReady { state: String },

    #[error("Resource error: {message}")]
    Resource { message: String },

    #[error("Pending buffer overflow (limit {limit})")]
    PendingOverflow { limit: usize },

    #[error("Overflow: {what} already pending")]
    Overflow { what: String },
}

impl CodelessError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse { message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into() }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource { message: message.into() }
    }

    pub fn overflow(what: impl Into<String>) -> Self {
        Self::Overflow { what: what.into() }
    }

    /// Whether this error came from the transport and forces a connection reset.
    pub fn is_transport(&self) -> bool {
        matches!(self, CodelessError::Transport { .. })
    }

    /// Whether this error is resolved locally by an error response to the peer.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            CodelessError::Parse { .. } | CodelessError::Validation { .. }
        )
    }

    /// Whether this error is a resource problem (file, sink or pending buffer).
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            CodelessError::Resource { .. }
                | CodelessError::PendingOverflow { .. }
                | CodelessError::NotReady { .. }
        )
    }
}

impl From<std::io::Error> for CodelessError {
    fn from(e: std::io::Error) -> Self {
        CodelessError::Resource { message: e.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, CodelessError>;
