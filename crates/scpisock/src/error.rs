use std::fmt;
use std::io::ErrorKind;

use scpisock_block::BlockError;
use scpisock_transport::TransportError;

/// Errors surfaced by instrument operations.
///
/// Four kinds: connectivity (socket-level), protocol (malformed command
/// text), framing (malformed binary block), and instrument (errors drained
/// from the instrument's own error queue).
#[derive(Debug, thiserror::Error)]
pub enum ScpiError {
    /// Invalid address, connection failure, timeout, or closed stream.
    #[error("connectivity error: {0}")]
    Connectivity(#[from] TransportError),

    /// The command contains characters outside the single-byte range.
    #[error("command is not single-byte text: {0:?}")]
    NotText(String),

    /// A query was issued without a `?` marker.
    #[error("query must contain a '?' marker: {0:?}")]
    QueryMarkerMissing(String),

    /// Malformed binary block header/terminator or oversized payload.
    #[error("framing error: {0}")]
    Framing(BlockError),

    /// One or more errors drained from the instrument's error queue.
    #[error("instrument error queue: {0}")]
    Instrument(ErrorQueue),
}

impl From<BlockError> for ScpiError {
    fn from(err: BlockError) -> Self {
        // Socket-level failures inside a framed read are connectivity
        // problems, not framing problems.
        match err {
            BlockError::Closed => ScpiError::Connectivity(TransportError::Closed),
            BlockError::Io(io)
                if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                ScpiError::Connectivity(TransportError::TimedOut)
            }
            BlockError::Io(io) => ScpiError::Connectivity(TransportError::Io(io)),
            other => ScpiError::Framing(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScpiError>;

/// One normalized entry from the instrument's error queue.
///
/// Responses are normalized before parsing: sign characters stripped and
/// surrounding whitespace trimmed, since `syst:err?` formatting varies
/// between instrument families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Numeric error code with sign characters stripped, or `None` when
    /// the code field did not parse.
    pub code: Option<u32>,
    /// Message text without the surrounding quotes, or the full response
    /// text when it did not split into code and message.
    pub message: String,
}

impl ErrorRecord {
    /// Parse a normalized error-query response such as
    /// `113,"Undefined header"`.
    ///
    /// A response that does not match the `<code>,<message>` shape is kept
    /// whole rather than collapsed to a fake code.
    pub fn parse(normalized: &str) -> Self {
        if let Some((code, message)) = normalized.split_once(',') {
            if let Ok(code) = code.trim().parse() {
                return Self {
                    code: Some(code),
                    message: message.trim().trim_matches('"').to_string(),
                };
            }
        }
        Self {
            code: None,
            message: normalized.to_string(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{},\"{}\"", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Ordered list of [`ErrorRecord`]s drained during one `err_check` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorQueue(pub Vec<ErrorRecord>);

impl ErrorQueue {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ErrorRecord> {
        self.0.iter()
    }
}

impl fmt::Display for ErrorQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, record) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{record}")?;
        }
        Ok(())
    }
}

/// Strip sign characters and surrounding whitespace from an error-query
/// response.
pub(crate) fn normalize_error_response(response: &str) -> String {
    response.trim().replace(['+', '-'], "")
}
