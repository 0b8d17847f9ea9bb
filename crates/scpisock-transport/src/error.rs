/// Errors that can occur on the raw socket transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host string is not a valid IPv4 or IPv6 literal.
    #[error("invalid instrument address {host:?}: not an IP literal")]
    InvalidAddress { host: String },

    /// Failed to establish the TCP connection.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// A receive did not complete within the configured timeout.
    #[error("receive timed out")]
    TimedOut,

    /// The peer closed the connection mid-operation.
    #[error("connection closed by peer")]
    Closed,

    /// An I/O error occurred on the socket.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
