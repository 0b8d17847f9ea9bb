/// Errors that can occur during binary block encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    /// The first byte of the response is not the `#` block marker.
    #[error("data in buffer is not in binary block format (got byte 0x{found:02x})")]
    UnexpectedMarker { found: u8 },

    /// The digit-count field is not a hex digit in 1-9.
    #[error("invalid block header digit count (got byte 0x{found:02x})")]
    InvalidDigitCount { found: u8 },

    /// The byte-count field is not a run of ASCII decimal digits.
    #[error("invalid block header byte count {field:?}")]
    InvalidByteCount { field: String },

    /// The payload exceeds the 1 GB frame-size ceiling.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The byte after the payload is not the newline terminator.
    #[error("block not terminated correctly (got byte 0x{found:02x})")]
    MissingTerminator { found: u8 },

    /// The payload length is not a whole number of elements.
    #[error("payload length {len} is not a multiple of element width {width}")]
    ElementSize { len: usize, width: usize },

    /// The stream ended before the frame was complete.
    #[error("connection closed (incomplete block)")]
    Closed,

    /// An I/O error occurred while reading the frame.
    #[error("block I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BlockError>;
