use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::error::{BlockError, Result};

/// Decodes IEEE 488.2 binary block frames from any `Read` stream.
///
/// Partial reads are looped over internally. The frame steps are exposed
/// individually because the transport layer bounds the `#` marker with a
/// shorter timeout than the rest of the frame; [`read_frame`] composes
/// them for streams that need no timeout juggling.
///
/// [`read_frame`]: BlockReader::read_frame
pub struct BlockReader<T> {
    inner: T,
}

impl<T: Read> BlockReader<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Read one byte and require it to be the `#` block marker.
    pub fn expect_marker(&mut self) -> Result<()> {
        let byte = self.read_byte()?;
        if byte != b'#' {
            return Err(BlockError::UnexpectedMarker { found: byte });
        }
        Ok(())
    }

    /// Read the header's digit-count and byte-count fields.
    ///
    /// The digit count is a single hex digit whose value must be 1-9; a
    /// literal `0` is an invalid header, never a zero-length frame. The
    /// byte count is that many ASCII decimal digits, so it is bounded
    /// below 10^9 by construction. A declared count of `0` (e.g. `#10`)
    /// is a well-formed empty frame.
    pub fn read_len(&mut self) -> Result<usize> {
        let digit_byte = self.read_byte()?;
        let digit_count = match (digit_byte as char).to_digit(16) {
            Some(d @ 1..=9) => d as usize,
            _ => return Err(BlockError::InvalidDigitCount { found: digit_byte }),
        };

        let mut field = vec![0u8; digit_count];
        self.read_exact(&mut field)?;
        let text = std::str::from_utf8(&field)
            .ok()
            .filter(|t| t.bytes().all(|b| b.is_ascii_digit()));
        let len = text
            .and_then(|t| t.parse::<usize>().ok())
            .ok_or_else(|| BlockError::InvalidByteCount {
                field: String::from_utf8_lossy(&field).into_owned(),
            })?;

        trace!(digit_count, len, "decoded block header");
        Ok(len)
    }

    /// Read exactly `len` payload bytes into a pre-sized buffer.
    pub fn read_payload(&mut self, len: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(len);
        self.read_exact(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Read one byte and require it to be the newline terminator.
    pub fn read_terminator(&mut self) -> Result<()> {
        let byte = self.read_byte()?;
        if byte != b'\n' {
            return Err(BlockError::MissingTerminator { found: byte });
        }
        Ok(())
    }

    /// Read header, payload, and terminator (everything after the marker).
    ///
    /// No partial payload escapes on a terminator failure.
    pub fn read_body(&mut self) -> Result<Bytes> {
        let len = self.read_len()?;
        let payload = self.read_payload(len)?;
        self.read_terminator()?;
        Ok(payload)
    }

    /// Read one complete frame: marker, header, payload, terminator.
    pub fn read_frame(&mut self) -> Result<Bytes> {
        self.expect_marker()?;
        self.read_body()
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => return Err(BlockError::Closed),
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(BlockError::Io(err)),
            }
        }
        Ok(())
    }
}
