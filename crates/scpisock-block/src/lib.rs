//! IEEE 488.2 binary block framing, layered on any `Read` stream.
//!
//! SCPI instruments transfer bulk numeric payloads inline in the text
//! command stream using the binary block format:
//!
//! ```text
//! #<x><yyy><payload>\n
//! ```
//!
//! `<x>` is one digit in 1-9 giving the number of decimal digits in the
//! payload length, `<yyy>` is the payload length in bytes, followed by
//! exactly that many raw bytes and a newline terminator.
//!
//! This crate provides the header codec, the frame state machine
//! ([`BlockReader`]), and raw-byte reinterpretation into fixed-width
//! element vectors ([`ElementType`], [`BlockData`]).

pub mod codec;
pub mod error;
pub mod reader;

pub use codec::{
    decode_elements, encode_elements, encode_header, BlockData, ElementType, MAX_PAYLOAD,
};
pub use error::{BlockError, Result};
pub use reader::BlockReader;
