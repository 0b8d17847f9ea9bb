//! Single-byte-per-character text codec for the SCPI wire format.
//!
//! Commands and responses travel as one byte per character; only
//! characters in the latin-1 range can be represented.

/// Encode text one byte per character.
///
/// Returns `None` when the text contains a character outside the
/// single-byte range.
pub fn encode_latin1(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect()
}

/// Decode bytes one character per byte. Never fails.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
