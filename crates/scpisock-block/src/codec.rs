use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{BlockError, Result};

/// Maximum payload size: just under 1 GB.
///
/// The header's digit-count field is a single digit in 1-9, so the
/// byte-count field can hold at most nine decimal digits.
pub const MAX_PAYLOAD: usize = 1_000_000_000;

/// Encode an IEEE 488.2 binary block header for a payload of `len` bytes.
///
/// Wire format:
/// ```text
/// #<x><yyy>
/// ```
/// where `<x>` is one digit giving the number of decimal digits in the
/// payload length, and `<yyy>` is the payload length itself.
///
/// For example, a 500-byte payload encodes as `#3500`.
pub fn encode_header(len: usize) -> Result<String> {
    if len >= MAX_PAYLOAD {
        return Err(BlockError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD,
        });
    }
    let count = len.to_string();
    Ok(format!("#{}{}", count.len(), count))
}

/// Element kinds a block payload can be reinterpreted as.
///
/// Each kind maps to a fixed byte width. The codec performs no byte-order
/// inference or conversion: bytes are reinterpreted in host order exactly
/// as received, so the caller must have configured the instrument's
/// transmitted byte order to match beforehand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Float64,
}

impl ElementType {
    /// Width of one element in bytes.
    pub fn width(self) -> usize {
        match self {
            ElementType::Int8 | ElementType::Uint8 => 1,
            ElementType::Int16 | ElementType::Uint16 => 2,
            ElementType::Int32 | ElementType::Uint32 | ElementType::Float32 => 4,
            ElementType::Int64 | ElementType::Uint64 | ElementType::Float64 => 8,
        }
    }
}

/// A decoded block payload, one vector variant per element kind.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockData {
    Int8(Vec<i8>),
    Uint8(Vec<u8>),
    Int16(Vec<i16>),
    Uint16(Vec<u16>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Int64(Vec<i64>),
    Uint64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl BlockData {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            BlockData::Int8(v) => v.len(),
            BlockData::Uint8(v) => v.len(),
            BlockData::Int16(v) => v.len(),
            BlockData::Uint16(v) => v.len(),
            BlockData::Int32(v) => v.len(),
            BlockData::Uint32(v) => v.len(),
            BlockData::Int64(v) => v.len(),
            BlockData::Uint64(v) => v.len(),
            BlockData::Float32(v) => v.len(),
            BlockData::Float64(v) => v.len(),
        }
    }

    /// True when the payload holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element kind of this payload.
    pub fn element_type(&self) -> ElementType {
        match self {
            BlockData::Int8(_) => ElementType::Int8,
            BlockData::Uint8(_) => ElementType::Uint8,
            BlockData::Int16(_) => ElementType::Int16,
            BlockData::Uint16(_) => ElementType::Uint16,
            BlockData::Int32(_) => ElementType::Int32,
            BlockData::Uint32(_) => ElementType::Uint32,
            BlockData::Int64(_) => ElementType::Int64,
            BlockData::Uint64(_) => ElementType::Uint64,
            BlockData::Float32(_) => ElementType::Float32,
            BlockData::Float64(_) => ElementType::Float64,
        }
    }
}

fn decode_vec<const W: usize, E>(bytes: &[u8], from: fn([u8; W]) -> E) -> Vec<E> {
    bytes
        .chunks_exact(W)
        .map(|chunk| {
            let mut arr = [0u8; W];
            arr.copy_from_slice(chunk);
            from(arr)
        })
        .collect()
}

/// Reinterpret raw payload bytes as fixed-width elements in host order.
///
/// Fails when the payload length is not a whole number of elements.
pub fn decode_elements(bytes: &[u8], element_type: ElementType) -> Result<BlockData> {
    let width = element_type.width();
    if bytes.len() % width != 0 {
        return Err(BlockError::ElementSize {
            len: bytes.len(),
            width,
        });
    }

    Ok(match element_type {
        ElementType::Int8 => BlockData::Int8(bytes.iter().map(|&b| b as i8).collect()),
        ElementType::Uint8 => BlockData::Uint8(bytes.to_vec()),
        ElementType::Int16 => BlockData::Int16(decode_vec(bytes, i16::from_ne_bytes)),
        ElementType::Uint16 => BlockData::Uint16(decode_vec(bytes, u16::from_ne_bytes)),
        ElementType::Int32 => BlockData::Int32(decode_vec(bytes, i32::from_ne_bytes)),
        ElementType::Uint32 => BlockData::Uint32(decode_vec(bytes, u32::from_ne_bytes)),
        ElementType::Int64 => BlockData::Int64(decode_vec(bytes, i64::from_ne_bytes)),
        ElementType::Uint64 => BlockData::Uint64(decode_vec(bytes, u64::from_ne_bytes)),
        ElementType::Float32 => BlockData::Float32(decode_vec(bytes, f32::from_ne_bytes)),
        ElementType::Float64 => BlockData::Float64(decode_vec(bytes, f64::from_ne_bytes)),
    })
}

/// Serialize elements back to raw payload bytes in host order.
///
/// Inverse of [`decode_elements`]; used for framed writes.
pub fn encode_elements(data: &BlockData) -> Bytes {
    let mut buf = BytesMut::with_capacity(data.len() * data.element_type().width());
    match data {
        BlockData::Int8(v) => {
            for &e in v {
                buf.put_slice(&e.to_ne_bytes());
            }
        }
        BlockData::Uint8(v) => buf.put_slice(v),
        BlockData::Int16(v) => {
            for &e in v {
                buf.put_slice(&e.to_ne_bytes());
            }
        }
        BlockData::Uint16(v) => {
            for &e in v {
                buf.put_slice(&e.to_ne_bytes());
            }
        }
        BlockData::Int32(v) => {
            for &e in v {
                buf.put_slice(&e.to_ne_bytes());
            }
        }
        BlockData::Uint32(v) => {
            for &e in v {
                buf.put_slice(&e.to_ne_bytes());
            }
        }
        BlockData::Int64(v) => {
            for &e in v {
                buf.put_slice(&e.to_ne_bytes());
            }
        }
        BlockData::Uint64(v) => {
            for &e in v {
                buf.put_slice(&e.to_ne_bytes());
            }
        }
        BlockData::Float32(v) => {
            for &e in v {
                buf.put_slice(&e.to_ne_bytes());
            }
        }
        BlockData::Float64(v) => {
            for &e in v {
                buf.put_slice(&e.to_ne_bytes());
            }
        }
    }
    buf.freeze()
}
