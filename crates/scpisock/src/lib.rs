//! SCPI instrument control over raw TCP sockets.
//!
//! scpisock talks to laboratory test instruments with the SCPI ASCII
//! dialect over a plain TCP connection (conventionally port 5025),
//! replacing heavier VISA middleware. It covers the connection lifecycle,
//! the text command/query round trip, IEEE 488.2 binary block transfers,
//! and instrument error-queue draining.
//!
//! # Crate structure
//!
//! - [`transport`] — raw TCP socket primitives and timeouts
//! - [`block`] — IEEE 488.2 binary block framing codec
//! - [`Instrument`] — the high-level client built on both
//!
//! # Example
//!
//! ```no_run
//! use scpisock::{ElementType, Instrument};
//!
//! # fn main() -> Result<(), scpisock::ScpiError> {
//! let mut vna = Instrument::open("192.168.1.42")?;
//! println!("connected to {}", vna.identity());
//!
//! vna.write("form:data real,64")?;
//! let trace = vna.query_binary_values("calc:data? sdata", ElementType::Float64)?;
//! println!("{} points", trace.len());
//!
//! vna.err_check()?;
//! vna.close()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod instrument;
pub mod observer;
pub mod text;

/// Re-export transport types.
pub mod transport {
    pub use scpisock_transport::*;
}

/// Re-export binary block types.
pub mod block {
    pub use scpisock_block::*;
}

pub use error::{ErrorQueue, ErrorRecord, Result, ScpiError};
pub use instrument::{Instrument, InstrumentConfig};
pub use observer::{Observer, OperationEvent, Outcome, TracingObserver};
pub use scpisock_block::{BlockData, ElementType};
