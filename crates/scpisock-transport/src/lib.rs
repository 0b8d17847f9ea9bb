//! Raw TCP socket transport for SCPI instrument control.
//!
//! This is the lowest layer of scpisock. It owns one blocking TCP
//! connection to an instrument (conventionally port 5025) and provides the
//! byte primitives everything else builds on: full-write and exact-read
//! loops, newline-terminated line receive, and read-timeout control.
//!
//! No SCPI syntax lives here; command validation and framing are the upper
//! layers' jobs.

pub mod error;
pub mod socket;

pub use error::{Result, TransportError};
pub use socket::ScpiSocket;
