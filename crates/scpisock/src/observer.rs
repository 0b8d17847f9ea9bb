//! Structured operation observation.
//!
//! An [`Observer`] supplied at construction is invoked after each public
//! instrument operation with the operation name, its arguments, and the
//! outcome. The transport and codec are fully functional with no observer
//! attached; this is a diagnostics hook, not a dependency of the core.

use tracing::debug;

/// Outcome of one instrument operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<'a> {
    /// The operation succeeded, optionally with a rendered return value.
    Success(Option<&'a str>),
    /// The operation failed with the given error text.
    Failure(&'a str),
}

/// One completed instrument operation.
#[derive(Debug, Clone, Copy)]
pub struct OperationEvent<'a> {
    /// Operation name, e.g. `query` or `write_binary_values`.
    pub operation: &'a str,
    /// Rendered arguments, typically the command text.
    pub arguments: &'a str,
    /// How the operation ended.
    pub outcome: Outcome<'a>,
}

/// Callback invoked after each instrument operation.
pub trait Observer: Send {
    fn on_operation(&mut self, event: &OperationEvent<'_>);
}

/// Observer that forwards events to `tracing` at debug level.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_operation(&mut self, event: &OperationEvent<'_>) {
        match event.outcome {
            Outcome::Success(returned) => debug!(
                operation = event.operation,
                arguments = event.arguments,
                returned,
                "instrument operation completed"
            ),
            Outcome::Failure(error) => debug!(
                operation = event.operation,
                arguments = event.arguments,
                error,
                "instrument operation failed"
            ),
        }
    }
}
