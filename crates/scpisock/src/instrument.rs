use std::time::Duration;

use scpisock_block::{decode_elements, encode_header, BlockData, BlockReader, ElementType};
use scpisock_transport::{ScpiSocket, TransportError};
use tracing::{debug, error};

use crate::error::{normalize_error_response, ErrorQueue, ErrorRecord, Result, ScpiError};
use crate::observer::{Observer, OperationEvent, Outcome};
use crate::text::{decode_latin1, encode_latin1};

/// Connection settings for an [`Instrument`].
#[derive(Debug, Clone)]
pub struct InstrumentConfig {
    /// TCP port; 5025 is the conventional raw-socket SCPI port.
    pub port: u16,
    /// Normal read/connect timeout.
    pub timeout: Duration,
    /// Disable Nagle's algorithm so each send reaches the wire immediately.
    pub no_delay: bool,
    /// Connection-wide half of the auto-error-check policy. An automatic
    /// `err_check` fires after an operation only when this AND the
    /// per-call flag are both set.
    pub auto_err_check: bool,
    /// Best-effort `syst:err:verbose 1` during open.
    pub verbose_errors: bool,
    /// Error-queue query command. `syst:err?` syntax varies between
    /// instrument families, so this is configuration, not a constant.
    pub err_query: String,
    /// Canonical no-error response, matched by containment after
    /// normalization.
    pub no_error_sentinel: String,
    /// Short timeout bounding only the `#` marker byte of a framed read.
    pub marker_timeout: Duration,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            port: 5025,
            timeout: Duration::from_secs(10),
            no_delay: true,
            auto_err_check: false,
            verbose_errors: false,
            err_query: "system:error?".to_string(),
            no_error_sentinel: "0,\"No error".to_string(),
            marker_timeout: Duration::from_secs(1),
        }
    }
}

/// One SCPI conversation with one instrument over one TCP connection.
///
/// Every operation is synchronous and blocking; there is no pipelining and
/// no internal locking. `&mut self` receivers make interleaved use from a
/// second caller unrepresentable without an external mutex held for the
/// full logical operation.
///
/// Opening performs an identity query immediately; the result is cached
/// and available via [`identity`](Instrument::identity). Closing consumes
/// the value, so a closed connection cannot be reused.
pub struct Instrument {
    socket: ScpiSocket,
    config: InstrumentConfig,
    identity: String,
    observer: Option<Box<dyn Observer>>,
}

impl Instrument {
    /// Open a connection with default settings.
    pub fn open(host: &str) -> Result<Self> {
        Self::open_with(host, InstrumentConfig::default(), None)
    }

    /// Open a connection with explicit settings.
    pub fn open_with_config(host: &str, config: InstrumentConfig) -> Result<Self> {
        Self::open_with(host, config, None)
    }

    /// Open a connection with explicit settings and an operation observer.
    ///
    /// `host` must be a valid IPv4 or IPv6 literal. The instrument is
    /// identified with `*idn?` immediately; if `verbose_errors` is set,
    /// `syst:err:verbose 1` is attempted and any resulting instrument
    /// error is swallowed (not every family supports it).
    pub fn open_with(
        host: &str,
        config: InstrumentConfig,
        observer: Option<Box<dyn Observer>>,
    ) -> Result<Self> {
        let socket = ScpiSocket::connect(host, config.port, config.timeout, config.no_delay)?;
        let mut instrument = Self {
            socket,
            config,
            identity: String::new(),
            observer,
        };

        instrument.identity = instrument.query_with_check("*idn?", false)?;
        debug!(identity = %instrument.identity, "instrument identified");

        if instrument.config.verbose_errors {
            match instrument.enable_verbose_errors() {
                Ok(()) | Err(ScpiError::Instrument(_)) => {}
                Err(other) => return Err(other),
            }
        }

        Ok(instrument)
    }

    /// The cached `*idn?` response from open.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The active connection settings.
    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    /// Send a command line.
    ///
    /// The command must be single-byte text; a newline terminator is
    /// appended and the line is sent as one message.
    pub fn write(&mut self, cmd: &str) -> Result<()> {
        self.write_with_check(cmd, true)
    }

    /// [`write`](Instrument::write) with an explicit per-call auto-check flag.
    pub fn write_with_check(&mut self, cmd: &str, check: bool) -> Result<()> {
        let result = match self.write_line(cmd) {
            Ok(()) => self.auto_check(check),
            Err(err) => Err(err),
        };
        self.observed("write", cmd, result, |_| None)
    }

    /// Read one newline-terminated response line, trimmed of surrounding
    /// whitespace.
    ///
    /// Blocks until data arrives or the connection timeout elapses.
    pub fn read(&mut self) -> Result<String> {
        let result = self.read_line();
        self.observed("read", "", result, |line| Some(line.clone()))
    }

    /// Send a query and read the response as one logical unit.
    ///
    /// The command must contain a `?` marker.
    pub fn query(&mut self, cmd: &str) -> Result<String> {
        self.query_with_check(cmd, true)
    }

    /// [`query`](Instrument::query) with an explicit per-call auto-check flag.
    pub fn query_with_check(&mut self, cmd: &str, check: bool) -> Result<String> {
        let result = match self.query_line(cmd) {
            Ok(response) => self.auto_check(check).map(|()| response),
            Err(err) => Err(err),
        };
        self.observed("query", cmd, result, |line| Some(line.clone()))
    }

    /// Send a query and decode the binary block response into elements of
    /// the given kind.
    ///
    /// The caller must have configured the instrument's output format and
    /// byte order to match `element_type` beforehand; bytes are
    /// reinterpreted in host order exactly as received.
    pub fn query_binary_values(&mut self, cmd: &str, element_type: ElementType) -> Result<BlockData> {
        self.query_binary_values_with_check(cmd, element_type, true)
    }

    /// [`query_binary_values`](Instrument::query_binary_values) with an
    /// explicit per-call auto-check flag.
    pub fn query_binary_values_with_check(
        &mut self,
        cmd: &str,
        element_type: ElementType,
        check: bool,
    ) -> Result<BlockData> {
        let result = match self.read_block(cmd, element_type) {
            Ok(data) => self.auto_check(check).map(|()| data),
            Err(err) => Err(err),
        };
        self.observed("query_binary_values", cmd, result, |data| {
            Some(format!("{} x {:?}", data.len(), data.element_type()))
        })
    }

    /// Send a command followed by a binary block payload.
    ///
    /// `data` is the raw payload, already serialized in the byte order the
    /// instrument expects.
    pub fn write_binary_values(&mut self, cmd: &str, data: &[u8]) -> Result<()> {
        self.write_binary_values_with_check(cmd, data, true)
    }

    /// [`write_binary_values`](Instrument::write_binary_values) with an
    /// explicit per-call auto-check flag.
    pub fn write_binary_values_with_check(
        &mut self,
        cmd: &str,
        data: &[u8],
        check: bool,
    ) -> Result<()> {
        let result = match self.write_block(cmd, data) {
            Ok(()) => self.auto_check(check),
            Err(err) => Err(err),
        };
        self.observed("write_binary_values", cmd, result, |_| None)
    }

    /// Drain the instrument's error queue.
    ///
    /// Issues the configured error query until the no-error sentinel is
    /// observed, collecting every other response in order. A non-empty
    /// collection fails with [`ScpiError::Instrument`].
    ///
    /// The loop is unbounded: an instrument that never reports the
    /// sentinel will loop until a receive times out.
    pub fn err_check(&mut self) -> Result<()> {
        let result = self.err_check_inner();
        self.observed("err_check", "", result, |_| None)
    }

    /// Shut down both directions of the connection and release it.
    ///
    /// Consumes the instrument; a closed connection must be reopened.
    pub fn close(mut self) -> Result<()> {
        self.socket.shutdown()?;
        Ok(())
    }

    fn enable_verbose_errors(&mut self) -> Result<()> {
        self.write_with_check("syst:err:verbose 1", false)?;
        self.err_check_inner()
    }

    /// Both halves of the policy must agree before a check fires.
    fn auto_check(&mut self, check: bool) -> Result<()> {
        if check && self.config.auto_err_check {
            self.err_check_inner()?;
        }
        Ok(())
    }

    fn err_check_inner(&mut self) -> Result<()> {
        let mut drained = Vec::new();
        let err_query = self.config.err_query.clone();

        loop {
            let response = self.query_line(&err_query)?;
            let normalized = normalize_error_response(&response);
            if normalized.contains(self.config.no_error_sentinel.as_str()) {
                break;
            }
            error!(response = %normalized, "instrument reported an error");
            drained.push(ErrorRecord::parse(&normalized));
        }

        if drained.is_empty() {
            Ok(())
        } else {
            Err(ScpiError::Instrument(ErrorQueue(drained)))
        }
    }

    fn write_line(&mut self, cmd: &str) -> Result<()> {
        let mut message =
            encode_latin1(cmd).ok_or_else(|| ScpiError::NotText(cmd.to_string()))?;
        message.push(b'\n');
        self.socket.send_all(&message)?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let raw = self.socket.recv_line()?;
        Ok(decode_latin1(&raw).trim().to_string())
    }

    fn query_line(&mut self, cmd: &str) -> Result<String> {
        if !cmd.contains('?') {
            return Err(ScpiError::QueryMarkerMissing(cmd.to_string()));
        }
        self.write_line(cmd)?;
        self.read_line()
    }

    fn read_block(&mut self, cmd: &str, element_type: ElementType) -> Result<BlockData> {
        self.write_line(cmd)?;

        // Bound only the marker byte with the short timeout, and restore
        // the normal timeout before acting on the result so every exit
        // path below leaves the connection as it found it.
        let normal = self.socket.read_timeout();
        self.socket.set_read_timeout(self.config.marker_timeout)?;
        let marker = self.socket.recv_byte();
        self.socket.set_read_timeout(normal)?;

        match marker {
            Ok(b'#') => {}
            Ok(found) => {
                return Err(scpisock_block::BlockError::UnexpectedMarker { found }.into());
            }
            Err(TransportError::TimedOut) => {
                // A queued instrument error is a richer diagnostic than a
                // bare timeout; drain the queue before failing.
                self.err_check_inner()?;
                return Err(ScpiError::Connectivity(TransportError::TimedOut));
            }
            Err(other) => return Err(other.into()),
        }

        let mut reader = BlockReader::new(&mut self.socket);
        let payload = reader.read_body()?;
        Ok(decode_elements(&payload, element_type)?)
    }

    fn write_block(&mut self, cmd: &str, data: &[u8]) -> Result<()> {
        let header = encode_header(data.len())?;
        let command = encode_latin1(cmd).ok_or_else(|| ScpiError::NotText(cmd.to_string()))?;

        // Command, header, payload, and terminator go out as separate
        // sends; nothing else may write to this connection while a framed
        // write is in flight.
        self.socket.send_all(&command)?;
        self.socket.send_all(header.as_bytes())?;
        self.socket.send_all(data)?;
        self.socket.send_all(b"\n")?;
        Ok(())
    }

    fn observed<T>(
        &mut self,
        operation: &'static str,
        arguments: &str,
        result: Result<T>,
        render: impl Fn(&T) -> Option<String>,
    ) -> Result<T> {
        if let Some(observer) = self.observer.as_mut() {
            match &result {
                Ok(value) => {
                    let returned = render(value);
                    observer.on_operation(&OperationEvent {
                        operation,
                        arguments,
                        outcome: Outcome::Success(returned.as_deref()),
                    });
                }
                Err(err) => {
                    let message = err.to_string();
                    observer.on_operation(&OperationEvent {
                        operation,
                        arguments,
                        outcome: Outcome::Failure(&message),
                    });
                }
            }
        }
        result
    }
}

impl std::fmt::Debug for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("socket", &self.socket)
            .field("identity", &self.identity)
            .field("auto_err_check", &self.config.auto_err_check)
            .finish()
    }
}
