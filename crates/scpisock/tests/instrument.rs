//! End-to-end tests driving a real `Instrument` against scripted TCP
//! servers standing in for instruments.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use scpisock::transport::TransportError;
use scpisock::{
    BlockData, ElementType, Instrument, InstrumentConfig, Observer, OperationEvent, Outcome,
    ScpiError,
};

const IDN: &str = "ACME,MODEL1,0,1.0";

fn spawn_server<F>(script: F) -> (String, u16, JoinHandle<()>)
where
    F: FnOnce(BufReader<TcpStream>) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("server should accept");
        script(BufReader::new(stream));
    });
    (addr.ip().to_string(), addr.port(), handle)
}

fn expect_cmd(reader: &mut BufReader<TcpStream>, expected: &str) {
    let mut line = String::new();
    reader.read_line(&mut line).expect("command should arrive");
    assert_eq!(line.trim_end(), expected);
}

fn send_line(reader: &mut BufReader<TcpStream>, text: &str) {
    let stream = reader.get_mut();
    stream.write_all(text.as_bytes()).expect("reply should send");
    stream.write_all(b"\n").expect("terminator should send");
    stream.flush().expect("reply should flush");
}

fn send_raw(reader: &mut BufReader<TcpStream>, bytes: &[u8]) {
    let stream = reader.get_mut();
    stream.write_all(bytes).expect("bytes should send");
    stream.flush().expect("bytes should flush");
}

fn handle_idn(reader: &mut BufReader<TcpStream>) {
    expect_cmd(reader, "*idn?");
    send_line(reader, IDN);
}

fn config_for(port: u16) -> InstrumentConfig {
    InstrumentConfig {
        port,
        timeout: Duration::from_secs(2),
        ..InstrumentConfig::default()
    }
}

fn open_instrument(host: &str, port: u16) -> Instrument {
    Instrument::open_with_config(host, config_for(port)).expect("instrument should open")
}

#[test]
fn open_caches_identity() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
    });

    let instrument = open_instrument(&host, port);
    assert_eq!(instrument.identity(), IDN);

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn query_requires_marker() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
    });

    let mut instrument = open_instrument(&host, port);
    let err = instrument.query("syst:err").unwrap_err();
    assert!(matches!(err, ScpiError::QueryMarkerMissing(cmd) if cmd == "syst:err"));

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn write_rejects_non_single_byte_text() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
    });

    let mut instrument = open_instrument(&host, port);
    let err = instrument.write("freq:span Δ").unwrap_err();
    assert!(matches!(err, ScpiError::NotText(_)));

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn query_trims_surrounding_whitespace() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
        expect_cmd(&mut reader, "freq:cent?");
        send_line(&mut reader, "  1.000000E+9  \r");
    });

    let mut instrument = open_instrument(&host, port);
    let response = instrument.query("freq:cent?").expect("query should succeed");
    assert_eq!(response, "1.000000E+9");

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn err_check_ok_when_sentinel_is_first() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
        expect_cmd(&mut reader, "system:error?");
        send_line(&mut reader, "+0,\"No error\"");
    });

    let mut instrument = open_instrument(&host, port);
    instrument.err_check().expect("clean queue should be ok");

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn err_check_collects_ordered_queue() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
        for response in [
            "113,\"Undefined header\"",
            "-222,\"Data out of range\"",
            "+0,\"No error\"",
        ] {
            expect_cmd(&mut reader, "system:error?");
            send_line(&mut reader, response);
        }
    });

    let mut instrument = open_instrument(&host, port);
    let err = instrument.err_check().unwrap_err();
    match err {
        ScpiError::Instrument(queue) => {
            assert_eq!(queue.len(), 2);
            let rendered: Vec<String> = queue.iter().map(ToString::to_string).collect();
            assert_eq!(
                rendered,
                vec![
                    "113,\"Undefined header\"".to_string(),
                    "222,\"Data out of range\"".to_string(),
                ]
            );
        }
        other => panic!("expected instrument error, got {other:?}"),
    }

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn err_query_command_is_configurable() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
        expect_cmd(&mut reader, "syst:err:next?");
        send_line(&mut reader, "0,\"No error\"");
    });

    let config = InstrumentConfig {
        err_query: "syst:err:next?".to_string(),
        ..config_for(port)
    };
    let mut instrument =
        Instrument::open_with_config(&host, config).expect("instrument should open");
    instrument.err_check().expect("clean queue should be ok");

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn auto_check_fires_only_when_both_flags_agree() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
        // Global on + per-call on: the write is followed by an error query.
        expect_cmd(&mut reader, "*rst");
        expect_cmd(&mut reader, "system:error?");
        send_line(&mut reader, "0,\"No error\"");
        // Global on + per-call off: no error query between these commands.
        expect_cmd(&mut reader, "*cls");
        expect_cmd(&mut reader, "*opc?");
        send_line(&mut reader, "1");
    });

    let config = InstrumentConfig {
        auto_err_check: true,
        ..config_for(port)
    };
    let mut instrument =
        Instrument::open_with_config(&host, config).expect("instrument should open");

    instrument.write("*rst").expect("checked write should succeed");
    instrument
        .write_with_check("*cls", false)
        .expect("unchecked write should succeed");
    let response = instrument
        .query_with_check("*opc?", false)
        .expect("unchecked query should succeed");
    assert_eq!(response, "1");

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn auto_check_stays_off_when_global_flag_is_off() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
        // Per-call flag defaults to on, but the global flag is off, so no
        // error query appears between these commands.
        expect_cmd(&mut reader, "*rst");
        expect_cmd(&mut reader, "*opc?");
        send_line(&mut reader, "1");
    });

    let mut instrument = open_instrument(&host, port);
    instrument.write("*rst").expect("write should succeed");
    let response = instrument.query("*opc?").expect("query should succeed");
    assert_eq!(response, "1");

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn binary_block_read_thousand_bytes() {
    let payload: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let wire_payload = payload.clone();
    let (host, port, server) = spawn_server(move |mut reader| {
        handle_idn(&mut reader);
        expect_cmd(&mut reader, "trac:data?");
        send_raw(&mut reader, b"#41000");
        send_raw(&mut reader, &wire_payload);
        send_raw(&mut reader, b"\n");
    });

    let mut instrument = open_instrument(&host, port);
    let data = instrument
        .query_binary_values("trac:data?", ElementType::Uint8)
        .expect("block read should succeed");
    assert_eq!(data.len(), 1000);
    assert_eq!(data, BlockData::Uint8(payload));

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn binary_block_read_float64() {
    let values = [0.0f64, -1.5, 3.25, 6.02e23];
    let wire: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
    let (host, port, server) = spawn_server(move |mut reader| {
        handle_idn(&mut reader);
        expect_cmd(&mut reader, "calc:data? sdata");
        send_raw(&mut reader, format!("#2{}", wire.len()).as_bytes());
        send_raw(&mut reader, &wire);
        send_raw(&mut reader, b"\n");
    });

    let mut instrument = open_instrument(&host, port);
    let data = instrument
        .query_binary_values("calc:data? sdata", ElementType::Float64)
        .expect("block read should succeed");
    assert_eq!(data, BlockData::Float64(values.to_vec()));

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn binary_block_missing_terminator_is_framing_error() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
        expect_cmd(&mut reader, "trac:data?");
        send_raw(&mut reader, b"#15hello!");
    });

    let mut instrument = open_instrument(&host, port);
    let err = instrument
        .query_binary_values("trac:data?", ElementType::Uint8)
        .unwrap_err();
    assert!(matches!(err, ScpiError::Framing(_)), "got {err:?}");

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn binary_block_zero_length_frame_decodes_empty() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
        expect_cmd(&mut reader, "trac:data?");
        send_raw(&mut reader, b"#10\n");
    });

    let mut instrument = open_instrument(&host, port);
    let data = instrument
        .query_binary_values("trac:data?", ElementType::Int16)
        .expect("empty frame should decode");
    assert!(data.is_empty());
    assert_eq!(data.element_type(), ElementType::Int16);

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn marker_timeout_is_enriched_by_error_queue() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
        expect_cmd(&mut reader, "wav:data?");
        // No block follows; the client times out on the marker byte and
        // falls back to draining the error queue.
        expect_cmd(&mut reader, "system:error?");
        send_line(&mut reader, "-410,\"Query INTERRUPTED\"");
        expect_cmd(&mut reader, "system:error?");
        send_line(&mut reader, "+0,\"No error\"");
    });

    let config = InstrumentConfig {
        marker_timeout: Duration::from_millis(100),
        ..config_for(port)
    };
    let mut instrument =
        Instrument::open_with_config(&host, config).expect("instrument should open");

    let err = instrument
        .query_binary_values("wav:data?", ElementType::Uint8)
        .unwrap_err();
    match err {
        ScpiError::Instrument(queue) => {
            assert_eq!(queue.len(), 1);
            assert_eq!(queue.iter().next().unwrap().to_string(), "410,\"Query INTERRUPTED\"");
        }
        other => panic!("expected instrument error, got {other:?}"),
    }

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn marker_timeout_with_clean_queue_is_connectivity() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
        expect_cmd(&mut reader, "wav:data?");
        expect_cmd(&mut reader, "system:error?");
        send_line(&mut reader, "0,\"No error\"");
    });

    let config = InstrumentConfig {
        marker_timeout: Duration::from_millis(100),
        ..config_for(port)
    };
    let mut instrument =
        Instrument::open_with_config(&host, config).expect("instrument should open");

    let err = instrument
        .query_binary_values("wav:data?", ElementType::Uint8)
        .unwrap_err();
    assert!(matches!(
        err,
        ScpiError::Connectivity(TransportError::TimedOut)
    ));

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn binary_block_write_wire_format() {
    let payload: Vec<u8> = (0..300u32).map(|i| (i % 256) as u8).collect();
    let mut expected = b"source:trace ".to_vec();
    expected.extend_from_slice(b"#3300");
    expected.extend_from_slice(&payload);
    expected.push(b'\n');

    let expected_wire = expected.clone();
    let (host, port, server) = spawn_server(move |mut reader| {
        handle_idn(&mut reader);
        let mut wire = vec![0u8; expected_wire.len()];
        reader.read_exact(&mut wire).expect("frame should arrive");
        assert_eq!(wire, expected_wire);
    });

    let mut instrument = open_instrument(&host, port);
    instrument
        .write_binary_values_with_check("source:trace ", &payload, false)
        .expect("framed write should succeed");

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn query_timeout_is_connectivity_error() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
        expect_cmd(&mut reader, "*opc?");
        // Never reply; let the client time out before dropping the socket.
        thread::sleep(Duration::from_millis(500));
    });

    let config = InstrumentConfig {
        timeout: Duration::from_millis(100),
        ..config_for(port)
    };
    let mut instrument =
        Instrument::open_with_config(&host, config).expect("instrument should open");

    let err = instrument.query("*opc?").unwrap_err();
    assert!(matches!(
        err,
        ScpiError::Connectivity(TransportError::TimedOut)
    ));

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

struct Recording {
    log: Arc<Mutex<Vec<(String, String, bool)>>>,
}

impl Observer for Recording {
    fn on_operation(&mut self, event: &OperationEvent<'_>) {
        let ok = matches!(event.outcome, Outcome::Success(_));
        self.log.lock().expect("log lock should be clean").push((
            event.operation.to_string(),
            event.arguments.to_string(),
            ok,
        ));
    }
}

#[test]
fn observer_sees_every_operation() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
        expect_cmd(&mut reader, "*opc?");
        send_line(&mut reader, "1");
    });

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut instrument = Instrument::open_with(
        &host,
        config_for(port),
        Some(Box::new(Recording { log: Arc::clone(&log) })),
    )
    .expect("instrument should open");

    instrument.query("*opc?").expect("query should succeed");
    let err = instrument.query("no-marker").unwrap_err();
    assert!(matches!(err, ScpiError::QueryMarkerMissing(_)));

    let events = log.lock().expect("log lock should be clean").clone();
    assert_eq!(
        events,
        vec![
            ("query".to_string(), "*idn?".to_string(), true),
            ("query".to_string(), "*opc?".to_string(), true),
            ("query".to_string(), "no-marker".to_string(), false),
        ]
    );

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}

#[test]
fn open_swallows_instrument_error_from_verbose_enable() {
    let (host, port, server) = spawn_server(|mut reader| {
        handle_idn(&mut reader);
        expect_cmd(&mut reader, "syst:err:verbose 1");
        expect_cmd(&mut reader, "system:error?");
        send_line(&mut reader, "-113,\"Undefined header\"");
        expect_cmd(&mut reader, "system:error?");
        send_line(&mut reader, "0,\"No error\"");
    });

    let config = InstrumentConfig {
        verbose_errors: true,
        ..config_for(port)
    };
    let instrument =
        Instrument::open_with_config(&host, config).expect("open should swallow the error");
    assert_eq!(instrument.identity(), IDN);

    instrument.close().expect("close should succeed");
    server.join().expect("server thread should complete");
}
