//! Connect to an instrument and print its identity string.
//!
//! Usage: identify <ip-address> [port]

use scpisock::{Instrument, InstrumentConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().ok_or("usage: identify <ip-address> [port]")?;
    let port = match args.next() {
        Some(p) => p.parse()?,
        None => 5025,
    };

    let config = InstrumentConfig {
        port,
        ..InstrumentConfig::default()
    };
    let instrument = Instrument::open_with_config(&host, config)?;
    println!("{}", instrument.identity());
    instrument.close()?;
    Ok(())
}
