use std::time::Duration;

use clap::Parser;

use bm58_rs::{
    sink::{ConsoleSink, MeasurementSink},
    transport::{DeviceConfig, UsbTransport, UsbTransportError},
    Bm58, Bm58Error, Identifier, LogOutput, Measurement,
};

#[cfg(feature = "sqlite")]
use bm58_rs::sink::SqliteSink;

/// Read stored blood pressure measurements from a Beurer BM58 monitor.
#[derive(Parser)]
#[clap(version, about)]
struct CliOpts {
    /// How many milliseconds to wait before timing out a USB transfer
    #[clap(default_value = "1000", long)]
    timeout_ms: u64,
    /// Abort instead of continuing when the kernel driver cannot be detached
    #[clap(long)]
    strict_detach: bool,
    /// Write measurements to this SQLite database instead of the console
    #[cfg(feature = "sqlite")]
    #[clap(long, short)]
    database: Option<std::path::PathBuf>,
    /// Write the rendered measurement table to this file instead of stdout
    #[cfg(feature = "log-to-file")]
    #[clap(long)]
    output_file: Option<std::path::PathBuf>,
}

fn main() {
    pretty_env_logger::formatted_builder()
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or("info".to_string()))
        .init();

    let opts = CliOpts::parse();

    let config = DeviceConfig {
        timeout: Duration::from_millis(opts.timeout_ms),
        abort_on_detach_failure: opts.strict_detach,
        ..DeviceConfig::default()
    };

    let mut session = match Bm58::connect(config) {
        Ok(session) => session,
        Err(e) => {
            log::error!("could not open device: {e:?}");
            std::process::exit(1);
        }
    };

    let result = read_device(&mut session);

    // Release the device before touching any sink; the handle is the scarce
    // resource here.
    session.terminate();

    let (identifier, records) = match result {
        Ok(result) => result,
        Err(e) => {
            log::error!("session failed: {e:?}");
            std::process::exit(1);
        }
    };

    if let Err(e) = write_records(&opts, identifier.as_str(), &records) {
        log::error!("could not write measurements: {e}");
        std::process::exit(1);
    }
}

fn read_device(
    session: &mut Bm58<UsbTransport>,
) -> Result<(Identifier, Vec<Measurement>), Bm58Error<UsbTransportError>> {
    let identifier = session.initialize()?;
    log::info!("connected to '{identifier}'");

    let count = session.record_count()?;
    log::info!("device reports {count} stored records");

    let mut records = Vec::with_capacity(count as usize);
    for slot in 0..count {
        records.push(session.get_record(slot)?);
    }

    Ok((identifier, records))
}

fn write_records(opts: &CliOpts, identifier: &str, records: &[Measurement]) -> Result<(), String> {
    #[cfg(feature = "sqlite")]
    if let Some(path) = &opts.database {
        let mut sink = SqliteSink::open(path).map_err(|e| e.to_string())?;
        sink.consume(identifier, records).map_err(|e| e.to_string())?;
        log::info!("wrote {} measurements to {}", records.len(), path.display());
        return Ok(());
    }

    let mut sink = ConsoleSink::new(console_output(opts)?);
    match sink.consume(identifier, records) {
        Ok(()) => Ok(()),
        Err(never) => match never {},
    }
}

fn console_output(opts: &CliOpts) -> Result<LogOutput, String> {
    #[cfg(feature = "log-to-file")]
    if let Some(path) = &opts.output_file {
        let file = std::fs::File::create(path).map_err(|e| e.to_string())?;
        return Ok(LogOutput::File(std::sync::Arc::new(parking_lot::Mutex::new(
            file,
        ))));
    }

    #[cfg(not(feature = "log-to-file"))]
    let _ = opts;

    Ok(LogOutput::StdOut)
}
