//! Reads RSL10 sensor messages from the BLE PMOD serial port and writes the resulting
//! telemetry to stdout, one JSON document per line.
mod config;

use log::{debug, error, info, warn};
use std::io::{self, Read, Write};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rsl10_serial::telemetry::TelemetrySink;
use rsl10_serial::{DefaultGateway, PLATFORM_READ_SIZE};

use config::GatewayConfig;

const SERIAL_READ_TIMEOUT_MS: u64 = 100;

#[repr(i32)]
#[derive(Clone, Copy)]
enum ExitCode {
    Success = 0,
    TermHandler = 1,
    Config = 2,
    SerialOpen = 3,
    SerialRead = 4,
    Authorization = 5,
}

fn exit(code: ExitCode) -> ! {
    process::exit(code as i32)
}

struct StdoutSink;

impl TelemetrySink for StdoutSink {
    type Error = io::Error;

    fn send_telemetry(&mut self, json: &str) -> Result<(), io::Error> {
        let mut out = io::stdout().lock();
        writeln!(out, "{}", json)?;
        out.flush()
    }
}

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            exit(ExitCode::Config);
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutdown signal received");
        r.store(false, Ordering::SeqCst);
    }) {
        error!("Failed to install termination handler: {}", e);
        exit(ExitCode::TermHandler);
    }

    let mut gateway = DefaultGateway::new(config.policy);
    for address in &config.authorized {
        if let Err(e) = gateway.authorized_mut().authorize(address.clone()) {
            error!("{}", e);
            exit(ExitCode::Authorization);
        }
    }
    info!(
        "Authorization policy {:?}, {} authorized devices",
        config.policy,
        config.authorized.len()
    );

    let mut port = match serialport::new(&config.serial_port, config.baud_rate)
        .timeout(Duration::from_millis(SERIAL_READ_TIMEOUT_MS))
        .open()
    {
        Ok(port) => port,
        Err(e) => {
            error!("Could not open UART \"{}\": {}", config.serial_port, e);
            exit(ExitCode::SerialOpen);
        }
    };
    info!(
        "Listening on {} at {} baud, telemetry every {}s",
        config.serial_port,
        config.baud_rate,
        config.telemetry_interval.as_secs()
    );

    let mut sink = StdoutSink;
    let mut serial_buf = [0u8; PLATFORM_READ_SIZE];
    let mut next_drain = Instant::now() + config.telemetry_interval;

    while running.load(Ordering::SeqCst) {
        match port.read(&mut serial_buf) {
            Ok(0) => (),
            Ok(n) => {
                // overflow is logged by the framer and recovered from on the next read
                let _ = gateway.process_bytes(&serial_buf[..n]);
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => (),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
            Err(e) => {
                error!("UART read failed: {}", e);
                exit(ExitCode::SerialRead);
            }
        }

        let now = Instant::now();
        if now >= next_drain {
            let report = gateway.drain(&mut sink);
            if report.failed > 0 {
                warn!("{} telemetry messages could not be sent", report.failed);
            }
            debug!("drain sent {} telemetry messages", report.sent);
            next_drain = now + config.telemetry_interval;
        }
    }

    info!("Program terminated. Exiting gracefully.");
    exit(ExitCode::Success);
}
