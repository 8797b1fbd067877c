//! Periodic telemetry from the device registry
//!
//! [`drain`] is run from a timer, independent of message arrival. Every category whose
//! dirty flag is set produces one JSON document, handed to a [`TelemetrySink`], and the
//! flag is cleared whether or not the send succeeded. Delivery guarantees are the sink's
//! business.
use core::fmt::{self, Write};
use heapless::String;
use log::{debug, error, warn};

use crate::registry::Registry;
use crate::sensor::{
    BatteryReading, DeviceAddress, EnvironmentalReading, MessageKind, MotionReading,
};

pub const MAX_TELEMETRY_LENGTH: usize = 320;
pub type TelemetryString = String<MAX_TELEMETRY_LENGTH>;

/// Receiver of serialized telemetry, usually the cloud connection
pub trait TelemetrySink {
    type Error: fmt::Debug;

    fn send_telemetry(&mut self, json: &str) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryError {
    BufferTooSmall,
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TelemetryError::BufferTooSmall => write!(
                f,
                "telemetry does not fit into {} bytes",
                MAX_TELEMETRY_LENGTH
            ),
        }
    }
}

impl From<fmt::Error> for TelemetryError {
    fn from(_: fmt::Error) -> TelemetryError {
        TelemetryError::BufferTooSmall
    }
}

struct Rssi(Option<i16>);

impl fmt::Display for Rssi {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Some(rssi) => write!(f, "{}", rssi),
            None => f.write_str("null"),
        }
    }
}

pub fn motion_json(
    address: &DeviceAddress,
    rssi: Option<i16>,
    motion: &MotionReading,
) -> Result<TelemetryString, TelemetryError> {
    let [ax, ay, az] = motion.acceleration;
    let [ow, ox, oy, oz] = motion.orientation;
    let mut json = TelemetryString::new();
    write!(
        json,
        "{{\"mac\":\"{}\",\"rssi\":{},\"sampleRate\":{},\"accelRange\":{},\"dataType\":{},\
         \"accelX\":{:.4},\"accelY\":{:.4},\"accelZ\":{:.4},\
         \"orientationW\":{:.4},\"orientationX\":{:.4},\"orientationY\":{:.4},\"orientationZ\":{:.4}}}",
        address,
        Rssi(rssi),
        motion.settings.sample_rate,
        motion.settings.accel_range,
        motion.settings.data_type,
        ax,
        ay,
        az,
        ow,
        ox,
        oy,
        oz
    )?;
    Ok(json)
}

pub fn environmental_json(
    address: &DeviceAddress,
    rssi: Option<i16>,
    env: &EnvironmentalReading,
) -> Result<TelemetryString, TelemetryError> {
    let mut json = TelemetryString::new();
    write!(
        json,
        "{{\"mac\":\"{}\",\"rssi\":{},\"temperature\":{:.2},\"humidity\":{:.2},\
         \"pressure\":{:.2},\"ambientLight\":{}}}",
        address,
        Rssi(rssi),
        env.temperature,
        env.humidity,
        env.pressure,
        env.ambient_light
    )?;
    Ok(json)
}

pub fn battery_json(
    address: &DeviceAddress,
    rssi: Option<i16>,
    battery: &BatteryReading,
) -> Result<TelemetryString, TelemetryError> {
    let mut json = TelemetryString::new();
    write!(
        json,
        "{{\"mac\":\"{}\",\"rssi\":{},\"battery\":{:.2}}}",
        address,
        Rssi(rssi),
        battery.voltage
    )?;
    Ok(json)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub sent: usize,
    pub failed: usize,
}

/// Sends every dirty category of every device and clears its flag.
///
/// Per device the order is motion, environmental, battery; each category is a separate
/// document.
pub fn drain<const N: usize, S: TelemetrySink>(
    registry: &mut Registry<N>,
    sink: &mut S,
) -> DrainReport {
    let mut report = DrainReport::default();

    for record in registry.iter_mut() {
        let address = record.address().clone();
        let rssi = record.rssi();

        if let Some(motion) = record.motion.take_dirty() {
            let json = motion_json(&address, rssi, motion);
            dispatch(sink, MessageKind::Motion, &address, json, &mut report);
        }
        if let Some(env) = record.environmental.take_dirty() {
            let json = environmental_json(&address, rssi, env);
            dispatch(sink, MessageKind::Environmental, &address, json, &mut report);
        }
        if let Some(battery) = record.battery.take_dirty() {
            let json = battery_json(&address, rssi, battery);
            dispatch(sink, MessageKind::Battery, &address, json, &mut report);
        }
    }

    if report.sent == 0 && report.failed == 0 {
        debug!("no new data found, not sending telemetry");
    }
    report
}

fn dispatch<S: TelemetrySink>(
    sink: &mut S,
    kind: MessageKind,
    address: &DeviceAddress,
    json: Result<TelemetryString, TelemetryError>,
    report: &mut DrainReport,
) {
    let json = match json {
        Ok(json) => json,
        Err(e) => {
            error!("{:?} telemetry for {} dropped: {}", kind, address, e);
            report.failed += 1;
            return;
        }
    };

    debug!("telemetry message: {}", json);
    match sink.send_telemetry(json.as_str()) {
        Ok(()) => report.sent += 1,
        Err(e) => {
            warn!("{:?} telemetry for {} not sent: {:?}", kind, address, e);
            report.failed += 1;
        }
    }
}
