//! Complete serial-to-telemetry pipeline
//!
//! A [`Gateway`] owns the framer, the device registry and the authorization list. The
//! application calls [`Gateway::process_bytes`] whenever the UART is readable and
//! [`Gateway::drain`] from its telemetry timer; both run to completion on the caller's
//! thread.
use core::fmt;
use log::{debug, warn};

use crate::framer::{self, FrameReader, DEFAULT_BUFFER_SIZE};
use crate::registry::{AuthorizationList, AuthorizationPolicy, Registry, RegistryError, MAX_DEVICES};
use crate::sensor::{ParseMessageError, Reading, SensorMessage};
use crate::telemetry::{self, DrainReport, TelemetrySink};

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Framing(framer::Error),
    Parse(ParseMessageError),
    Registry(RegistryError),
}

impl From<framer::Error> for Error {
    fn from(e: framer::Error) -> Error {
        Error::Framing(e)
    }
}

impl From<ParseMessageError> for Error {
    fn from(e: ParseMessageError) -> Error {
        Error::Parse(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Error {
        Error::Registry(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Framing(e) => write!(f, "{}", e),
            Error::Parse(e) => write!(f, "{}", e),
            Error::Registry(e) => write!(f, "{}", e),
        }
    }
}

pub type DefaultGateway = Gateway<DEFAULT_BUFFER_SIZE, MAX_DEVICES>;

pub struct Gateway<const BUFL: usize, const DEVICES: usize> {
    reader: FrameReader<BUFL>,
    registry: Registry<DEVICES>,
    authorized: AuthorizationList<DEVICES>,
}

impl<const BUFL: usize, const DEVICES: usize> Gateway<BUFL, DEVICES> {
    pub fn new(policy: AuthorizationPolicy) -> Self {
        Self {
            reader: FrameReader::new(),
            registry: Registry::new(),
            authorized: AuthorizationList::new(policy),
        }
    }

    /// Feeds one serial read, returns how many frames updated the registry.
    ///
    /// Bad frames are logged and skipped. The only error is a buffer overflow, after which
    /// the framer starts over empty.
    pub fn process_bytes(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        self.reader.push(bytes)?;

        let mut applied = 0;
        while let Some(frame) = self.reader.next_frame() {
            let result = frame
                .map_err(Error::from)
                .and_then(|frame| self.handle_frame(&frame));
            match result {
                Ok(_) => applied += 1,
                Err(Error::Parse(e @ ParseMessageError::UnknownTag(_))) => {
                    debug!("discarding frame: {}", e)
                }
                Err(e) => warn!("discarding frame: {}", e),
            }
        }
        Ok(applied)
    }

    /// Decodes one frame and stores it in the device's slot, returns the slot index
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<usize, Error> {
        let message = SensorMessage::parse(frame)?;
        if !self.authorized.is_authorized(&message.address) {
            return Err(RegistryError::Unauthorized(message.address).into());
        }

        let index = self.registry.resolve(&message.address, &self.authorized)?;
        if let Some(record) = self.registry.get_mut(index) {
            record.apply(&message);
        }
        log_capture(index, &message);
        Ok(index)
    }

    pub fn drain<S: TelemetrySink>(&mut self, sink: &mut S) -> DrainReport {
        telemetry::drain(&mut self.registry, sink)
    }

    pub fn registry(&self) -> &Registry<DEVICES> {
        &self.registry
    }

    pub fn authorized(&self) -> &AuthorizationList<DEVICES> {
        &self.authorized
    }

    pub fn authorized_mut(&mut self) -> &mut AuthorizationList<DEVICES> {
        &mut self.authorized
    }

    pub fn buffered(&self) -> usize {
        self.reader.len()
    }
}

impl<const BUFL: usize, const DEVICES: usize> Default for Gateway<BUFL, DEVICES> {
    fn default() -> Self {
        Self::new(AuthorizationPolicy::AllowAll)
    }
}

fn log_capture(index: usize, message: &SensorMessage) {
    match &message.reading {
        Reading::Motion(m) => debug!(
            "{} [{}] motion: rssi={} accel={:?} orientation={:?}",
            message.address, index, message.rssi, m.acceleration, m.orientation
        ),
        Reading::Environmental(e) => debug!(
            "{} [{}] environment: rssi={} temperature={:.2} humidity={:.2} pressure={:.2}",
            message.address, index, message.rssi, e.temperature, e.humidity, e.pressure
        ),
        Reading::Battery(b) => debug!(
            "{} [{}] battery: rssi={} voltage={:.2}",
            message.address, index, message.rssi, b.voltage
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::fixtures::{BAT_FRAME, ESD_FRAME, MSD_FRAME};
    use crate::sensor::DeviceAddress;

    struct RecordingSink(std::vec::Vec<std::string::String>);

    impl TelemetrySink for RecordingSink {
        type Error = ();

        fn send_telemetry(&mut self, json: &str) -> Result<(), ()> {
            self.0.push(json.to_string());
            Ok(())
        }
    }

    fn line(frame: &[u8]) -> std::vec::Vec<u8> {
        let mut v = frame.to_vec();
        v.push(b'\n');
        v
    }

    fn device(index: u8) -> std::vec::Vec<u8> {
        format!("BAT00{:02X}8967452301000BB8 -72\n", index).into_bytes()
    }

    #[test]
    fn test_environmental_end_to_end() {
        let mut gw = DefaultGateway::default();
        assert_eq!(gw.process_bytes(&line(ESD_FRAME)), Ok(1));

        let record = gw.registry().get(0).unwrap();
        assert_eq!(record.address().as_str(), "01:23:45:67:89:AB");
        assert_eq!(record.rssi(), Some(-50));
        assert!(record.environmental().is_dirty());
        assert!(!record.motion().is_dirty());
        assert!(!record.battery().is_dirty());
        let env = record.environmental().latest().unwrap();
        assert!((env.temperature - 25.08).abs() < 1e-4);
        assert!((env.humidity - 46.87).abs() < 1e-4);
        assert!((env.pressure - 101598.0).abs() < 1e-2);

        let mut sink = RecordingSink(vec![]);
        assert_eq!(gw.drain(&mut sink), DrainReport { sent: 1, failed: 0 });
        assert_eq!(sink.0.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&sink.0[0]).unwrap();
        assert_eq!(value["mac"], "01:23:45:67:89:AB");
        assert_eq!(value["rssi"], -50);
        assert_eq!(value["temperature"].as_f64(), Some(25.08));
        assert_eq!(value["humidity"].as_f64(), Some(46.87));
        assert!(!gw.registry().get(0).unwrap().environmental().is_dirty());
    }

    #[test]
    fn test_motion_dirty_flag_lifecycle() {
        let mut gw = DefaultGateway::default();
        gw.process_bytes(&line(MSD_FRAME)).unwrap();
        {
            let record = gw.registry().get(0).unwrap();
            assert!(record.motion().is_dirty());
            assert!(!record.environmental().is_dirty());
            assert!(!record.battery().is_dirty());
        }

        let mut sink = RecordingSink(vec![]);
        assert_eq!(gw.drain(&mut sink).sent, 1);
        assert!(!gw.registry().get(0).unwrap().motion().is_dirty());
        assert_eq!(gw.drain(&mut sink).sent, 0);
        assert_eq!(sink.0.len(), 1);
    }

    #[test]
    fn test_same_address_resolves_to_same_slot() {
        let mut gw = DefaultGateway::default();
        let mut input = line(ESD_FRAME);
        input.extend(line(MSD_FRAME));
        input.extend(line(BAT_FRAME));
        assert_eq!(gw.process_bytes(&input), Ok(3));
        assert_eq!(gw.registry().len(), 1);
        assert!(gw.registry().get(0).unwrap().motion().is_dirty());
        assert!(gw.registry().get(0).unwrap().battery().is_dirty());
    }

    #[test]
    fn test_frame_split_across_reads() {
        let mut gw = DefaultGateway::default();
        let input = line(ESD_FRAME);
        let (a, b) = input.split_at(20);
        assert_eq!(gw.process_bytes(a), Ok(0));
        assert_eq!(gw.buffered(), 20);
        assert_eq!(gw.process_bytes(b), Ok(1));
        assert_eq!(gw.buffered(), 0);
    }

    #[test]
    fn test_bad_frames_are_dropped_without_state_change() {
        let mut gw = DefaultGateway::default();
        let mut input = b"garbage\n".to_vec();
        input.extend_from_slice(b"XYZ00AB896745230100CC094F12B8069BFFFF -50\n");
        input.extend_from_slice(b"BAT00AB896745230100QQB8 -72\n");
        input.extend(line(BAT_FRAME));
        assert_eq!(gw.process_bytes(&input), Ok(1));
        assert_eq!(gw.registry().len(), 1);
    }

    #[test]
    fn test_handle_frame_errors() {
        let mut gw = DefaultGateway::default();
        assert_eq!(
            gw.handle_frame(b"short"),
            Err(Error::Parse(ParseMessageError::TooShort(5)))
        );
        assert_eq!(gw.handle_frame(BAT_FRAME), Ok(0));
    }

    #[test]
    fn test_unauthorized_device_never_reaches_registry() {
        let mut gw = DefaultGateway::new(AuthorizationPolicy::AllowList);
        let address: DeviceAddress = "01:23:45:67:89:AB".parse().unwrap();
        assert_eq!(
            gw.handle_frame(ESD_FRAME),
            Err(Error::Registry(RegistryError::Unauthorized(address.clone())))
        );
        assert!(gw.registry().is_empty());

        gw.authorized_mut().authorize(address).unwrap();
        assert_eq!(gw.process_bytes(&line(ESD_FRAME)), Ok(1));
        assert_eq!(gw.registry().len(), 1);
    }

    #[test]
    fn test_registry_full_drops_new_devices() {
        let mut gw = Gateway::<DEFAULT_BUFFER_SIZE, 2>::default();
        for i in 0..5 {
            gw.process_bytes(&device(i)).unwrap();
        }
        assert_eq!(gw.registry().len(), 2);
        assert_eq!(
            gw.handle_frame(&device(9)[..27]),
            Err(Error::Registry(RegistryError::Full(
                "01:23:45:67:89:09".parse().unwrap()
            )))
        );
        // existing devices keep updating
        assert_eq!(gw.handle_frame(&device(1)[..27]), Ok(1));
    }

    #[test]
    fn test_overflow_then_recovery() {
        let mut gw = DefaultGateway::default();
        gw.process_bytes(b"ESD00AB89674523").unwrap();
        let flood = [b'F'; DEFAULT_BUFFER_SIZE];
        assert!(matches!(
            gw.process_bytes(&flood),
            Err(Error::Framing(framer::Error::BufferFull { .. }))
        ));
        assert_eq!(gw.buffered(), 0);

        assert_eq!(gw.process_bytes(&line(ESD_FRAME)), Ok(1));
        assert_eq!(
            gw.registry().get(0).unwrap().address().as_str(),
            "01:23:45:67:89:AB"
        );
    }
}
