//! Bounded table of the RSL10 devices seen on the serial link
//!
//! Devices are keyed by their canonical [`DeviceAddress`]. A slot is created the first time
//! an authorized device is heard from and lives for the rest of the process; when all slots
//! are taken, messages from new devices are dropped.
use core::fmt;
use heapless::Vec;
use log::info;

use crate::sensor::{
    BatteryReading, DeviceAddress, EnvironmentalReading, MotionReading, Reading, SensorMessage,
};

pub const MAX_DEVICES: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    Unauthorized(DeviceAddress),
    Full(DeviceAddress),
    AuthorizationListFull(DeviceAddress),
    InvalidSlot(usize),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegistryError::Unauthorized(addr) => write!(
                f,
                "device {} is not authorized, add it to the authorized list",
                addr
            ),
            RegistryError::Full(addr) => {
                write!(f, "device list is full, could not add device {}", addr)
            }
            RegistryError::AuthorizationListFull(addr) => {
                write!(f, "authorized list is full, could not authorize {}", addr)
            }
            RegistryError::InvalidSlot(index) => write!(f, "no authorized slot {}", index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationPolicy {
    /// every address is accepted
    AllowAll,
    /// only addresses in the list are accepted
    AllowList,
}

/// Addresses allowed to create and update registry slots
///
/// Slots are addressed by index so they can mirror numbered configuration entries
/// (`authorizedMac1`, `authorizedMac2`, ...) where clearing an entry frees its slot.
pub struct AuthorizationList<const N: usize> {
    policy: AuthorizationPolicy,
    slots: [Option<DeviceAddress>; N],
}

impl<const N: usize> AuthorizationList<N> {
    pub fn new(policy: AuthorizationPolicy) -> Self {
        Self {
            policy,
            slots: core::array::from_fn(|_| None),
        }
    }

    pub fn policy(&self) -> AuthorizationPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: AuthorizationPolicy) {
        self.policy = policy;
    }

    pub fn is_authorized(&self, address: &DeviceAddress) -> bool {
        match self.policy {
            AuthorizationPolicy::AllowAll => true,
            AuthorizationPolicy::AllowList => self.contains(address),
        }
    }

    pub fn contains(&self, address: &DeviceAddress) -> bool {
        self.iter().any(|a| a == address)
    }

    /// Places `address` in the first free slot, returns its index
    pub fn authorize(&mut self, address: DeviceAddress) -> Result<usize, RegistryError> {
        if let Some(index) = self.slots.iter().position(|s| s.as_ref() == Some(&address)) {
            return Ok(index);
        }
        match self.slots.iter().position(Option::is_none) {
            Some(index) => {
                self.slots[index] = Some(address);
                Ok(index)
            }
            None => Err(RegistryError::AuthorizationListFull(address)),
        }
    }

    /// Returns whether the address was present
    pub fn revoke(&mut self, address: &DeviceAddress) -> bool {
        let mut found = false;
        for slot in self.slots.iter_mut() {
            if slot.as_ref() == Some(address) {
                *slot = None;
                found = true;
            }
        }
        found
    }

    pub fn set_slot(
        &mut self,
        index: usize,
        address: Option<DeviceAddress>,
    ) -> Result<(), RegistryError> {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = address;
                Ok(())
            }
            None => Err(RegistryError::InvalidSlot(index)),
        }
    }

    pub fn slot(&self, index: usize) -> Option<&DeviceAddress> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceAddress> {
        self.slots.iter().filter_map(Option::as_ref)
    }
}

impl<const N: usize> Default for AuthorizationList<N> {
    fn default() -> Self {
        Self::new(AuthorizationPolicy::AllowAll)
    }
}

/// Latest value of one message category plus its dirty flag
#[derive(Debug, Clone, PartialEq)]
pub struct Slot<T> {
    latest: Option<T>,
    dirty: bool,
}

impl<T> Slot<T> {
    /// `None` until the first message of this category arrives
    pub fn latest(&self) -> Option<&T> {
        self.latest.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn update(&mut self, value: T) {
        self.latest = Some(value);
        self.dirty = true;
    }

    /// Clears the dirty flag, returning the value if it was set
    pub(crate) fn take_dirty(&mut self) -> Option<&T> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        self.latest.as_ref()
    }
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot {
            latest: None,
            dirty: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    address: DeviceAddress,
    rssi: Option<i16>,
    pub(crate) motion: Slot<MotionReading>,
    pub(crate) environmental: Slot<EnvironmentalReading>,
    pub(crate) battery: Slot<BatteryReading>,
}

impl DeviceRecord {
    pub fn new(address: DeviceAddress) -> Self {
        DeviceRecord {
            address,
            rssi: None,
            motion: Slot::default(),
            environmental: Slot::default(),
            battery: Slot::default(),
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    pub fn motion(&self) -> &Slot<MotionReading> {
        &self.motion
    }

    pub fn environmental(&self) -> &Slot<EnvironmentalReading> {
        &self.environmental
    }

    pub fn battery(&self) -> &Slot<BatteryReading> {
        &self.battery
    }

    pub fn is_dirty(&self) -> bool {
        self.motion.is_dirty() || self.environmental.is_dirty() || self.battery.is_dirty()
    }

    /// Stores a decoded message, marking only its category dirty
    pub fn apply(&mut self, message: &SensorMessage) {
        self.rssi = Some(message.rssi);
        match message.reading {
            Reading::Motion(m) => self.motion.update(m),
            Reading::Environmental(e) => self.environmental.update(e),
            Reading::Battery(b) => self.battery.update(b),
        }
    }
}

pub struct Registry<const N: usize> {
    devices: Vec<DeviceRecord, N>,
}

impl<const N: usize> Registry<N> {
    pub fn new() -> Self {
        Self { devices: Vec::new() }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn lookup(&self, address: &DeviceAddress) -> Option<usize> {
        self.devices.iter().position(|d| d.address == *address)
    }

    /// Adds a new slot for `address`.
    ///
    /// Authorization is checked again here so no caller can create a slot for a device
    /// that is not allowed. Does not check for an existing slot, see [`Self::resolve`].
    pub fn insert<const A: usize>(
        &mut self,
        address: DeviceAddress,
        authorized: &AuthorizationList<A>,
    ) -> Result<usize, RegistryError> {
        if !authorized.is_authorized(&address) {
            return Err(RegistryError::Unauthorized(address));
        }
        if self.devices.len() == N {
            return Err(RegistryError::Full(address));
        }

        let index = self.devices.len();
        info!("adding device {} at index {}", address, index);
        self.devices
            .push(DeviceRecord::new(address))
            .map_err(|record| RegistryError::Full(record.address))?;
        Ok(index)
    }

    pub fn resolve<const A: usize>(
        &mut self,
        address: &DeviceAddress,
        authorized: &AuthorizationList<A>,
    ) -> Result<usize, RegistryError> {
        match self.lookup(address) {
            Some(index) => Ok(index),
            None => self.insert(address.clone(), authorized),
        }
    }

    pub fn get(&self, index: usize) -> Option<&DeviceRecord> {
        self.devices.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut DeviceRecord> {
        self.devices.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut DeviceRecord> {
        self.devices.iter_mut()
    }
}

impl<const N: usize> Default for Registry<N> {
    fn default() -> Self {
        Self::new()
    }
}
