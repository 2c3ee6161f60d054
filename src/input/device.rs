//! Devices, capabilities and hot-plug events.
//!
//! A [`DeviceManager`] owns the currently plugged devices. Each device
//! exposes at most one [`Capability`] per [`CapabilityClass`]. Capability
//! ids are unique for the lifetime of the manager and never reused.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

// =============================================================================
// CAPABILITY
// =============================================================================

/// Kind of capability a device can provide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityClass {
    /// Keyboard keys.
    Keys,
    /// Mouse or touch pointer.
    Pointer,
    /// Gamepad or joystick buttons.
    Joystick,
    /// Sound playback (headphones, speakers).
    Playback,
}

impl CapabilityClass {
    /// Whether the class is the sound playback class.
    #[inline]
    pub fn is_playback(self) -> bool {
        self == CapabilityClass::Playback
    }
}

impl fmt::Display for CapabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapabilityClass::Keys => "keys",
            CapabilityClass::Pointer => "pointer",
            CapabilityClass::Joystick => "joystick",
            CapabilityClass::Playback => "playback",
        };
        f.write_str(name)
    }
}

/// A capability of a plugged device.
#[derive(Debug, PartialEq, Eq)]
pub struct Capability {
    id: i32,
    class: CapabilityClass,
    device_id: i32,
}

impl Capability {
    /// Process-wide unique id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Capability class.
    pub fn class(&self) -> CapabilityClass {
        self.class
    }

    /// Id of the device providing the capability.
    pub fn device_id(&self) -> i32 {
        self.device_id
    }
}

// =============================================================================
// DEVICE
// =============================================================================

/// A plugged input or output device.
#[derive(Debug)]
pub struct Device {
    id: i32,
    name: String,
    capabilities: Vec<Rc<Capability>>,
}

impl Device {
    /// Device id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Human readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The device's capability of the given class, if any.
    pub fn capability(&self, class: CapabilityClass) -> Option<&Rc<Capability>> {
        self.capabilities.iter().find(|capa| capa.class == class)
    }

    /// All capabilities of the device.
    pub fn capabilities(&self) -> &[Rc<Capability>] {
        &self.capabilities
    }
}

/// Hot-plug notification.
#[derive(Clone, Debug)]
pub enum DeviceEvent {
    /// A device was plugged.
    Added(Rc<Device>),
    /// A device was unplugged.
    Removed(Rc<Device>),
}

// =============================================================================
// DEVICE MANAGER
// =============================================================================

/// Registry of plugged devices.
///
/// Single-threaded: events are produced synchronously by
/// [`DeviceManager::add_device`] and [`DeviceManager::remove_device`] and
/// are expected to be forwarded to the preferences and game by the caller.
#[derive(Debug)]
pub struct DeviceManager {
    classes: Vec<CapabilityClass>,
    devices: Vec<Rc<Device>>,
    next_device_id: i32,
    next_capability_id: i32,
}

impl DeviceManager {
    /// Create a manager supporting the given capability classes.
    pub fn new(classes: &[CapabilityClass]) -> Self {
        let mut unique: Vec<CapabilityClass> = Vec::with_capacity(classes.len());
        for &class in classes {
            if !unique.contains(&class) {
                unique.push(class);
            }
        }
        Self { classes: unique, devices: Vec::new(), next_device_id: 1, next_capability_id: 1 }
    }

    /// Supported capability classes, in registration order.
    pub fn capability_classes(&self) -> &[CapabilityClass] {
        &self.classes
    }

    /// Currently plugged devices, in plug order.
    pub fn devices(&self) -> &[Rc<Device>] {
        &self.devices
    }

    /// Plug a device with one capability per listed class.
    ///
    /// Classes the manager does not support are ignored.
    pub fn add_device(&mut self, name: &str, classes: &[CapabilityClass]) -> DeviceEvent {
        let device_id = self.next_device_id;
        self.next_device_id += 1;
        let mut capabilities = Vec::new();
        for &class in classes {
            if !self.classes.contains(&class) || capabilities.iter().any(|c: &Rc<Capability>| c.class == class) {
                continue;
            }
            capabilities.push(Rc::new(Capability { id: self.next_capability_id, class, device_id }));
            self.next_capability_id += 1;
        }
        let device = Rc::new(Device { id: device_id, name: name.to_string(), capabilities });
        debug!("Device {} '{}' added with {} capabilities", device_id, name, device.capabilities.len());
        self.devices.push(Rc::clone(&device));
        DeviceEvent::Added(device)
    }

    /// Unplug a device. Returns `None` if the id is unknown.
    pub fn remove_device(&mut self, device_id: i32) -> Option<DeviceEvent> {
        let pos = self.devices.iter().position(|d| d.id == device_id)?;
        let device = self.devices.remove(pos);
        debug!("Device {} '{}' removed", device_id, device.name);
        Some(DeviceEvent::Removed(device))
    }

    /// Plugged capability with the given id.
    pub fn capability(&self, capability_id: i32) -> Option<&Rc<Capability>> {
        self.devices
            .iter()
            .flat_map(|d| d.capabilities.iter())
            .find(|capa| capa.id == capability_id)
    }
}

// =============================================================================
// TESTS
// =============================================================================
