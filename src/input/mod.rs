//! Input device model.
//!
//! ## Module Structure
//!
//! - `keys`: Hardware keys and their global order
//! - `device`: Capabilities, devices, hot-plug events
//! - `event`: Input events routed into a game

pub mod keys;
pub mod device;
pub mod event;

// Re-export key types
pub use keys::{HardwareKey, UnknownKey};
pub use device::{Capability, CapabilityClass, Device, DeviceEvent, DeviceManager};
pub use event::{InputEvent, InputKind, KeyInputType};
