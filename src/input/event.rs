//! Input events.
//!
//! Events carry the capability that produced them. Key-like events can be
//! translated into key actions through the preferences' key bindings.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::device::Capability;
use super::keys::HardwareKey;

/// How a key-like input changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyInputType {
    /// Key went down.
    Press,
    /// Key went up.
    Release,
    /// Key went up because the focus or device was lost.
    ReleaseCancel,
}

/// Payload of an input event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputKind {
    /// One key changed.
    Key {
        /// The key.
        key: HardwareKey,
        /// Press or release.
        input_type: KeyInputType,
    },
    /// Several keys changed at once (chorded buttons).
    Keys(Vec<(HardwareKey, KeyInputType)>),
    /// Any other event (pointer motion, axis). Only routed to players.
    Other {
        /// Application defined code.
        code: i32,
    },
}

/// An input event produced by a device capability.
#[derive(Clone, Debug)]
pub struct InputEvent {
    /// Timestamp in microseconds.
    pub time_usec: i64,
    /// Producing capability.
    pub capability: Rc<Capability>,
    /// Payload.
    pub kind: InputKind,
}

impl InputEvent {
    /// Key press event.
    pub fn key_press(capability: &Rc<Capability>, key: HardwareKey, time_usec: i64) -> Self {
        Self::key(capability, key, KeyInputType::Press, time_usec)
    }

    /// Key release event.
    pub fn key_release(capability: &Rc<Capability>, key: HardwareKey, time_usec: i64) -> Self {
        Self::key(capability, key, KeyInputType::Release, time_usec)
    }

    /// Key event of any type.
    pub fn key(capability: &Rc<Capability>, key: HardwareKey, input_type: KeyInputType, time_usec: i64) -> Self {
        Self { time_usec, capability: Rc::clone(capability), kind: InputKind::Key { key, input_type } }
    }

    /// Non-key event.
    pub fn other(capability: &Rc<Capability>, code: i32, time_usec: i64) -> Self {
        Self { time_usec, capability: Rc::clone(capability), kind: InputKind::Other { code } }
    }

    /// Id of the producing capability.
    pub fn capability_id(&self) -> i32 {
        self.capability.id()
    }

    /// The keys this event can be interpreted as, in order.
    pub fn as_keys(&self) -> Vec<(HardwareKey, KeyInputType)> {
        match &self.kind {
            InputKind::Key { key, input_type } => vec![(*key, *input_type)],
            InputKind::Keys(keys) => keys.clone(),
            InputKind::Other { .. } => Vec::new(),
        }
    }
}
