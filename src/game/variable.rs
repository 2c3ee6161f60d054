//! Game variables.
//!
//! A variable is an `i32` owned by the game, a team or a player. Time
//! relative variables never tick eagerly: the elapsed game time is added
//! when the value is read, and removed again when it is written.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// TYPES
// =============================================================================

/// Unit of the elapsed time added to a time relative variable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeBase {
    /// Milliseconds.
    Millisec,
    /// Seconds.
    #[default]
    Sec,
    /// Minutes.
    Min,
}

impl TimeBase {
    fn millisec_per_unit(self) -> i32 {
        match self {
            TimeBase::Millisec => 1,
            TimeBase::Sec => 1_000,
            TimeBase::Min => 60_000,
        }
    }
}

/// How a value is rendered for display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableFormat {
    /// Plain number.
    #[default]
    Number,
    /// Thousands separated by `'`, e.g. `131'234`.
    Mill,
    /// Seconds as `m:ss`.
    MinSec,
    /// Milliseconds as `m:ss.mmm`.
    MinSecMillisec,
}

/// Declaration of a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariableType {
    /// Value at game start.
    pub initial: i32,
    /// Writes through [`Variable::set`] are ignored.
    pub read_only: bool,
    /// Game time is added (or subtracted) when reading.
    pub time_relative: bool,
    /// Whether elapsed time counts up (`true`) or down.
    pub add_time: bool,
    /// Unit of the elapsed time.
    pub time_base: TimeBase,
    /// Display format.
    pub format: VariableFormat,
}

impl Default for VariableType {
    fn default() -> Self {
        Self {
            initial: 0,
            read_only: false,
            time_relative: false,
            add_time: true,
            time_base: TimeBase::Sec,
            format: VariableFormat::Number,
        }
    }
}

impl VariableType {
    /// A plain writable variable.
    pub fn new(initial: i32) -> Self {
        Self { initial, ..Self::default() }
    }

    /// A read-only variable.
    pub fn read_only(initial: i32) -> Self {
        Self { initial, read_only: true, ..Self::default() }
    }

    /// A variable that follows the game clock.
    pub fn time_relative(initial: i32, add_time: bool, time_base: TimeBase) -> Self {
        Self { initial, time_relative: true, add_time, time_base, ..Self::default() }
    }

    /// Set the display format.
    pub fn with_format(mut self, format: VariableFormat) -> Self {
        self.format = format;
        self
    }
}

// =============================================================================
// CLOCK
// =============================================================================

/// Game time as seen by variables.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GameClock {
    /// Number of completed ticks.
    pub tick: i32,
    /// Game time in milliseconds.
    pub elapsed_millisec: i32,
    /// Whether a tick is being processed.
    pub in_tick: bool,
}

// =============================================================================
// VARIABLE
// =============================================================================

/// A variable instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    var_type: VariableType,
    /// Stored value. For time relative variables this is the offset from the
    /// elapsed time, which may leave the `i32` range.
    value: i64,
    last_change: i32,
    /// Frozen game time. Set once the owner finished.
    inhibit_millisec: Option<i32>,
}

impl Variable {
    /// New variable holding the initial value. The initial value counts as
    /// a change in tick 0.
    pub fn new(var_type: VariableType) -> Self {
        Self { var_type, value: i64::from(var_type.initial), last_change: 0, inhibit_millisec: None }
    }

    /// The declaration.
    pub fn var_type(&self) -> &VariableType {
        &self.var_type
    }

    fn elapsed(&self, clock: &GameClock) -> i32 {
        let millisec = self.inhibit_millisec.unwrap_or(clock.elapsed_millisec);
        let units = millisec / self.var_type.time_base.millisec_per_unit();
        if self.var_type.add_time { units } else { -units }
    }

    /// Current value.
    pub fn get(&self, clock: &GameClock) -> i32 {
        let value = if self.var_type.time_relative { self.value + i64::from(self.elapsed(clock)) } else { self.value };
        value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    /// Set the value. Ignored for read-only and inhibited variables.
    pub fn set(&mut self, clock: &GameClock, value: i32) {
        if self.var_type.read_only || self.inhibit_millisec.is_some() {
            return;
        }
        self.store(clock, value);
    }

    /// Add to the value.
    pub fn inc(&mut self, clock: &GameClock, delta: i32) {
        let value = self.get(clock).saturating_add(delta);
        self.set(clock, value);
    }

    /// Whether the value changed in the current (or, outside a tick, last) tick.
    ///
    /// Time relative variables always report a change.
    pub fn is_changed(&self, clock: &GameClock) -> bool {
        if self.var_type.time_relative {
            return true;
        }
        if clock.in_tick {
            clock.tick <= self.last_change
        } else {
            clock.tick - 1 <= self.last_change
        }
    }

    /// Whether the variable was frozen.
    pub fn is_inhibited(&self) -> bool {
        self.inhibit_millisec.is_some()
    }

    /// Current value with its display format.
    pub fn value(&self, clock: &GameClock) -> VariableValue {
        VariableValue { value: self.get(clock), format: self.var_type.format }
    }

    /// Set even if read-only or inhibited. Used for system variables.
    pub(crate) fn force_set(&mut self, clock: &GameClock, value: i32) {
        self.store(clock, value);
    }

    /// Freeze the game time seen by this variable and refuse further writes.
    pub(crate) fn inhibit(&mut self, clock: &GameClock) {
        if self.inhibit_millisec.is_none() {
            self.inhibit_millisec = Some(clock.elapsed_millisec);
        }
    }

    fn store(&mut self, clock: &GameClock, value: i32) {
        let value = i64::from(value);
        self.value = if self.var_type.time_relative { value - i64::from(self.elapsed(clock)) } else { value };
        self.last_change = clock.tick;
    }
}

/// The variables of one owner, indexed by variable id within its scope.
pub type Variables = Vec<Variable>;

/// Create the variables of a scope from their declarations.
pub fn make_variables<'a>(types: impl IntoIterator<Item = &'a VariableType>) -> Variables {
    types.into_iter().copied().map(Variable::new).collect()
}

// =============================================================================
// VALUE
// =============================================================================

/// A formatted snapshot of a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableValue {
    /// The value.
    pub value: i32,
    /// How to render it.
    pub format: VariableFormat,
}

impl VariableValue {
    /// Plain number.
    pub fn number(value: i32) -> Self {
        Self { value, format: VariableFormat::Number }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.value < 0 { "-" } else { "" };
        let abs = self.value.unsigned_abs();
        match self.format {
            VariableFormat::Number => write!(f, "{}", self.value),
            VariableFormat::Mill => {
                let mut groups = Vec::new();
                let mut rest = abs;
                while rest >= 1000 {
                    groups.push(rest % 1000);
                    rest /= 1000;
                }
                write!(f, "{sign}{rest}")?;
                for group in groups.iter().rev() {
                    write!(f, "'{group:03}")?;
                }
                Ok(())
            }
            VariableFormat::MinSec => write!(f, "{sign}{}:{:02}", abs / 60, abs % 60),
            VariableFormat::MinSecMillisec => {
                let secs = abs / 1000;
                write!(f, "{sign}{}:{:02}.{:03}", secs / 60, secs % 60, abs % 1000)
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
