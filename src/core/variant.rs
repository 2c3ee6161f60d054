//! Tagged option/discriminator values.
//!
//! [`Variant`] is the value type of every option and discriminator.
//! [`VariantSet`] is a compact set of variants, stored either as an
//! inclusive range or as a sorted, deduplicated list.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// VARIANT
// =============================================================================

/// A null, integer or boolean value.
///
/// Equality compares type and value. Ordering compares the numeric value
/// first (booleans count as 0 and 1) and uses the type only to break ties,
/// so that `Ord` stays consistent with `Eq`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Variant {
    /// No value.
    #[default]
    Null,
    /// Integer value.
    Int(i32),
    /// Boolean value.
    Bool(bool),
}

impl Variant {
    /// Whether this is [`Variant::Null`].
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    /// Numeric value: integers as is, booleans as 0/1, null as 0.
    #[inline]
    pub fn as_int(&self) -> i32 {
        match *self {
            Variant::Null => 0,
            Variant::Int(n) => n,
            Variant::Bool(b) => b as i32,
        }
    }

    /// Boolean value: non-zero integers are true, null is false.
    #[inline]
    pub fn as_bool(&self) -> bool {
        match *self {
            Variant::Null => false,
            Variant::Int(n) => n != 0,
            Variant::Bool(b) => b,
        }
    }

    /// Whether both variants hold the same kind of value.
    #[inline]
    pub fn same_type(&self, other: &Variant) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    fn type_rank(&self) -> u8 {
        match self {
            Variant::Null => 0,
            Variant::Int(_) => 1,
            Variant::Bool(_) => 2,
        }
    }
}

impl PartialOrd for Variant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_int()
            .cmp(&other.as_int())
            .then_with(|| self.type_rank().cmp(&other.type_rank()))
    }
}

impl From<i32> for Variant {
    fn from(n: i32) -> Self {
        Variant::Int(n)
    }
}

impl From<bool> for Variant {
    fn from(b: bool) -> Self {
        Variant::Bool(b)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => write!(f, "null"),
            Variant::Int(n) => write!(f, "{}", n),
            Variant::Bool(b) => write!(f, "{}", b),
        }
    }
}

// =============================================================================
// VARIANT SET
// =============================================================================

/// A set of non-null variants of the same type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantSet {
    /// The empty set.
    #[default]
    Empty,
    /// All values in the inclusive range `from..=to`.
    Range {
        /// Smallest value.
        from: Variant,
        /// Largest value.
        to: Variant,
    },
    /// Sorted, deduplicated values.
    List(Vec<Variant>),
}

impl VariantSet {
    /// Set containing a single value.
    pub fn single(value: Variant) -> Self {
        debug_assert!(!value.is_null());
        VariantSet::Range { from: value, to: value }
    }

    /// Inclusive range. The bounds are swapped if given in reverse order.
    pub fn range(from: Variant, to: Variant) -> Self {
        debug_assert!(!from.is_null() && from.same_type(&to));
        if from > to {
            VariantSet::Range { from: to, to: from }
        } else {
            VariantSet::Range { from, to }
        }
    }

    /// Set from arbitrary values. One value collapses into a range.
    pub fn from_values(mut values: Vec<Variant>) -> Self {
        match values.len() {
            0 => VariantSet::Empty,
            1 => VariantSet::single(values[0]),
            _ => {
                values.sort();
                values.dedup();
                debug_assert!(values.iter().all(|v| !v.is_null() && v.same_type(&values[0])));
                VariantSet::List(values)
            }
        }
    }

    /// Number of values in the set.
    pub fn size(&self) -> i32 {
        match self {
            VariantSet::Empty => 0,
            VariantSet::Range { from, to } => to.as_int() - from.as_int() + 1,
            VariantSet::List(values) => values.len() as i32,
        }
    }

    /// Whether the set has no values.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Membership test: binary search for lists, bounds check for ranges.
    pub fn contains(&self, value: &Variant) -> bool {
        match self {
            VariantSet::Empty => false,
            VariantSet::Range { from, to } => value >= from && value <= to,
            VariantSet::List(values) => values.binary_search(value).is_ok(),
        }
    }
}

impl From<Vec<Variant>> for VariantSet {
    fn from(values: Vec<Variant>) -> Self {
        VariantSet::from_values(values)
    }
}

// =============================================================================
// TESTS
// =============================================================================
