//! Core deterministic primitives.
//!
//! Value types, registries and hashing shared by the configuration,
//! preferences, game and highscore layers.

pub mod variant;
pub mod named;
pub mod owner;
pub mod rng;
pub mod hash;

// Re-export core types
pub use variant::{Variant, VariantSet};
pub use named::NamedObjIndex;
pub use owner::OwnerType;
pub use rng::GameRng;
pub use hash::{StateHash, StateHasher};
