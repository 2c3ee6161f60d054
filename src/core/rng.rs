//! Seeded random numbers for games.
//!
//! A [`GameRng`] is an Xorshift128+ stream. Each started game draws from a
//! stream keyed by the application name, the base seed and how many games
//! were started before it, so replaying the same inputs reproduces a game.

use sha2::{Digest, Sha256};

/// Xorshift128+ stream used by the tick engine.
///
/// ```
/// use stmg::core::rng::GameRng;
///
/// let mut rng = GameRng::for_game("tetris", 42, 0);
/// let roll = rng.between(1, 6);
/// assert!((1..=6).contains(&roll));
/// ```
#[derive(Clone, Debug)]
pub struct GameRng {
    s0: u64,
    s1: u64,
}

impl Default for GameRng {
    fn default() -> Self {
        Self::seeded(0)
    }
}

impl GameRng {
    /// Stream expanded from a raw seed with SplitMix64.
    pub fn seeded(seed: u64) -> Self {
        let mut mix = seed;
        let s0 = splitmix64(&mut mix);
        let s1 = splitmix64(&mut mix);
        // An all-zero state would only ever yield zeros.
        if s0 | s1 == 0 {
            return Self { s0: 1, s1: 1 };
        }
        Self { s0, s1 }
    }

    /// Stream of the `games_started`-th game of an application.
    pub fn for_game(app_name: &str, base_seed: u64, games_started: i32) -> Self {
        Self::seeded(game_seed(app_name, base_seed, games_started))
    }

    fn next_u64(&mut self) -> u64 {
        let (s0, mut s1) = (self.s0, self.s1);
        let out = s0.wrapping_add(s1);
        s1 ^= s0;
        self.s0 = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.s1 = s1.rotate_left(37);
        out
    }

    /// Uniform value in `from..=to`. Returns `from` when the range is empty.
    pub fn between(&mut self, from: i32, to: i32) -> i32 {
        if to <= from {
            return from;
        }
        let span = (i64::from(to) - i64::from(from) + 1) as u64;
        (i64::from(from) + (self.next_u64() % span) as i64) as i32
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of the `games_started`-th game: first 8 bytes of a SHA-256 over
/// the application name, base seed and game counter.
pub fn game_seed(app_name: &str, base_seed: u64, games_started: i32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"STMG_GAME_SEED_V1");
    hasher.update((app_name.len() as u32).to_le_bytes());
    hasher.update(app_name.as_bytes());
    hasher.update(base_seed.to_le_bytes());
    hasher.update(games_started.to_le_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

// =============================================================================
// TESTS
// =============================================================================
