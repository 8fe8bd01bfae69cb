//! Shared mapping contract and the argument-error taxonomy.
//!
//! Both engines implement [`HashSmithView`] so that external collaborators
//! (a future Robin-Hood variant, a SIMD-probed variant, a shard wrapper)
//! can depend on one capability trait instead of inheriting from a concrete
//! engine.

use thiserror::Error;

/// Default load factor: 7/8, matching the spec's capacity-pressure target.
pub const DEFAULT_LOAD_FACTOR: f64 = 7.0 / 8.0;

/// Argument errors reported synchronously, before any state changes.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum MapError {
    /// `load_factor` must lie strictly between 0 and 1.
    #[error("load factor must be in (0, 1), got {0}")]
    InvalidLoadFactor(f64),

    /// The requested capacity overflows `usize` once rounded to the next
    /// power of two of groups.
    #[error("requested capacity {0} overflows usize when rounded to a power of two")]
    CapacityOverflow(usize),
}

pub(crate) fn validate_load_factor(load_factor: f64) -> Result<(), MapError> {
    if load_factor > 0.0 && load_factor < 1.0 {
        Ok(())
    } else {
        Err(MapError::InvalidLoadFactor(load_factor))
    }
}

/// Rounds `capacity` up to a power of two of at least 8, reserving one
/// group so lookups always terminate on an EMPTY lane.
pub(crate) fn round_up_capacity(capacity: usize) -> Result<usize, MapError> {
    let wanted = capacity.max(crate::group::WIDTH);
    wanted
        .checked_next_power_of_two()
        .ok_or(MapError::CapacityOverflow(capacity))
}

/// The mapping contract both engines expose.
///
/// Methods that require exclusive access on the single-threaded engine but
/// only shared access on the lock-free engine take `&self` here; callers
/// needing the single-threaded engine's `&mut self` fast paths use its
/// inherent methods directly (this trait exists for code that must be
/// generic over "which engine", not as the primary API surface).
pub trait HashSmithView<K, V> {
    /// Returns a clone of the value stored at `key`, if present.
    fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone;

    /// Number of live entries.
    fn len(&self) -> usize;

    /// Whether the table holds no live entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is present.
    fn contains_key(&self, key: &K) -> bool;
}
