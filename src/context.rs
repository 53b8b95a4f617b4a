//! Ambient configuration: the decode/encode context structs and the
//! process-wide toggle singleton (spec.md §5, §6.2, design note §9).
//!
//! The teacher's `der` crate carries its handful of behavioral switches
//! (e.g. whether to accept indefinite lengths) as Cargo feature flags
//! resolved at compile time. This crate's toggles are genuinely runtime
//! — a single process may decode both strict DER and permissive BER
//! input in the same run — so they are modeled as an explicit context
//! struct threaded through calls, per design note §9, with a process-wide
//! singleton (grounded on the same `once_cell::sync::Lazy` pattern used
//! by [`crate::oid::REGISTRY`]) as the convenience wrapper the public API
//! surface (`enable_blobs_on_bad_decodes` and friends) is built on.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

/// Default recursion depth cap (spec.md §4.5).
pub const DEFAULT_RECURSION_LIMIT: usize = 128;

/// Which canonical form the encoder prefers for an ambiguous time value
/// (one with no schema-declared type, e.g. under a TYPE_ANY slot).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimeFormat {
    /// Prefer `UTCTime` (legal only for 1950-2049).
    Utc,
    /// Prefer `GeneralizedTime`.
    Generalized,
}

/// Configuration consulted by the BER decoder.
#[derive(Copy, Clone, Debug)]
pub struct DecodeConfig {
    /// Maximum constructed-node nesting depth before
    /// [`crate::error::ErrorKind::RecursionDepthExceeded`].
    pub recursion_limit: usize,
    /// When true, a primitive or structural decode failure produces a
    /// `MalformedData`/opaque node in place of the offending value
    /// instead of aborting the whole decode.
    pub blobs_on_bad_decode: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            blobs_on_bad_decode: false,
        }
    }
}

impl DecodeConfig {
    /// Snapshot the current process-wide toggles into a config value.
    pub fn from_global() -> Self {
        Self {
            recursion_limit: GLOBAL.recursion_limit.load(Ordering::Relaxed),
            blobs_on_bad_decode: GLOBAL.blobs_on_bad_decode.load(Ordering::Relaxed),
        }
    }
}

/// Configuration consulted by [`crate::node`] mutation and
/// [`crate::encoder`].
#[derive(Copy, Clone, Debug)]
pub struct EncodeConfig {
    /// Whether a structural mutation to a Lazy Constructed node
    /// propagates cache invalidation up the parent chain. Disabled while
    /// decoding a nested extension value in place, so that re-interpreting
    /// it does not dirty the enclosing signed body (spec.md §4.6, §9).
    pub invalidate_cache: bool,
    /// Preferred re-emission form for ambiguous time values.
    pub time_format: TimeFormat,
    /// Whether the encoder's cache short-circuit (spec.md §4.8) may return
    /// a Lazy Constructed node's cached bytes at all. Disabling this forces
    /// every node to be rebuilt from its mapped value on every encode, at
    /// the cost of losing signature-preserving byte-exact re-emission.
    pub use_encoded_cache: bool,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            invalidate_cache: true,
            time_format: TimeFormat::Utc,
            use_encoded_cache: true,
        }
    }
}

impl EncodeConfig {
    /// Snapshot the current process-wide toggles into a config value.
    pub fn from_global() -> Self {
        Self {
            invalidate_cache: GLOBAL.invalidate_cache.load(Ordering::Relaxed),
            time_format: *GLOBAL.time_format.read().unwrap(),
            use_encoded_cache: GLOBAL.use_encoded_cache.load(Ordering::Relaxed),
        }
    }
}

struct GlobalToggles {
    recursion_limit: AtomicUsize,
    blobs_on_bad_decode: AtomicBool,
    invalidate_cache: AtomicBool,
    time_format: RwLock<TimeFormat>,
    use_encoded_cache: AtomicBool,
}

static GLOBAL: Lazy<GlobalToggles> = Lazy::new(|| GlobalToggles {
    recursion_limit: AtomicUsize::new(DEFAULT_RECURSION_LIMIT),
    blobs_on_bad_decode: AtomicBool::new(false),
    invalidate_cache: AtomicBool::new(true),
    time_format: RwLock::new(TimeFormat::Utc),
    use_encoded_cache: AtomicBool::new(true),
});

/// Enable the blobs-on-bad-decode relaxation process-wide.
pub fn enable_blobs_on_bad_decodes() {
    GLOBAL.blobs_on_bad_decode.store(true, Ordering::Relaxed);
}

/// Disable the blobs-on-bad-decode relaxation process-wide (the default).
pub fn disable_blobs_on_bad_decodes() {
    GLOBAL.blobs_on_bad_decode.store(false, Ordering::Relaxed);
}

/// Enable ancestor cache invalidation on structural mutation
/// process-wide (the default).
pub fn enable_cache_invalidation() {
    GLOBAL.invalidate_cache.store(true, Ordering::Relaxed);
}

/// Disable ancestor cache invalidation on structural mutation
/// process-wide. See [`EncodeConfig::invalidate_cache`].
pub fn disable_cache_invalidation() {
    GLOBAL.invalidate_cache.store(false, Ordering::Relaxed);
}

/// Set the process-wide recursion depth cap.
pub fn set_recursion_depth(limit: usize) {
    GLOBAL.recursion_limit.store(limit, Ordering::Relaxed);
}

/// Set the process-wide preferred time re-emission form.
pub fn set_time_format(format: TimeFormat) {
    *GLOBAL.time_format.write().unwrap() = format;
}

/// Enable the encoder's cache short-circuit process-wide (the default).
pub fn enable_encoded_cache() {
    GLOBAL.use_encoded_cache.store(true, Ordering::Relaxed);
}

/// Disable the encoder's cache short-circuit process-wide, forcing every
/// Lazy Constructed node to be rebuilt from its mapped value.
pub fn ignore_encoded_cache() {
    GLOBAL.use_encoded_cache.store(false, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes tests that touch process-wide state; `cargo test` runs
    // within one process and these toggles are shared.
    static LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn recursion_depth_round_trips_through_global() {
        let _guard = LOCK.lock().unwrap();
        set_recursion_depth(64);
        assert_eq!(DecodeConfig::from_global().recursion_limit, 64);
        set_recursion_depth(DEFAULT_RECURSION_LIMIT);
    }

    #[test]
    fn cache_invalidation_toggle_round_trips() {
        let _guard = LOCK.lock().unwrap();
        disable_cache_invalidation();
        assert!(!EncodeConfig::from_global().invalidate_cache);
        enable_cache_invalidation();
        assert!(EncodeConfig::from_global().invalidate_cache);
    }
}
