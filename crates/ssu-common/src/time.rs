// ============================================
// File: crates/ssu-common/src/time.rs
// ============================================
//! # Time Utilities
//!
//! ## Creation Reason
//! SSU datagrams carry a 32-bit seconds-since-epoch header field and
//! SessionCreated signs over the responder's signing time. Sessions also
//! track their last activity from several tasks at once.
//!
//! ## Main Functionality
//! - `Timestamp`: 32-bit Unix seconds as carried on the wire (big-endian)
//! - `AtomicInstant`: lock-free last-activity tracking
//!
//! ## ⚠️ Important Note for Next Developer
//! - The wire field is unsigned 32-bit; it wraps in 2106
//! - Skew checks compare against the local clock, not a monotonic one
//!
//! ## Last Modified
//! v0.1.0 - Initial time utilities

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ============================================
// Constants
// ============================================

/// Default tolerated clock skew for handshake datagrams.
pub const DEFAULT_MAX_CLOCK_SKEW_SECS: u32 = 60;

// ============================================
// Timestamp
// ============================================

/// Unix timestamp in whole seconds, as carried in the datagram header.
///
/// # Example
/// ```
/// use ssu_common::time::Timestamp;
///
/// let now = Timestamp::now();
/// let wire = now.to_be_bytes();
/// assert_eq!(Timestamp::from_be_bytes(wire), now);
/// assert!(now.is_recent(5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u32);

impl Timestamp {
    /// Creates a timestamp from Unix seconds.
    #[must_use]
    pub const fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    /// Returns the current time.
    ///
    /// A clock set before the epoch reads as zero and one past 2106
    /// saturates at `u32::MAX`.
    #[must_use]
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(u32::try_from(secs).unwrap_or(u32::MAX))
    }

    /// Returns the Unix timestamp in seconds.
    #[must_use]
    pub const fn as_secs(&self) -> u32 {
        self.0
    }

    /// Big-endian wire encoding.
    #[must_use]
    pub const fn to_be_bytes(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Decodes the big-endian wire encoding.
    #[must_use]
    pub const fn from_be_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(bytes))
    }

    /// Signed distance from the local clock. Positive means in the future.
    #[must_use]
    pub fn offset_from_now(&self) -> i64 {
        i64::from(self.0) - i64::from(Self::now().0)
    }

    /// `true` if `|timestamp - now| <= max_skew_secs`.
    #[must_use]
    pub fn is_recent(&self, max_skew_secs: u32) -> bool {
        self.offset_from_now().unsigned_abs() <= u64::from(max_skew_secs)
    }
}

impl From<u32> for Timestamp {
    fn from(secs: u32) -> Self {
        Self(secs)
    }
}

impl From<Timestamp> for u32 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================
// AtomicInstant
// ============================================

/// Thread-safe wrapper around [`Instant`].
///
/// Stores nanoseconds elapsed since a process-wide reference instant in an
/// `AtomicU64`, so readers and writers never take a lock.
#[derive(Debug)]
pub struct AtomicInstant {
    nanos: AtomicU64,
}

impl AtomicInstant {
    fn reference() -> Instant {
        static REFERENCE: OnceLock<Instant> = OnceLock::new();
        *REFERENCE.get_or_init(Instant::now)
    }

    fn to_nanos(instant: Instant) -> u64 {
        instant
            .checked_duration_since(Self::reference())
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }

    /// Creates an `AtomicInstant` set to now.
    #[must_use]
    pub fn now() -> Self {
        Self::from_instant(Instant::now())
    }

    /// Creates an `AtomicInstant` from an `Instant`.
    #[must_use]
    pub fn from_instant(instant: Instant) -> Self {
        Self {
            nanos: AtomicU64::new(Self::to_nanos(instant)),
        }
    }

    /// Loads the stored instant.
    #[must_use]
    pub fn load(&self) -> Instant {
        Self::reference() + Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }

    /// Stores a new instant.
    pub fn store(&self, instant: Instant) {
        self.nanos.store(Self::to_nanos(instant), Ordering::Relaxed);
    }

    /// Updates to now.
    pub fn touch(&self) {
        self.store(Instant::now());
    }

    /// Time elapsed since the stored instant.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.load().elapsed()
    }
}

impl Default for AtomicInstant {
    fn default() -> Self {
        Self::now()
    }
}

// ============================================
// Tests
// ============================================
