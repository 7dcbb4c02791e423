//! Index health state machine
//!
//! ```text
//!   NotLoaded ──► Healthy ──► Degraded ──┐
//!       │            │                   ▼
//!       ├────────────┴─────────────► ReadOnly
//!       └──► Degraded
//! ```
//!
//! `Degraded` and `ReadOnly` are terminal until restart; only the
//! emergency switch moves `Degraded` on to `ReadOnly`.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Health of the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Health {
    /// Not initialized yet
    NotLoaded,

    /// No issue detected
    Healthy,

    /// Writes are refused (filesystem or emergency switch)
    ReadOnly,

    /// An index file was corrupt or a write failed
    Degraded,
}

impl Health {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Health::NotLoaded,
            1 => Health::Healthy,
            2 => Health::ReadOnly,
            _ => Health::Degraded,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Health::NotLoaded => 0,
            Health::Healthy => 1,
            Health::ReadOnly => 2,
            Health::Degraded => 3,
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Health::NotLoaded => "not-loaded",
            Health::Healthy => "healthy",
            Health::ReadOnly => "read-only",
            Health::Degraded => "degraded",
        };
        f.write_str(name)
    }
}

/// Lock-free holder for the current `Health`
#[derive(Debug)]
pub struct HealthState(AtomicU8);

impl HealthState {
    pub fn new() -> Self {
        Self(AtomicU8::new(Health::NotLoaded.as_u8()))
    }

    pub fn get(&self) -> Health {
        Health::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Leave `NotLoaded` once startup finished; no-op afterwards
    pub fn loaded(&self, outcome: Health) -> Health {
        self.transition(|current| match current {
            Health::NotLoaded => outcome,
            other => other,
        })
    }

    /// Record a failure; only `NotLoaded` and `Healthy` move to `Degraded`
    pub fn degrade(&self) -> Health {
        self.transition(|current| match current {
            Health::NotLoaded | Health::Healthy => Health::Degraded,
            other => other,
        })
    }

    /// Emergency switch: `ReadOnly` from any state
    pub fn force_read_only(&self) -> Health {
        self.0.swap(Health::ReadOnly.as_u8(), Ordering::AcqRel);
        Health::ReadOnly
    }

    fn transition(&self, next: impl Fn(Health) -> Health) -> Health {
        let updated = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
            Some(next(Health::from_u8(raw)).as_u8())
        });
        // The closure never returns None, so both arms carry the old value
        let previous = match updated {
            Ok(raw) | Err(raw) => raw,
        };
        next(Health::from_u8(previous))
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}
