//! # AtlasKV Index
//!
//! The key → location index of AtlasKV:
//! - Maps keys (up to 255 bytes) to `(data file, offset, length)`
//! - Append-only index files, replayed on startup
//! - Crash recovery with torn-tail handling
//! - Single-writer/multi-reader concurrency model
//! - User keys or generated sequence ids
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Index Root                            │
//! │         (health, sequence ids, mutation lock)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Journal   │          │ BranchTable │
//!   │  (Append)   │          │ (RwLock per │
//!   │ index_N.idx │          │   branch)   │
//!   └─────────────┘          └──────┬──────┘
//!                                   │
//!                                   ▼
//!                           ┌─────────────┐
//!                           │ EntryStore  │
//!                           │(reuse slot) │
//!                           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod branch;
pub mod dkey;
pub mod entry;
pub mod health;
pub mod index;
pub mod journal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{RunMode, Settings, SyncStrategy};
pub use entry::{EntryFlags, Location};
pub use error::{IndexError, Result};
pub use health::Health;
pub use index::Index;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of the AtlasKV index
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
