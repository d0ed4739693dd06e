// ============================================
// File: crates/ssu-common/src/lib.rs
// ============================================
//! # SSU Common - Shared Utilities Library
//!
//! ## Creation Reason
//! Foundational types shared by every crate in the workspace.
//!
//! ## Main Functionality
//! - [`error`]: `CommonError` and the `Result` alias
//! - [`time`]: wire timestamps and atomic instants
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   ssu-node                          │
//! │                      │                              │
//! │         ┌────────────┴────────────┐                 │
//! │         ▼                         ▼                 │
//! │     ssu-core                ssu-transport           │
//! │         │                                           │
//! │         └────────────┐   (ssu-node also uses it)    │
//! │                      ▼                              │
//! │                 ssu-common  ◄── You are here        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;

pub use error::{CommonError, Result};
pub use time::{AtomicInstant, Timestamp};
