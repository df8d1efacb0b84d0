// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]

//! Vigil - room presence tracking and disconnect reconciliation.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Configuration parsing and validation
//! - `core::runtime` - Service wiring and runtime orchestration
//! - `core::time` - Deterministic time utilities
//!
//! ## Presence
//! - `presence::record` - Presence records and invariants
//! - `presence::store` - Presence store trait and in-memory backend
//! - `presence::registry` - Live connection attribution
//! - `presence::reconciler` - Disconnect signal reconciliation
//! - `presence::sweeper` - Inactivity sweep batches
//!
//! ## Notifications
//! - `notify::events` - Typed state-change events
//! - `notify::store` - Notification store trait and in-memory backend
//! - `notify::broadcaster` - Broadcast payload assembly and fan-out
//! - `notify::transport` - Real-time transport seam
//!
//! ## Operations
//! - `ops::telemetry` - Logging and the control endpoint
//! - `ops::observability` - Presence counters
//! - `ops::faults` - Fault injection for store failure testing
//!
//! ## CLI
//! - `cli` - clap argument definitions and commands

// Core infrastructure
pub mod core;

// Presence subsystem
pub mod presence;

// Notification fan-out
pub mod notify;

// Operations
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, runtime, time};
pub use notify::{broadcaster, events, transport};
pub use ops::{faults, observability, telemetry};
pub use presence::{reconciler, record, registry, store, sweeper};
