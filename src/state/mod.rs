//! State module for tracking per-job fetch progress
//!
//! # Components
//!
//! - `FetchState`: States of the per-job content state machine
//! - `FailureKind`: Classification of transport failures
//! - `FetchAttemptContext`: Per-job failure, redirect and miss counters

mod attempt;
mod fetch_state;

// Re-export main types
pub use attempt::{Escalation, FetchAttemptContext};
pub use fetch_state::{FailureKind, FetchState};
