//! Greenlight end-to-end surface.
//!
//! Re-exports every workspace crate so downstream code can depend on one
//! crate, and carries the cross-crate scenario tests for the full
//! pipeline lifecycle under `tests/`.
//!
//! Run with: `cargo test -p greenlight-integration`

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub use greenlight_audit;
pub use greenlight_conductor;
pub use greenlight_contracts;
pub use greenlight_storage;
pub use greenlight_types;
pub use greenlight_verifier;

/// Shared test harness: wired-up control plane, stage walkthroughs,
/// payload builders.
pub mod helpers;
