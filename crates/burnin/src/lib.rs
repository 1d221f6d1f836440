#![forbid(unsafe_code)]
//! burnin public API facade.
//!
//! Re-exports the conformance core through a stable external
//! interface. This is the crate downstream consumers (CLI, scripting
//! harnesses) depend on.

pub use burnin_conform::*;
