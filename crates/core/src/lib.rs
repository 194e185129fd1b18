//! simsearch-core
//!
//! Core library for finding similar machine-code functions across binaries.
//!
//! A function is described as a control-flow graph (`model`), reduced to a
//! 128-bit similarity-preserving hash (`analysis`), and stored in or looked
//! up from a persistent permutation index (`db`). `services` ties these
//! together for frontends.
//!
//! Disassembly is out of scope: callers build `Flowgraph`s themselves or load
//! them from the JSON exchange format.

pub mod analysis;
pub mod db;
pub mod model;
pub mod services;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
