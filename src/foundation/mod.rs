//! Shared primitive types and the crate error type.

/// Frame/time/canvas primitives.
pub mod core;
/// Crate error enum and result alias.
pub mod error;
