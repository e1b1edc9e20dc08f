//! Domain model for tracekit
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time safety via newtype pattern (a PC is never confused with a
//!   sequence index)
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{MorphKind, MorphTarget, Pc, SeqIndex};

pub use errors::{MorphError, MorphSpecError, ProfileError, TraceError};
