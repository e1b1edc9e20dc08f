//! Command-line interface for tracekit
//!
//! This module contains CLI argument parsing and the mapping from flags to
//! engine configuration

pub mod args;

pub use args::{Cli, Command, ImemArgs, MorphArgs};
