//! Pre-flight checks for tracekit
//!
//! Validates inputs before a run starts reading the trace.
//! Provides clear, actionable error messages when something is off.

use anyhow::{bail, Result};
use std::path::Path;

use crate::trace_io::is_stdio;

/// Checks shared by every subcommand
pub fn run_preflight_checks(trace: &Path, output: &Path) -> Result<()> {
    check_trace_exists(trace)?;
    check_output_dir(output)?;
    Ok(())
}

/// Check that the trace exists and is a regular file
pub fn check_trace_exists(trace: &Path) -> Result<()> {
    if !trace.exists() {
        bail!(
            "Trace not found: {}\n\n\
             Make sure the path is correct and the trace exists.",
            trace.display()
        );
    }
    if !trace.is_file() {
        bail!(
            "Not a file: {}\n\n\
             The trace argument must point to a trace file, not a directory.",
            trace.display()
        );
    }
    Ok(())
}

/// Check that the directory an output file goes into exists
pub fn check_output_dir(output: &Path) -> Result<()> {
    if is_stdio(output) {
        return Ok(());
    }
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => bail!(
            "Output directory not found: {}\n\n\
             Create it first or choose another --output path.",
            dir.display()
        ),
        _ => Ok(()),
    }
}

/// Check that a morph range is not inverted
pub fn check_morph_range(start: u64, end: Option<u64>) -> Result<()> {
    if let Some(end) = end {
        if end < start {
            bail!(
                "Invalid range: end instruction ({end}) must be greater than or equal to \
                 start instruction ({start})"
            );
        }
    }
    Ok(())
}
