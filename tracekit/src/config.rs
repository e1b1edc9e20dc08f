//! Run-level options consumed by the engines
//!
//! The CLI maps its flags onto these structs; the library never looks at
//! argv. Zero-valued thread filters mean "no filter", and the budgets use
//! `u64::MAX` for "unbounded".

use std::path::PathBuf;

use crate::footprint::LookupMode;

/// Options that decide which events are counted and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    /// Admitted events counted as warm-up
    pub warmup_count: u64,
    /// Admitted-event index below which an event counts as measured
    pub runlength_count: u64,
    /// Leading region events discarded before anything is counted
    pub skip_count: u64,
    /// Stop after this many admitted events
    pub keep_count: u64,
    pub hw_tid: u32,
    pub pid: u32,
    pub tid: u32,
    /// Drop events not executed in user mode
    pub user_only: bool,
    pub lookup: LookupMode,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            warmup_count: 0,
            runlength_count: u64::MAX,
            skip_count: 0,
            keep_count: u64::MAX,
            hw_tid: 0,
            pid: 0,
            tid: 0,
            user_only: false,
            lookup: LookupMode::Single,
        }
    }
}

/// Options for the two footprint reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    /// Trace name echoed in the CONFIG header
    pub trace_name: String,
    /// Linear report destination (`-` for stdout)
    pub output: PathBuf,
    pub show_percentage: bool,
    /// Warm-up/run-length columns and the CONFIG header
    pub track: bool,
    /// Also produce the frequency-ranked report
    pub sort_output: bool,
    /// Append local history tokens to ranked lines
    pub local_history: bool,
    pub show_physpc: bool,
    pub rv64: bool,
    /// Echo of [`ProfileConfig::warmup_count`], also the warm% denominator
    pub warmup_count: u64,
    /// Echo of [`ProfileConfig::runlength_count`], also the run% denominator.
    /// Unlike the profiler budget, 0 here means unbounded: the header prints
    /// it as given and the run% column stays at zero.
    pub runlength_count: u64,
    pub user_only: bool,
}

impl ReportConfig {
    /// Copy the budgets and filters echoed in the CONFIG header from `profile`
    #[must_use]
    pub fn with_profile(self, profile: &ProfileConfig) -> Self {
        let runlength_count = if profile.runlength_count == u64::MAX { 0 } else { profile.runlength_count };
        Self { warmup_count: profile.warmup_count, runlength_count, user_only: profile.user_only, ..self }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            trace_name: String::new(),
            output: PathBuf::from(crate::trace_io::STDIO_PATH),
            show_percentage: false,
            track: false,
            sort_output: false,
            local_history: false,
            show_physpc: false,
            rv64: true,
            warmup_count: 0,
            runlength_count: 0,
            user_only: false,
        }
    }
}

/// Load/store target used by replacement opcodes with no explicit `@addr:size`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LsDefaults {
    pub address: Option<u64>,
    pub size: Option<u16>,
    pub stride: i64,
}

/// Options for one morph run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MorphOptions {
    /// Index morph wins over a PC morph hitting the same event
    pub allow_collisions: bool,
    /// First sequence index processed
    pub start: u64,
    /// Last sequence index processed (inclusive)
    pub end: Option<u64>,
    pub ls_defaults: LsDefaults,
}
