//! Footprint report rendering
//!
//! Two views of a finished [`Footprint`]:
//!
//! - **Linear report**: every table (newest first), entries in ascending PC
//!   order, with a `...` line wherever the code is not contiguous
//! - **Ranked report**: contiguous runs of entries ([`SortedBlock`]s) ordered
//!   by their aggregate execution count
//!
//! ```text
//! ============ MAP 1 IEM:RV64 ============
//!        4  0000000000010078  00000013 op-imm
//!        4  000000000001007c  00a50533 op x10,x10<-
//! ...
//!        1  0000000000010200  00008067 ret
//! ```
//!
//! Column widths come from a [`ReportLayout`] built once per report run from
//! the largest counters observed.
//!
//! # Performance
//!
//! - Linear report: O(entries)
//! - Ranked report: O(entries + blocks log blocks)

// Percentage calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use std::io::Write;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::entry::FootprintEntry;
use super::profiler::{Footprint, Maxima};
use super::table::FootprintTable;
use crate::config::ReportConfig;
use crate::decode::Decoder;
use crate::domain::ProfileError;
use crate::trace_io::{is_stdio, open_output, STDIO_PATH};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Minimum width of a count column
const MIN_FIELD_WIDTH: usize = 8;

/// Width of a rendered PC
const PC_WIDTH: usize = 16;

/// Width of a rendered `pc:physpc` pair
const PHYS_PC_WIDTH: usize = PC_WIDTH * 2 + 1;

/// Linear report suffix replaced by the ranked report suffix
const LINEAR_SUFFIX: &str = ".imem";
const SORTED_SUFFIX: &str = ".s_imem";

// =============================================================================
// FORMATTING HELPERS
// =============================================================================

/// Column widths for one report run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLayout {
    pub count_width: usize,
    pub warmup_width: usize,
    pub runlength_width: usize,
}

impl ReportLayout {
    #[must_use]
    pub fn from_maxima(maxima: &Maxima) -> Self {
        let width = |value: u64| value.to_string().len().max(MIN_FIELD_WIDTH);
        Self {
            count_width: width(maxima.count),
            warmup_width: width(maxima.warmup),
            runlength_width: width(maxima.runlength),
        }
    }

    /// Count width once thousands separators are added
    #[must_use]
    pub fn comma_count_width(&self) -> usize {
        self.count_width + (self.count_width - 1) / 3
    }
}

/// `1234567` -> `1,234,567`
#[must_use]
pub fn with_commas(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn percent(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 * 100.0 / denominator as f64
    }
}

/// Column header cell: name centered in dashes, followed by `||`
fn header_field(line: &mut String, name: &str, width: usize, last: bool) {
    let diff = width.saturating_sub(name.len());
    let pad = diff / 2;
    line.push_str(&"-".repeat(pad + diff % 2));
    line.push_str(name);
    line.push_str(&"-".repeat(pad));
    if !last {
        line.push_str("||");
    }
}

fn format_pc(pc: u64, entry: &FootprintEntry, config: &ReportConfig) -> String {
    if config.show_physpc {
        format!("{pc:016x}:{:016x}", entry.phys_pc())
    } else {
        format!("{pc:016x}")
    }
}

/// Ranked report path derived from the linear report path
///
/// `trace.imem` becomes `trace.s_imem`, anything else gets `.s_imem`
/// appended, and stdout stays stdout.
#[must_use]
pub fn sorted_path(output: &Path) -> PathBuf {
    if is_stdio(output) {
        return PathBuf::from(STDIO_PATH);
    }
    let text = output.to_string_lossy();
    match text.strip_suffix(LINEAR_SUFFIX) {
        Some(stem) => PathBuf::from(format!("{stem}{SORTED_SUFFIX}")),
        None => PathBuf::from(format!("{text}{SORTED_SUFFIX}")),
    }
}

// =============================================================================
// BLOCKS
// =============================================================================

/// A run of entries whose PCs follow each other without gaps
#[derive(Debug, Clone)]
pub struct SortedBlock<'a> {
    pub start_pc: u64,
    /// Sum of the entries' execution counts
    pub count: u64,
    pub entries: Vec<(u64, &'a FootprintEntry)>,
}

/// Split each table into contiguous blocks, in report order
///
/// Blocks never span two tables.
#[must_use]
pub fn build_blocks(tables: &[FootprintTable]) -> Vec<SortedBlock<'_>> {
    let mut blocks = Vec::new();
    for table in tables {
        let mut current: Option<SortedBlock<'_>> = None;
        let mut expected_pc = 0;

        for (pc, entry) in table.iter() {
            if let Some(block) = current.as_mut().filter(|_| pc == expected_pc) {
                block.count += entry.count();
                block.entries.push((pc, entry));
            } else {
                blocks.extend(current.take());
                current =
                    Some(SortedBlock { start_pc: pc, count: entry.count(), entries: vec![(pc, entry)] });
            }
            expected_pc = pc.wrapping_add(entry.size().bytes());
        }
        blocks.extend(current);
    }
    blocks
}

/// Order blocks by descending count, ties by ascending start PC
pub fn rank_blocks(blocks: &mut [SortedBlock<'_>]) {
    blocks.sort_by(|a, b| b.count.cmp(&a.count).then(a.start_pc.cmp(&b.start_pc)));
}

// =============================================================================
// LINEAR REPORT
// =============================================================================

fn write_config_header<W: Write>(
    out: &mut W,
    config: &ReportConfig,
    layout: &ReportLayout,
) -> std::io::Result<()> {
    writeln!(out, "============ CONFIG  ============")?;
    writeln!(out, "original trace: {}", config.trace_name)?;
    writeln!(out, "warmup: {}", config.warmup_count)?;
    writeln!(out, "runlength: {}", config.runlength_count)?;
    writeln!(out, "skip non-user: {}", config.user_only)?;

    let mut line = String::new();
    if config.show_percentage {
        header_field(&mut line, "total%", MIN_FIELD_WIDTH, false);
        header_field(&mut line, "warm%", MIN_FIELD_WIDTH, false);
        header_field(&mut line, "run%", MIN_FIELD_WIDTH, false);
    }
    header_field(&mut line, "total", layout.count_width, false);
    header_field(&mut line, "warm", layout.warmup_width, false);
    header_field(&mut line, "runl", layout.runlength_width, false);
    let pc_width = if config.show_physpc { PHYS_PC_WIDTH } else { PC_WIDTH };
    header_field(&mut line, "instpc", pc_width, false);
    header_field(&mut line, "opcode", MIN_FIELD_WIDTH, false);
    header_field(&mut line, "disasm", MIN_FIELD_WIDTH, true);
    writeln!(out, "{line}")
}

fn write_linear_entry<W: Write>(
    out: &mut W,
    pc: u64,
    entry: &FootprintEntry,
    total: u64,
    config: &ReportConfig,
    layout: &ReportLayout,
    decoder: &dyn Decoder,
) -> std::io::Result<()> {
    if config.show_percentage {
        write!(out, "{:>7.3}% ", percent(entry.count(), total))?;
        if config.track {
            write!(out, "{:>7.3}% ", percent(entry.warmup(), config.warmup_count))?;
            write!(out, "{:>7.3}% ", percent(entry.runlength(), config.runlength_count))?;
        }
    }
    write!(out, "{:>width$}", entry.count(), width = layout.count_width)?;
    if config.track {
        write!(out, "  {:>width$}", entry.warmup(), width = layout.warmup_width)?;
        write!(out, "  {:>width$}", entry.runlength(), width = layout.runlength_width)?;
    }
    writeln!(
        out,
        "  {}  {} {}",
        format_pc(pc, entry, config),
        decoder.format_opcode(entry.opcode()),
        decoder.disassemble(pc, entry.opcode())
    )
}

/// Write the address-ordered report
///
/// With `entries` false only the headers are written (used when the ranked
/// report shares stdout with it).
///
/// # Errors
/// Returns an error if writing fails.
pub fn write_linear_report<W: Write>(
    out: &mut W,
    footprint: &Footprint,
    config: &ReportConfig,
    decoder: &dyn Decoder,
    entries: bool,
) -> std::io::Result<()> {
    let layout = ReportLayout::from_maxima(&footprint.maxima);
    let total = footprint.stats.admitted;
    let iem = if config.rv64 { "RV64" } else { "RV32" };

    if config.track {
        write_config_header(out, config, &layout)?;
    }

    for (map_num, table) in footprint.tables.iter().enumerate() {
        writeln!(out)?;
        writeln!(out, "============ MAP {} IEM:{iem} ============", map_num + 1)?;
        if !entries {
            continue;
        }

        let mut expected_pc = None;
        for (pc, entry) in table.iter() {
            if expected_pc.is_some_and(|expected| expected != pc) {
                writeln!(out, "...")?;
            }
            write_linear_entry(out, pc, entry, total, config, &layout, decoder)?;
            expected_pc = Some(pc.wrapping_add(entry.size().bytes()));
        }
    }
    Ok(())
}

// =============================================================================
// RANKED REPORT
// =============================================================================

/// Write the frequency-ranked report from already-ranked blocks
///
/// Tracks the cumulative count across blocks and fails if it does not add
/// up to `expected`, which means a block went missing.
///
/// # Errors
/// Returns [`ProfileError::CumulativeMismatch`] on a lost block, or an I/O
/// error if writing fails.
pub fn write_sorted_report<W: Write>(
    out: &mut W,
    blocks: &[SortedBlock<'_>],
    footprint: &Footprint,
    config: &ReportConfig,
    decoder: &dyn Decoder,
    expected: u64,
) -> Result<(), ProfileError> {
    let layout = ReportLayout::from_maxima(&footprint.maxima);
    let total = footprint.stats.admitted;
    let count_width = layout.comma_count_width();

    writeln!(out, "Total inst count = {}", with_commas(total))?;
    writeln!(out, "Max count        = {}", with_commas(footprint.maxima.count))?;

    let mut cumulative = 0u64;
    for block in blocks {
        writeln!(
            out,
            "-------------------------{:>6.1}% - {} inst, {} addr",
            percent(block.count, total),
            with_commas(block.count),
            block.entries.len()
        )?;

        for &(pc, entry) in &block.entries {
            cumulative += entry.count();
            write!(
                out,
                "{:>count_width$}  {:>5.1}% {:>5.1}% {}  {}  {}",
                with_commas(entry.count()),
                percent(entry.count(), total),
                percent(cumulative, total),
                format_pc(pc, entry, config),
                decoder.format_opcode(entry.opcode()),
                decoder.disassemble(pc, entry.opcode())
            )?;
            if config.local_history {
                if let Some(tokens) = entry.history_tokens() {
                    write!(out, "    {tokens}")?;
                }
            }
            writeln!(out)?;
        }
    }

    if cumulative != expected {
        return Err(ProfileError::CumulativeMismatch { cumulative, recorded: expected });
    }
    Ok(())
}

// =============================================================================
// ENTRY POINT
// =============================================================================

/// Where the reports went
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub linear: PathBuf,
    pub sorted: Option<PathBuf>,
    pub blocks: usize,
}

/// Write the linear report and, if enabled, the ranked report
///
/// # Errors
/// Returns an error if an output cannot be written or the ranked report
/// loses count of a block.
pub fn write_reports(
    footprint: &Footprint,
    config: &ReportConfig,
    decoder: &dyn Decoder,
) -> Result<ReportSummary, ProfileError> {
    let to_stdout = is_stdio(&config.output);
    let mut out = open_output(&config.output)?;
    write_linear_report(&mut out, footprint, config, decoder, !(to_stdout && config.sort_output))?;
    out.flush()?;
    info!("wrote linear report to {}", config.output.display());

    let mut summary = ReportSummary { linear: config.output.clone(), sorted: None, blocks: 0 };
    if !config.sort_output {
        return Ok(summary);
    }

    let mut blocks = build_blocks(&footprint.tables);
    if blocks.is_empty() {
        warn!("generated footprint was empty, skipping the sorted report");
        return Ok(summary);
    }
    rank_blocks(&mut blocks);

    let path = sorted_path(&config.output);
    let mut sorted_out = open_output(&path)?;
    if is_stdio(&path) {
        writeln!(sorted_out, "-----------------------------------------")?;
    }
    write_sorted_report(&mut sorted_out, &blocks, footprint, config, decoder, footprint.stats.recorded)?;
    sorted_out.flush()?;
    info!("wrote {} ranked blocks to {}", blocks.len(), path.display());

    summary.sorted = Some(path);
    summary.blocks = blocks.len();
    Ok(summary)
}
