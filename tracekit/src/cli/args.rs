//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{LsDefaults, MorphOptions, ProfileConfig, ReportConfig};
use crate::domain::{MorphKind, MorphSpecError};
use crate::footprint::LookupMode;
use crate::morph::MorphRule;
use crate::region::RegionBound;
use crate::trace_io::STDIO_PATH;

#[derive(Parser)]
#[command(
    name = "tracekit",
    version,
    about = "Profile and rewrite CPU instruction traces",
    after_help = "\
EXAMPLES:
    tracekit imem run.jsonl -o run.imem -S -L          Footprint with ranked report
    tracekit imem run.jsonl -w 1000000 -r 5000000 -t   Warm-up/run-length columns
    tracekit morph run.jsonl -o out.jsonl -i 1000=0x00000013@0x2000:4+0x4,0x00000013"
)]
pub struct Cli {
    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print the run statistics as JSON on stderr instead of the summary
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build an instruction footprint report
    Imem(ImemArgs),
    /// Replace instructions by sequence index or PC
    Morph(MorphArgs),
}

fn parse_hex_u64(text: &str) -> Result<u64, String> {
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value \"{text}\": {e}"))
}

fn parse_hex_u32(text: &str) -> Result<u32, String> {
    let value = parse_hex_u64(text)?;
    u32::try_from(value).map_err(|_| format!("opcode \"{text}\" does not fit in 32 bits"))
}

// =============================================================================
// IMEM
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ImemArgs {
    /// Trace to profile (JSON Lines)
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Report file (`-` for stdout); the ranked report replaces `.imem` with `.s_imem`
    #[arg(short, long, default_value = STDIO_PATH)]
    pub output: PathBuf,

    /// Instructions counted as warm-up
    #[arg(short, long, default_value = "0")]
    pub warmup: u64,

    /// Instruction count at which the measured window ends (0 = unlimited)
    #[arg(short, long, default_value = "0")]
    pub runlength: u64,

    /// Skip this many instructions before counting
    #[arg(short, long, default_value = "0")]
    pub skip: u64,

    /// Stop after this many instructions (0 = unlimited)
    #[arg(short, long, default_value = "0")]
    pub keep: u64,

    /// Only count this hardware thread (0 = all)
    #[arg(long, default_value = "0")]
    pub hwtid: u32,

    /// Only count this process (0 = all)
    #[arg(long, default_value = "0")]
    pub pid: u32,

    /// Only count this thread (0 = all)
    #[arg(long, default_value = "0")]
    pub tid: u32,

    /// Skip instructions not executed in user mode
    #[arg(short, long)]
    pub user_only: bool,

    /// Add warm-up/run-length columns and a CONFIG header
    #[arg(short, long)]
    pub track: bool,

    /// Show percentages
    #[arg(short = 'P', long)]
    pub percent: bool,

    /// Also write the frequency-ranked report
    #[arg(short = 'S', long)]
    pub sort: bool,

    /// Append local stride/branch history to ranked lines
    #[arg(short = 'L', long)]
    pub local_history: bool,

    /// Allow one PC to carry several opcodes (JIT-compiled code)
    #[arg(short, long)]
    pub java: bool,

    /// Show physical PCs
    #[arg(short = 'p', long)]
    pub physpc: bool,

    /// Use disassembly aliases
    #[arg(short = 'A', long)]
    pub aliases: bool,

    /// Classify branches by opcode so never-taken branches get a history
    #[arg(long)]
    pub decoder_branches: bool,

    /// Trace is RV32 rather than RV64
    #[arg(long)]
    pub rv32: bool,

    /// Only profile between the ROI tracepoints
    #[arg(long)]
    pub roi: bool,

    /// ROI start tracepoint opcode (hex)
    #[arg(long, value_parser = parse_hex_u32, requires = "roi")]
    pub roi_start_opcode: Option<u32>,

    /// ROI stop tracepoint opcode (hex)
    #[arg(long, value_parser = parse_hex_u32, requires = "roi")]
    pub roi_stop_opcode: Option<u32>,

    /// Start profiling at this PC (hex)
    #[arg(long, value_parser = parse_hex_u64, requires = "roi_stop_pc")]
    pub roi_start_pc: Option<u64>,

    /// Stop profiling at this PC (hex)
    #[arg(long, value_parser = parse_hex_u64, requires = "roi_start_pc")]
    pub roi_stop_pc: Option<u64>,
}

fn unlimited_if_zero(value: u64) -> u64 {
    if value == 0 {
        u64::MAX
    } else {
        value
    }
}

impl ImemArgs {
    #[must_use]
    pub fn profile_config(&self) -> ProfileConfig {
        ProfileConfig {
            warmup_count: self.warmup,
            runlength_count: unlimited_if_zero(self.runlength),
            skip_count: self.skip,
            keep_count: unlimited_if_zero(self.keep),
            hw_tid: self.hwtid,
            pid: self.pid,
            tid: self.tid,
            user_only: self.user_only,
            lookup: if self.java { LookupMode::MultiTable } else { LookupMode::Single },
        }
    }

    #[must_use]
    pub fn report_config(&self) -> ReportConfig {
        ReportConfig {
            trace_name: self.trace.display().to_string(),
            output: self.output.clone(),
            show_percentage: self.percent,
            track: self.track,
            sort_output: self.sort,
            local_history: self.local_history,
            show_physpc: self.physpc,
            rv64: !self.rv32,
            ..Default::default()
        }
        .with_profile(&self.profile_config())
    }

    #[must_use]
    pub fn region_bound(&self) -> RegionBound {
        match (self.roi_start_pc, self.roi_stop_pc) {
            (Some(start_pc), Some(stop_pc)) => RegionBound::Pc { start_pc, stop_pc },
            _ if self.roi => RegionBound::tracepoint(
                self.roi_start_opcode.unwrap_or(0),
                self.roi_stop_opcode.unwrap_or(0),
            ),
            _ => RegionBound::Full,
        }
    }
}

// =============================================================================
// MORPH
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct MorphArgs {
    /// Trace to rewrite (JSON Lines)
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Rewritten trace (`-` for stdout)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Morph by sequence index: index=op1[@addr:size[+stride]][,op2...]
    #[arg(short, long = "index", value_name = "RULE")]
    pub index_rules: Vec<String>,

    /// Morph every occurrence of a PC: pc=op1[@addr:size[+stride]][,op2...]
    #[arg(short = 'a', long = "pc", value_name = "RULE")]
    pub pc_rules: Vec<String>,

    /// Morph with an explicit identifier kind: KIND:RULE (KIND is index or pc)
    #[arg(long = "morph", value_name = "KIND:RULE")]
    pub tagged_rules: Vec<String>,

    /// Address used by load/store replacements without @addr:size (hex)
    #[arg(short = 'A', long, value_parser = parse_hex_u64)]
    pub address: Option<u64>,

    /// Access size used by load/store replacements without @addr:size
    #[arg(short = 'S', long)]
    pub size: Option<u16>,

    /// Added to --address after each use
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    pub stride: i64,

    /// Let index morphs take precedence over PC morphs on the same instruction
    #[arg(short = 'C', long)]
    pub allow_collisions: bool,

    /// First instruction index to process
    #[arg(short, long, default_value = "1")]
    pub start: u64,

    /// Last instruction index to process
    #[arg(short, long)]
    pub end: Option<u64>,

    /// Use the RV32 decoder for replacement opcodes
    #[arg(long)]
    pub rv32: bool,
}

impl MorphArgs {
    /// Parse every rule given on the command line
    ///
    /// # Errors
    /// Returns the first malformed rule.
    pub fn rules(&self) -> Result<Vec<MorphRule>, MorphSpecError> {
        let index = self.index_rules.iter().map(|rule| MorphRule::parse(MorphKind::Index, rule));
        let pc = self.pc_rules.iter().map(|rule| MorphRule::parse(MorphKind::Pc, rule));
        let tagged = self.tagged_rules.iter().map(|rule| MorphRule::parse_tagged(rule));
        index.chain(pc).chain(tagged).collect()
    }

    #[must_use]
    pub fn options(&self) -> MorphOptions {
        MorphOptions {
            allow_collisions: self.allow_collisions,
            start: self.start,
            end: self.end,
            ls_defaults: LsDefaults { address: self.address, size: self.size, stride: self.stride },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imem_flags_map_to_config() {
        let cli = Cli::try_parse_from([
            "tracekit", "imem", "run.jsonl", "-o", "run.imem", "-w", "10", "-k", "100", "-j", "-S",
        ])
        .unwrap();
        let Command::Imem(args) = cli.command else { panic!("expected imem") };

        let profile = args.profile_config();
        assert_eq!(profile.warmup_count, 10);
        assert_eq!(profile.keep_count, 100);
        assert_eq!(profile.runlength_count, u64::MAX);
        assert_eq!(profile.lookup, LookupMode::MultiTable);
        assert!(args.report_config().sort_output);
        assert_eq!(args.region_bound(), RegionBound::Full);
    }

    #[test]
    fn test_report_config_echoes_profile_budgets() {
        let cli = Cli::try_parse_from(["tracekit", "imem", "t.jsonl", "-w", "4", "-r", "0", "-u"]).unwrap();
        let Command::Imem(args) = cli.command else { panic!("expected imem") };
        let report = args.report_config();
        assert_eq!(args.profile_config().runlength_count, u64::MAX);
        assert_eq!((report.warmup_count, report.runlength_count, report.user_only), (4, 0, true));

        let cli = Cli::try_parse_from(["tracekit", "imem", "t.jsonl", "-r", "50"]).unwrap();
        let Command::Imem(args) = cli.command else { panic!("expected imem") };
        assert_eq!(args.report_config().runlength_count, 50);
    }

    #[test]
    fn test_roi_flags() {
        let cli = Cli::try_parse_from([
            "tracekit", "imem", "t.jsonl", "--roi-start-pc", "0x1000", "--roi-stop-pc", "2000",
        ])
        .unwrap();
        let Command::Imem(args) = cli.command else { panic!("expected imem") };
        assert_eq!(args.region_bound(), RegionBound::Pc { start_pc: 0x1000, stop_pc: 0x2000 });

        assert!(Cli::try_parse_from(["tracekit", "imem", "t.jsonl", "--roi-start-pc", "0x1000"]).is_err());
    }

    #[test]
    fn test_morph_rules_collected_from_all_flags() {
        let cli = Cli::try_parse_from([
            "tracekit", "morph", "in.jsonl", "-o", "out.jsonl", "-i", "5=0x13", "-a", "100=0x13",
            "--morph", "pc:200=0x13", "--stride", "-8", "-C",
        ])
        .unwrap();
        let Command::Morph(args) = cli.command else { panic!("expected morph") };

        let rules = args.rules().unwrap();
        let kinds: Vec<(MorphKind, u64)> = rules.iter().map(|r| (r.kind, r.id)).collect();
        assert_eq!(kinds, vec![(MorphKind::Index, 5), (MorphKind::Pc, 0x100), (MorphKind::Pc, 0x200)]);
        let options = args.options();
        assert!(options.allow_collisions);
        assert_eq!(options.ls_defaults.stride, -8);
        assert_eq!(options.start, 1);
    }
}
