//! # tracekit - Main Entry Point
//!
//! Two subcommands:
//! - **imem** (`tracekit imem TRACE -o out.imem`): instruction footprint reports
//! - **morph** (`tracekit morph TRACE -o out.jsonl -i RULE`): rewrite instructions
//!
//! Run summaries go to stderr so a report written to stdout stays clean.

use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use tracekit::cli::{Cli, Command, ImemArgs, MorphArgs};
use tracekit::config::{MorphOptions, ProfileConfig};
use tracekit::decode::RiscvDecoder;
use tracekit::domain::{MorphError, MorphSpecError, TraceError};
use tracekit::footprint::{
    write_reports, Classifier, DecoderClassifier, EventClassifier, Footprint, FootprintProfiler,
    FootprintTable,
};
use tracekit::morph::{MorphSet, MorphStats, TraceMorpher};
use tracekit::preflight::{check_morph_range, check_output_dir, check_trace_exists, run_preflight_checks};
use tracekit::region::Region;
use tracekit::trace_io::{is_stdio, TraceReader, TraceWriter};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let bad_input = err.chain().any(|cause| {
        cause.is::<MorphSpecError>()
            || matches!(
                cause.downcast_ref::<MorphError>(),
                Some(MorphError::Spec(_) | MorphError::DuplicateMorph(_) | MorphError::InvalidRange { .. })
            )
    });
    let msg = err.to_string().to_lowercase();
    if bad_input || msg.contains("missing required argument") || msg.contains("invalid range") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Command::Imem(args) => run_imem(args, &cli),
        Command::Morph(args) => run_morph(args, &cli),
    }
}

fn profile<C, I>(config: ProfileConfig, classifier: C, events: I) -> Result<Footprint>
where
    C: Classifier,
    I: IntoIterator<Item = Result<tracekit_common::InstructionEvent, TraceError>>,
{
    let mut profiler = FootprintProfiler::new(config, classifier);
    profiler.run(events).context("Failed to read trace")?;
    Ok(profiler.finish())
}

fn run_imem(args: &ImemArgs, cli: &Cli) -> Result<()> {
    run_preflight_checks(&args.trace, &args.output)?;

    let reader = TraceReader::open(&args.trace)
        .with_context(|| format!("Failed to open trace: {}", args.trace.display()))?;
    let region = Region::new(reader, args.region_bound());
    let decoder = RiscvDecoder::new(!args.rv32, args.aliases);
    info!("profiling {} ({:?})", args.trace.display(), args.region_bound());

    let footprint = if args.decoder_branches {
        profile(args.profile_config(), DecoderClassifier::new(decoder), region)?
    } else {
        profile(args.profile_config(), EventClassifier, region)?
    };

    let summary = write_reports(&footprint, &args.report_config(), &decoder)
        .context("Failed to write footprint report")?;

    if cli.json {
        eprintln!("{}", serde_json::to_string(&footprint.stats)?);
    } else if !cli.quiet {
        let stats = &footprint.stats;
        eprintln!(
            "{} instructions, {} distinct PCs in {} table(s) ({} opcode mismatches, {} invalid, {} filtered)",
            stats.admitted,
            footprint.tables.iter().map(FootprintTable::len).sum::<usize>(),
            stats.tables,
            stats.mismatches,
            stats.invalid,
            stats.filtered,
        );
        eprintln!("report: {}", summary.linear.display());
        if let Some(sorted) = &summary.sorted {
            eprintln!("ranked report: {} ({} blocks)", sorted.display(), summary.blocks);
        }
    }
    Ok(())
}

fn run_morph(args: &MorphArgs, cli: &Cli) -> Result<()> {
    check_trace_exists(&args.trace)?;
    check_output_dir(&args.output)?;
    check_morph_range(args.start, args.end)?;

    let rules = args.rules()?;
    if rules.is_empty() {
        anyhow::bail!(
            "Missing required argument: at least one --index, --pc or --morph rule\n\n\
             Run 'tracekit morph --help' for the rule syntax"
        );
    }

    let decoder = RiscvDecoder::new(!args.rv32, false);
    let options = args.options();
    let morphs = MorphSet::from_rules(&rules, &decoder, &options.ls_defaults)?;

    let mut reader = TraceReader::open(&args.trace)
        .with_context(|| format!("Failed to open trace: {}", args.trace.display()))?;
    if options.start > 1 {
        reader.seek_to_index(options.start)?;
    }
    let skipped_malformed = reader.skipped_malformed();
    let writer = TraceWriter::create(&args.output)
        .with_context(|| format!("Failed to create output: {}", args.output.display()))?;

    let (mut stats, written) = match write_morphed(reader, writer, morphs, options) {
        Ok(done) => done,
        Err(e) => {
            discard_output(&args.output);
            return Err(e);
        }
    };
    stats.malformed += skipped_malformed;

    if cli.json {
        eprintln!("{}", serde_json::to_string(&stats)?);
    } else if !cli.quiet {
        eprintln!(
            "{} instructions read, {} morphed ({} replacements, {} overwritten), {} written to {}",
            stats.read,
            stats.morphed,
            stats.emitted,
            stats.suppressed,
            written,
            args.output.display()
        );
        if stats.skipped_morphs > 0 {
            eprintln!("{} morph(s) not applied, their target was overwritten", stats.skipped_morphs);
        }
    }
    Ok(())
}

/// Run the morpher to completion and flush the output
///
/// Returns the run statistics and the number of events written.
fn write_morphed<R, W>(
    reader: TraceReader<R>,
    writer: TraceWriter<W>,
    morphs: MorphSet,
    options: MorphOptions,
) -> Result<(MorphStats, u64)>
where
    R: BufRead,
    W: Write,
{
    let mut morpher = TraceMorpher::new(reader, writer, morphs, options)?;
    let stats = morpher.process()?;
    let writer = morpher.into_sink();
    let written = writer.written();
    writer.finish().context("Failed to flush output trace")?;
    Ok((stats, written))
}

/// Remove a partially written output trace so a failed run leaves nothing behind
fn discard_output(path: &Path) {
    if is_stdio(path) {
        return;
    }
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Failed to remove partial output {}: {e}", path.display());
    }
}
