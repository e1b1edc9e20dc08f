//! # tracekit - Instruction Trace Analysis
//!
//! tracekit consumes CPU instruction traces (one JSON object per executed
//! instruction) and runs one of two single-pass engines over them: a
//! footprint profiler that counts how often every PC executed, and a trace
//! morpher that replaces chosen instructions with synthesized ones.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Trace (JSON Lines, indexed)                   │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ InstructionEvent stream
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      trace_io / region                          │
//! │  • TraceReader: line decoding, seek to a sequence index         │
//! │  • Region: tracepoint or PC bounded window                      │
//! └───────────────┬─────────────────────────────────┬───────────────┘
//!                 │                                 │
//!                 ▼                                 ▼
//! ┌───────────────────────────────┐ ┌───────────────────────────────┐
//! │          footprint            │ │            morph              │
//! │  ┌─────────┐   ┌───────────┐  │ │  ┌────────┐   ┌────────────┐  │
//! │  │Profiler │──▶│  Tables   │  │ │  │ Rules  │──▶│ MorphSet   │  │
//! │  └─────────┘   └─────┬─────┘  │ │  └────────┘   └─────┬──────┘  │
//! │                      ▼        │ │                     ▼         │
//! │  ┌──────────────────────────┐ │ │  ┌──────────────────────────┐ │
//! │  │ Linear + ranked reports  │ │ │  │ TraceMorpher + RegState  │ │
//! │  └──────────────────────────┘ │ │  └────────────┬─────────────┘ │
//! └───────────────────────────────┘ └───────────────┼───────────────┘
//!                                                   ▼
//!                                         TraceWriter (JSON Lines)
//! ```
//!
//! ## Module Structure
//!
//! - [`footprint`]: per-PC execution counts, local stride/branch history,
//!   the linear report and the frequency-ranked block report
//! - [`morph`]: rule parsing, replacement synthesis and the rewriting pass
//! - [`decode`]: opcode classification, operands and disassembly text
//! - [`trace_io`]: JSON Lines reader/writer and the [`trace_io::TraceSink`] seam
//! - [`region`]: region-of-interest bounding of an event stream
//! - [`config`]: run configuration assembled by the CLI
//! - [`cli`]: command-line argument parsing
//! - [`preflight`]: input validation with actionable messages
//! - [`domain`]: identifiers and error types
//!
//! ## Typical Usage
//!
//! ```bash
//! # Footprint report with the ranked companion (run.s_imem)
//! tracekit imem run.jsonl -o run.imem -S -L
//!
//! # Replace instruction 1000 with a load at 0x2000 followed by a nop
//! tracekit morph run.jsonl -o out.jsonl -i 1000=0x00002083@0x2000:4,0x00000013
//! ```
//!
//! ## Key Concepts
//!
//! - **Warm-up / run-length**: absolute instruction counts splitting the
//!   trace into a warm-up window and a measured window
//! - **Block**: a run of consecutive PCs with identical counts
//! - **Morph**: the replacement sequence for one index or one PC

pub mod cli;
pub mod config;
pub mod decode;
pub mod domain;
pub mod footprint;
pub mod morph;
pub mod preflight;
pub mod region;
pub mod trace_io;
