//! Footprint profiler engine
//!
//! One forward pass over the event stream. Every admitted event costs one
//! table lookup plus a constant amount of history bookkeeping; nothing about
//! the trace itself is buffered.
//!
//! ```text
//! events ──► skip ──► filters ──► count() ──► FootprintTables
//!                        │            │
//!                   (thread, user,  Classifier
//!                    fault)         (load/store address, branch outcome)
//! ```
//!
//! The per-event classification is an injected [`Classifier`], so the same
//! update skeleton serves both the recorded-trace view and the
//! decoder-backed view that also sees never-taken branches.

use log::{debug, warn};
use tracekit_common::InstructionEvent;

use super::entry::{FootprintEntry, Sighting, Window};
use super::table::{FootprintTable, FootprintTables, Lookup};
use crate::config::ProfileConfig;
use crate::decode::Decoder;
use crate::domain::{Pc, TraceError};

// =============================================================================
// CLASSIFIERS
// =============================================================================

/// Per-event classification capability
pub trait Classifier {
    fn classify(&self, event: &InstructionEvent) -> Sighting;
}

impl<F> Classifier for F
where
    F: Fn(&InstructionEvent) -> Sighting,
{
    fn classify(&self, event: &InstructionEvent) -> Sighting {
        self(event)
    }
}

/// Address of the first access of the step, reads for loads, writes for stores
fn first_address(event: &InstructionEvent, is_load: bool, is_store: bool) -> Option<u64> {
    if is_load {
        event.memory_reads.first().map(|m| m.address)
    } else if is_store {
        event.memory_writes.first().map(|m| m.address)
    } else {
        None
    }
}

/// Classifies from what the trace recorded
///
/// Branches are only seen when taken, so a branch that never is taken looks
/// like any other instruction.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventClassifier;

impl Classifier for EventClassifier {
    fn classify(&self, event: &InstructionEvent) -> Sighting {
        Sighting {
            mem_address: first_address(event, event.is_load(), event.is_store()),
            branch: event.taken_branch.then_some(true),
        }
    }
}

/// Classifies from the opcode, so not-taken branches are captured too
#[derive(Debug, Clone, Copy)]
pub struct DecoderClassifier<D> {
    decoder: D,
}

impl<D: Decoder> DecoderClassifier<D> {
    pub fn new(decoder: D) -> Self {
        Self { decoder }
    }
}

impl<D: Decoder> Classifier for DecoderClassifier<D> {
    fn classify(&self, event: &InstructionEvent) -> Sighting {
        let opcode = event.opcode;
        Sighting {
            mem_address: first_address(
                event,
                self.decoder.is_load(opcode),
                self.decoder.is_store(opcode),
            ),
            branch: self.decoder.is_branch(opcode).then_some(event.taken_branch),
        }
    }
}

// =============================================================================
// RUN STATE
// =============================================================================

/// Whether the caller should keep feeding events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The keep-count cap was reached
    Stop,
}

/// Counters for one profiler run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProfileStats {
    /// Events passed to `count()`
    pub admitted: u64,
    /// Admitted events that landed in an entry (admitted minus mismatches)
    pub recorded: u64,
    pub mismatches: u64,
    /// Events flagged invalid by the trace (still counted)
    pub invalid: u64,
    /// Unparseable trace records that were skipped
    pub malformed: u64,
    /// Events dropped by the skip count and filters
    pub filtered: u64,
    pub tables: usize,
}

/// Largest per-entry counters seen, for report column widths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Maxima {
    pub count: u64,
    pub warmup: u64,
    pub runlength: u64,
}

impl Maxima {
    fn observe(&mut self, entry: &FootprintEntry) {
        self.count = self.count.max(entry.count());
        self.warmup = self.warmup.max(entry.warmup());
        self.runlength = self.runlength.max(entry.runlength());
    }
}

/// Finished profile, ready for reporting
#[derive(Debug, Clone)]
pub struct Footprint {
    /// Newest table first
    pub tables: Vec<FootprintTable>,
    pub stats: ProfileStats,
    pub maxima: Maxima,
}

impl Footprint {
    /// Sum of every entry's execution count
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.tables.iter().map(FootprintTable::total_count).sum()
    }
}

// =============================================================================
// PROFILER
// =============================================================================

pub struct FootprintProfiler<C> {
    config: ProfileConfig,
    classifier: C,
    tables: FootprintTables,
    stats: ProfileStats,
    maxima: Maxima,
}

impl<C: Classifier> FootprintProfiler<C> {
    pub fn new(config: ProfileConfig, classifier: C) -> Self {
        let tables = FootprintTables::new(config.lookup);
        Self { config, classifier, tables, stats: ProfileStats::default(), maxima: Maxima::default() }
    }

    fn window(&self) -> Window {
        let seen = self.stats.admitted;
        if seen < self.config.warmup_count {
            Window::Warmup
        } else if seen < self.config.runlength_count {
            Window::Measured
        } else {
            Window::Beyond
        }
    }

    /// Account one admitted event
    pub fn count(&mut self, event: &InstructionEvent) -> Flow {
        let window = self.window();
        let sighting = self.classifier.classify(event);
        let pc = event.pc;

        match self.tables.resolve(pc, event.opcode) {
            Lookup::Vacant(table) => {
                let entry = FootprintEntry::new(
                    event.opcode,
                    event.phys_pc.unwrap_or(0),
                    event.size,
                    sighting,
                    window,
                );
                self.maxima.observe(&entry);
                self.tables.insert(table, pc, entry);
                self.stats.recorded += 1;
            }
            Lookup::Hit(table) => {
                if let Some(entry) = self.tables.entry_mut(table, pc) {
                    entry.record(sighting, window);
                    self.maxima.observe(entry);
                    self.stats.recorded += 1;
                }
            }
            Lookup::Mismatch { stored } => {
                warn!("{} two opcodes {stored:08x} {:08x}", Pc(pc), event.opcode);
                self.stats.mismatches += 1;
            }
        }

        self.stats.admitted += 1;
        if self.stats.admitted >= self.config.keep_count {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    /// True if the thread/mode filters drop this event
    fn filtered_out(&self, event: &InstructionEvent) -> bool {
        let config = &self.config;
        (config.hw_tid != 0 && config.hw_tid != event.threads.hw_tid)
            || (config.pid != 0 && config.pid != event.threads.pid)
            || (config.tid != 0 && config.tid != event.threads.tid)
            || (config.user_only && !event.user_mode)
    }

    /// Consume a (region-bounded) event stream
    ///
    /// Malformed records are logged and skipped; any other read error ends
    /// the run.
    ///
    /// # Errors
    /// Returns the first I/O error from the source.
    pub fn run<I>(&mut self, events: I) -> Result<(), TraceError>
    where
        I: IntoIterator<Item = Result<InstructionEvent, TraceError>>,
    {
        let mut to_skip = self.config.skip_count;

        for event in events {
            let event = match event {
                Ok(event) => event,
                Err(TraceError::MalformedRecord { line, source }) => {
                    warn!("skipping malformed trace record on line {line}: {source}");
                    self.stats.malformed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if to_skip > 0 {
                to_skip -= 1;
                self.stats.filtered += 1;
                continue;
            }

            if !event.valid {
                warn!("{} invalid instruction {:08x} PC {}", event.index, event.opcode, Pc(event.pc));
                self.stats.invalid += 1;
            }

            // Faulting instructions are replayed and would count twice
            if self.filtered_out(&event) || event.fault {
                self.stats.filtered += 1;
                continue;
            }

            if self.count(&event) == Flow::Stop {
                debug!("keep count {} reached at index {}", self.config.keep_count, event.index);
                break;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> &ProfileStats {
        &self.stats
    }

    #[must_use]
    pub fn finish(self) -> Footprint {
        let tables = self.tables.into_tables();
        let stats = ProfileStats { tables: tables.len(), ..self.stats };
        Footprint { tables, stats, maxima: self.maxima }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::RiscvDecoder;
    use crate::footprint::LookupMode;
    use tracekit_common::MemoryAccess;

    const ADDI: u32 = 0x0000_0013;
    const ADD: u32 = 0x0000_0033;
    const LW: u32 = 0x0000_a503;
    const BEQ: u32 = 0x0000_0063;

    fn event(index: u64, pc: u64, opcode: u32) -> InstructionEvent {
        InstructionEvent::new(index, pc, opcode)
    }

    fn profile(config: ProfileConfig, events: Vec<InstructionEvent>) -> Footprint {
        let mut profiler = FootprintProfiler::new(config, EventClassifier);
        profiler.run(events.into_iter().map(Ok)).unwrap();
        profiler.finish()
    }

    #[test]
    fn test_total_counts_equal_admitted() {
        let events: Vec<_> =
            (0..20).map(|i| event(i, 0x100 + (i % 5) * 4, ADDI)).collect();
        let footprint = profile(ProfileConfig::default(), events);

        assert_eq!(footprint.stats.admitted, 20);
        assert_eq!(footprint.total_count(), 20);
        assert_eq!(footprint.maxima.count, 4);
    }

    #[test]
    fn test_mismatch_leaves_entry_untouched() {
        let events = vec![event(1, 0x100, ADDI), event(2, 0x100, ADD), event(3, 0x100, ADD)];
        let footprint = profile(ProfileConfig::default(), events);

        let entry = footprint.tables[0].get(0x100).unwrap();
        assert_eq!(entry.opcode(), ADDI);
        assert_eq!(entry.count(), 1);
        assert_eq!(footprint.stats.mismatches, 2, "one warning per mismatching event");
        assert_eq!(footprint.stats.admitted, 3);
        assert_eq!(footprint.stats.recorded, 1);
    }

    #[test]
    fn test_warmup_and_runlength_are_exclusive() {
        let config = ProfileConfig { warmup_count: 3, runlength_count: 7, ..Default::default() };
        let events: Vec<_> = (0..10).map(|i| event(i, 0x100, ADDI)).collect();
        let footprint = profile(config, events);

        let entry = footprint.tables[0].get(0x100).unwrap();
        assert_eq!(entry.count(), 10);
        assert_eq!(entry.warmup(), 3);
        assert_eq!(entry.runlength(), 4);
        assert!(entry.warmup() + entry.runlength() <= entry.count());
    }

    #[test]
    fn test_keep_count_stops_run() {
        let config = ProfileConfig { keep_count: 4, ..Default::default() };
        let events: Vec<_> = (0..10).map(|i| event(i, 0x100 + i * 4, ADDI)).collect();
        let footprint = profile(config, events);

        assert_eq!(footprint.stats.admitted, 4);
        assert_eq!(footprint.tables[0].len(), 4);
    }

    #[test]
    fn test_filters_skip_and_faults() {
        let mut faulting = event(3, 0x108, ADDI);
        faulting.fault = true;
        let mut kernel = event(4, 0x10c, ADDI);
        kernel.user_mode = false;
        let mut other_thread = event(5, 0x110, ADDI);
        other_thread.threads.tid = 9;

        let config = ProfileConfig { skip_count: 1, user_only: true, tid: 7, ..Default::default() };
        let mut events = vec![event(1, 0x100, ADDI), event(2, 0x104, ADDI), faulting, kernel, other_thread];
        for e in &mut events {
            if e.threads.tid == 0 {
                e.threads.tid = 7;
            }
        }
        let footprint = profile(config, events);

        assert_eq!(footprint.stats.admitted, 1);
        assert!(footprint.tables[0].get(0x104).is_some());
        assert_eq!(footprint.stats.filtered, 4);
    }

    #[test]
    fn test_invalid_events_are_still_counted() {
        let mut bad = event(1, 0x100, ADDI);
        bad.valid = false;
        let footprint = profile(ProfileConfig::default(), vec![bad]);
        assert_eq!(footprint.stats.invalid, 1);
        assert_eq!(footprint.total_count(), 1);
    }

    #[test]
    fn test_load_strides_recorded() {
        let events: Vec<_> = [0x2000, 0x2010, 0x2020]
            .iter()
            .enumerate()
            .map(|(i, &address)| {
                let mut e = event(i as u64, 0x100, LW);
                e.memory_reads.push(MemoryAccess::new(address, 4));
                e
            })
            .collect();
        let footprint = profile(ProfileConfig::default(), events);

        let entry = footprint.tables[0].get(0x100).unwrap();
        assert_eq!(entry.history_tokens().unwrap(), "LStrides={16,16}");
    }

    #[test]
    fn test_decoder_classifier_sees_not_taken_branches() {
        let mut profiler =
            FootprintProfiler::new(ProfileConfig::default(), DecoderClassifier::new(RiscvDecoder::new(true, false)));
        let mut taken = event(2, 0x100, BEQ);
        taken.taken_branch = true;
        profiler.count(&event(1, 0x100, BEQ));
        profiler.count(&taken);
        let footprint = profiler.finish();

        assert_eq!(footprint.tables[0].get(0x100).unwrap().history_tokens().unwrap(), "LHR={01}");
    }

    #[test]
    fn test_closure_classifier() {
        let classifier = |_: &InstructionEvent| Sighting { mem_address: None, branch: Some(true) };
        let mut profiler = FootprintProfiler::new(ProfileConfig::default(), classifier);
        profiler.count(&event(1, 0x100, ADDI));
        assert!(profiler.finish().tables[0].get(0x100).unwrap().is_branch());
    }

    #[test]
    fn test_multi_table_counts_both_opcodes() {
        let config = ProfileConfig { lookup: LookupMode::MultiTable, ..Default::default() };
        let events = vec![event(1, 0x100, ADDI), event(2, 0x100, ADD), event(3, 0x100, ADDI)];
        let footprint = profile(config, events);

        assert_eq!(footprint.stats.tables, 2);
        assert_eq!(footprint.stats.mismatches, 0);
        assert_eq!(footprint.total_count(), 3);
    }
}
