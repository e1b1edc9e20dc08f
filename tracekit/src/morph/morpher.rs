//! Trace morpher engine
//!
//! ```text
//! source ──► update pre-state ──► index/PC lookup ──┬─► pass through ──┐
//!                                                   └─► replacements ──┼─► sink
//!                                   update post-state ◄────────────────┘
//! ```
//!
//! A morph overwrites the instruction bytes starting at its target. When
//! its replacements are wider than the matched instruction, the original
//! events that follow are dropped until the extra bytes are covered.
//! Output events are renumbered so indices stay consecutive.

use std::collections::HashMap;

use log::{debug, warn};
use tracekit_common::InstructionEvent;

use super::opcode_morph::{OpcodeMorph, ReplacementOp};
use super::reg_state::RegisterState;
use super::rule::MorphRule;
use crate::config::{LsDefaults, MorphOptions};
use crate::decode::Decoder;
use crate::domain::{MorphError, MorphKind, Pc, TraceError};
use crate::trace_io::TraceSink;

// =============================================================================
// MORPH SET
// =============================================================================

/// Morphs keyed by sequence index and by PC
#[derive(Debug, Clone, Default)]
pub struct MorphSet {
    by_index: HashMap<u64, OpcodeMorph>,
    by_pc: HashMap<u64, OpcodeMorph>,
}

impl MorphSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `rule` and add it
    ///
    /// # Errors
    /// Returns [`MorphError::DuplicateMorph`] if its identifier already has a
    /// morph of the same kind.
    pub fn add(&mut self, rule: &MorphRule, decoder: &dyn Decoder, defaults: &LsDefaults) -> Result<(), MorphError> {
        let map = match rule.kind {
            MorphKind::Index => &mut self.by_index,
            MorphKind::Pc => &mut self.by_pc,
        };
        if map.contains_key(&rule.id) {
            return Err(MorphError::DuplicateMorph(rule.target()));
        }

        let mut morph = OpcodeMorph::default();
        for spec in &rule.replacements {
            morph.add_op(ReplacementOp::from_spec(spec, decoder, defaults));
        }
        map.insert(rule.id, morph);
        Ok(())
    }

    /// Build a set from parsed rules
    ///
    /// # Errors
    /// Returns the first duplicate identifier.
    pub fn from_rules<'a>(
        rules: impl IntoIterator<Item = &'a MorphRule>,
        decoder: &dyn Decoder,
        defaults: &LsDefaults,
    ) -> Result<Self, MorphError> {
        let mut set = Self::new();
        for rule in rules {
            set.add(rule, decoder, defaults)?;
        }
        Ok(set)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_index.len() + self.by_pc.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty() && self.by_pc.is_empty()
    }
}

// =============================================================================
// MORPHER
// =============================================================================

/// Counters for one morph run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MorphStats {
    /// Events taken from the source inside the processing range
    pub read: u64,
    pub passed_through: u64,
    /// Occurrences that had a morph applied
    pub morphed: u64,
    /// Replacement events written
    pub emitted: u64,
    /// Original events overwritten by wider replacements
    pub suppressed: u64,
    /// Encoded bytes of all applied morphs
    pub substituted_bytes: u64,
    /// Overwritten events that had a morph of their own, left unapplied
    pub skipped_morphs: u64,
    pub invalid: u64,
    pub malformed: u64,
}

pub struct TraceMorpher<I, S> {
    source: I,
    sink: S,
    morphs: MorphSet,
    options: MorphOptions,
    reg_state: RegisterState,
    stats: MorphStats,
}

impl<I, S> TraceMorpher<I, S>
where
    I: Iterator<Item = Result<InstructionEvent, TraceError>>,
    S: TraceSink,
{
    /// Set up a morph run over `source`, which should already be positioned
    /// at `options.start`
    ///
    /// # Errors
    /// Returns [`MorphError::InvalidRange`] if the end bound precedes the
    /// start bound.
    pub fn new(source: I, sink: S, morphs: MorphSet, options: MorphOptions) -> Result<Self, MorphError> {
        if let Some(end) = options.end {
            if end < options.start {
                return Err(MorphError::InvalidRange { start: options.start, end });
            }
        }
        if morphs.is_empty() {
            warn!("no morphs given, the trace will be copied unchanged");
        }
        Ok(Self {
            source,
            sink,
            morphs,
            options,
            reg_state: RegisterState::new(),
            stats: MorphStats::default(),
        })
    }

    /// Consume the source up to the end bound
    ///
    /// # Errors
    /// Returns [`MorphError::Collision`] when an event matches both an index
    /// and a PC morph and collisions are not allowed, or any source/sink
    /// error.
    pub fn process(&mut self) -> Result<MorphStats, MorphError> {
        let mut next_index: Option<u64> = None;
        let mut pending_bytes = 0u64;

        while let Some(event) = self.source.next() {
            let mut event = match event {
                Ok(event) => event,
                Err(TraceError::MalformedRecord { line, source }) => {
                    warn!("skipping malformed trace record on line {line}: {source}");
                    self.stats.malformed += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if event.index < self.options.start {
                continue;
            }
            if self.options.end.is_some_and(|end| event.index > end) {
                break;
            }
            self.stats.read += 1;
            if !event.valid {
                warn!("{} invalid instruction {:08x} PC {}", event.index, event.opcode, Pc(event.pc));
                self.stats.invalid += 1;
            }

            let out_index = next_index.get_or_insert(event.index);
            self.reg_state.update_pre(&event);

            if pending_bytes > 0 {
                debug!("instruction {} overwritten by preceding morph", event.index);
                if self.morphs.by_index.contains_key(&event.index) {
                    warn!(
                        "morph for instruction {} not applied, it was overwritten by a preceding morph",
                        event.index
                    );
                    self.stats.skipped_morphs += 1;
                } else if self.morphs.by_pc.contains_key(&event.pc) {
                    warn!(
                        "morph for PC {} not applied at instruction {}, it was overwritten by a preceding morph",
                        Pc(event.pc),
                        event.index
                    );
                    self.stats.skipped_morphs += 1;
                }
                pending_bytes = pending_bytes.saturating_sub(event.size.bytes());
                self.stats.suppressed += 1;
                self.reg_state.update_post(&event);
                continue;
            }

            let index_morph = self.morphs.by_index.get_mut(&event.index);
            let pc_morph = self.morphs.by_pc.get_mut(&event.pc);
            let morph = match (index_morph, pc_morph) {
                (Some(_), Some(_)) if !self.options.allow_collisions => {
                    return Err(MorphError::Collision { index: event.index, pc: event.pc });
                }
                (Some(morph), _) | (None, Some(morph)) => Some(morph),
                (None, None) => None,
            };

            match morph {
                Some(morph) => {
                    let written = morph.write(&mut self.sink, &self.reg_state, &event, *out_index)?;
                    *out_index += written;
                    pending_bytes = morph.total_size().saturating_sub(event.size.bytes());
                    self.stats.morphed += 1;
                    self.stats.emitted += written;
                    self.stats.substituted_bytes += morph.total_size();
                    self.reg_state.update_post(&event);
                }
                None => {
                    self.reg_state.update_post(&event);
                    event.index = *out_index;
                    self.sink.append(&event)?;
                    *out_index += 1;
                    self.stats.passed_through += 1;
                }
            }
        }

        if pending_bytes > 0 {
            warn!("trace ended {pending_bytes} bytes into the last morph");
        }
        Ok(self.stats)
    }

    #[must_use]
    pub fn stats(&self) -> &MorphStats {
        &self.stats
    }

    #[must_use]
    pub fn register_state(&self) -> &RegisterState {
        &self.reg_state
    }

    /// Hand back the sink, e.g. to flush it
    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::RiscvDecoder;
    use tracekit_common::{MemoryAccess, RegisterRecord, RegisterRole};

    const ADDI: u32 = 0x0000_0013;
    const ADD: u32 = 0x0000_0033;
    const NOP_C: u32 = 0x0000_0001;

    fn trace(len: u64, start_pc: u64) -> Vec<Result<InstructionEvent, TraceError>> {
        (0..len).map(|i| Ok(InstructionEvent::new(i + 1, start_pc + i * 4, ADD))).collect()
    }

    fn morph_set(rules: &[(MorphKind, &str)]) -> MorphSet {
        let rules: Vec<MorphRule> =
            rules.iter().map(|&(kind, text)| MorphRule::parse(kind, text).unwrap()).collect();
        MorphSet::from_rules(&rules, &RiscvDecoder::new(true, false), &LsDefaults::default()).unwrap()
    }

    fn run(
        input: Vec<Result<InstructionEvent, TraceError>>,
        morphs: MorphSet,
        options: MorphOptions,
    ) -> Result<(Vec<InstructionEvent>, MorphStats), MorphError> {
        let mut morpher = TraceMorpher::new(input.into_iter(), Vec::new(), morphs, options)?;
        let stats = morpher.process()?;
        Ok((morpher.into_sink(), stats))
    }

    #[test]
    fn test_unmorphed_trace_passes_through() {
        let (out, stats) = run(trace(3, 0x100), MorphSet::new(), MorphOptions::default()).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(stats.passed_through, 3);
        assert!(out.iter().all(|e| e.opcode == ADD));
    }

    #[test]
    fn test_index_morph_with_target() {
        let morphs = morph_set(&[(MorphKind::Index, "2=0x00000013@0x2000:4+0x4,0x00000013")]);
        let (out, stats) = run(trace(4, 0x100), morphs, MorphOptions::default()).unwrap();

        // 8 replacement bytes overwrite instructions 2 and 3
        let summary: Vec<(u64, u64, u32)> = out.iter().map(|e| (e.index, e.pc, e.opcode)).collect();
        assert_eq!(summary, vec![(1, 0x100, ADD), (2, 0x104, ADDI), (3, 0x108, ADDI), (4, 0x10c, ADD)]);
        assert_eq!(out[1].memory_reads, vec![MemoryAccess::new(0x2000, 4)]);
        assert!(out[2].memory_reads.is_empty());
        assert_eq!((stats.morphed, stats.emitted, stats.suppressed), (1, 2, 1));
        assert_eq!(stats.substituted_bytes, 8);
    }

    #[test]
    fn test_pc_morph_advances_address_per_hit() {
        let input: Vec<_> = (1..=3).map(|i| Ok(InstructionEvent::new(i, 0x100, ADD))).collect();
        let morphs = morph_set(&[(MorphKind::Pc, "100=0x00000013@0x2000:4+0x4")]);
        let (out, _) = run(input, morphs, MorphOptions::default()).unwrap();

        let addresses: Vec<u64> = out.iter().map(|e| e.memory_reads[0].address).collect();
        assert_eq!(addresses, vec![0x2000, 0x2004, 0x2008]);
    }

    #[test]
    fn test_collision_is_an_error_by_default() {
        let morphs = morph_set(&[(MorphKind::Index, "2=0x13"), (MorphKind::Pc, "104=0x0001")]);
        let result = run(trace(3, 0x100), morphs, MorphOptions::default());
        assert!(matches!(result, Err(MorphError::Collision { index: 2, pc: 0x104 })));
    }

    #[test]
    fn test_allowed_collision_prefers_index_morph() {
        let input: Vec<_> = (1..=3).map(|i| Ok(InstructionEvent::new(i, 0x100, ADD))).collect();
        let morphs = morph_set(&[
            (MorphKind::Index, "1=0x00000013"),
            (MorphKind::Pc, "100=0x00000013@0x3000:4+0x10"),
        ]);
        let options = MorphOptions { allow_collisions: true, ..Default::default() };
        let (out, _) = run(input, morphs, options).unwrap();

        assert!(out[0].memory_reads.is_empty(), "index morph wins");
        // PC morph queue was not advanced by the collided occurrence
        assert_eq!(out[1].memory_reads, vec![MemoryAccess::new(0x3000, 4)]);
        assert_eq!(out[2].memory_reads, vec![MemoryAccess::new(0x3010, 4)]);
    }

    #[test]
    fn test_compressed_replacement_renumbers_output() {
        let morphs = morph_set(&[(MorphKind::Index, "1=0x13,0x0001,0x0001")]);
        let (out, stats) = run(trace(3, 0x100), morphs, MorphOptions::default()).unwrap();

        // 8 bytes of replacements overwrite instructions 1 and 2
        let summary: Vec<(u64, u64, u32)> = out.iter().map(|e| (e.index, e.pc, e.opcode)).collect();
        assert_eq!(
            summary,
            vec![(1, 0x100, ADDI), (2, 0x104, NOP_C), (3, 0x106, NOP_C), (4, 0x108, ADD)]
        );
        assert_eq!(stats.suppressed, 1);
    }

    #[test]
    fn test_morph_on_overwritten_instruction_is_counted() {
        let morphs = morph_set(&[(MorphKind::Index, "2=0x13,0x13"), (MorphKind::Index, "3=0x00100093")]);
        let (out, stats) = run(trace(4, 0x100), morphs, MorphOptions::default()).unwrap();

        let opcodes: Vec<u32> = out.iter().map(|e| e.opcode).collect();
        assert_eq!(opcodes, vec![ADD, ADDI, ADDI, ADD]);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(stats.skipped_morphs, 1);
    }

    #[test]
    fn test_range_bounds() {
        let options = MorphOptions { start: 2, end: Some(3), ..Default::default() };
        let (out, stats) = run(trace(5, 0x100), MorphSet::new(), options).unwrap();
        assert_eq!(out.iter().map(|e| e.index).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(stats.read, 2);

        let options = MorphOptions { start: 5, end: Some(4), ..Default::default() };
        assert!(matches!(
            run(trace(1, 0x100), MorphSet::new(), options),
            Err(MorphError::InvalidRange { start: 5, end: 4 })
        ));
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let rules = [
            MorphRule::parse(MorphKind::Pc, "100=0x13").unwrap(),
            MorphRule::parse(MorphKind::Pc, "0x100=0x33").unwrap(),
        ];
        let result = MorphSet::from_rules(&rules, &RiscvDecoder::new(true, false), &LsDefaults::default());
        assert!(matches!(result, Err(MorphError::DuplicateMorph(_))));
    }

    #[test]
    fn test_register_state_tracks_skipped_and_morphed_events() {
        let mut first = InstructionEvent::new(1, 0x100, ADD);
        first.registers.push(RegisterRecord::new(10, RegisterRole::Dest, 0x55));
        let mut second = InstructionEvent::new(2, 0x104, ADD);
        second.registers.push(RegisterRecord::new(11, RegisterRole::Dest, 0x66));

        let morphs = morph_set(&[(MorphKind::Index, "1=0x13")]);
        let mut morpher =
            TraceMorpher::new(vec![Ok(first), Ok(second)].into_iter(), Vec::new(), morphs, MorphOptions::default())
                .unwrap();
        morpher.process().unwrap();

        assert_eq!(morpher.register_state().get(10), Some(0x55));
        assert_eq!(morpher.register_state().get(11), Some(0x66));
    }
}
