//! Region-of-interest selection
//!
//! Wraps an event stream so only the events between a start and a stop
//! condition come through. The engines downstream never know which kind of
//! bound is in effect.
//!
//! ```text
//! trace:   ... A  [start]  B  C  D  [stop]  E ...
//! region:                  B  C  D                 (tracepoint bounds)
//! region:         [start]  B  C  D                 (PC bounds)
//! ```

use tracekit_common::InstructionEvent;

use crate::domain::TraceError;

/// Default tracepoint that opens a region: `xor x0, x0, x0`
pub const DEFAULT_ROI_START_OPCODE: u32 = 0x0000_4033;

/// Default tracepoint that closes a region: `xor x0, x1, x1`
pub const DEFAULT_ROI_STOP_OPCODE: u32 = 0x0010_c033;

/// Which events a [`Region`] admits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionBound {
    /// Every event
    #[default]
    Full,
    /// Events strictly between a start and a stop marker opcode
    Tracepoint { start_opcode: u32, stop_opcode: u32 },
    /// From the first event at `start_pc` up to (excluding) the next event
    /// at `stop_pc`
    Pc { start_pc: u64, stop_pc: u64 },
}

impl RegionBound {
    /// Tracepoint bounds, substituting the default marker for a zero opcode
    #[must_use]
    pub fn tracepoint(start_opcode: u32, stop_opcode: u32) -> Self {
        let pick = |opcode: u32, default: u32| if opcode == 0 { default } else { opcode };
        RegionBound::Tracepoint {
            start_opcode: pick(start_opcode, DEFAULT_ROI_START_OPCODE),
            stop_opcode: pick(stop_opcode, DEFAULT_ROI_STOP_OPCODE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Before,
    Inside,
    Done,
}

/// Iterator adapter that yields only the events inside a region
///
/// Read errors are passed through untouched so the caller sees them.
pub struct Region<I> {
    inner: I,
    bound: RegionBound,
    phase: Phase,
}

impl<I> Region<I>
where
    I: Iterator<Item = Result<InstructionEvent, TraceError>>,
{
    pub fn new(inner: I, bound: RegionBound) -> Self {
        let phase = if bound == RegionBound::Full { Phase::Inside } else { Phase::Before };
        Self { inner, bound, phase }
    }

    /// Decide what to do with one event; returns true if it is yielded
    fn admit(&mut self, event: &InstructionEvent) -> bool {
        match (self.bound, self.phase) {
            (_, Phase::Done) => false,
            (RegionBound::Full, _) => true,
            (RegionBound::Tracepoint { start_opcode, .. }, Phase::Before) => {
                if event.opcode == start_opcode {
                    self.phase = Phase::Inside;
                }
                false
            }
            (RegionBound::Tracepoint { stop_opcode, .. }, Phase::Inside) => {
                if event.opcode == stop_opcode {
                    self.phase = Phase::Done;
                    return false;
                }
                true
            }
            (RegionBound::Pc { start_pc, .. }, Phase::Before) => {
                if event.pc == start_pc {
                    self.phase = Phase::Inside;
                    return true;
                }
                false
            }
            (RegionBound::Pc { stop_pc, .. }, Phase::Inside) => {
                if event.pc == stop_pc {
                    self.phase = Phase::Done;
                    return false;
                }
                true
            }
        }
    }
}

impl<I> Iterator for Region<I>
where
    I: Iterator<Item = Result<InstructionEvent, TraceError>>,
{
    type Item = Result<InstructionEvent, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.phase == Phase::Done {
                return None;
            }
            match self.inner.next()? {
                Ok(event) => {
                    if self.admit(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(spec: &[(u64, u32)]) -> Vec<Result<InstructionEvent, TraceError>> {
        spec.iter()
            .enumerate()
            .map(|(i, &(pc, opcode))| Ok(InstructionEvent::new(i as u64 + 1, pc, opcode)))
            .collect()
    }

    fn pcs(region: Region<std::vec::IntoIter<Result<InstructionEvent, TraceError>>>) -> Vec<u64> {
        region.map(|e| e.unwrap().pc).collect()
    }

    #[test]
    fn test_full_region_passes_everything() {
        let input = events(&[(0x100, 0x13), (0x104, 0x13)]);
        assert_eq!(pcs(Region::new(input.into_iter(), RegionBound::Full)), vec![0x100, 0x104]);
    }

    #[test]
    fn test_tracepoint_region_excludes_markers() {
        let input = events(&[
            (0x100, 0x13),
            (0x104, DEFAULT_ROI_START_OPCODE),
            (0x108, 0x13),
            (0x10c, 0x13),
            (0x110, DEFAULT_ROI_STOP_OPCODE),
            (0x114, 0x13),
        ]);
        let region = Region::new(input.into_iter(), RegionBound::tracepoint(0, 0));
        assert_eq!(pcs(region), vec![0x108, 0x10c]);
    }

    #[test]
    fn test_pc_region_includes_start_excludes_stop() {
        let input = events(&[(0x100, 0x13), (0x200, 0x13), (0x204, 0x13), (0x300, 0x13), (0x304, 0x13)]);
        let region = Region::new(input.into_iter(), RegionBound::Pc { start_pc: 0x200, stop_pc: 0x300 });
        assert_eq!(pcs(region), vec![0x200, 0x204]);
    }

    #[test]
    fn test_tracepoint_override_opcodes() {
        assert_eq!(
            RegionBound::tracepoint(0xdead, 0),
            RegionBound::Tracepoint { start_opcode: 0xdead, stop_opcode: DEFAULT_ROI_STOP_OPCODE }
        );
    }
}
