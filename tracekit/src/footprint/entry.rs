//! Per-instruction footprint statistics

use tracekit_common::OpcodeSize;

use super::history::{BranchHistory, StrideRing};

/// What the classifier learned about one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sighting {
    /// Target address if the event is a load/store (first access of the step)
    pub mem_address: Option<u64>,
    /// Taken/not-taken outcome if the event is a branch
    pub branch: Option<bool>,
}

/// Where in the measurement timeline an event falls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Warmup,
    Measured,
    /// Past the run-length budget; only the total count moves
    Beyond,
}

/// Local history of one static instruction
#[derive(Debug, Clone)]
pub enum LocalHistory {
    None,
    Memory { last_address: u64, strides: Box<StrideRing> },
    Branch(BranchHistory),
}

/// Statistics for one static instruction (one PC)
#[derive(Debug, Clone)]
pub struct FootprintEntry {
    opcode: u32,
    phys_pc: u64,
    size: OpcodeSize,
    count: u64,
    warmup: u64,
    runlength: u64,
    history: LocalHistory,
}

impl FootprintEntry {
    /// Entry for the first sighting of a PC
    #[must_use]
    pub fn new(opcode: u32, phys_pc: u64, size: OpcodeSize, sighting: Sighting, window: Window) -> Self {
        let history = match (sighting.mem_address, sighting.branch) {
            (Some(address), _) => {
                LocalHistory::Memory { last_address: address, strides: Box::default() }
            }
            (None, Some(taken)) => {
                let mut history = BranchHistory::default();
                history.push(taken);
                LocalHistory::Branch(history)
            }
            (None, None) => LocalHistory::None,
        };

        let mut entry =
            Self { opcode, phys_pc, size, count: 1, warmup: 0, runlength: 0, history };
        entry.bump_window(window);
        entry
    }

    /// Record a repeat sighting with a matching opcode
    pub fn record(&mut self, sighting: Sighting, window: Window) {
        self.count += 1;
        self.bump_window(window);

        if let Some(address) = sighting.mem_address {
            match &mut self.history {
                LocalHistory::Memory { last_address, strides } => {
                    // Wrapping difference reinterpreted as signed gives the
                    // true stride for any pair of 64-bit addresses
                    #[allow(clippy::cast_possible_wrap)]
                    strides.push(address.wrapping_sub(*last_address) as i64);
                    *last_address = address;
                }
                history @ LocalHistory::None => {
                    *history =
                        LocalHistory::Memory { last_address: address, strides: Box::default() };
                }
                LocalHistory::Branch(_) => {}
            }
        } else if let Some(taken) = sighting.branch {
            match &mut self.history {
                LocalHistory::Branch(history) => history.push(taken),
                // The first sighting may have happened before the branch
                // nature was observable (e.g. a not-taken first execution)
                history @ LocalHistory::None => {
                    let mut branch = BranchHistory::default();
                    branch.push(taken);
                    *history = LocalHistory::Branch(branch);
                }
                LocalHistory::Memory { .. } => {}
            }
        }
    }

    fn bump_window(&mut self, window: Window) {
        match window {
            Window::Warmup => self.warmup += 1,
            Window::Measured => self.runlength += 1,
            Window::Beyond => {}
        }
    }

    #[must_use]
    pub fn opcode(&self) -> u32 {
        self.opcode
    }

    #[must_use]
    pub fn opcode_matches(&self, opcode: u32) -> bool {
        self.opcode == opcode
    }

    #[must_use]
    pub fn phys_pc(&self) -> u64 {
        self.phys_pc
    }

    #[must_use]
    pub fn size(&self) -> OpcodeSize {
        self.size
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn warmup(&self) -> u64 {
        self.warmup
    }

    #[must_use]
    pub fn runlength(&self) -> u64 {
        self.runlength
    }

    #[must_use]
    pub fn history(&self) -> &LocalHistory {
        &self.history
    }

    #[must_use]
    pub fn is_load_store(&self) -> bool {
        matches!(self.history, LocalHistory::Memory { .. })
    }

    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self.history, LocalHistory::Branch(_))
    }

    /// Render the local history as a compact token list, if there is one
    #[must_use]
    pub fn history_tokens(&self) -> Option<String> {
        match &self.history {
            LocalHistory::None => None,
            LocalHistory::Memory { strides, .. } => {
                let tokens: Vec<String> = strides.iter().map(|s| s.to_string()).collect();
                Some(format!("LStrides={{{}}}", tokens.join(",")))
            }
            LocalHistory::Branch(history) => {
                let bits: String = history.iter().map(|t| if t { '1' } else { '0' }).collect();
                Some(format!("LHR={{{bits}}}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_at(address: u64) -> Sighting {
        Sighting { mem_address: Some(address), branch: None }
    }

    #[test]
    fn test_new_entry_counts_once_in_its_window() {
        let entry = FootprintEntry::new(0x13, 0, OpcodeSize::Full, Sighting::default(), Window::Warmup);
        assert_eq!((entry.count(), entry.warmup(), entry.runlength()), (1, 1, 0));

        let entry = FootprintEntry::new(0x13, 0, OpcodeSize::Full, Sighting::default(), Window::Beyond);
        assert_eq!((entry.count(), entry.warmup(), entry.runlength()), (1, 0, 0));
    }

    #[test]
    fn test_strides_track_address_deltas() {
        let mut entry = FootprintEntry::new(0x3, 0, OpcodeSize::Full, load_at(0x1000), Window::Measured);
        entry.record(load_at(0x1008), Window::Measured);
        entry.record(load_at(0x1000), Window::Measured);

        assert!(entry.is_load_store());
        assert_eq!(entry.history_tokens().unwrap(), "LStrides={8,-8}");
        assert_eq!(entry.runlength(), 3);
    }

    #[test]
    fn test_not_taken_first_sighting_becomes_branch_later() {
        let mut entry = FootprintEntry::new(0x63, 0, OpcodeSize::Full, Sighting::default(), Window::Measured);
        assert!(!entry.is_branch());

        entry.record(Sighting { mem_address: None, branch: Some(true) }, Window::Measured);
        entry.record(Sighting { mem_address: None, branch: Some(false) }, Window::Measured);

        assert!(entry.is_branch());
        assert_eq!(entry.history_tokens().unwrap(), "LHR={10}");
    }

    #[test]
    fn test_plain_entry_has_no_history_tokens() {
        let entry = FootprintEntry::new(0x13, 0, OpcodeSize::Full, Sighting::default(), Window::Measured);
        assert_eq!(entry.history_tokens(), None);
    }
}
