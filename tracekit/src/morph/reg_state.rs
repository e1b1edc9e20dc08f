//! Architectural register model
//!
//! The morpher only needs the last value seen for each register, so that a
//! synthesized event can carry register-state records consistent with the
//! events around it.

use std::collections::HashMap;

use tracekit_common::{InstructionEvent, RegisterRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterState {
    values: HashMap<u16, u64>,
}

impl RegisterState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, record: &RegisterRecord) {
        self.values.insert(record.reg, record.value);
    }

    /// Absorb the values known before `event` executes
    pub fn update_pre(&mut self, event: &InstructionEvent) {
        for record in event.register_states().chain(event.source_operands()) {
            self.update(record);
        }
    }

    /// Absorb the values `event` produced
    pub fn update_post(&mut self, event: &InstructionEvent) {
        for record in event.dest_operands() {
            self.update(record);
        }
    }

    #[must_use]
    pub fn get(&self, reg: u16) -> Option<u64> {
        self.values.get(&reg).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracekit_common::RegisterRole;

    #[test]
    fn test_pre_and_post_updates() {
        let mut event = InstructionEvent::new(1, 0x100, 0x0052_8533);
        event.registers = vec![
            RegisterRecord::new(5, RegisterRole::State, 1),
            RegisterRecord::new(5, RegisterRole::Source, 2),
            RegisterRecord::new(10, RegisterRole::Dest, 3),
        ];

        let mut state = RegisterState::new();
        state.update_pre(&event);
        assert_eq!(state.get(5), Some(2), "source operand is newer than the snapshot");
        assert_eq!(state.get(10), None);

        state.update_post(&event);
        assert_eq!(state.get(10), Some(3));
        assert_eq!(state.len(), 2);
    }
}
