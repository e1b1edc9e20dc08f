//! Replacement opcodes and the events synthesized from them

use tracekit_common::{
    AccessType, InstructionEvent, MemoryAccess, OpcodeSize, RegisterRecord, RegisterRole,
};

use super::reg_state::RegisterState;
use super::rule::ReplacementSpec;
use crate::config::LsDefaults;
use crate::decode::{Decoder, OperandRef};
use crate::domain::TraceError;
use crate::trace_io::TraceSink;

/// Access size used when neither the rule nor the decoder gives one
const FALLBACK_ACCESS_SIZE: u16 = 8;

/// Where a replacement's memory access points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTarget {
    /// No memory access
    None,
    /// A synthesized address that moves by `stride` after every use
    Fixed { address: u64, size: u16, stride: i64, access: AccessType },
    /// Reuse the first address the original event touched
    FromOriginal { size: Option<u16>, access: AccessType },
}

/// One opcode of a morph, ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementOp {
    opcode: u32,
    size: OpcodeSize,
    operands: Vec<OperandRef>,
    memory: MemoryTarget,
}

impl ReplacementOp {
    #[must_use]
    pub fn new(opcode: u32, size: OpcodeSize, operands: Vec<OperandRef>, memory: MemoryTarget) -> Self {
        Self { opcode, size, operands, memory }
    }

    /// Resolve a parsed replacement against the decoder and the default
    /// load/store target
    ///
    /// An explicit `@address:size` always yields a memory access, even for
    /// an opcode the decoder does not classify as load/store.
    #[must_use]
    pub fn from_spec(spec: &ReplacementSpec, decoder: &dyn Decoder, defaults: &LsDefaults) -> Self {
        let opcode = spec.opcode;
        let access = if decoder.is_store(opcode) { AccessType::Write } else { AccessType::Read };
        let is_load_store = decoder.is_load(opcode) || decoder.is_store(opcode);
        let size = defaults.size.or_else(|| decoder.access_size(opcode));

        let memory = match (spec.target, defaults.address) {
            (Some(target), _) => MemoryTarget::Fixed {
                address: target.address,
                size: target.size,
                stride: target.stride,
                access,
            },
            (None, _) if !is_load_store => MemoryTarget::None,
            (None, Some(address)) => MemoryTarget::Fixed {
                address,
                size: size.unwrap_or(FALLBACK_ACCESS_SIZE),
                stride: defaults.stride,
                access,
            },
            (None, None) => MemoryTarget::FromOriginal { size, access },
        };

        Self::new(opcode, decoder.opcode_size(opcode), decoder.register_operands(opcode), memory)
    }

    #[must_use]
    pub fn opcode(&self) -> u32 {
        self.opcode
    }

    #[must_use]
    pub fn size(&self) -> OpcodeSize {
        self.size
    }

    #[must_use]
    pub fn memory(&self) -> MemoryTarget {
        self.memory
    }

    fn memory_access(&mut self, original: &InstructionEvent) -> Option<(MemoryAccess, AccessType)> {
        match &mut self.memory {
            MemoryTarget::None => None,
            MemoryTarget::Fixed { address, size, stride, access } => {
                let current = MemoryAccess::new(*address, *size);
                *address = address.wrapping_add_signed(*stride);
                Some((current, *access))
            }
            MemoryTarget::FromOriginal { size, access } => {
                let first = original.first_memory_access()?;
                Some((MemoryAccess::new(first.address, size.unwrap_or(first.size)), *access))
            }
        }
    }

    fn register_records(&self, reg_state: &RegisterState) -> Vec<RegisterRecord> {
        let mut records = Vec::with_capacity(self.operands.len() * 2);
        for operand in &self.operands {
            let value = reg_state.get(operand.reg).unwrap_or(0);
            if operand.role == RegisterRole::Source {
                records.push(RegisterRecord::new(operand.reg, RegisterRole::State, value));
            }
            records.push(RegisterRecord::new(operand.reg, operand.role, value));
        }
        records
    }

    /// Synthesize one event at `index`/`pc` and append it to `sink`
    ///
    /// Thread and privilege context come from `original`. A fixed memory
    /// target advances by its stride afterwards.
    ///
    /// # Errors
    /// Returns an error if the sink fails.
    pub fn write<S: TraceSink + ?Sized>(
        &mut self,
        sink: &mut S,
        reg_state: &RegisterState,
        original: &InstructionEvent,
        index: u64,
        pc: u64,
    ) -> Result<(), TraceError> {
        let mut event = InstructionEvent {
            index,
            pc,
            opcode: self.opcode,
            size: self.size,
            user_mode: original.user_mode,
            threads: original.threads,
            registers: self.register_records(reg_state),
            ..InstructionEvent::default()
        };
        match self.memory_access(original) {
            Some((access, AccessType::Read)) => event.memory_reads.push(access),
            Some((access, AccessType::Write)) => event.memory_writes.push(access),
            None => {}
        }
        sink.append(&event)
    }
}

/// Ordered replacement queue bound to one identifier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpcodeMorph {
    ops: Vec<ReplacementOp>,
    total_size: u64,
}

impl OpcodeMorph {
    pub fn add_op(&mut self, op: ReplacementOp) {
        self.total_size += op.size().bytes();
        self.ops.push(op);
    }

    /// Encoded bytes of all replacements
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Write every replacement in order, numbering from `first_index`
    ///
    /// Each op after the first sits right after the previous one in memory.
    /// Returns the number of events written.
    ///
    /// # Errors
    /// Returns an error if the sink fails.
    pub fn write<S: TraceSink + ?Sized>(
        &mut self,
        sink: &mut S,
        reg_state: &RegisterState,
        original: &InstructionEvent,
        first_index: u64,
    ) -> Result<u64, TraceError> {
        let mut pc = original.pc;
        let mut index = first_index;
        for op in &mut self.ops {
            op.write(sink, reg_state, original, index, pc)?;
            pc = pc.wrapping_add(op.size().bytes());
            index += 1;
        }
        Ok(index - first_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::RiscvDecoder;
    use crate::morph::rule::LsTarget;

    const ADDI: u32 = 0x0000_0013;
    const LW_X5_0_X10: u32 = 0x0005_2283;
    const SW_X5_0_X10: u32 = 0x0055_2023;

    fn decoder() -> RiscvDecoder {
        RiscvDecoder::new(true, false)
    }

    fn spec(opcode: u32, target: Option<LsTarget>) -> ReplacementSpec {
        ReplacementSpec { opcode, target }
    }

    #[test]
    fn test_fixed_target_advances_by_stride() {
        let target = LsTarget { address: 0x2000, size: 4, stride: 4 };
        let mut op = ReplacementOp::from_spec(&spec(ADDI, Some(target)), &decoder(), &LsDefaults::default());

        let original = InstructionEvent::new(1, 0x100, ADDI);
        let mut sink = Vec::new();
        op.write(&mut sink, &RegisterState::new(), &original, 1, 0x100).unwrap();
        op.write(&mut sink, &RegisterState::new(), &original, 2, 0x100).unwrap();

        assert_eq!(sink[0].memory_reads, vec![MemoryAccess::new(0x2000, 4)]);
        assert_eq!(sink[1].memory_reads, vec![MemoryAccess::new(0x2004, 4)]);
    }

    #[test]
    fn test_store_uses_write_access_and_defaults() {
        let defaults = LsDefaults { address: Some(0x8000), size: None, stride: -8 };
        let op = ReplacementOp::from_spec(&spec(SW_X5_0_X10, None), &decoder(), &defaults);
        assert_eq!(
            op.memory(),
            MemoryTarget::Fixed { address: 0x8000, size: 4, stride: -8, access: AccessType::Write }
        );
    }

    #[test]
    fn test_load_without_target_reuses_original_address() {
        let mut op = ReplacementOp::from_spec(&spec(LW_X5_0_X10, None), &decoder(), &LsDefaults::default());
        let mut original = InstructionEvent::new(1, 0x100, 0x0000_3503);
        original.memory_reads.push(MemoryAccess::new(0x7000, 8));

        let mut sink = Vec::new();
        op.write(&mut sink, &RegisterState::new(), &original, 1, 0x100).unwrap();
        assert_eq!(sink[0].memory_reads, vec![MemoryAccess::new(0x7000, 4)]);
    }

    #[test]
    fn test_register_records_follow_state() {
        let mut reg_state = RegisterState::new();
        reg_state.update(&RegisterRecord::new(10, RegisterRole::State, 0x40));

        let mut op = ReplacementOp::from_spec(&spec(LW_X5_0_X10, None), &decoder(), &LsDefaults::default());
        let mut sink = Vec::new();
        op.write(&mut sink, &reg_state, &InstructionEvent::new(1, 0, 0), 1, 0).unwrap();

        let records = &sink[0].registers;
        assert!(records.contains(&RegisterRecord::new(10, RegisterRole::State, 0x40)));
        assert!(records.contains(&RegisterRecord::new(10, RegisterRole::Source, 0x40)));
        assert!(records.iter().any(|r| r.reg == 5 && r.role == RegisterRole::Dest));
        assert!(sink[0].memory_reads.is_empty(), "original event had no access to reuse");
    }

    #[test]
    fn test_morph_writes_consecutive_pcs() {
        let mut morph = OpcodeMorph::default();
        morph.add_op(ReplacementOp::from_spec(&spec(ADDI, None), &decoder(), &LsDefaults::default()));
        morph.add_op(ReplacementOp::from_spec(&spec(0x0001, None), &decoder(), &LsDefaults::default()));
        assert_eq!(morph.total_size(), 6);

        let mut sink = Vec::new();
        let written = morph
            .write(&mut sink, &RegisterState::new(), &InstructionEvent::new(9, 0x100, ADDI), 9)
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!((sink[0].index, sink[0].pc), (9, 0x100));
        assert_eq!((sink[1].index, sink[1].pc, sink[1].size), (10, 0x104, OpcodeSize::Compressed));
    }
}
