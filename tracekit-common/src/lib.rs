//! # Shared Instruction Event Model
//!
//! Defines the per-instruction execution record shared between trace
//! readers, writers and the analysis engines in `tracekit`. A trace is an
//! ordered stream of [`InstructionEvent`]s; every engine consumes it front to
//! back and never needs more than one event at a time.
//!
//! ## Key Types
//!
//! - [`InstructionEvent`] - One executed instruction with its side effects
//! - [`MemoryAccess`] - A single load or store target
//! - [`RegisterRecord`] - Register state, source operand or destination operand
//! - [`OpcodeSize`] - Compressed (16-bit) or full-width (32-bit) encoding
//! - [`ThreadIds`] - Hardware thread / process / thread identity
//!
//! With the `serde` feature enabled every type can be (de)serialized; missing
//! optional fields take their [`Default`] values so hand-written fixtures can
//! stay short.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Size in bytes of a compressed (RVC-style) instruction
pub const COMPRESSED_OPCODE_BYTES: u64 = 2;

/// Size in bytes of a full-width instruction
pub const FULL_OPCODE_BYTES: u64 = 4;

// ============================================================================
// Enumerations
// ============================================================================

/// Encoded width of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum OpcodeSize {
    /// 16-bit encoding
    Compressed,
    /// 32-bit encoding
    #[default]
    Full,
}

impl OpcodeSize {
    /// Number of bytes the encoding occupies in memory
    #[must_use]
    pub fn bytes(self) -> u64 {
        match self {
            OpcodeSize::Compressed => COMPRESSED_OPCODE_BYTES,
            OpcodeSize::Full => FULL_OPCODE_BYTES,
        }
    }

    /// Returns true for the 16-bit encoding
    #[must_use]
    pub fn is_compressed(self) -> bool {
        matches!(self, OpcodeSize::Compressed)
    }
}

/// Role of a register record attached to an event
///
/// The ordering inside [`InstructionEvent::registers`] is preserved, so a
/// writer can emit records exactly in the order a reader produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RegisterRole {
    /// Architectural state snapshot (value before the instruction executes)
    State,
    /// Source operand read by the instruction
    Source,
    /// Destination operand written by the instruction
    Dest,
}

/// Direction of a memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AccessType {
    Read,
    Write,
}

// ============================================================================
// Records
// ============================================================================

/// A memory access performed by an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MemoryAccess {
    /// Virtual target address
    pub address: u64,

    /// Access size in bytes (0 if the producer did not record it)
    #[cfg_attr(feature = "serde", serde(default))]
    pub size: u16,
}

impl MemoryAccess {
    #[must_use]
    pub fn new(address: u64, size: u16) -> Self {
        Self { address, size }
    }
}

/// A register record attached to an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegisterRecord {
    /// Architectural register number (ISA-specific numbering)
    pub reg: u16,

    /// What this record describes
    pub role: RegisterRole,

    /// Register value
    ///
    /// For `State` and `Source` records this is the value read; for `Dest`
    /// records it is the value written.
    #[cfg_attr(feature = "serde", serde(default))]
    pub value: u64,
}

impl RegisterRecord {
    #[must_use]
    pub fn new(reg: u16, role: RegisterRole, value: u64) -> Self {
        Self { reg, role, value }
    }
}

/// Identity of the hardware thread and software context that executed an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ThreadIds {
    /// Hardware thread (hart) id
    pub hw_tid: u32,
    /// Process id
    pub pid: u32,
    /// Thread id
    pub tid: u32,
}

// ============================================================================
// Instruction Event
// ============================================================================

/// One executed instruction as recorded in a trace
///
/// This is the read-only view handed to the analysis engines for every step
/// of the trace. Synthesized events written by the morpher use the same type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct InstructionEvent {
    // ========================================================================
    // Position
    // ========================================================================
    /// Global sequence index (1-based in recorded traces)
    pub index: u64,

    /// Virtual program counter
    pub pc: u64,

    /// Physical program counter, when the producer recorded one
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub phys_pc: Option<u64>,

    // ========================================================================
    // Encoding
    // ========================================================================
    /// Raw opcode bits (16-bit encodings occupy the low half)
    pub opcode: u32,

    /// Encoding width
    pub size: OpcodeSize,

    // ========================================================================
    // Status
    // ========================================================================
    /// False if the producer flagged this record as malformed
    pub valid: bool,

    /// The instruction faulted and will be replayed
    pub fault: bool,

    /// An interrupt was taken at this instruction
    pub interrupt: bool,

    /// Executed in user mode
    pub user_mode: bool,

    // ========================================================================
    // Control Flow
    // ========================================================================
    /// The instruction was a taken branch or jump
    pub taken_branch: bool,

    /// Destination of a taken branch
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub branch_target: Option<u64>,

    // ========================================================================
    // Context
    // ========================================================================
    pub threads: ThreadIds,

    // ========================================================================
    // Side Effects
    // ========================================================================
    /// Memory reads, in execution order
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub memory_reads: Vec<MemoryAccess>,

    /// Memory writes, in execution order
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub memory_writes: Vec<MemoryAccess>,

    /// Register state and operand records, in recorded order
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub registers: Vec<RegisterRecord>,
}

impl Default for InstructionEvent {
    fn default() -> Self {
        Self {
            index: 0,
            pc: 0,
            phys_pc: None,
            opcode: 0,
            size: OpcodeSize::Full,
            valid: true,
            fault: false,
            interrupt: false,
            user_mode: true,
            taken_branch: false,
            branch_target: None,
            threads: ThreadIds::default(),
            memory_reads: Vec::new(),
            memory_writes: Vec::new(),
            registers: Vec::new(),
        }
    }
}

impl InstructionEvent {
    /// Create a plain full-width event with no side effects
    #[must_use]
    pub fn new(index: u64, pc: u64, opcode: u32) -> Self {
        Self { index, pc, opcode, ..Self::default() }
    }

    /// Returns true if the event recorded at least one memory read
    #[must_use]
    pub fn is_load(&self) -> bool {
        !self.memory_reads.is_empty()
    }

    /// Returns true if the event recorded at least one memory write
    #[must_use]
    pub fn is_store(&self) -> bool {
        !self.memory_writes.is_empty()
    }

    /// First address touched by this event (reads take priority over writes)
    #[must_use]
    pub fn first_memory_access(&self) -> Option<&MemoryAccess> {
        self.memory_reads.first().or_else(|| self.memory_writes.first())
    }

    /// Address of the instruction that follows this one in program order
    #[must_use]
    pub fn next_pc(&self) -> u64 {
        self.pc.wrapping_add(self.size.bytes())
    }

    /// Register-state snapshot records
    pub fn register_states(&self) -> impl Iterator<Item = &RegisterRecord> {
        self.registers_with_role(RegisterRole::State)
    }

    /// Source operand records
    pub fn source_operands(&self) -> impl Iterator<Item = &RegisterRecord> {
        self.registers_with_role(RegisterRole::Source)
    }

    /// Destination operand records
    pub fn dest_operands(&self) -> impl Iterator<Item = &RegisterRecord> {
        self.registers_with_role(RegisterRole::Dest)
    }

    fn registers_with_role(&self, role: RegisterRole) -> impl Iterator<Item = &RegisterRecord> {
        self.registers.iter().filter(move |r| r.role == role)
    }
}
