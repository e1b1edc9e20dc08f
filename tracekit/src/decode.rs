//! Opcode classification and rendering
//!
//! The engines only need a handful of facts about an opcode: is it a
//! load, store or branch, how wide is it, which registers does it touch, and
//! how should it be printed in a report. [`Decoder`] is that capability; the
//! full instruction decoder/disassembler is an external collaborator.
//!
//! [`RiscvDecoder`] covers the RV32/RV64 base and compressed encodings at the
//! format level (major opcode / quadrant), which is enough to classify every
//! instruction. Its "disassembly" names the instruction format rather than
//! the exact mnemonic.

use tracekit_common::{OpcodeSize, RegisterRole};

/// Offset added to floating-point register numbers so they never collide
/// with integer register numbers in a register-state map
pub const FP_REG_BASE: u16 = 32;

/// Stack pointer (x2), the implicit base of the `*sp` compressed forms
const SP: u16 = 2;

/// Coarse instruction class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstClass {
    Load,
    Store,
    /// Conditional branch
    Branch,
    /// Unconditional jump (direct or indirect)
    Jump,
    Other,
}

/// A register named by an opcode's operand fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandRef {
    pub reg: u16,
    /// `Source` or `Dest`
    pub role: RegisterRole,
}

impl OperandRef {
    fn src(reg: u16) -> Self {
        Self { reg, role: RegisterRole::Source }
    }

    fn dest(reg: u16) -> Self {
        Self { reg, role: RegisterRole::Dest }
    }
}

/// Opcode decoding capability used by the profiler and the morpher
pub trait Decoder {
    /// Encoding width of `opcode`
    fn opcode_size(&self, opcode: u32) -> OpcodeSize;

    /// Coarse class of `opcode`
    fn classify(&self, opcode: u32) -> InstClass;

    /// Bytes accessed by a load/store opcode
    fn access_size(&self, opcode: u32) -> Option<u16>;

    /// Registers read and written by `opcode`, sources first
    fn register_operands(&self, opcode: u32) -> Vec<OperandRef>;

    /// Human readable text for `opcode` executed at `pc`
    fn disassemble(&self, pc: u64, opcode: u32) -> String;

    fn is_load(&self, opcode: u32) -> bool {
        self.classify(opcode) == InstClass::Load
    }

    fn is_store(&self, opcode: u32) -> bool {
        self.classify(opcode) == InstClass::Store
    }

    fn is_branch(&self, opcode: u32) -> bool {
        matches!(self.classify(opcode), InstClass::Branch | InstClass::Jump)
    }

    /// Hex rendering of the opcode, sized to its encoding
    fn format_opcode(&self, opcode: u32) -> String {
        match self.opcode_size(opcode) {
            OpcodeSize::Compressed => format!("{:04x}    ", opcode & 0xffff),
            OpcodeSize::Full => format!("{opcode:08x}"),
        }
    }
}

// =============================================================================
// RISC-V
// =============================================================================

/// Compressed (16-bit) instruction forms, resolved from quadrant and funct3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompressedOp {
    Addi4spn,
    Fld,
    Lw,
    Ld,
    Flw,
    Fsd,
    Sw,
    Sd,
    Fsw,
    Addi,
    Addiw,
    Jal,
    Li,
    Lui,
    /// srli/srai/andi and the register-register ALU group
    Alu,
    J,
    Beqz,
    Bnez,
    Slli,
    Fldsp,
    Lwsp,
    Ldsp,
    Flwsp,
    Jr,
    Jalr,
    Mv,
    Add,
    Fsdsp,
    Swsp,
    Sdsp,
    Fswsp,
    Unknown,
}

impl CompressedOp {
    fn name(self) -> &'static str {
        match self {
            Self::Addi4spn => "c.addi4spn",
            Self::Fld => "c.fld",
            Self::Lw => "c.lw",
            Self::Ld => "c.ld",
            Self::Flw => "c.flw",
            Self::Fsd => "c.fsd",
            Self::Sw => "c.sw",
            Self::Sd => "c.sd",
            Self::Fsw => "c.fsw",
            Self::Addi => "c.addi",
            Self::Addiw => "c.addiw",
            Self::Jal => "c.jal",
            Self::Li => "c.li",
            Self::Lui => "c.lui",
            Self::Alu => "c.alu",
            Self::J => "c.j",
            Self::Beqz => "c.beqz",
            Self::Bnez => "c.bnez",
            Self::Slli => "c.slli",
            Self::Fldsp => "c.fldsp",
            Self::Lwsp => "c.lwsp",
            Self::Ldsp => "c.ldsp",
            Self::Flwsp => "c.flwsp",
            Self::Jr => "c.jr",
            Self::Jalr => "c.jalr",
            Self::Mv => "c.mv",
            Self::Add => "c.add",
            Self::Fsdsp => "c.fsdsp",
            Self::Swsp => "c.swsp",
            Self::Sdsp => "c.sdsp",
            Self::Fswsp => "c.fswsp",
            Self::Unknown => "c.unknown",
        }
    }

    fn class(self) -> InstClass {
        match self {
            Self::Fld | Self::Lw | Self::Ld | Self::Flw | Self::Fldsp | Self::Lwsp | Self::Ldsp | Self::Flwsp => {
                InstClass::Load
            }
            Self::Fsd | Self::Sw | Self::Sd | Self::Fsw | Self::Fsdsp | Self::Swsp | Self::Sdsp | Self::Fswsp => {
                InstClass::Store
            }
            Self::Beqz | Self::Bnez => InstClass::Branch,
            Self::J | Self::Jal | Self::Jr | Self::Jalr => InstClass::Jump,
            _ => InstClass::Other,
        }
    }

    fn access_size(self) -> Option<u16> {
        match self {
            Self::Lw | Self::Sw | Self::Lwsp | Self::Swsp | Self::Flw | Self::Fsw | Self::Flwsp | Self::Fswsp => {
                Some(4)
            }
            Self::Ld | Self::Sd | Self::Ldsp | Self::Sdsp | Self::Fld | Self::Fsd | Self::Fldsp | Self::Fsdsp => {
                Some(8)
            }
            _ => None,
        }
    }
}

/// Format-level RISC-V decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct RiscvDecoder {
    rv64: bool,
    use_aliases: bool,
}

impl RiscvDecoder {
    #[must_use]
    pub fn new(rv64: bool, use_aliases: bool) -> Self {
        Self { rv64, use_aliases }
    }

    fn rd(opcode: u32) -> u16 {
        ((opcode >> 7) & 0x1f) as u16
    }

    fn rs1(opcode: u32) -> u16 {
        ((opcode >> 15) & 0x1f) as u16
    }

    fn rs2(opcode: u32) -> u16 {
        ((opcode >> 20) & 0x1f) as u16
    }

    fn funct3(opcode: u32) -> u32 {
        (opcode >> 12) & 0x7
    }

    // Compressed register fields
    fn c_funct3(opcode: u32) -> u32 {
        (opcode >> 13) & 0x7
    }

    fn c_rd_full(opcode: u32) -> u16 {
        ((opcode >> 7) & 0x1f) as u16
    }

    fn c_rs2_full(opcode: u32) -> u16 {
        ((opcode >> 2) & 0x1f) as u16
    }

    fn c_rs1_prime(opcode: u32) -> u16 {
        (((opcode >> 7) & 0x7) + 8) as u16
    }

    fn c_rs2_prime(opcode: u32) -> u16 {
        (((opcode >> 2) & 0x7) + 8) as u16
    }

    fn major_name(opcode: u32) -> &'static str {
        match opcode & 0x7f {
            0x03 => "load",
            0x07 => "load-fp",
            0x0f => "misc-mem",
            0x13 => "op-imm",
            0x17 => "auipc",
            0x1b => "op-imm-32",
            0x23 => "store",
            0x27 => "store-fp",
            0x2f => "amo",
            0x33 => "op",
            0x37 => "lui",
            0x3b => "op-32",
            0x53 => "op-fp",
            0x63 => "branch",
            0x67 => "jalr",
            0x6f => "jal",
            0x73 => "system",
            _ => "unknown",
        }
    }

    fn compressed_op(&self, opcode: u32) -> CompressedOp {
        use CompressedOp as C;
        let rv = |rv64: CompressedOp, rv32: CompressedOp| if self.rv64 { rv64 } else { rv32 };
        match (opcode & 0x3, Self::c_funct3(opcode)) {
            (0, 0b000) => C::Addi4spn,
            (0, 0b001) => C::Fld,
            (0, 0b010) => C::Lw,
            (0, 0b011) => rv(C::Ld, C::Flw),
            (0, 0b101) => C::Fsd,
            (0, 0b110) => C::Sw,
            (0, 0b111) => rv(C::Sd, C::Fsw),
            (1, 0b000) => C::Addi,
            (1, 0b001) => rv(C::Addiw, C::Jal),
            (1, 0b010) => C::Li,
            (1, 0b011) => C::Lui,
            (1, 0b100) => C::Alu,
            (1, 0b101) => C::J,
            (1, 0b110) => C::Beqz,
            (1, 0b111) => C::Bnez,
            (2, 0b000) => C::Slli,
            (2, 0b001) => C::Fldsp,
            (2, 0b010) => C::Lwsp,
            (2, 0b011) => rv(C::Ldsp, C::Flwsp),
            (2, 0b100) => {
                let jump = Self::c_rs2_full(opcode) == 0 && Self::c_rd_full(opcode) != 0;
                match (jump, (opcode >> 12) & 1) {
                    (true, 0) => C::Jr,
                    (true, _) => C::Jalr,
                    (false, 0) => C::Mv,
                    (false, _) => C::Add,
                }
            }
            (2, 0b101) => C::Fsdsp,
            (2, 0b110) => C::Swsp,
            (2, 0b111) => rv(C::Sdsp, C::Fswsp),
            _ => C::Unknown,
        }
    }

    fn alias(&self, opcode: u32) -> Option<&'static str> {
        if !self.use_aliases {
            return None;
        }
        match opcode {
            0x0000_0013 => Some("nop"),
            0x0000_8067 => Some("ret"),
            0x0001 => Some("c.nop"),
            0x8082 => Some("c.ret"),
            _ => None,
        }
    }

    fn compressed_operands(&self, opcode: u32) -> Vec<OperandRef> {
        use CompressedOp as C;
        let fp = |reg: u16| reg + FP_REG_BASE;
        let (rd, rs2) = (Self::c_rd_full(opcode), Self::c_rs2_full(opcode));
        let (rs1_p, rs2_p) = (Self::c_rs1_prime(opcode), Self::c_rs2_prime(opcode));
        match self.compressed_op(opcode) {
            C::Lw | C::Ld => vec![OperandRef::src(rs1_p), OperandRef::dest(rs2_p)],
            C::Fld | C::Flw => vec![OperandRef::src(rs1_p), OperandRef::dest(fp(rs2_p))],
            C::Sw | C::Sd => vec![OperandRef::src(rs1_p), OperandRef::src(rs2_p)],
            C::Fsd | C::Fsw => vec![OperandRef::src(rs1_p), OperandRef::src(fp(rs2_p))],
            C::Lwsp | C::Ldsp => vec![OperandRef::src(SP), OperandRef::dest(rd)],
            C::Fldsp | C::Flwsp => vec![OperandRef::src(SP), OperandRef::dest(fp(rd))],
            C::Swsp | C::Sdsp => vec![OperandRef::src(SP), OperandRef::src(rs2)],
            C::Fsdsp | C::Fswsp => vec![OperandRef::src(SP), OperandRef::src(fp(rs2))],
            C::Beqz | C::Bnez => vec![OperandRef::src(rs1_p)],
            C::Jr => vec![OperandRef::src(rd)],
            C::Jalr => vec![OperandRef::src(rd), OperandRef::dest(1)],
            C::Jal => vec![OperandRef::dest(1)],
            C::Mv => vec![OperandRef::src(rs2), OperandRef::dest(rd)],
            C::Add => vec![OperandRef::src(rd), OperandRef::src(rs2), OperandRef::dest(rd)],
            C::Addi | C::Addiw | C::Slli => vec![OperandRef::src(rd), OperandRef::dest(rd)],
            C::Li | C::Lui => vec![OperandRef::dest(rd)],
            C::Addi4spn => vec![OperandRef::src(SP), OperandRef::dest(rs2_p)],
            C::Alu => vec![OperandRef::src(rs1_p), OperandRef::dest(rs1_p)],
            C::J | C::Unknown => Vec::new(),
        }
    }

    fn full_operands(opcode: u32) -> Vec<OperandRef> {
        let (rd, rs1, rs2) = (Self::rd(opcode), Self::rs1(opcode), Self::rs2(opcode));
        let fp = |reg: u16| reg + FP_REG_BASE;
        let mut ops = match opcode & 0x7f {
            0x03 => vec![OperandRef::src(rs1), OperandRef::dest(rd)],
            0x07 => vec![OperandRef::src(rs1), OperandRef::dest(fp(rd))],
            0x13 | 0x1b => vec![OperandRef::src(rs1), OperandRef::dest(rd)],
            0x17 | 0x37 | 0x6f => vec![OperandRef::dest(rd)],
            0x23 | 0x63 => vec![OperandRef::src(rs1), OperandRef::src(rs2)],
            0x27 => vec![OperandRef::src(rs1), OperandRef::src(fp(rs2))],
            0x2f | 0x33 | 0x3b => vec![OperandRef::src(rs1), OperandRef::src(rs2), OperandRef::dest(rd)],
            0x53 => vec![OperandRef::src(fp(rs1)), OperandRef::src(fp(rs2)), OperandRef::dest(fp(rd))],
            0x67 => vec![OperandRef::src(rs1), OperandRef::dest(rd)],
            _ => Vec::new(),
        };
        // Writes to x0 are discarded by the hardware
        ops.retain(|op| !(op.role == RegisterRole::Dest && op.reg == 0));
        ops
    }
}

impl Decoder for RiscvDecoder {
    fn opcode_size(&self, opcode: u32) -> OpcodeSize {
        if opcode & 0x3 == 0x3 {
            OpcodeSize::Full
        } else {
            OpcodeSize::Compressed
        }
    }

    fn classify(&self, opcode: u32) -> InstClass {
        if self.opcode_size(opcode).is_compressed() {
            return self.compressed_op(opcode).class();
        }
        match opcode & 0x7f {
            0x03 | 0x07 | 0x2f => InstClass::Load,
            0x23 | 0x27 => InstClass::Store,
            0x63 => InstClass::Branch,
            0x67 | 0x6f => InstClass::Jump,
            _ => InstClass::Other,
        }
    }

    fn access_size(&self, opcode: u32) -> Option<u16> {
        if self.opcode_size(opcode).is_compressed() {
            return self.compressed_op(opcode).access_size();
        }
        let funct3 = Self::funct3(opcode);
        match opcode & 0x7f {
            // lb/lh/lw/ld and unsigned variants
            0x03 | 0x23 => Some(1 << (funct3 & 0x3)),
            // flh/flw/fld/flq
            0x07 | 0x27 if (1..=4).contains(&funct3) => Some(1 << funct3),
            0x2f if funct3 == 2 => Some(4),
            0x2f if funct3 == 3 => Some(8),
            _ => None,
        }
    }

    fn register_operands(&self, opcode: u32) -> Vec<OperandRef> {
        if self.opcode_size(opcode).is_compressed() {
            self.compressed_operands(opcode)
        } else {
            Self::full_operands(opcode)
        }
    }

    fn disassemble(&self, _pc: u64, opcode: u32) -> String {
        if let Some(alias) = self.alias(opcode) {
            return alias.to_string();
        }

        let name = if self.opcode_size(opcode).is_compressed() {
            self.compressed_op(opcode).name()
        } else {
            Self::major_name(opcode)
        };

        let operands: Vec<String> = self
            .register_operands(opcode)
            .iter()
            .map(|op| {
                let reg = if op.reg >= FP_REG_BASE {
                    format!("f{}", op.reg - FP_REG_BASE)
                } else {
                    format!("x{}", op.reg)
                };
                match op.role {
                    RegisterRole::Dest => format!("{reg}<-"),
                    _ => reg,
                }
            })
            .collect();

        if operands.is_empty() {
            name.to_string()
        } else {
            format!("{name} {}", operands.join(","))
        }
    }
}
