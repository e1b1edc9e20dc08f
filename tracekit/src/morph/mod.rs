//! Instruction trace rewriting
//!
//! Rules written as `ident=op1[@addr:size[+stride]][,op2...]` are parsed by
//! [`rule`], resolved against a decoder into [`OpcodeMorph`]s and applied
//! by [`TraceMorpher`] in a single forward pass.

pub mod morpher;
pub mod opcode_morph;
pub mod reg_state;
pub mod rule;

pub use morpher::{MorphSet, MorphStats, TraceMorpher};
pub use opcode_morph::{MemoryTarget, OpcodeMorph, ReplacementOp};
pub use reg_state::RegisterState;
pub use rule::{LsTarget, MorphRule, ReplacementSpec};
