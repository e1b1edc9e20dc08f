//! Structured error types for tracekit
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! Setup errors (bad morph rules, inverted bounds) stop a run before the
//! first event is read. Per-event data anomalies are not errors at all: the
//! engines log them with `warn!` and keep going.

use super::types::{MorphKind, MorphTarget};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Malformed trace record on line {line}: {source}")]
    MalformedRecord {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Trace ended before instruction index {0}")]
    SeekPastEnd(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MorphSpecError {
    #[error("Morph rule \"{0}\" is missing '=' between identifier and opcodes")]
    MissingSeparator(String),

    #[error("Invalid {kind} identifier \"{text}\"")]
    InvalidIdentifier { kind: MorphKind, text: String },

    #[error("Unknown morph identifier kind \"{0}\" (expected \"index\" or \"pc\")")]
    UnknownKind(String),

    #[error("Morph rule \"{0}\" has no replacement opcodes")]
    NoReplacements(String),

    #[error("Invalid opcode \"{0}\"")]
    InvalidOpcode(String),

    #[error("Invalid load/store target \"{0}\" (expected addr:size[+stride])")]
    InvalidTarget(String),

    #[error("Invalid address \"{0}\"")]
    InvalidAddress(String),

    #[error("Invalid access size \"{0}\"")]
    InvalidSize(String),

    #[error("Invalid stride \"{0}\"")]
    InvalidStride(String),
}

#[derive(Error, Debug)]
pub enum MorphError {
    #[error(transparent)]
    Spec(#[from] MorphSpecError),

    #[error("{0} was specified more than once")]
    DuplicateMorph(MorphTarget),

    #[error(
        "Instruction {index} at PC {pc:#x} matches both an index morph and a PC morph \
         (pass --allow-collisions to let the index morph take precedence)"
    )]
    Collision { index: u64, pc: u64 },

    #[error("End instruction ({end}) must be greater than or equal to start instruction ({start})")]
    InvalidRange { start: u64, end: u64 },

    #[error(transparent)]
    Trace(#[from] TraceError),
}

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error(
        "Not all blocks were included in sorted output! cumulative count = {cumulative}, \
         recorded count = {recorded}"
    )]
    CumulativeMismatch { cumulative: u64, recorded: u64 },

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{MorphKind, Pc};

    #[test]
    fn test_collision_error_display() {
        let err = MorphError::Collision { index: 1000, pc: 0x8000_0000 };
        let msg = err.to_string();
        assert!(msg.contains("1000"));
        assert!(msg.contains("0x80000000"));
    }

    #[test]
    fn test_duplicate_error_names_target() {
        let err = MorphError::DuplicateMorph(MorphTarget::Pc(Pc(0x1f0)));
        assert_eq!(err.to_string(), "PC(1f0) was specified more than once");
    }

    #[test]
    fn test_spec_error_converts() {
        let err: MorphError =
            MorphSpecError::InvalidIdentifier { kind: MorphKind::Index, text: "zz".to_string() }
                .into();
        assert!(err.to_string().contains("index identifier \"zz\""));
    }
}
