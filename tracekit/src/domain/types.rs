//! Domain types providing compile-time safety and self-documentation
//!
//! Traces are full of bare `u64`s. These wrappers keep program counters,
//! sequence indices and morph identifiers apart in function signatures.

use std::fmt;
use std::str::FromStr;

use super::errors::MorphSpecError;

/// Program counter (virtual address of an instruction)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pc(pub u64);

impl fmt::Display for Pc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Global sequence index of an event within a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeqIndex(pub u64);

impl fmt::Display for SeqIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a morph rule selects the instruction occurrences it rewrites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MorphKind {
    /// Exactly one occurrence, by global sequence index (decimal)
    Index,
    /// Every occurrence of a program counter (hexadecimal)
    Pc,
}

impl MorphKind {
    /// Parse an identifier in the radix this kind uses
    ///
    /// # Errors
    /// Returns [`MorphSpecError::InvalidIdentifier`] if the text is not a valid
    /// number in this kind's radix.
    pub fn parse_identifier(self, text: &str) -> Result<u64, MorphSpecError> {
        let text = text.trim();
        let parsed = match self {
            MorphKind::Index => text.parse::<u64>().ok(),
            MorphKind::Pc => {
                let digits = text
                    .strip_prefix("0x")
                    .or_else(|| text.strip_prefix("0X"))
                    .unwrap_or(text);
                u64::from_str_radix(digits, 16).ok()
            }
        };
        parsed.ok_or_else(|| MorphSpecError::InvalidIdentifier { kind: self, text: text.to_string() })
    }

    /// Bind an identifier value to this kind
    #[must_use]
    pub fn target(self, value: u64) -> MorphTarget {
        match self {
            MorphKind::Index => MorphTarget::Index(SeqIndex(value)),
            MorphKind::Pc => MorphTarget::Pc(Pc(value)),
        }
    }
}

impl fmt::Display for MorphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MorphKind::Index => write!(f, "index"),
            MorphKind::Pc => write!(f, "pc"),
        }
    }
}

impl FromStr for MorphKind {
    type Err = MorphSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "index" | "i" | "stfid" => Ok(MorphKind::Index),
            "pc" | "a" => Ok(MorphKind::Pc),
            other => Err(MorphSpecError::UnknownKind(other.to_string())),
        }
    }
}

/// The occurrence(s) a morph rule is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MorphTarget {
    Index(SeqIndex),
    Pc(Pc),
}

impl fmt::Display for MorphTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MorphTarget::Index(index) => write!(f, "INDEX({index})"),
            MorphTarget::Pc(pc) => write!(f, "PC({:x})", pc.0),
        }
    }
}
