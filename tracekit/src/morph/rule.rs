//! Morph rule grammar
//!
//! ```text
//! rule        = ident "=" replacement ("," replacement)*
//! replacement = opcode ["@" address ":" size ["+" stride]]
//! ```
//!
//! `ident` is decimal for index rules and hexadecimal for PC rules. Opcodes
//! and addresses are hexadecimal (`0x` optional), sizes are decimal, and a
//! stride is decimal or `0x`-prefixed hexadecimal and may be negative.
//!
//! Example: `1000=0x00000013@0x2000:4+0x4,0x00000013`

use std::str::FromStr;

use crate::domain::{MorphKind, MorphSpecError, MorphTarget};

/// Explicit load/store target of a replacement opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LsTarget {
    pub address: u64,
    pub size: u16,
    /// Added to `address` after each use
    pub stride: i64,
}

/// One replacement opcode as written in a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplacementSpec {
    pub opcode: u32,
    pub target: Option<LsTarget>,
}

/// A parsed morph rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphRule {
    pub kind: MorphKind,
    pub id: u64,
    pub replacements: Vec<ReplacementSpec>,
}

fn strip_hex_prefix(text: &str) -> &str {
    text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text)
}

fn parse_hex(text: &str) -> Option<u64> {
    let digits = strip_hex_prefix(text.trim());
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Decimal, or hexadecimal with `0x`; an optional leading `-`
fn parse_stride(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, magnitude) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let value = if magnitude.starts_with("0x") || magnitude.starts_with("0X") {
        i64::from_str_radix(strip_hex_prefix(magnitude), 16).ok()?
    } else {
        magnitude.parse::<i64>().ok()?
    };
    Some(if negative { -value } else { value })
}

impl FromStr for LsTarget {
    type Err = MorphSpecError;

    /// `address:size[+stride]`
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (address, rest) =
            text.split_once(':').ok_or_else(|| MorphSpecError::InvalidTarget(text.to_string()))?;
        let (size, stride) = match rest.split_once('+') {
            Some((size, stride)) => (size, Some(stride)),
            None => (rest, None),
        };

        let address = parse_hex(address).ok_or_else(|| MorphSpecError::InvalidAddress(address.to_string()))?;
        let size = size
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|&size| size > 0)
            .ok_or_else(|| MorphSpecError::InvalidSize(size.to_string()))?;
        let stride = match stride {
            Some(stride) => parse_stride(stride).ok_or_else(|| MorphSpecError::InvalidStride(stride.to_string()))?,
            None => 0,
        };

        Ok(Self { address, size, stride })
    }
}

impl FromStr for ReplacementSpec {
    type Err = MorphSpecError;

    /// `opcode[@address:size[+stride]]`
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let (opcode_text, target) = match text.split_once('@') {
            Some((opcode, target)) => (opcode, Some(target.parse::<LsTarget>()?)),
            None => (text, None),
        };

        let opcode = parse_hex(opcode_text)
            .and_then(|value| u32::try_from(value).ok())
            .ok_or_else(|| MorphSpecError::InvalidOpcode(opcode_text.trim().to_string()))?;

        Ok(Self { opcode, target })
    }
}

impl MorphRule {
    /// Parse `ident=op1[,op2...]` for the given identifier kind
    ///
    /// # Errors
    /// Returns the first grammar violation found.
    pub fn parse(kind: MorphKind, text: &str) -> Result<Self, MorphSpecError> {
        let (ident, body) =
            text.split_once('=').ok_or_else(|| MorphSpecError::MissingSeparator(text.to_string()))?;
        let id = kind.parse_identifier(ident)?;

        if body.trim().is_empty() {
            return Err(MorphSpecError::NoReplacements(text.to_string()));
        }
        let replacements = body.split(',').map(str::parse::<ReplacementSpec>).collect::<Result<Vec<_>, _>>()?;

        Ok(Self { kind, id, replacements })
    }

    /// Parse the tagged form `KIND:ident=op1[,op2...]`
    ///
    /// # Errors
    /// Returns [`MorphSpecError::UnknownKind`] for an unrecognized tag, or
    /// any grammar violation in the rule itself.
    pub fn parse_tagged(text: &str) -> Result<Self, MorphSpecError> {
        let (kind, rule) =
            text.split_once(':').ok_or_else(|| MorphSpecError::UnknownKind(text.to_string()))?;
        Self::parse(kind.parse()?, rule)
    }

    #[must_use]
    pub fn target(&self) -> MorphTarget {
        self.kind.target(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_rule() {
        let rule = MorphRule::parse(MorphKind::Index, "1000=0x00000013@0x2000:4+0x4,0x00000013").unwrap();
        assert_eq!(rule.id, 1000);
        assert_eq!(
            rule.replacements,
            vec![
                ReplacementSpec {
                    opcode: 0x13,
                    target: Some(LsTarget { address: 0x2000, size: 4, stride: 4 })
                },
                ReplacementSpec { opcode: 0x13, target: None },
            ]
        );
    }

    #[test]
    fn test_pc_identifier_is_hex() {
        let rule = MorphRule::parse(MorphKind::Pc, "80001000=00002503@1000:8").unwrap();
        assert_eq!(rule.target(), MorphTarget::Pc(crate::domain::Pc(0x8000_1000)));
        assert_eq!(rule.replacements[0].target.unwrap().stride, 0);
    }

    #[test]
    fn test_negative_and_decimal_strides() {
        assert_eq!("0x100:8+-16".parse::<LsTarget>().unwrap().stride, -16);
        assert_eq!("0x100:8+-0x10".parse::<LsTarget>().unwrap().stride, -16);
        assert_eq!("0x100:8+12".parse::<LsTarget>().unwrap().stride, 12);
    }

    #[test]
    fn test_grammar_errors() {
        assert_eq!(
            MorphRule::parse(MorphKind::Index, "1000").unwrap_err(),
            MorphSpecError::MissingSeparator("1000".into())
        );
        assert!(matches!(
            MorphRule::parse(MorphKind::Index, "abc=0x13"),
            Err(MorphSpecError::InvalidIdentifier { .. })
        ));
        assert_eq!(
            MorphRule::parse(MorphKind::Index, "1=").unwrap_err(),
            MorphSpecError::NoReplacements("1=".into())
        );
        assert_eq!(
            MorphRule::parse(MorphKind::Index, "1=zz").unwrap_err(),
            MorphSpecError::InvalidOpcode("zz".into())
        );
        assert_eq!(
            MorphRule::parse(MorphKind::Index, "1=0x13,").unwrap_err(),
            MorphSpecError::InvalidOpcode(String::new())
        );
        assert_eq!(
            MorphRule::parse(MorphKind::Index, "1=0x13@0x100").unwrap_err(),
            MorphSpecError::InvalidTarget("0x100".into())
        );
        assert_eq!(
            MorphRule::parse(MorphKind::Index, "1=0x13@0x100:0").unwrap_err(),
            MorphSpecError::InvalidSize("0".into())
        );
        assert_eq!(
            MorphRule::parse(MorphKind::Index, "1=0x13@0x100:4+x").unwrap_err(),
            MorphSpecError::InvalidStride("x".into())
        );
        assert_eq!(
            MorphRule::parse(MorphKind::Index, "1=0x123456789").unwrap_err(),
            MorphSpecError::InvalidOpcode("0x123456789".into())
        );
    }

    #[test]
    fn test_tagged_rules() {
        let rule = MorphRule::parse_tagged("pc:1000=0x13").unwrap();
        assert_eq!(rule.kind, MorphKind::Pc);
        assert_eq!(rule.id, 0x1000);

        assert_eq!(
            MorphRule::parse_tagged("bogus:1=0x13").unwrap_err(),
            MorphSpecError::UnknownKind("bogus".into())
        );
    }
}
