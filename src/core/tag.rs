//! Tag registry.
//!
//! Resolves a configured `register → type name` mapping into a [`TagSet`]
//! of typed read requests. Type names are resolved once, at startup, into
//! the closed [`TagType`] enum; an unrecognized name is a configuration
//! error naming the offending register, never a silently dropped tag.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{RelayError, Result};

/// Declared data type of a controller register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TagType {
    /// Single bit
    Bit,
    /// Signed 16-bit word
    Sword,
    /// Unsigned 16-bit word
    Uword,
    /// Signed 32-bit double word
    Sdword,
    /// Unsigned 32-bit double word
    Udword,
    /// 32-bit IEEE 754 float
    Float,
    /// 64-bit IEEE 754 float
    Double,
    /// Signed 64-bit long word
    Slword,
    /// Unsigned 64-bit long word
    Ulword,
}

impl TagType {
    /// All supported types, in declaration order.
    pub const ALL: [TagType; 9] = [
        Self::Bit,
        Self::Sword,
        Self::Uword,
        Self::Sdword,
        Self::Udword,
        Self::Float,
        Self::Double,
        Self::Slword,
        Self::Ulword,
    ];

    /// Canonical upper-case name, as written in configuration.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bit => "BIT",
            Self::Sword => "SWORD",
            Self::Uword => "UWORD",
            Self::Sdword => "SDWORD",
            Self::Udword => "UDWORD",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Slword => "SLWORD",
            Self::Ulword => "ULWORD",
        }
    }

    /// Width of the register value in bits.
    pub const fn bit_width(&self) -> u8 {
        match self {
            Self::Bit => 1,
            Self::Sword | Self::Uword => 16,
            Self::Sdword | Self::Udword | Self::Float => 32,
            Self::Double | Self::Slword | Self::Ulword => 64,
        }
    }

    /// Whether the type holds a floating-point value.
    #[inline]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Whether the type holds a signed integer.
    #[inline]
    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Sword | Self::Sdword | Self::Slword)
    }

    /// Short human-readable description.
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Bit => "single bit",
            Self::Sword => "signed 16-bit word",
            Self::Uword => "unsigned 16-bit word",
            Self::Sdword => "signed 32-bit double word",
            Self::Udword => "unsigned 32-bit double word",
            Self::Float => "32-bit floating point",
            Self::Double => "64-bit floating point",
            Self::Slword => "signed 64-bit long word",
            Self::Ulword => "unsigned 64-bit long word",
        }
    }

    /// Parse a type name case-insensitively, ignoring surrounding whitespace.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        // Use eq_ignore_ascii_case to avoid String allocation from to_uppercase()
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TagType {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| RelayError::Config(format!("Unknown tag type: {}", s)))
    }
}

/// A validated read request for one controller register.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagSpec {
    register: String,
    tag_type: TagType,
}

impl TagSpec {
    /// Register address (e.g. `"D10"`).
    pub fn register(&self) -> &str {
        &self.register
    }

    /// Declared data type.
    pub fn tag_type(&self) -> TagType {
        self.tag_type
    }
}

/// Ordered, immutable set of tags polled from one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<TagSpec>,
}

impl TagSet {
    /// Number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Check if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterate over tags in resolution order.
    pub fn iter(&self) -> impl Iterator<Item = &TagSpec> {
        self.tags.iter()
    }

    /// Look up a tag by register address.
    pub fn get(&self, register: &str) -> Option<&TagSpec> {
        self.tags.iter().find(|t| t.register == register)
    }

    /// Borrow the tags as a slice.
    pub fn as_slice(&self) -> &[TagSpec] {
        &self.tags
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a TagSpec;
    type IntoIter = std::slice::Iter<'a, TagSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

/// Resolve a `register → type name` mapping into a [`TagSet`].
///
/// Entries keep the order in which the mapping yields them. Fails on the
/// first entry with an empty register, a duplicated register, or a type
/// name that is not one of the nine [`TagType`]s.
///
/// # Example
///
/// ```
/// use tagrelay::core::tag::{resolve, TagType};
///
/// let tags = resolve([("D10", "sword"), ("X01", "BIT")]).unwrap();
/// assert_eq!(tags.len(), 2);
/// assert_eq!(tags.get("D10").unwrap().tag_type(), TagType::Sword);
///
/// let err = resolve([("D11", "WORD")]).unwrap_err();
/// assert!(err.is_configuration());
/// ```
pub fn resolve<I, K, V>(mapping: I) -> Result<TagSet>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let iter = mapping.into_iter();
    let mut tags = Vec::with_capacity(iter.size_hint().0);
    let mut seen = HashSet::new();

    for (register, type_name) in iter {
        let register = register.as_ref().trim();
        let type_name = type_name.as_ref();

        if register.is_empty() {
            return Err(RelayError::configuration(
                register,
                "register address must not be empty",
            ));
        }

        let tag_type = TagType::parse(type_name).ok_or_else(|| {
            RelayError::configuration(
                register,
                format!("unrecognized data type '{}'", type_name),
            )
        })?;

        if !seen.insert(register.to_string()) {
            return Err(RelayError::configuration(register, "duplicate register"));
        }

        tags.push(TagSpec {
            register: register.to_string(),
            tag_type,
        });
    }

    Ok(TagSet { tags })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_types_case_insensitive() {
        for t in TagType::ALL {
            assert_eq!(TagType::parse(t.name()), Some(t));
            assert_eq!(TagType::parse(&t.name().to_lowercase()), Some(t));
        }
        assert_eq!(TagType::parse(" Float "), Some(TagType::Float));
        assert_eq!(TagType::parse("sDwOrD"), Some(TagType::Sdword));
        assert_eq!(TagType::parse("WORD"), None);
        assert_eq!(TagType::parse(""), None);
    }

    #[test]
    fn test_type_widths() {
        assert_eq!(TagType::Bit.bit_width(), 1);
        assert_eq!(TagType::Uword.bit_width(), 16);
        assert_eq!(TagType::Float.bit_width(), 32);
        assert_eq!(TagType::Ulword.bit_width(), 64);
        assert!(TagType::Double.is_float());
        assert!(TagType::Slword.is_signed());
        assert!(!TagType::Udword.is_signed());
    }

    #[test]
    fn test_resolve_keeps_order() {
        let tags = resolve([
            ("SD215", "SWORD"),
            ("D10", "sword"),
            ("M0", "bit"),
        ])
        .unwrap();

        let registers: Vec<&str> = tags.iter().map(|t| t.register()).collect();
        assert_eq!(registers, vec!["SD215", "D10", "M0"]);
        assert_eq!(tags.get("M0").unwrap().tag_type(), TagType::Bit);
    }

    #[test]
    fn test_resolve_unknown_type_names_register() {
        let err = resolve([("D10", "SWORD"), ("D11", "INT")]).unwrap_err();
        match err {
            RelayError::Configuration { registry, message } => {
                assert_eq!(registry, "D11");
                assert!(message.contains("INT"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_rejects_empty_and_duplicate_registers() {
        assert!(resolve([("", "BIT")]).unwrap_err().is_configuration());
        assert!(resolve([("D10", "BIT"), ("D10", "SWORD")])
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mapping = vec![("D10".to_string(), "UDWORD".to_string())];
        let a = resolve(mapping.clone()).unwrap();
        let b = resolve(mapping).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_resolve_empty_mapping() {
        let tags = resolve(Vec::<(String, String)>::new()).unwrap();
        assert!(tags.is_empty());
    }
}
