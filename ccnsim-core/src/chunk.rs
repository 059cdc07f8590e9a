use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a content object (its rank in the catalog, starting at 1)
pub type ObjectName = u32;

/// Index of a chunk inside its object, starting at 0
pub type ChunkNumber = u32;

const NAME_SHIFT: u32 = 32;
const NUMBER_MASK: u64 = 0x0000_0000_FFFF_FFFF;

/// Identity of one chunk of a named object.
///
/// The object name occupies the upper 32 bits and the chunk number the lower
/// 32 bits, so the natural `u64` order sorts by object first and chunk second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(u64);

impl ChunkId {
    /// Build the identifier of chunk `number` of object `name`
    pub const fn new(name: ObjectName, number: ChunkNumber) -> Self {
        Self(((name as u64) << NAME_SHIFT) | number as u64)
    }

    /// Rebuild an identifier from its packed representation
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Packed representation
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Object this chunk belongs to
    pub const fn name(self) -> ObjectName {
        (self.0 >> NAME_SHIFT) as ObjectName
    }

    /// Position of this chunk inside its object
    pub const fn number(self) -> ChunkNumber {
        (self.0 & NUMBER_MASK) as ChunkNumber
    }

    /// Same object, different chunk
    pub const fn with_number(self, number: ChunkNumber) -> Self {
        Self::new(self.name(), number)
    }

    /// The following chunk of the same object, if the chunk counter does not overflow
    pub fn next_chunk(self) -> Option<Self> {
        self.number().checked_add(1).map(|n| self.with_number(n))
    }
}

impl From<ChunkId> for u64 {
    fn from(id: ChunkId) -> Self {
        id.raw()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name(), self.number())
    }
}

/// Errors produced when parsing the textual `object/chunk` form
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkIdParseError {
    #[error("Missing '/' separator in chunk id: {0}")]
    MissingSeparator(String),
    #[error("Invalid object name: {0}")]
    InvalidName(String),
    #[error("Invalid chunk number: {0}")]
    InvalidNumber(String),
}

impl FromStr for ChunkId {
    type Err = ChunkIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, number) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| ChunkIdParseError::MissingSeparator(s.to_string()))?;

        let name = name
            .parse::<ObjectName>()
            .map_err(|_| ChunkIdParseError::InvalidName(name.to_string()))?;
        let number = number
            .parse::<ChunkNumber>()
            .map_err(|_| ChunkIdParseError::InvalidNumber(number.to_string()))?;

        Ok(Self::new(name, number))
    }
}
