use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

/// Upper bound on dotted components ("major.minor.build.revision").
const MAX_DOTTED_PARTS: usize = 4;

/// How version text is read and compared.
///
/// - `Dotted`: two to four numeric components separated by dots ("4.10")
/// - `Integer`: a single non-negative number ("42")
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VersionScheme {
    #[default]
    Dotted,
    Integer,
}

impl VersionScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dotted => "dotted",
            Self::Integer => "integer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dotted" => Some(Self::Dotted),
            "integer" => Some(Self::Integer),
            _ => None,
        }
    }

    /// Parse version text according to this scheme.
    pub fn parse(&self, text: &str) -> Result<Version> {
        let trimmed = text.trim();
        let parts = match self {
            Self::Dotted => parse_dotted(trimmed),
            Self::Integer => parse_number(trimmed).map(|n| vec![n]),
        }
        .ok_or_else(|| Error::InvalidVersionFormat(text.to_string()))?;

        Ok(Version {
            scheme: *self,
            parts,
            text: trimmed.to_string(),
        })
    }
}

fn parse_number(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_dotted(s: &str) -> Option<Vec<u64>> {
    let parts = s.split('.').map(parse_number).collect::<Option<Vec<_>>>()?;
    (2..=MAX_DOTTED_PARTS).contains(&parts.len()).then_some(parts)
}

/// A comparable database version.
///
/// Ordering and equality are numeric and component-wise: "4.9" < "4.10", and
/// "1.0" == "1.0.0" because missing components count as zero. The original
/// text is kept for display and persistence.
#[derive(Debug, Clone)]
pub struct Version {
    scheme: VersionScheme,
    parts: Vec<u64>,
    text: String,
}

impl Version {
    pub fn scheme(&self) -> VersionScheme {
        self.scheme
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Components without trailing zeros, the canonical form for equality.
    fn significant_parts(&self) -> &[u64] {
        let len = self
            .parts
            .iter()
            .rposition(|&p| p != 0)
            .map_or(0, |i| i + 1);
        &self.parts[..len]
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| {
                let a = self.parts.get(i).copied().unwrap_or(0);
                let b = other.parts.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant_parts().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}
