use std::fmt;
use std::str::FromStr;

use crate::error::FabricError;
use crate::event::{Category, FabricEvent};

/// Subscription pattern, parsed once at subscribe time.
///
/// | Input | Pattern |
/// |---|---|
/// | `*`, `*.*` | [`Pattern::Wildcard`] |
/// | `ledger`, `ledger.*` | [`Pattern::Category`] |
/// | `*.entry.appended` | [`Pattern::TypeWildcard`] |
/// | `ledger.entry.appended` | [`Pattern::Exact`] |
///
/// The first dot separates the category from the type; the type may
/// contain further dots.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Pattern {
    Wildcard,
    Category(Category),
    TypeWildcard(String),
    Exact(Category, String),
}

impl Pattern {
    pub fn parse(input: &str) -> Result<Self, FabricError> {
        let invalid = || FabricError::InvalidPattern(input.to_string());
        let (head, tail) = match input.split_once('.') {
            Some((head, tail)) => (head, Some(tail)),
            None => (input, None),
        };
        match (head, tail) {
            ("*", None) | ("*", Some("*")) => Ok(Self::Wildcard),
            ("*", Some(ty)) if valid_type(ty) => Ok(Self::TypeWildcard(ty.to_string())),
            (cat, None) | (cat, Some("*")) => {
                let category = cat.parse::<Category>().map_err(|_| invalid())?;
                Ok(Self::Category(category))
            }
            (cat, Some(ty)) if valid_type(ty) => {
                let category = cat.parse::<Category>().map_err(|_| invalid())?;
                Ok(Self::Exact(category, ty.to_string()))
            }
            _ => Err(invalid()),
        }
    }

    pub fn matches(&self, event: &FabricEvent) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Category(category) => *category == event.category(),
            Self::TypeWildcard(ty) => ty == event.event_type(),
            Self::Exact(category, ty) => {
                *category == event.category() && ty == event.event_type()
            }
        }
    }
}

/// Types are non-empty, contain no wildcard, and have no empty segments.
fn valid_type(ty: &str) -> bool {
    !ty.is_empty() && !ty.contains('*') && ty.split('.').all(|seg| !seg.is_empty())
}

impl FromStr for Pattern {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => f.write_str("*"),
            Self::Category(category) => write!(f, "{category}.*"),
            Self::TypeWildcard(ty) => write!(f, "*.{ty}"),
            Self::Exact(category, ty) => write!(f, "{category}.{ty}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_form() {
        assert_eq!(Pattern::parse("*").unwrap(), Pattern::Wildcard);
        assert_eq!(Pattern::parse("*.*").unwrap(), Pattern::Wildcard);
        assert_eq!(
            Pattern::parse("ledger").unwrap(),
            Pattern::Category(Category::Ledger)
        );
        assert_eq!(
            Pattern::parse("ledger.*").unwrap(),
            Pattern::Category(Category::Ledger)
        );
        assert_eq!(
            Pattern::parse("*.booted").unwrap(),
            Pattern::TypeWildcard("booted".into())
        );
        assert_eq!(
            Pattern::parse("ledger.entry.appended").unwrap(),
            Pattern::Exact(Category::Ledger, "entry.appended".into())
        );
        assert_eq!(
            Pattern::parse("reputation-scoring.updated").unwrap(),
            Pattern::Exact(Category::ReputationScoring, "updated".into())
        );
    }

    #[test]
    fn rejects_malformed_patterns() {
        for bad in ["", "bogus", "bogus.x", "ledger.", "ledger..x", "*.a*", "ledger.*.x", "**"] {
            assert_eq!(
                Pattern::parse(bad),
                Err(FabricError::InvalidPattern(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_round_trips() {
        for input in ["*", "kernel.*", "*.booted", "kernel.transaction.pre"] {
            let pattern = Pattern::parse(input).unwrap();
            assert_eq!(Pattern::parse(&pattern.to_string()).unwrap(), pattern);
        }
    }
}
