//! Open Flags Module
//!
//! Parses the 1-2 character flag string that controls how a cache is opened.

use std::fmt;
use std::str::FromStr;

use crate::error::{CacheError, Result};

// == Existence Policy ==
/// What to do with the cache location at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Existence {
    /// `r`: open an existing cache read-only
    ReadOnly,
    /// `w`: open an existing cache read-write
    ReadWrite,
    /// `c`: open an existing cache or create one
    #[default]
    Create,
    /// `n`: always start from an empty cache
    Truncate,
}

// == Open Flags ==
/// Existence policy plus sync policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    pub existence: Existence,
    /// `s`: write every mutation through immediately instead of buffering
    pub immediate: bool,
}

impl OpenFlags {
    pub fn is_read_only(&self) -> bool {
        self.existence == Existence::ReadOnly
    }

    /// Whether opening fails when the location is absent.
    pub fn requires_existing(&self) -> bool {
        matches!(self.existence, Existence::ReadOnly | Existence::ReadWrite)
    }
}

impl FromStr for OpenFlags {
    type Err = CacheError;

    fn from_str(flag: &str) -> Result<Self> {
        let mut chars = flag.chars();

        let existence = match chars.next() {
            Some('r') => Existence::ReadOnly,
            Some('w') => Existence::ReadWrite,
            Some('c') => Existence::Create,
            Some('n') => Existence::Truncate,
            _ => {
                return Err(CacheError::Config(format!(
                    "invalid flag: '{}', first flag must be one of 'r', 'w', 'c' or 'n'",
                    flag
                )))
            }
        };

        let immediate = match (chars.next(), chars.next()) {
            (None, _) => false,
            (Some('s'), None) => true,
            _ => {
                return Err(CacheError::Config(format!(
                    "invalid flag: '{}', second flag must be 's'",
                    flag
                )))
            }
        };

        Ok(Self {
            existence,
            immediate,
        })
    }
}

impl fmt::Display for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = match self.existence {
            Existence::ReadOnly => 'r',
            Existence::ReadWrite => 'w',
            Existence::Create => 'c',
            Existence::Truncate => 'n',
        };
        write!(f, "{}", first)?;
        if self.immediate {
            write!(f, "s")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_valid_flags() {
        for flag in ["r", "w", "c", "n", "rs", "ws", "cs", "ns"] {
            let parsed: OpenFlags = flag.parse().unwrap();
            assert_eq!(parsed.to_string(), flag);
        }
    }

    #[test]
    fn test_default_is_create_buffered() {
        let flags = OpenFlags::default();
        assert_eq!(flags.existence, Existence::Create);
        assert!(!flags.immediate);
        assert_eq!(flags.to_string(), "c");
    }

    #[test]
    fn test_invalid_flags() {
        for flag in ["", "z", "rz", "css", "sc", "r "] {
            let result = flag.parse::<OpenFlags>();
            assert!(matches!(result, Err(CacheError::Config(_))), "flag {:?}", flag);
        }
    }

    #[test]
    fn test_policy_helpers() {
        let r: OpenFlags = "r".parse().unwrap();
        assert!(r.is_read_only());
        assert!(r.requires_existing());

        let w: OpenFlags = "ws".parse().unwrap();
        assert!(!w.is_read_only());
        assert!(w.requires_existing());
        assert!(w.immediate);

        let n: OpenFlags = "n".parse().unwrap();
        assert!(!n.requires_existing());
    }
}
