use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReportError;

/// A `(name, value)` label attached to results, metrics sets, experiments,
/// variants and mutations. Two tags are equal when both parts are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.value)
    }
}

/// Parses `name:value` (or `name=value`). The value may itself contain
/// separators; only the first one splits.
impl FromStr for Tag {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s.find([':', '=']).ok_or_else(|| {
            ReportError::InvalidInput(format!("tag '{s}' is not of the form name:value"))
        })?;

        let (name, value) = (s[..split].trim(), s[split + 1..].trim());
        if name.is_empty() {
            return Err(ReportError::InvalidInput(format!("tag '{s}' has an empty name")));
        }

        Ok(Self::new(name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let tag = Tag::new("region", "eu-west-1");
        assert_eq!(tag.to_string(), "region:eu-west-1");

        let parsed: Tag = "region:eu-west-1".parse().unwrap();
        assert_eq!(parsed, tag);

        let parsed: Tag = "url = http://localhost:8080".parse().unwrap();
        assert_eq!(parsed.name, "url");
        assert_eq!(parsed.value, "http://localhost:8080");
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        assert!("nocolon".parse::<Tag>().is_err());
        assert!(":value".parse::<Tag>().is_err());
    }

    #[test]
    fn test_equality_uses_both_parts() {
        assert_ne!(Tag::new("env", "prod"), Tag::new("env", "staging"));
        assert_eq!(Tag::new("env", "prod"), Tag::new("env", "prod"));
    }
}
