//! MQTT topic filters
//!
//! Filters follow MQTT 3.1.1 rules: `+` matches exactly one level and must
//! occupy a whole level, `#` matches the remaining levels and must be the
//! last level.

use crate::defaults;
use std::fmt;
use thiserror::Error;

/// Errors produced when validating a topic filter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    #[error("Topic filter is empty")]
    Empty,

    #[error("Topic filter contains a NUL character: {0:?}")]
    NulCharacter(String),

    #[error("Invalid wildcard placement in topic filter: {0}")]
    InvalidWildcard(String),
}

/// A validated topic filter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicFilter(String);

impl TopicFilter {
    /// Validate and wrap a filter string
    pub fn new(filter: impl Into<String>) -> Result<Self, TopicError> {
        let filter = filter.into();

        if filter.is_empty() {
            return Err(TopicError::Empty);
        }
        if filter.contains('\0') {
            return Err(TopicError::NulCharacter(filter));
        }

        let levels: Vec<&str> = filter.split('/').collect();
        for (i, level) in levels.iter().enumerate() {
            let is_last = i == levels.len() - 1;
            if level.contains('#') && (*level != "#" || !is_last) {
                return Err(TopicError::InvalidWildcard(filter));
            }
            if level.contains('+') && *level != "+" {
                return Err(TopicError::InvalidWildcard(filter));
            }
        }

        Ok(Self(filter))
    }

    /// Filter addressing every monitor: `home/monitors/all`
    pub fn broadcast() -> Self {
        Self(format!("{}/{}", defaults::TOPIC_PREFIX, defaults::BROADCAST_LEVEL))
    }

    /// Filter addressing a single host: `home/monitors/<hostname>`
    pub fn for_host(hostname: &str) -> Result<Self, TopicError> {
        Self::new(format!("{}/{}", defaults::TOPIC_PREFIX, hostname))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether a concrete topic name is matched by this filter
    pub fn matches(&self, topic: &str) -> bool {
        let mut filter_levels = self.0.split('/');
        let mut topic_levels = topic.split('/');

        // Wildcards at the first level never match `$`-prefixed system topics
        if topic.starts_with('$') && (self.0.starts_with('+') || self.0.starts_with('#')) {
            return false;
        }

        loop {
            match (filter_levels.next(), topic_levels.next()) {
                (Some("#"), _) => return true,
                (Some("+"), Some(_)) => {}
                (Some(f), Some(t)) if f == t => {}
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TopicFilter {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filters() {
        assert_eq!(TopicFilter::broadcast().as_str(), "home/monitors/all");
        assert_eq!(
            TopicFilter::for_host("desk-01").unwrap().as_str(),
            "home/monitors/desk-01"
        );
    }

    #[test]
    fn test_validation() {
        assert_eq!(TopicFilter::new(""), Err(TopicError::Empty));
        assert!(matches!(TopicFilter::new("a\0b"), Err(TopicError::NulCharacter(_))));
        assert!(matches!(TopicFilter::new("a/#/b"), Err(TopicError::InvalidWildcard(_))));
        assert!(matches!(TopicFilter::new("a/b#"), Err(TopicError::InvalidWildcard(_))));
        assert!(matches!(TopicFilter::new("a/b+/c"), Err(TopicError::InvalidWildcard(_))));

        assert!(TopicFilter::new("home/monitors/#").is_ok());
        assert!(TopicFilter::new("home/+/all").is_ok());
        assert!(TopicFilter::new("#").is_ok());
    }

    #[test]
    fn test_exact_match() {
        let filter = TopicFilter::broadcast();
        assert!(filter.matches("home/monitors/all"));
        assert!(!filter.matches("home/monitors/all/extra"));
        assert!(!filter.matches("home/monitors"));
        assert!(!filter.matches("home/monitors/desk-01"));
    }

    #[test]
    fn test_wildcard_match() {
        let single = TopicFilter::new("home/+/all").unwrap();
        assert!(single.matches("home/monitors/all"));
        assert!(!single.matches("home/monitors/desk/all"));

        let multi = TopicFilter::new("home/monitors/#").unwrap();
        assert!(multi.matches("home/monitors/all"));
        assert!(multi.matches("home/monitors/desk/01"));
        assert!(multi.matches("home/monitors"));

        let everything = TopicFilter::new("#").unwrap();
        assert!(everything.matches("home/monitors/all"));
        assert!(!everything.matches("$SYS/broker/uptime"));
    }
}
