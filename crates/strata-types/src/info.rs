use std::fmt;

use serde::{Deserialize, Serialize};

/// Metadata recorded with every commit: who, when, and why.
///
/// `date` is seconds since the UNIX epoch. It orders commits in
/// last-modified searches, so producers should use a monotonic-enough clock.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Info {
    pub author: String,
    pub date: i64,
    pub message: String,
}

impl Info {
    /// Create info with an explicit date.
    pub fn new(author: impl Into<String>, date: i64, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            date,
            message: message.into(),
        }
    }

    /// Create info stamped with the current wall-clock time.
    pub fn now(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(author, chrono::Utc::now().timestamp(), message)
    }

    /// Info with no author, a zero date and no message.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The commit date as a UTC timestamp, if representable.
    pub fn datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp(self.date, 0)
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>: {}", self.date, self.author, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_after_2020() {
        let info = Info::now("alice", "init");
        assert!(info.date > 1_577_836_800);
        assert_eq!(info.author, "alice");
        assert_eq!(info.message, "init");
    }

    #[test]
    fn datetime_matches_date() {
        let info = Info::new("bob", 86_400, "a day later");
        assert_eq!(info.datetime().unwrap().timestamp(), 86_400);
    }

    #[test]
    fn display_format() {
        let info = Info::new("carol", 42, "fix");
        assert_eq!(info.to_string(), "42 <carol>: fix");
    }

    #[test]
    fn serde_roundtrip() {
        let info = Info::new("dave", 7, "msg");
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(serde_json::from_str::<Info>(&json).unwrap(), info);
    }
}
