//! Entrant record: one person in the line, waiting or already passed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entrant identity. Assigned by the store at creation and never reused.
pub type EntrantId = i64;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Waiting,
    Passed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Waiting => "waiting",
            Status::Passed => "passed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Status::Waiting),
            "passed" => Ok(Status::Passed),
            other => Err(anyhow::anyhow!("unknown entrant status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrant {
    pub id: EntrantId,
    pub name: String,
    pub status: Status,
    /// 1-based rank; `Some` exactly when `status` is `Waiting`.
    pub position: Option<u32>,
    pub added_at: DateTime<Utc>,
    pub passed_at: Option<DateTime<Utc>>,
    /// Insertion order into the passed list. Timestamps can collide, this can't.
    #[serde(default)]
    pub passed_seq: Option<u64>,
}

impl Entrant {
    pub fn is_waiting(&self) -> bool {
        self.status == Status::Waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_its_own_labels() {
        for s in [Status::Waiting, Status::Passed] {
            assert_eq!(s.as_str().parse::<Status>().unwrap(), s);
        }
        assert!("deleted".parse::<Status>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Status::Waiting).unwrap(),
            "\"waiting\""
        );
        let s: Status = serde_json::from_str("\"passed\"").unwrap();
        assert_eq!(s, Status::Passed);
    }
}
