use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which way a migration is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Progressive form used in operator-facing messages.
    pub fn verb(self) -> &'static str {
        match self {
            Direction::Up => "applying",
            Direction::Down => "reverting",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Lifecycle of a single migration attempt.
///
/// ```text
/// Unapplied --begin(Up)--> Applying --succeed--> Applied
/// Applied --begin(Down)--> Reverting --succeed--> Unapplied
/// Applying | Reverting --fail--> Failed
/// ```
///
/// `Failed` is terminal for the attempt. Nothing moves out of it; the
/// operator decides whether to revert before trying again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Unapplied,
    Applying,
    Applied,
    Reverting,
    Failed,
}

impl MigrationState {
    pub fn begin(self, direction: Direction) -> Result<Self> {
        match (self, direction) {
            (MigrationState::Unapplied, Direction::Up) => Ok(MigrationState::Applying),
            (MigrationState::Applied, Direction::Down) => Ok(MigrationState::Reverting),
            (from, direction) => Err(Error::InvalidTransition {
                from: from.to_string(),
                event: format!("begin {direction}"),
            }),
        }
    }

    pub fn succeed(self) -> Result<Self> {
        match self {
            MigrationState::Applying => Ok(MigrationState::Applied),
            MigrationState::Reverting => Ok(MigrationState::Unapplied),
            from => Err(Error::InvalidTransition {
                from: from.to_string(),
                event: "succeed".into(),
            }),
        }
    }

    pub fn fail(self) -> Result<Self> {
        match self {
            MigrationState::Applying | MigrationState::Reverting => Ok(MigrationState::Failed),
            from => Err(Error::InvalidTransition {
                from: from.to_string(),
                event: "fail".into(),
            }),
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationState::Unapplied => "unapplied",
            MigrationState::Applying => "applying",
            MigrationState::Applied => "applied",
            MigrationState::Reverting => "reverting",
            MigrationState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_then_revert_cycle() {
        let s = MigrationState::Unapplied.begin(Direction::Up).unwrap();
        assert_eq!(s, MigrationState::Applying);
        let s = s.succeed().unwrap();
        assert_eq!(s, MigrationState::Applied);
        let s = s.begin(Direction::Down).unwrap();
        assert_eq!(s, MigrationState::Reverting);
        assert_eq!(s.succeed().unwrap(), MigrationState::Unapplied);
    }

    #[test]
    fn failure_is_terminal() {
        let failed = MigrationState::Applying.fail().unwrap();
        assert_eq!(failed, MigrationState::Failed);
        assert!(failed.begin(Direction::Up).is_err());
        assert!(failed.begin(Direction::Down).is_err());
        assert!(failed.succeed().is_err());
        assert!(failed.fail().is_err());
    }

    #[test]
    fn rejects_out_of_order_begin() {
        let err = MigrationState::Applied.begin(Direction::Up).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid migration state transition: cannot begin applying from applied"
        );
        assert!(MigrationState::Unapplied.begin(Direction::Down).is_err());
    }

    #[test]
    fn direction_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Direction::Up).unwrap(), r#""up""#);
        assert_eq!(
            serde_json::to_string(&MigrationState::Applied).unwrap(),
            r#""applied""#
        );
    }
}
