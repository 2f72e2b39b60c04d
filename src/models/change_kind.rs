use std::fmt;
use std::str::FromStr;

use crate::error::ResolinkError;

/// Operation kind carried by a change message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A record was inserted at the message's target index.
    Added,

    /// A record was replaced; its position may move to the target index.
    Changed,

    /// A record was removed, matched by its primary-key field.
    Removed,
}

impl FromStr for ChangeKind {
    type Err = ResolinkError;

    /// Parse the wire value of the `msg` field.
    ///
    /// Any other value indicates a client/server protocol mismatch and is
    /// rejected loudly rather than ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(Self::Added),
            "changed" => Ok(Self::Changed),
            "removed" => Ok(Self::Removed),
            other => Err(ResolinkError::ProtocolError(format!(
                "Unknown change operation '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds() {
        assert_eq!("added".parse::<ChangeKind>().unwrap(), ChangeKind::Added);
        assert_eq!("changed".parse::<ChangeKind>().unwrap(), ChangeKind::Changed);
        assert_eq!("removed".parse::<ChangeKind>().unwrap(), ChangeKind::Removed);
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = "upserted".parse::<ChangeKind>().unwrap_err();
        assert!(matches!(err, ResolinkError::ProtocolError(_)));
    }
}
