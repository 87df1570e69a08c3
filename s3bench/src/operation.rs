use std::fmt;
use std::str::FromStr;

/// One of the four benchmark phases, in the order they run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    /// Upload fresh objects.
    Write,
    /// Download every object and verify its contents.
    Read,
    /// Fetch and verify the metadata of every object.
    Stat,
    /// Delete every object.
    Remove,
}

impl OperationKind {
    /// All operations in phase order.
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Write,
        OperationKind::Read,
        OperationKind::Stat,
        OperationKind::Remove,
    ];

    /// The name used in sample and summary lines.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Write => "Write",
            OperationKind::Read => "Read",
            OperationKind::Stat => "Stat",
            OperationKind::Remove => "Remove",
        }
    }

    /// The operation running after this one, if any.
    pub fn next(self) -> Option<OperationKind> {
        match self {
            OperationKind::Write => Some(OperationKind::Read),
            OperationKind::Read => Some(OperationKind::Stat),
            OperationKind::Stat => Some(OperationKind::Remove),
            OperationKind::Remove => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown operation name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownOperation(String);

impl fmt::Display for UnknownOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"unknown operation "{}": expected one of "Write", "Read", "Stat", "Remove""#,
            self.0
        )
    }
}

impl std::error::Error for UnknownOperation {}

impl FromStr for OperationKind {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOperation(s.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_names() {
        for op in OperationKind::ALL {
            assert_eq!(op.to_string().parse::<OperationKind>(), Ok(op));
        }
        assert!("write".parse::<OperationKind>().is_err());
    }

    #[test]
    fn phases_run_in_order() {
        let mut phases = vec![OperationKind::Write];
        while let Some(next) = phases.last().and_then(|op| op.next()) {
            phases.push(next);
        }
        assert_eq!(phases, OperationKind::ALL);
    }
}
