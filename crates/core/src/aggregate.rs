//! Aggregate traits for CRM records (companies, leads, orders, groups...).

use crate::error::{DomainError, DomainResult};

/// A consistency boundary with an identity and a revision counter.
///
/// Every CRM record that is written through commands implements this. The
/// version is the number of events applied so far and backs optimistic
/// concurrency in the event store.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied to this instance (0 for a fresh record).
    fn version(&self) -> u64;
}

/// Expected stream revision when appending.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip the check (imports, migrations).
    Any,
    /// Require the stream to be at exactly this revision.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "record was modified concurrently (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

/// Decide/evolve contract for event-sourced records.
///
/// `handle` inspects the current state and returns the events a command
/// produces without touching `self`; `apply` folds one event into state.
/// Neither may perform IO.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_version_matches_only_same_revision() {
        assert!(ExpectedVersion::Exact(3).matches(3));
        assert!(!ExpectedVersion::Exact(3).matches(4));
        assert!(ExpectedVersion::Any.matches(42));
    }

    #[test]
    fn check_reports_conflict_on_mismatch() {
        match ExpectedVersion::Exact(1).check(2) {
            Err(DomainError::Conflict(msg)) => assert!(msg.contains("expected")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
