//! Observable state of one synchronized collection.

use std::fmt;

/// Coarse controller state. Syncing and mutating may overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    Mutating,
    SyncingAndMutating,
    /// An auth failure ended the session scope; re-authenticate to resume.
    SessionExpired,
}

impl SyncState {
    pub(crate) const fn from_activity(syncing: bool, mutating: bool) -> Self {
        match (syncing, mutating) {
            (false, false) => Self::Idle,
            (true, false) => Self::Syncing,
            (false, true) => Self::Mutating,
            (true, true) => Self::SyncingAndMutating,
        }
    }

    pub const fn is_syncing(self) -> bool {
        matches!(self, Self::Syncing | Self::SyncingAndMutating)
    }

    pub const fn is_mutating(self) -> bool {
        matches!(self, Self::Mutating | Self::SyncingAndMutating)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Mutating => "mutating",
            Self::SyncingAndMutating => "syncing, mutating",
            Self::SessionExpired => "session expired",
        })
    }
}
