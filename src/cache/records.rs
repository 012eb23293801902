//! The four persisted records and the lenient read/write path over a
//! [`KeyValueStore`].

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use super::profiles::GroupProfile;
use crate::storage::{KeyValueStore, StorageError};

/// Top-level keys of the persisted key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    AdminCodes,
    ParticipantCodes,
    GroupParticipants,
    GroupProfiles,
}

impl RecordKey {
    pub const ALL: [RecordKey; 4] = [
        RecordKey::AdminCodes,
        RecordKey::ParticipantCodes,
        RecordKey::GroupParticipants,
        RecordKey::GroupProfiles,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKey::AdminCodes => "secret-santa-admin-codes",
            RecordKey::ParticipantCodes => "secret-santa-participant-codes",
            RecordKey::GroupParticipants => "secret-santa-group-participants",
            RecordKey::GroupProfiles => "secret-santa-group-profiles",
        }
    }
}

/// Published after every successful write. Receivers treat it as a signal to
/// re-read; nothing orders it relative to their own reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreChange {
    pub key: RecordKey,
}

/// `joinCode → adminCode` and `participantId → accessCode`.
pub(super) type CodeMap = BTreeMap<String, String>;
/// `joinCode → [participantId]`, no duplicates.
pub(super) type MembershipMap = BTreeMap<String, Vec<String>>;
/// `joinCode → profile`.
pub(super) type ProfileMap = BTreeMap<String, GroupProfile>;

/// Borrowed view over the backend for the duration of one cache operation.
pub(super) struct Records<'a> {
    store: &'a dyn KeyValueStore,
    changes: &'a broadcast::Sender<StoreChange>,
    pub(super) now: u64,
}

impl<'a> Records<'a> {
    pub(super) fn new(
        store: &'a dyn KeyValueStore,
        changes: &'a broadcast::Sender<StoreChange>,
        now: u64,
    ) -> Self {
        Self {
            store,
            changes,
            now,
        }
    }

    /// Read a record. Missing, unreadable or malformed records all read as
    /// empty; the latter two are logged.
    pub(super) fn read<T: DeserializeOwned + Default>(&self, key: RecordKey) -> T {
        let raw = match self.store.get_item(key.as_str()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(e) => {
                crate::rlog!("warning: could not read {}: {}", key.as_str(), e);
                return T::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                crate::rlog!(
                    "warning: ignoring malformed {} ({}), treating it as empty",
                    key.as_str(),
                    e
                );
                T::default()
            }
        }
    }

    /// Persist a record. A failed write is logged and otherwise swallowed;
    /// later reads show whatever the backend kept.
    pub(super) fn write<T: Serialize>(&self, key: RecordKey, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(StorageError::from)
            .and_then(|raw| self.store.set_item(key.as_str(), &raw));
        match result {
            Ok(()) => {
                // No receivers is the common case.
                let _ = self.changes.send(StoreChange { key });
            }
            Err(e) => crate::rlog!("warning: could not write {}: {}", key.as_str(), e),
        }
    }
}
