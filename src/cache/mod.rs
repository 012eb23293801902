//! The room cache: what this client remembers about the groups it created or
//! joined.
//!
//! Four records live in a [`KeyValueStore`]:
//!
//! | record | shape |
//! |---|---|
//! | admin codes | `{ joinCode: adminCode }` |
//! | participant codes | `{ participantId: accessCode }` |
//! | group participants | `{ joinCode: [participantId] }` |
//! | group profiles | `{ joinCode: GroupProfile }` |
//!
//! [`RoomCache`] is the only way in. Its operations keep the profile in step
//! with every credential and membership write, and [`RoomCache::forget_group`]
//! removes a group from all four records at once. Each operation holds the
//! backend lock from its first read to its last write.
//!
//! Reads never fail: a missing or malformed record reads as empty and a
//! failed write is logged, so callers only ever see lookup misses.

mod clock;
mod credentials;
mod membership;
mod profiles;
mod query;
mod records;

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::codes::normalize_code;
use crate::logging;
use crate::storage::{db_path, KeyValueStore, SqliteStore, StorageError};

pub use clock::{Clock, ManualClock, SystemClock};
pub use profiles::{GroupProfile, ParticipantProfile};
pub use query::{AdministeredGroup, ParticipantLink};
pub use records::{RecordKey, StoreChange};

use records::Records;

pub const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A participant as returned by the Groups API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: Option<String>,
    pub is_owner: bool,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.map(str::to_string),
            is_owner: false,
        }
    }

    pub fn as_owner(mut self) -> Self {
        self.is_owner = true;
        self
    }
}

/// What [`RoomCache::add_participant`] accepts: a bare id, or a full record
/// whose name and owner flag also go to the profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantRef {
    Id(String),
    Record(Participant),
}

impl ParticipantRef {
    fn id(&self) -> &str {
        match self {
            ParticipantRef::Id(id) => id,
            ParticipantRef::Record(p) => &p.id,
        }
    }
}

impl From<&str> for ParticipantRef {
    fn from(id: &str) -> Self {
        ParticipantRef::Id(id.to_string())
    }
}

impl From<String> for ParticipantRef {
    fn from(id: String) -> Self {
        ParticipantRef::Id(id)
    }
}

impl From<Participant> for ParticipantRef {
    fn from(participant: Participant) -> Self {
        ParticipantRef::Record(participant)
    }
}

impl From<&Participant> for ParticipantRef {
    fn from(participant: &Participant) -> Self {
        ParticipantRef::Record(participant.clone())
    }
}

/// Everything behind the cache lock.
struct CacheState {
    store: Box<dyn KeyValueStore>,
    /// Join codes purged by this process. Groups API results that arrive for
    /// them afterwards are dropped.
    deleted: HashSet<String>,
}

/// Process-wide handle over the persisted records. Construct once and share
/// behind an [`Arc`].
pub struct RoomCache {
    state: Mutex<CacheState>,
    clock: Arc<dyn Clock>,
    changes: broadcast::Sender<StoreChange>,
}

impl RoomCache {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(CacheState {
                store: Box::new(store),
                deleted: HashSet::new(),
            }),
            clock: Arc::new(SystemClock),
            changes,
        }
    }

    /// Open the SQLite-backed cache inside `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        Ok(Self::new(SqliteStore::open(&db_path(data_dir))?))
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Signals published after each persisted write. A receiver that lags
    /// should simply re-read everything.
    pub fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn with_state<R>(&self, f: impl FnOnce(&Records<'_>, &mut HashSet<String>) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let CacheState { store, deleted } = &mut *guard;
        let records = Records::new(&**store, &self.changes, self.clock.now_millis());
        f(&records, deleted)
    }

    fn with_records<R>(&self, f: impl FnOnce(&Records<'_>) -> R) -> R {
        self.with_state(|records, _| f(records))
    }

    // -----------------------------------------------------------------------
    // Credentials
    // -----------------------------------------------------------------------

    /// Store the admin code for a group, replacing any previous one, and
    /// refresh the group's profile (setting its name when one is given).
    pub fn remember_admin(&self, join_code: &str, admin_code: &str, name: Option<&str>) {
        if join_code.is_empty() || admin_code.is_empty() {
            return;
        }
        let join_code = normalize_code(join_code);
        self.with_records(|records| remember_admin_in(records, &join_code, admin_code, name));
    }

    pub fn get_admin(&self, join_code: &str) -> Option<String> {
        if join_code.is_empty() {
            return None;
        }
        let join_code = normalize_code(join_code);
        self.with_records(|records| credentials::admin(records, &join_code))
    }

    /// Drop the admin code after the server refused it. Membership, access
    /// codes and the profile stay: the client may still hold a participant
    /// link to the group.
    pub fn reject_admin(&self, join_code: &str) {
        if join_code.is_empty() {
            return;
        }
        let join_code = normalize_code(join_code);
        if self.with_records(|records| credentials::remove_admin(records, &join_code)) {
            crate::rlog!(
                "cache: dropped rejected admin code for {}",
                logging::join_code(&join_code)
            );
        }
    }

    pub fn remember_participant_access(&self, participant_id: &str, access_code: &str) {
        if participant_id.is_empty() || access_code.is_empty() {
            return;
        }
        self.with_records(|records| remember_access_in(records, participant_id, access_code));
    }

    pub fn get_participant_access(&self, participant_id: &str) -> Option<String> {
        if participant_id.is_empty() {
            return None;
        }
        self.with_records(|records| credentials::access(records, participant_id))
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Record that `participant` belongs to the group. Adding the same id
    /// again changes nothing but recency. A full record also updates the
    /// participant's name and, for the owner, the profile's owner id.
    pub fn add_participant(&self, join_code: &str, participant: impl Into<ParticipantRef>) {
        let participant = participant.into();
        if join_code.is_empty() || participant.id().is_empty() {
            return;
        }
        let join_code = normalize_code(join_code);
        self.with_records(|records| add_participant_in(records, &join_code, &participant));
    }

    pub fn get_participants(&self, join_code: &str) -> Vec<String> {
        if join_code.is_empty() {
            return Vec::new();
        }
        let join_code = normalize_code(join_code);
        self.with_records(|records| membership::members(records, &join_code))
    }

    // -----------------------------------------------------------------------
    // Profiles
    // -----------------------------------------------------------------------

    /// The group's profile, created empty if there was none.
    pub fn ensure_profile(&self, join_code: &str) -> Option<GroupProfile> {
        if join_code.is_empty() {
            return None;
        }
        let join_code = normalize_code(join_code);
        Some(self.with_records(|records| profiles::ensure(records, &join_code)))
    }

    /// Mark the group as just viewed, renaming it when `name` is non-empty.
    pub fn touch_group(&self, join_code: &str, name: Option<&str>) {
        if join_code.is_empty() {
            return;
        }
        let join_code = normalize_code(join_code);
        self.with_records(|records| profiles::touch_group(records, &join_code, name));
    }

    /// Upsert the participant's name and recency. When `participant.is_owner`
    /// is set it becomes the group's owner, replacing any earlier one.
    pub fn touch_participant(&self, join_code: &str, participant: &Participant) {
        if join_code.is_empty() || participant.id.is_empty() {
            return;
        }
        let join_code = normalize_code(join_code);
        self.with_records(|records| profiles::touch_participant(records, &join_code, participant));
    }

    pub fn get_profile(&self, join_code: &str) -> Option<GroupProfile> {
        if join_code.is_empty() {
            return None;
        }
        let join_code = normalize_code(join_code);
        self.with_records(|records| profiles::get(records, &join_code))
    }

    // -----------------------------------------------------------------------
    // Cascade delete
    // -----------------------------------------------------------------------

    /// Remove everything known about a group: admin code, membership, the
    /// access codes of its members, and its profile. Safe to repeat and safe
    /// on codes that were never remembered.
    ///
    /// The code stays marked as deleted for the life of this cache, so a
    /// Groups API result for it that lands afterwards is not written back.
    pub fn forget_group(&self, join_code: &str) {
        if join_code.is_empty() {
            return;
        }
        let join_code = normalize_code(join_code);
        let removed = self.with_state(|records, deleted| {
            deleted.insert(join_code.clone());
            forget_in(records, &join_code)
        });
        if let Some(participants) = removed {
            crate::rlog!(
                "cache: forgot group {} ({} participant(s))",
                logging::join_code(&join_code),
                participants
            );
        }
    }

    /// Whether [`forget_group`](Self::forget_group) ran for this code in
    /// this process.
    pub fn is_deleted(&self, join_code: &str) -> bool {
        let join_code = normalize_code(join_code);
        self.with_state(|_, deleted| deleted.contains(&join_code))
    }

    // -----------------------------------------------------------------------
    // Groups API results
    // -----------------------------------------------------------------------

    /// Apply one Groups API result for `join_code` under a single lock.
    /// Returns `false` without writing when the group was purged earlier,
    /// unless `revive` is set (the server just created it).
    pub(crate) fn record_group(
        &self,
        join_code: &str,
        revive: bool,
        f: impl FnOnce(&GroupWrite<'_>),
    ) -> bool {
        if join_code.is_empty() {
            return false;
        }
        let join_code = normalize_code(join_code);
        let applied = self.with_state(|records, deleted| {
            if revive {
                deleted.remove(&join_code);
            } else if deleted.contains(&join_code) {
                return false;
            }
            f(&GroupWrite {
                records,
                join_code: &join_code,
            });
            true
        });
        if !applied {
            crate::rlog!(
                "cache: dropped late result for deleted group {}",
                logging::join_code(&join_code)
            );
        }
        applied
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Groups with a stored admin code, most recently viewed first.
    pub fn list_administered_groups(&self) -> Vec<AdministeredGroup> {
        self.with_records(query::administered_groups)
    }

    /// Participant identities with a stored access code, most recently viewed
    /// first.
    pub fn list_participant_links(&self) -> Vec<ParticipantLink> {
        self.with_records(query::participant_links)
    }
}

/// Writes for one group, all inside the lock held by
/// [`RoomCache::record_group`].
pub(crate) struct GroupWrite<'a> {
    records: &'a Records<'a>,
    join_code: &'a str,
}

impl GroupWrite<'_> {
    pub(crate) fn remember_admin(&self, admin_code: &str, name: Option<&str>) {
        if !admin_code.is_empty() {
            remember_admin_in(self.records, self.join_code, admin_code, name);
        }
    }

    pub(crate) fn remember_participant_access(&self, participant_id: &str, access_code: &str) {
        if !participant_id.is_empty() && !access_code.is_empty() {
            remember_access_in(self.records, participant_id, access_code);
        }
    }

    pub(crate) fn add_participant(&self, participant: impl Into<ParticipantRef>) {
        let participant = participant.into();
        if !participant.id().is_empty() {
            add_participant_in(self.records, self.join_code, &participant);
        }
    }
}

// Composite operations below take an already normalized join code.

fn remember_admin_in(
    records: &Records<'_>,
    join_code: &str,
    admin_code: &str,
    name: Option<&str>,
) {
    let admin_code = normalize_code(admin_code);
    credentials::set_admin(records, join_code, &admin_code);
    profiles::touch_group(records, join_code, name);
    crate::rlog!(
        "cache: remembered admin code {} for {}",
        logging::secret(&admin_code),
        logging::join_code(join_code)
    );
}

fn remember_access_in(records: &Records<'_>, participant_id: &str, access_code: &str) {
    credentials::set_access(records, participant_id, &normalize_code(access_code));
}

fn add_participant_in(records: &Records<'_>, join_code: &str, participant: &ParticipantRef) {
    profiles::ensure(records, join_code);
    membership::insert(records, join_code, participant.id());
    if let ParticipantRef::Record(record) = participant {
        profiles::touch_participant(records, join_code, record);
    }
    profiles::touch_group(records, join_code, None);
}

/// Returns the number of member ids dropped, or `None` when nothing was
/// stored for the group.
fn forget_in(records: &Records<'_>, join_code: &str) -> Option<usize> {
    let participant_ids = membership::take(records, join_code);
    let codes_removed = credentials::remove_access(records, &participant_ids);
    let admin_removed = credentials::remove_admin(records, join_code);
    let profile_removed = profiles::remove(records, join_code);
    let any = !participant_ids.is_empty() || codes_removed > 0 || admin_removed || profile_removed;
    any.then_some(participant_ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn test_cache() -> (RoomCache, ManualClock) {
        let clock = ManualClock::new(1_000);
        let cache = RoomCache::new(MemoryStore::new()).with_clock(clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_admin_round_trip_any_casing() {
        let (cache, _) = test_cache();
        cache.remember_admin("abc123", "adm1n", None);
        assert_eq!(cache.get_admin("ABC123").as_deref(), Some("ADM1N"));
        assert_eq!(cache.get_admin("abc123").as_deref(), Some("ADM1N"));
    }

    #[test]
    fn test_remember_admin_touches_profile() {
        let (cache, _) = test_cache();
        cache.remember_admin("abc", "x", Some("Navidad"));
        let profile = cache.get_profile("ABC").unwrap();
        assert_eq!(profile.name.as_deref(), Some("Navidad"));
        assert_eq!(profile.last_viewed_at, Some(1_000));
    }

    #[test]
    fn test_empty_inputs_write_nothing() {
        let (cache, _) = test_cache();
        cache.remember_admin("", "X", None);
        cache.remember_admin("ABC", "", None);
        cache.remember_participant_access("", "X");
        cache.add_participant("", "p1");
        cache.add_participant("ABC", "");
        assert!(cache.get_admin("ABC").is_none());
        assert!(cache.get_profile("ABC").is_none());
        assert!(cache.get_participant_access("").is_none());
        assert!(cache.ensure_profile("").is_none());
    }

    #[test]
    fn test_add_participant_ensures_profile_first() {
        let (cache, _) = test_cache();
        cache.add_participant("xyz", "p1");
        assert_eq!(cache.get_participants("XYZ"), vec!["p1"]);
        let profile = cache.get_profile("XYZ").unwrap();
        assert!(profile.participants.is_empty());
        assert_eq!(profile.last_viewed_at, Some(1_000));
    }

    #[test]
    fn test_owner_is_last_writer() {
        let (cache, _) = test_cache();
        cache.add_participant("ABC", Participant::new("p1", Some("Ana")).as_owner());
        cache.add_participant("ABC", Participant::new("p2", Some("Beto")).as_owner());
        let profile = cache.get_profile("ABC").unwrap();
        assert_eq!(profile.owner_participant_id.as_deref(), Some("p2"));
        assert_eq!(cache.get_participants("ABC"), vec!["p1", "p2"]);
    }

    #[test]
    fn test_reject_admin_keeps_participant_link() {
        let (cache, _) = test_cache();
        cache.remember_admin("ABC", "ADM", None);
        cache.remember_participant_access("p1", "acc");
        cache.add_participant("ABC", "p1");

        cache.reject_admin("abc");
        assert!(cache.get_admin("ABC").is_none());
        assert!(cache.list_administered_groups().is_empty());
        assert_eq!(cache.list_participant_links().len(), 1);
    }

    #[test]
    fn test_changes_are_published() {
        let (cache, _) = test_cache();
        let mut rx = cache.changes();
        cache.remember_participant_access("p1", "acc");
        let change = rx.try_recv().unwrap();
        assert_eq!(change.key, RecordKey::ParticipantCodes);
    }

    #[test]
    fn test_forget_unknown_group_publishes_nothing() {
        let (cache, _) = test_cache();
        let mut rx = cache.changes();
        cache.forget_group("NOPE");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cache_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RoomCache>();
    }
}
