//! Integration tests for the realtime subscription lifecycle and for
//! reconciling inbound group events with the cache.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::mpsc;

use santa_rooms::cache::{ManualClock, Participant, RecordKey, RoomCache};
use santa_rooms::groups::{GroupDetails, ParticipantRecord};
use santa_rooms::realtime::{
    Frame, GroupEvent, GroupSubscription, RealtimeChannel, SubscriptionState, GROUP_DELETED,
    JOIN_EVENT, LEAVE_EVENT,
};
use santa_rooms::reconcile::{watch_group, GroupEventAction, WatchOutcome};
use santa_rooms::storage::{KeyValueStore, MemoryStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Records every outbound frame instead of sending it anywhere.
#[derive(Default)]
struct RecordingChannel {
    frames: Mutex<Vec<Frame>>,
}

impl RealtimeChannel for RecordingChannel {
    fn emit(&self, event: &str, payload: Value) {
        self.frames.lock().unwrap().push(Frame {
            event: event.to_string(),
            data: payload,
        });
    }
}

impl RecordingChannel {
    fn sent(&self) -> Vec<(String, String)> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|f| {
                (
                    f.event.clone(),
                    f.data["code"].as_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}

fn join(code: &str) -> (String, String) {
    (JOIN_EVENT.to_string(), code.to_string())
}

fn leave(code: &str) -> (String, String) {
    (LEAVE_EVENT.to_string(), code.to_string())
}

fn seeded_cache(store: MemoryStore) -> RoomCache {
    let cache = RoomCache::new(store).with_clock(ManualClock::new(7_000));
    cache.remember_admin("xmas", "adm", Some("Navidad"));
    cache.remember_participant_access("p-host", "acc-host");
    cache.add_participant("xmas", Participant::new("p-host", Some("Ana")).as_owner());
    cache.remember_participant_access("p-other", "acc-other");
    cache.add_participant("other", Participant::new("p-other", Some("Beto")));
    cache
}

fn snapshot(store: &MemoryStore) -> Vec<Option<String>> {
    RecordKey::ALL
        .iter()
        .map(|key| store.get_item(key.as_str()).unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// Subscription lifecycle
// ---------------------------------------------------------------------------

#[test]
fn join_and_leave_are_paired() {
    let channel = Arc::new(RecordingChannel::default());
    let mut sub = GroupSubscription::new(channel.clone(), |_| {});

    sub.acquire("abc");
    assert_eq!(
        sub.state(),
        &SubscriptionState::Joined {
            code: "ABC".to_string()
        }
    );
    sub.release();
    sub.release();
    assert_eq!(sub.state(), &SubscriptionState::Idle);

    assert_eq!(channel.sent(), vec![join("ABC"), leave("ABC")]);
}

#[test]
fn switching_codes_leaves_the_previous_group_first() {
    let channel = Arc::new(RecordingChannel::default());
    let mut sub = GroupSubscription::new(channel.clone(), |_| {});

    sub.acquire("one");
    sub.acquire("two");
    sub.acquire("");

    assert_eq!(
        channel.sent(),
        vec![join("ONE"), leave("ONE"), join("TWO"), leave("TWO")]
    );
    assert_eq!(sub.code(), None);
}

#[test]
fn drop_releases_the_join() {
    let channel = Arc::new(RecordingChannel::default());
    {
        let mut sub = GroupSubscription::new(channel.clone(), |_| {});
        sub.acquire("abc");
    }
    assert_eq!(channel.sent(), vec![join("ABC"), leave("ABC")]);
}

#[test]
fn panic_while_joined_still_leaves() {
    let channel = Arc::new(RecordingChannel::default());
    let inner = channel.clone();
    let result = std::panic::catch_unwind(move || {
        let mut sub = GroupSubscription::new(inner, |_| {});
        sub.acquire("abc");
        panic!("consumer failed");
    });
    assert!(result.is_err());
    assert_eq!(channel.sent(), vec![join("ABC"), leave("ABC")]);
}

#[test]
fn only_named_events_reach_the_handler_while_joined() {
    let channel = Arc::new(RecordingChannel::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut sub = GroupSubscription::new(channel, move |event: &GroupEvent| {
        sink.lock().unwrap().push(event.clone());
    });

    // Idle: dropped.
    assert!(!sub.deliver(&GroupEvent::named("group:updated")));

    sub.acquire("abc");
    let mut detailed = GroupEvent::named("future:event");
    detailed.extra.insert("detail".to_string(), json!({ "n": 3 }));
    assert!(sub.deliver(&detailed));
    assert!(!sub.deliver(&GroupEvent::default()));

    sub.release();
    assert!(!sub.deliver(&GroupEvent::named("group:updated")));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], detailed);
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[test]
fn deleted_event_matches_explicit_forget() {
    let explicit_store = MemoryStore::new();
    let explicit = seeded_cache(explicit_store.clone());
    explicit.forget_group("XMAS");

    let realtime_store = MemoryStore::new();
    let realtime = seeded_cache(realtime_store.clone());
    let action = realtime.apply_group_event("xmas", &GroupEvent::named(GROUP_DELETED));

    assert_eq!(action, GroupEventAction::Purge);
    assert_eq!(snapshot(&explicit_store), snapshot(&realtime_store));
    assert!(realtime.get_admin("XMAS").is_none());
    assert_eq!(realtime.list_participant_links().len(), 1);
}

#[test]
fn other_events_leave_the_cache_alone() {
    let store = MemoryStore::new();
    let cache = seeded_cache(store.clone());
    let before = snapshot(&store);

    let action = cache.apply_group_event("xmas", &GroupEvent::named("group:assignments"));

    assert_eq!(action, GroupEventAction::Refresh);
    assert_eq!(snapshot(&store), before);
}

fn loaded_details() -> GroupDetails {
    GroupDetails {
        name: Some("Navidad".to_string()),
        owner_participant_id: Some("p1".to_string()),
        participants: vec![ParticipantRecord {
            id: "p1".to_string(),
            name: Some("Ana".to_string()),
        }],
    }
}

#[test]
fn load_completing_after_realtime_delete_stays_purged() {
    let cache = RoomCache::new(MemoryStore::new());
    cache.remember_admin("abc", "adm", None);

    cache.apply_group_event("abc", &GroupEvent::named(GROUP_DELETED));
    let applied = cache.record_loaded_group("abc", "adm", &loaded_details());

    assert!(!applied);
    assert!(cache.get_admin("ABC").is_none());
    assert!(cache.get_profile("ABC").is_none());
    assert!(cache.get_participants("ABC").is_empty());
}

#[test]
fn delete_racing_loads_on_another_thread_ends_purged() {
    let cache = Arc::new(RoomCache::new(MemoryStore::new()));
    cache.remember_participant_access("p1", "acc");
    cache.record_loaded_group("race", "adm", &loaded_details());

    let loader = {
        let cache = Arc::clone(&cache);
        std::thread::spawn(move || {
            let details = loaded_details();
            for _ in 0..200 {
                cache.record_loaded_group("race", "adm", &details);
            }
        })
    };
    cache.apply_group_event("race", &GroupEvent::named(GROUP_DELETED));
    loader.join().unwrap();

    assert!(cache.get_admin("RACE").is_none());
    assert!(cache.get_profile("RACE").is_none());
    assert!(cache.get_participants("RACE").is_empty());
    assert!(cache.get_participant_access("p1").is_none());
}

#[tokio::test]
async fn watch_purges_and_stops_on_delete() {
    let store = MemoryStore::new();
    let cache = Arc::new(seeded_cache(store.clone()));
    let channel = Arc::new(RecordingChannel::default());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    events_tx.send(GroupEvent::named("group:updated")).unwrap();
    events_tx.send(GroupEvent::default()).unwrap();
    events_tx.send(GroupEvent::named(GROUP_DELETED)).unwrap();
    // Never reached: the watch ends at the delete.
    events_tx.send(GroupEvent::named("group:updated")).unwrap();

    let mut refreshed = Vec::new();
    let outcome = watch_group(
        Arc::clone(&cache),
        channel.clone(),
        &mut events_rx,
        "xmas",
        |code, event| refreshed.push((code.to_string(), event.event.clone())),
        std::future::pending(),
    )
    .await;

    assert_eq!(outcome, WatchOutcome::GroupDeleted);
    assert_eq!(
        refreshed,
        vec![("XMAS".to_string(), "group:updated".to_string())]
    );
    assert_eq!(channel.sent(), vec![join("XMAS"), leave("XMAS")]);
    assert!(cache.get_admin("XMAS").is_none());
    assert!(cache.get_profile("XMAS").is_none());
    assert!(cache.get_participant_access("p-host").is_none());
    assert_eq!(
        cache.get_participant_access("p-other").as_deref(),
        Some("ACC-OTHER")
    );
}

#[tokio::test]
async fn watch_leaves_when_stopped() {
    let cache = Arc::new(RoomCache::new(MemoryStore::new()));
    let channel = Arc::new(RecordingChannel::default());
    let (_events_tx, mut events_rx) = mpsc::unbounded_channel::<GroupEvent>();

    let outcome = watch_group(
        cache,
        channel.clone(),
        &mut events_rx,
        "abc",
        |_, _| {},
        async {},
    )
    .await;

    assert_eq!(outcome, WatchOutcome::Stopped);
    assert_eq!(channel.sent(), vec![join("ABC"), leave("ABC")]);
}

#[tokio::test]
async fn watch_leaves_when_events_end() {
    let cache = Arc::new(RoomCache::new(MemoryStore::new()));
    let channel = Arc::new(RecordingChannel::default());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<GroupEvent>();
    drop(events_tx);

    let outcome = watch_group(
        cache,
        channel.clone(),
        &mut events_rx,
        "abc",
        |_, _| {},
        std::future::pending(),
    )
    .await;

    assert_eq!(outcome, WatchOutcome::Disconnected);
    assert_eq!(channel.sent(), vec![join("ABC"), leave("ABC")]);
}
