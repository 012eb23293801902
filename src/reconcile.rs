//! Applying inbound group events to the cache.
//!
//! `group:deleted` purges the group from every record and ends the watch.
//! Any other named event means the group changed on the server and the
//! caller should reload it from the Groups API.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cache::RoomCache;
use crate::codes::normalize_code;
use crate::logging;
use crate::realtime::{GroupEvent, GroupSubscription, RealtimeChannel, GROUP_DELETED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupEventAction {
    /// The group is gone; its cache entries were removed.
    Purge,
    /// Reload the group from the Groups API.
    Refresh,
    /// Nothing to do.
    Ignore,
}

impl GroupEventAction {
    pub fn classify(event: &GroupEvent) -> Self {
        match event.event.as_str() {
            "" => GroupEventAction::Ignore,
            GROUP_DELETED => GroupEventAction::Purge,
            _ => GroupEventAction::Refresh,
        }
    }
}

impl RoomCache {
    /// Classify `event` for `join_code`, purging the group when it was
    /// deleted.
    pub fn apply_group_event(&self, join_code: &str, event: &GroupEvent) -> GroupEventAction {
        let action = GroupEventAction::classify(event);
        if action == GroupEventAction::Purge {
            crate::rlog!(
                "realtime: group {} was deleted on the server",
                logging::join_code(&normalize_code(join_code))
            );
            self.forget_group(join_code);
        }
        action
    }
}

/// Why [`watch_group`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A `group:deleted` event arrived and the group was purged.
    GroupDeleted,
    /// The `shutdown` future completed.
    Stopped,
    /// The inbound event stream ended.
    Disconnected,
}

/// Join `join_code` on `channel` and apply every inbound event to `cache`
/// until the group is deleted, `shutdown` resolves, or `events` closes.
/// `on_refresh` runs for each event that asks for a reload. The group is
/// left before returning, and also if the future is dropped early.
pub async fn watch_group<F, S>(
    cache: Arc<RoomCache>,
    channel: Arc<dyn RealtimeChannel>,
    events: &mut mpsc::UnboundedReceiver<GroupEvent>,
    join_code: &str,
    mut on_refresh: F,
    shutdown: S,
) -> WatchOutcome
where
    F: FnMut(&str, &GroupEvent),
    S: Future<Output = ()>,
{
    let code = normalize_code(join_code);
    let (actions_tx, mut actions_rx) = mpsc::unbounded_channel();

    let handler_cache = Arc::clone(&cache);
    let handler_code = code.clone();
    let mut subscription = GroupSubscription::new(channel, move |event: &GroupEvent| {
        let action = handler_cache.apply_group_event(&handler_code, event);
        let _ = actions_tx.send((action, event.clone()));
    });
    subscription.acquire(&code);

    tokio::pin!(shutdown);
    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => break WatchOutcome::Stopped,
            message = events.recv() => {
                let Some(message) = message else {
                    break WatchOutcome::Disconnected;
                };
                subscription.deliver(&message);

                let mut deleted = false;
                while let Ok((action, event)) = actions_rx.try_recv() {
                    match action {
                        GroupEventAction::Purge => deleted = true,
                        GroupEventAction::Refresh => on_refresh(&code, &event),
                        GroupEventAction::Ignore => {}
                    }
                }
                if deleted {
                    break WatchOutcome::GroupDeleted;
                }
            }
        }
    };

    subscription.release();
    outcome
}
