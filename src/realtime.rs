//! Per-group realtime subscription.
//!
//! A [`GroupSubscription`] is joined to at most one group code at a time.
//! Acquiring a code sends `groups:join { code }`; releasing it sends
//! `groups:leave { code }`. Release runs exactly once per join, including
//! when the subscription is dropped on an error path. While joined, every
//! inbound group event with a non-empty `event` name goes to the handler
//! unchanged. While idle, inbound events are dropped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::codes::normalize_code;
use crate::logging;

pub const JOIN_EVENT: &str = "groups:join";
pub const LEAVE_EVENT: &str = "groups:leave";
/// Name of inbound frames carrying a [`GroupEvent`].
pub const GROUP_EVENT: &str = "group:event";
/// `GroupEvent::event` value announcing the group no longer exists.
pub const GROUP_DELETED: &str = "group:deleted";

/// One gateway frame: an event name and its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Payload of an inbound `group:event` frame. Fields other than `event` are
/// kept as they arrived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupEvent {
    #[serde(default)]
    pub event: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GroupEvent {
    pub fn named(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            extra: Map::new(),
        }
    }
}

/// Outbound half of the realtime gateway.
pub trait RealtimeChannel: Send + Sync {
    /// Queue a frame. Delivery failures are the channel's to log.
    fn emit(&self, event: &str, payload: Value);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Joined { code: String },
}

/// Join/leave lifecycle for one consumer.
pub struct GroupSubscription {
    channel: Arc<dyn RealtimeChannel>,
    handler: Box<dyn FnMut(&GroupEvent) + Send>,
    state: SubscriptionState,
}

impl GroupSubscription {
    pub fn new(
        channel: Arc<dyn RealtimeChannel>,
        handler: impl FnMut(&GroupEvent) + Send + 'static,
    ) -> Self {
        Self {
            channel,
            handler: Box::new(handler),
            state: SubscriptionState::Idle,
        }
    }

    pub fn state(&self) -> &SubscriptionState {
        &self.state
    }

    /// The joined code, if any.
    pub fn code(&self) -> Option<&str> {
        match &self.state {
            SubscriptionState::Joined { code } => Some(code),
            SubscriptionState::Idle => None,
        }
    }

    /// Join `code`, leaving the current group first if it differs. An empty
    /// code only leaves.
    pub fn acquire(&mut self, code: &str) {
        let code = normalize_code(code);
        if self.code() == Some(code.as_str()) {
            return;
        }
        self.release();
        if code.is_empty() {
            return;
        }
        self.channel.emit(JOIN_EVENT, json!({ "code": code }));
        crate::rlog!("realtime: joined {}", logging::join_code(&code));
        self.state = SubscriptionState::Joined { code };
    }

    /// Leave the joined group. Does nothing while idle.
    pub fn release(&mut self) {
        let SubscriptionState::Joined { code } =
            std::mem::replace(&mut self.state, SubscriptionState::Idle)
        else {
            return;
        };
        self.channel.emit(LEAVE_EVENT, json!({ "code": code }));
        crate::rlog!("realtime: left {}", logging::join_code(&code));
    }

    /// Hand an inbound event to the handler. Returns whether it was
    /// forwarded; events without a name or arriving while idle are not.
    pub fn deliver(&mut self, message: &GroupEvent) -> bool {
        if self.state == SubscriptionState::Idle || message.event.is_empty() {
            return false;
        }
        (self.handler)(message);
        true
    }
}

impl Drop for GroupSubscription {
    fn drop(&mut self) {
        self.release();
    }
}
