//! Groups API response shapes and how each one lands in the cache.
//!
//! The HTTP calls themselves belong to the caller. Once a call succeeds (or
//! fails in a way the cache cares about) the caller hands the outcome to one
//! of the `record_*` methods below.

use serde::{Deserialize, Serialize};

use crate::cache::{Participant, RoomCache};

/// A participant entry as the API returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// The group owner's own participant identity, returned on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostParticipant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub access_code: String,
}

/// Response to creating a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedGroup {
    pub join_code: String,
    pub admin_code: String,
    #[serde(default)]
    pub name: Option<String>,
    pub host_participant: HostParticipant,
}

/// Response to joining a group as a guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedGroup {
    pub participant: ParticipantRecord,
    pub access_code: String,
}

/// Response to loading a group with its admin code. Only the fields the
/// cache uses are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner_participant_id: Option<String>,
    #[serde(default)]
    pub participants: Vec<ParticipantRecord>,
}

impl GroupDetails {
    pub fn owner(&self) -> Option<&ParticipantRecord> {
        let owner_id = self.owner_participant_id.as_deref()?;
        self.participants.iter().find(|p| p.id == owner_id)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl RoomCache {
    /// A group was just created. The names typed into the creation form are
    /// used when the response leaves them out. A fresh group is live even if
    /// its code was purged earlier in this process.
    pub fn record_created_group(
        &self,
        created: &CreatedGroup,
        requested_name: Option<&str>,
        requested_owner_name: Option<&str>,
    ) {
        let name = non_empty(created.name.as_deref()).or(requested_name);
        let host = &created.host_participant;
        let host_name = non_empty(host.name.as_deref()).or(requested_owner_name);
        self.record_group(&created.join_code, true, |group| {
            group.remember_admin(&created.admin_code, name);
            group.remember_participant_access(&host.id, &host.access_code);
            group.add_participant(Participant::new(host.id.clone(), host_name).as_owner());
        });
    }

    /// This client joined `join_code` as a guest. Returns `false` when the
    /// group was purged before the response arrived.
    pub fn record_joined_group(&self, join_code: &str, joined: &JoinedGroup) -> bool {
        let participant = &joined.participant;
        self.record_group(join_code, false, |group| {
            group.remember_participant_access(&participant.id, &joined.access_code);
            group.add_participant(Participant::new(
                participant.id.clone(),
                participant.name.as_deref(),
            ));
        })
    }

    /// The server accepted `admin_code` and returned the group. Returns
    /// `false` when the group was purged while the load was in flight.
    pub fn record_loaded_group(
        &self,
        join_code: &str,
        admin_code: &str,
        details: &GroupDetails,
    ) -> bool {
        self.record_group(join_code, false, |group| {
            group.remember_admin(admin_code, details.name.as_deref());
            if let Some(owner) = details.owner() {
                group.add_participant(
                    Participant::new(owner.id.clone(), owner.name.as_deref()).as_owner(),
                );
            }
        })
    }

    /// The server refused the stored admin code.
    pub fn record_admin_rejected(&self, join_code: &str) {
        self.reject_admin(join_code);
    }

    /// The user deleted the group through the API.
    pub fn record_group_deleted(&self, join_code: &str) {
        self.forget_group(join_code);
    }
}
