//! Participant ids this client holds per join code.

use super::records::{MembershipMap, RecordKey, Records};

/// Add `participant_id` to the group's set. Returns `false` when it was
/// already there, in which case nothing is written.
pub(super) fn insert(records: &Records<'_>, join_code: &str, participant_id: &str) -> bool {
    let mut groups: MembershipMap = records.read(RecordKey::GroupParticipants);
    let members = groups.entry(join_code.to_string()).or_default();
    if members.iter().any(|id| id == participant_id) {
        return false;
    }
    members.push(participant_id.to_string());
    records.write(RecordKey::GroupParticipants, &groups);
    true
}

pub(super) fn members(records: &Records<'_>, join_code: &str) -> Vec<String> {
    let mut groups: MembershipMap = records.read(RecordKey::GroupParticipants);
    groups.remove(join_code).unwrap_or_default()
}

/// Remove the group's entry and return the ids it held.
pub(super) fn take(records: &Records<'_>, join_code: &str) -> Vec<String> {
    let mut groups: MembershipMap = records.read(RecordKey::GroupParticipants);
    match groups.remove(join_code) {
        Some(ids) => {
            records.write(RecordKey::GroupParticipants, &groups);
            ids
        }
        None => Vec::new(),
    }
}
