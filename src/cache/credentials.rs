//! Admin codes per join code and access codes per participant id.
//!
//! All codes arrive here already normalized.

use super::records::{CodeMap, RecordKey, Records};

pub(super) fn set_admin(records: &Records<'_>, join_code: &str, admin_code: &str) {
    let mut admins: CodeMap = records.read(RecordKey::AdminCodes);
    admins.insert(join_code.to_string(), admin_code.to_string());
    records.write(RecordKey::AdminCodes, &admins);
}

pub(super) fn admin(records: &Records<'_>, join_code: &str) -> Option<String> {
    let mut admins: CodeMap = records.read(RecordKey::AdminCodes);
    admins.remove(join_code)
}

/// Returns whether an entry was removed.
pub(super) fn remove_admin(records: &Records<'_>, join_code: &str) -> bool {
    let mut admins: CodeMap = records.read(RecordKey::AdminCodes);
    if admins.remove(join_code).is_none() {
        return false;
    }
    records.write(RecordKey::AdminCodes, &admins);
    true
}

pub(super) fn set_access(records: &Records<'_>, participant_id: &str, access_code: &str) {
    let mut codes: CodeMap = records.read(RecordKey::ParticipantCodes);
    codes.insert(participant_id.to_string(), access_code.to_string());
    records.write(RecordKey::ParticipantCodes, &codes);
}

pub(super) fn access(records: &Records<'_>, participant_id: &str) -> Option<String> {
    let mut codes: CodeMap = records.read(RecordKey::ParticipantCodes);
    codes.remove(participant_id)
}

/// Remove the access codes of every id in `participant_ids`. Returns how
/// many were present.
pub(super) fn remove_access(records: &Records<'_>, participant_ids: &[String]) -> usize {
    if participant_ids.is_empty() {
        return 0;
    }
    let mut codes: CodeMap = records.read(RecordKey::ParticipantCodes);
    let removed = participant_ids
        .iter()
        .filter(|id| codes.remove(id.as_str()).is_some())
        .count();
    if removed > 0 {
        records.write(RecordKey::ParticipantCodes, &codes);
    }
    removed
}
