//! "Your rooms" views joined from the four records.

use std::cmp::Reverse;

use serde::Serialize;

use super::profiles;
use super::records::{CodeMap, MembershipMap, RecordKey, Records};
use crate::codes::{fallback_group_name, FALLBACK_PARTICIPANT_NAME};

/// A group this client holds the admin code for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdministeredGroup {
    pub join_code: String,
    pub admin_code: String,
    pub name: String,
    pub last_viewed_at: Option<u64>,
    pub owner_participant_id: Option<String>,
    pub owner_participant_name: Option<String>,
    pub owner_access_code: Option<String>,
}

/// A participant identity this client can reopen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantLink {
    pub join_code: String,
    pub participant_id: String,
    pub access_code: String,
    pub group_name: String,
    pub participant_name: String,
    pub last_viewed_at: Option<u64>,
}

/// Most recent first; absent timestamps count as zero. `sort_by_key` is
/// stable, so ties keep enumeration order.
fn sort_by_recency<T>(entries: &mut [T], last_viewed_at: impl Fn(&T) -> Option<u64>) {
    entries.sort_by_key(|entry| Reverse(last_viewed_at(entry).unwrap_or(0)));
}

pub(super) fn administered_groups(records: &Records<'_>) -> Vec<AdministeredGroup> {
    let admins: CodeMap = records.read(RecordKey::AdminCodes);
    let profiles = profiles::read_all(records);
    let access_codes: CodeMap = records.read(RecordKey::ParticipantCodes);

    let mut groups: Vec<AdministeredGroup> = admins
        .into_iter()
        .map(|(join_code, admin_code)| {
            let profile = profiles.get(&join_code);
            let owner_participant_id = profile.and_then(|p| p.owner_participant_id.clone());
            let owner_participant_name = match (profile, owner_participant_id.as_deref()) {
                (Some(p), Some(owner)) => p.participants.get(owner).map(|o| o.name.clone()),
                _ => None,
            };
            let owner_access_code = owner_participant_id
                .as_deref()
                .and_then(|owner| access_codes.get(owner).cloned());
            AdministeredGroup {
                name: profile
                    .and_then(|p| p.name.clone())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| fallback_group_name(&join_code)),
                last_viewed_at: profile.and_then(|p| p.last_viewed_at),
                owner_participant_id,
                owner_participant_name,
                owner_access_code,
                join_code,
                admin_code,
            }
        })
        .collect();

    sort_by_recency(&mut groups, |g| g.last_viewed_at);
    groups
}

pub(super) fn participant_links(records: &Records<'_>) -> Vec<ParticipantLink> {
    let memberships: MembershipMap = records.read(RecordKey::GroupParticipants);
    let access_codes: CodeMap = records.read(RecordKey::ParticipantCodes);
    let profiles = profiles::read_all(records);

    let mut links = Vec::new();
    for (join_code, participant_ids) in memberships {
        let profile = profiles.get(&join_code);
        let group_name = profile
            .and_then(|p| p.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| fallback_group_name(&join_code));
        for participant_id in participant_ids {
            // An id without a credential is not a usable link.
            let Some(access_code) = access_codes.get(&participant_id) else {
                continue;
            };
            let participant = profile.and_then(|p| p.participants.get(&participant_id));
            links.push(ParticipantLink {
                join_code: join_code.clone(),
                access_code: access_code.clone(),
                group_name: group_name.clone(),
                participant_name: participant
                    .map(|p| p.name.clone())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| FALLBACK_PARTICIPANT_NAME.to_string()),
                last_viewed_at: participant
                    .and_then(|p| p.last_viewed_at)
                    .or_else(|| profile.and_then(|p| p.last_viewed_at)),
                participant_id,
            });
        }
    }

    sort_by_recency(&mut links, |l| l.last_viewed_at);
    links
}
