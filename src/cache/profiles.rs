//! Denormalized display profile per group: name, recency, owner and the
//! names of the participants this client has seen.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::records::{ProfileMap, RecordKey, Records};
use super::Participant;
use crate::codes::FALLBACK_PARTICIPANT_NAME;

/// Cached display data for one group.
///
/// Every field reads leniently: a value of the wrong type reads as absent
/// (or as the fallback name) so one bad field never costs the whole record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupProfile {
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(
        default,
        deserialize_with = "lenient_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_viewed_at: Option<u64>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub owner_participant_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_participants")]
    pub participants: BTreeMap<String, ParticipantProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProfile {
    #[serde(default = "fallback_name", deserialize_with = "lenient_name")]
    pub name: String,
    #[serde(
        default,
        deserialize_with = "lenient_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_viewed_at: Option<u64>,
}

impl Default for ParticipantProfile {
    fn default() -> Self {
        Self {
            name: fallback_name(),
            last_viewed_at: None,
        }
    }
}

fn fallback_name() -> String {
    FALLBACK_PARTICIPANT_NAME.to_string()
}

/// A timestamp that is not a non-negative integer reads as absent rather
/// than failing the whole record.
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_u64())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string))
}

fn lenient_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .filter(|name| !name.is_empty())
        .map_or_else(fallback_name, str::to_string))
}

/// `null` or a non-object reads as no participants; entries that are not
/// objects are skipped.
fn lenient_participants<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, ParticipantProfile>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(entries) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|(id, entry)| Some((id, serde_json::from_value(entry).ok()?)))
        .collect())
}

/// Read the profiles record one group at a time. An entry that is not an
/// object is dropped with a warning; the other groups survive.
pub(super) fn read_all(records: &Records<'_>) -> ProfileMap {
    let raw: BTreeMap<String, Value> = records.read(RecordKey::GroupProfiles);
    let mut profiles = ProfileMap::new();
    for (join_code, entry) in raw {
        match serde_json::from_value(entry) {
            Ok(profile) => {
                profiles.insert(join_code, profile);
            }
            Err(e) => crate::rlog!("warning: ignoring malformed profile for {}: {}", join_code, e),
        }
    }
    profiles
}

/// Return the group's profile, creating and persisting an empty one first if
/// there is none. An existing profile is returned untouched.
pub(super) fn ensure(records: &Records<'_>, join_code: &str) -> GroupProfile {
    let mut profiles = read_all(records);
    if let Some(profile) = profiles.get(join_code) {
        return profile.clone();
    }
    let profile = GroupProfile::default();
    profiles.insert(join_code.to_string(), profile.clone());
    records.write(RecordKey::GroupProfiles, &profiles);
    profile
}

pub(super) fn touch_group(records: &Records<'_>, join_code: &str, name: Option<&str>) {
    let mut profiles = read_all(records);
    let profile = profiles.entry(join_code.to_string()).or_default();
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        profile.name = Some(name.to_string());
    }
    profile.last_viewed_at = Some(records.now);
    records.write(RecordKey::GroupProfiles, &profiles);
}

pub(super) fn touch_participant(records: &Records<'_>, join_code: &str, participant: &Participant) {
    let mut profiles = read_all(records);
    let profile = profiles.entry(join_code.to_string()).or_default();
    let name = participant
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or(FALLBACK_PARTICIPANT_NAME);
    profile.participants.insert(
        participant.id.clone(),
        ParticipantProfile {
            name: name.to_string(),
            last_viewed_at: Some(records.now),
        },
    );
    if participant.is_owner {
        profile.owner_participant_id = Some(participant.id.clone());
    }
    records.write(RecordKey::GroupProfiles, &profiles);
}

pub(super) fn get(records: &Records<'_>, join_code: &str) -> Option<GroupProfile> {
    let mut profiles = read_all(records);
    profiles.remove(join_code)
}

/// Returns whether a profile was removed.
pub(super) fn remove(records: &Records<'_>, join_code: &str) -> bool {
    let mut profiles = read_all(records);
    if profiles.remove(join_code).is_none() {
        return false;
    }
    records.write(RecordKey::GroupProfiles, &profiles);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore};
    use tokio::sync::broadcast;

    #[test]
    fn test_ensure_keeps_existing_name() {
        let store = MemoryStore::new();
        let (tx, _rx) = broadcast::channel(8);
        let records = Records::new(&store, &tx, 10);

        touch_group(&records, "ABC", Some("Oficina"));
        let profile = ensure(&records, "ABC");
        assert_eq!(profile.name.as_deref(), Some("Oficina"));
        assert_eq!(profile.last_viewed_at, Some(10));
    }

    #[test]
    fn test_touch_group_ignores_empty_name() {
        let store = MemoryStore::new();
        let (tx, _rx) = broadcast::channel(8);
        touch_group(&Records::new(&store, &tx, 1), "ABC", Some("Familia"));
        touch_group(&Records::new(&store, &tx, 2), "ABC", Some(""));

        let profile = get(&Records::new(&store, &tx, 3), "ABC").unwrap();
        assert_eq!(profile.name.as_deref(), Some("Familia"));
        assert_eq!(profile.last_viewed_at, Some(2));
    }

    #[test]
    fn test_touch_participant_defaults_name_and_marks_owner() {
        let store = MemoryStore::new();
        let (tx, _rx) = broadcast::channel(8);
        let records = Records::new(&store, &tx, 5);

        let owner = Participant {
            id: "p1".to_string(),
            name: None,
            is_owner: true,
        };
        touch_participant(&records, "ABC", &owner);

        let profile = get(&records, "ABC").unwrap();
        assert_eq!(profile.owner_participant_id.as_deref(), Some("p1"));
        assert_eq!(profile.participants["p1"].name, "Participante");
        assert_eq!(profile.participants["p1"].last_viewed_at, Some(5));
    }

    #[test]
    fn test_unparsable_timestamp_reads_as_absent() {
        let store = MemoryStore::new();
        store
            .set_item(
                RecordKey::GroupProfiles.as_str(),
                r#"{"ABC":{"name":"Amigos","lastViewedAt":"2024-12-01T10:00:00.000Z","participants":{}}}"#,
            )
            .unwrap();
        let (tx, _rx) = broadcast::channel(8);
        let profile = get(&Records::new(&store, &tx, 0), "ABC").unwrap();
        assert_eq!(profile.name.as_deref(), Some("Amigos"));
        assert_eq!(profile.last_viewed_at, None);
    }

    #[test]
    fn test_serialized_shape_is_camel_case() {
        let mut profile = GroupProfile {
            name: Some("Amigos".to_string()),
            last_viewed_at: Some(42),
            owner_participant_id: Some("p1".to_string()),
            participants: BTreeMap::new(),
        };
        profile.participants.insert(
            "p1".to_string(),
            ParticipantProfile {
                name: "Ana".to_string(),
                last_viewed_at: Some(42),
            },
        );
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["lastViewedAt"], 42);
        assert_eq!(json["ownerParticipantId"], "p1");
        assert_eq!(json["participants"]["p1"]["name"], "Ana");
    }

    #[test]
    fn test_nameless_participant_does_not_cost_other_profiles() {
        let store = MemoryStore::new();
        store
            .set_item(
                RecordKey::GroupProfiles.as_str(),
                r#"{"AAA":{"name":"Uno","participants":{"p9":{"lastViewedAt":1}}},"BBB":{"name":"Dos","participants":{}}}"#,
            )
            .unwrap();
        let (tx, _rx) = broadcast::channel(8);
        touch_group(&Records::new(&store, &tx, 7), "CCC", None);

        let records = Records::new(&store, &tx, 8);
        let aaa = get(&records, "AAA").unwrap();
        assert_eq!(aaa.participants["p9"].name, "Participante");
        assert_eq!(aaa.participants["p9"].last_viewed_at, Some(1));
        assert_eq!(get(&records, "BBB").unwrap().name.as_deref(), Some("Dos"));
        assert_eq!(get(&records, "CCC").unwrap().last_viewed_at, Some(7));
    }

    #[test]
    fn test_null_and_mistyped_fields_read_as_absent() {
        let store = MemoryStore::new();
        store
            .set_item(
                RecordKey::GroupProfiles.as_str(),
                r#"{"AAA":{"name":7,"ownerParticipantId":null,"participants":null},"BAD":"nope","CCC":{"participants":{"p1":"x","p2":{"name":""}}}}"#,
            )
            .unwrap();
        let (tx, _rx) = broadcast::channel(8);
        let records = Records::new(&store, &tx, 0);

        let aaa = get(&records, "AAA").unwrap();
        assert!(aaa.name.is_none());
        assert!(aaa.owner_participant_id.is_none());
        assert!(aaa.participants.is_empty());

        assert!(get(&records, "BAD").is_none());

        let ccc = get(&records, "CCC").unwrap();
        assert!(!ccc.participants.contains_key("p1"));
        assert_eq!(ccc.participants["p2"].name, "Participante");
    }
}
