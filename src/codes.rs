//! Code normalization and the placeholder names shown for unnamed entries.

/// Join, admin and access codes are case-insensitive; the uppercase form is
/// the only one ever stored or compared.
pub fn normalize_code(code: &str) -> String {
    code.to_uppercase()
}

/// Display name for a group whose profile carries no name.
pub fn fallback_group_name(join_code: &str) -> String {
    format!("Grupo {join_code}")
}

/// Display name for a participant whose profile carries no name.
pub const FALLBACK_PARTICIPANT_NAME: &str = "Participante";
