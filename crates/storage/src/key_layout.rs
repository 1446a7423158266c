//! Mapping from case identities to backend keys.
//!
//! Every object of a case lives under `<case-id>/`. Keys always use `/` as
//! separator; the filesystem backend maps them onto nested directories.

use uuid::Uuid;

/// Key prefix owning every stored object of a case
pub fn case_prefix(case_id: Uuid) -> String {
    format!("{}/", case_id)
}

/// Key of a stored object named `stored_name` inside a case
pub fn key_for(case_id: Uuid, stored_name: &str) -> String {
    format!("{}{}", case_prefix(case_id), stored_name)
}

/// Stored name relative to the case prefix, if `key` belongs to that case
pub fn relative_name(case_id: Uuid, key: &str) -> Option<&str> {
    let case_id = case_id.to_string();
    key.strip_prefix(case_id.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
}
