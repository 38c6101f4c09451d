//! Composite resource IDs.
//!
//! Grafana objects are addressed by a UID inside an organization, so state
//! IDs carry the org as a prefix: `orgID:resourceID`. Rule groups use
//! `folderUID;groupName` as the resource part and public dashboards use
//! `orgID:dashboardUID:publicDashboardUID`.

use crate::error::ProviderError;

const ORG_SEPARATOR: char = ':';
const GROUP_SEPARATOR: char = ';';

/// `org:id`.
pub fn org_resource_id(org_id: i64, id: &str) -> String {
    format!("{}{}{}", org_id, ORG_SEPARATOR, id)
}

/// Split an `org:id` string.
///
/// The org is only recognized when the part before the first `:` is an
/// integer; anything else is returned whole as the resource part, which then
/// belongs to the provider's default org.
pub fn split_org_resource_id(id: &str) -> (Option<i64>, &str) {
    match id.split_once(ORG_SEPARATOR) {
        Some((org, rest)) => match org.parse::<i64>() {
            Ok(org_id) => (Some(org_id), rest),
            Err(_) => (None, id),
        },
        None => (None, id),
    }
}

/// `folderUID;groupName`.
pub fn rule_group_key(folder_uid: &str, name: &str) -> String {
    format!("{}{}{}", folder_uid, GROUP_SEPARATOR, name)
}

/// Split a `folderUID;groupName` key. Group names may contain `;`, folder
/// UIDs may not.
pub fn split_rule_group_key(key: &str) -> Result<(&str, &str), ProviderError> {
    key.split_once(GROUP_SEPARATOR)
        .filter(|(folder, name)| !folder.is_empty() && !name.is_empty())
        .ok_or_else(|| {
            ProviderError::Validation(format!(
                "invalid rule group ID '{}': expected folderUID;groupName",
                key
            ))
        })
}

/// `orgID:dashboardUID:publicDashboardUID`.
pub fn public_dashboard_id(org_id: i64, dashboard_uid: &str, uid: &str) -> String {
    format!(
        "{}{sep}{}{sep}{}",
        org_id,
        dashboard_uid,
        uid,
        sep = ORG_SEPARATOR
    )
}

/// Split an `orgID:dashboardUID:publicDashboardUID` ID.
pub fn split_public_dashboard_id(id: &str) -> Result<(i64, &str, &str), ProviderError> {
    let invalid = || {
        ProviderError::Validation(format!(
            "invalid public dashboard ID '{}': expected orgID:dashboardUID:publicDashboardUID",
            id
        ))
    };

    let parts: Vec<&str> = id.split(ORG_SEPARATOR).collect();
    let [org, dashboard_uid, uid] = parts.as_slice() else {
        return Err(invalid());
    };
    let org_id = org.parse::<i64>().map_err(|_| invalid())?;
    if dashboard_uid.is_empty() || uid.is_empty() {
        return Err(invalid());
    }
    Ok((org_id, dashboard_uid, uid))
}
