//! `grafana_organization`, including its membership.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use super::{found, read_back, state_id, GrafanaContext, Resource};
use crate::client::{GrafanaClient, OrgUser};
use crate::error::ProviderError;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::state::{opt_str, str_attr, string_set};

/// Resource type name.
pub const ORGANIZATION: &str = "grafana_organization";

const DEFAULT_ADMIN_USER: &str = "admin";

/// Membership attributes and the role each grants.
const ROLES: [(&str, &str); 3] = [("admins", "Admin"), ("editors", "Editor"), ("viewers", "Viewer")];

/// A Grafana organization.
#[derive(Debug, Default)]
pub struct OrganizationResource;

#[async_trait::async_trait]
impl Resource for OrganizationResource {
    fn type_name(&self) -> &'static str {
        ORGANIZATION
    }

    fn schema(&self) -> Schema {
        let mut schema = Schema::v0()
            .with_description("Manages an organization and its members")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("org_id", Attribute::computed_int64())
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "admin_user",
                Attribute::optional_string()
                    .with_default(json!(DEFAULT_ADMIN_USER))
                    .with_description("The server admin. Never removed from the organization."),
            );
        for (attribute, role) in ROLES {
            schema = schema.with_attribute(
                attribute,
                Attribute::string_set()
                    .with_description(format!("Logins or emails of users with the {} role.", role)),
            );
        }
        schema
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        let mut diagnostics = Vec::new();
        for (attribute, _) in ROLES {
            for user in string_set(config, attribute) {
                if let Some(other) = seen.insert(user.clone(), attribute) {
                    diagnostics.push(
                        Diagnostic::error(format!("User '{}' has more than one role", user))
                            .with_detail(format!("Listed in both {} and {}", other, attribute))
                            .with_attribute(attribute),
                    );
                }
            }
        }
        diagnostics
    }

    #[instrument(skip_all, fields(name = str_attr(planned, "name")))]
    async fn create(&self, ctx: &GrafanaContext, planned: &Value) -> Result<Value, ProviderError> {
        let org_id = ctx.client().new_org(str_attr(planned, "name")).await?;
        info!(org_id, "created organization");

        reconcile_members(ctx.client(), org_id, planned).await?;

        let mut state = planned.clone();
        state["id"] = json!(org_id.to_string());
        read_back(self, ctx, &state).await
    }

    #[instrument(skip_all, fields(id = str_attr(state, "id")))]
    async fn read(&self, ctx: &GrafanaContext, state: &Value) -> Result<Option<Value>, ProviderError> {
        let id = state_id(state)?;
        let org_id = parse_org_id(id)?;
        let client = ctx.client();

        let Some(org) = found(client.org(org_id).await, ORGANIZATION, id)? else {
            return Ok(None);
        };
        let users = client.org_users(org_id).await?;
        let admin_user = opt_str(state, "admin_user").unwrap_or(DEFAULT_ADMIN_USER);

        let mut result = json!({
            "id": org.id.to_string(),
            "org_id": org.id,
            "name": org.name,
            "admin_user": admin_user,
        });
        for (attribute, role) in ROLES {
            let configured = string_set(state, attribute);
            let members: BTreeSet<String> = users
                .iter()
                .filter(|u| u.role == role)
                .filter(|u| !is_user(u, admin_user) || is_listed(u, &configured))
                .map(|u| identity(u, &configured))
                .collect();
            result[attribute] = if members.is_empty() {
                Value::Null
            } else {
                json!(members)
            };
        }
        Ok(Some(result))
    }

    #[instrument(skip_all, fields(id = str_attr(prior, "id")))]
    async fn update(
        &self,
        ctx: &GrafanaContext,
        prior: &Value,
        planned: &Value,
    ) -> Result<Value, ProviderError> {
        let org_id = parse_org_id(state_id(prior)?)?;
        let name = str_attr(planned, "name");
        if name != str_attr(prior, "name") {
            ctx.client().update_org(org_id, name).await?;
        }
        reconcile_members(ctx.client(), org_id, planned).await?;

        let mut state = planned.clone();
        state["id"] = json!(org_id.to_string());
        read_back(self, ctx, &state).await
    }

    #[instrument(skip_all, fields(id = str_attr(state, "id")))]
    async fn delete(&self, ctx: &GrafanaContext, state: &Value) -> Result<(), ProviderError> {
        let id = state_id(state)?;
        found(ctx.client().delete_org(parse_org_id(id)?).await, ORGANIZATION, id)?;
        Ok(())
    }
}

fn parse_org_id(id: &str) -> Result<i64, ProviderError> {
    id.parse()
        .map_err(|_| ProviderError::Validation(format!("invalid organization ID '{}'", id)))
}

fn is_user(user: &OrgUser, login_or_email: &str) -> bool {
    user.login == login_or_email || (!user.email.is_empty() && user.email == login_or_email)
}

fn is_listed(user: &OrgUser, configured: &BTreeSet<String>) -> bool {
    configured.iter().any(|who| is_user(user, who))
}

/// How a member is written to state: as configured when possible, otherwise
/// by email.
fn identity(user: &OrgUser, configured: &BTreeSet<String>) -> String {
    if configured.contains(&user.login) || user.email.is_empty() {
        user.login.clone()
    } else {
        user.email.clone()
    }
}

/// One change to an org's membership.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MembershipChange {
    Add { login_or_email: String, role: &'static str },
    Update { user_id: i64, role: &'static str },
    Remove { user_id: i64 },
}

fn membership_changes(desired: &Value, current: &[OrgUser]) -> Vec<MembershipChange> {
    let admin_user = opt_str(desired, "admin_user").unwrap_or(DEFAULT_ADMIN_USER);
    let wanted: Vec<(String, &'static str)> = ROLES
        .iter()
        .flat_map(|(attribute, role)| {
            string_set(desired, attribute)
                .into_iter()
                .map(move |user| (user, *role))
        })
        .collect();

    let mut changes = Vec::new();
    for (login_or_email, role) in &wanted {
        match current.iter().find(|u| is_user(u, login_or_email)) {
            None => changes.push(MembershipChange::Add {
                login_or_email: login_or_email.clone(),
                role: *role,
            }),
            Some(user) if user.role != *role => changes.push(MembershipChange::Update {
                user_id: user.user_id,
                role: *role,
            }),
            Some(_) => {},
        }
    }
    for user in current {
        let listed = wanted.iter().any(|(who, _)| is_user(user, who));
        if !listed && !is_user(user, admin_user) {
            changes.push(MembershipChange::Remove {
                user_id: user.user_id,
            });
        }
    }
    changes
}

async fn reconcile_members(
    client: &GrafanaClient,
    org_id: i64,
    desired: &Value,
) -> Result<(), ProviderError> {
    let current = client.org_users(org_id).await?;
    for change in membership_changes(desired, &current) {
        debug!(org_id, ?change, "applying membership change");
        match change {
            MembershipChange::Add {
                login_or_email,
                role,
            } => client.add_org_user(org_id, &login_or_email, role).await?,
            MembershipChange::Update { user_id, role } => {
                client.update_org_user(org_id, user_id, role).await?
            },
            MembershipChange::Remove { user_id } => client.remove_org_user(org_id, user_id).await?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, login: &str, email: &str, role: &str) -> OrgUser {
        OrgUser {
            org_id: 2,
            user_id: id,
            email: email.to_string(),
            login: login.to_string(),
            role: role.to_string(),
        }
    }

    #[test]
    fn test_membership_changes() {
        let current = vec![
            user(1, "admin", "admin@localhost", "Admin"),
            user(2, "john", "john.doe@example.com", "Viewer"),
            user(3, "jane", "jane@example.com", "Editor"),
        ];
        let desired = json!({
            "admin_user": "admin",
            "admins": ["john.doe@example.com"],
            "viewers": ["new@example.com"]
        });
        let changes = membership_changes(&desired, &current);
        assert_eq!(
            changes,
            vec![
                MembershipChange::Update { user_id: 2, role: "Admin" },
                MembershipChange::Add {
                    login_or_email: "new@example.com".to_string(),
                    role: "Viewer"
                },
                MembershipChange::Remove { user_id: 3 },
            ]
        );
    }

    #[test]
    fn test_admin_user_is_never_removed() {
        let current = vec![user(1, "admin", "admin@localhost", "Admin")];
        assert!(membership_changes(&json!({}), &current).is_empty());
        let changes = membership_changes(&json!({"admin_user": "root"}), &current);
        assert_eq!(changes, vec![MembershipChange::Remove { user_id: 1 }]);
    }

    #[test]
    fn test_identity_prefers_configured_login() {
        let u = user(2, "john", "john.doe@example.com", "Viewer");
        let configured: BTreeSet<String> = ["john".to_string()].into();
        assert_eq!(identity(&u, &configured), "john");
        assert_eq!(identity(&u, &BTreeSet::new()), "john.doe@example.com");
    }

    #[test]
    fn test_validate_duplicate_roles() {
        let diagnostics = OrganizationResource.validate(&json!({
            "admins": ["a@example.com"],
            "viewers": ["a@example.com"]
        }));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("viewers"));
    }
}
