//! Management API: projects, users, features, deleted projects,
//! organizations and maintainers.

use crate::client::{ApiClient, Credential};
use crate::error::{KbcError, Result};
use crate::outcome::Outcome;
use crate::region::{Region, Service};
use crate::types::{DeletedProject, Feature, Maintainer, User};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// What a feature flag is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureScope {
    Project,
    User,
}

impl FeatureScope {
    fn segment(self) -> &'static str {
        match self {
            FeatureScope::Project => "projects",
            FeatureScope::User => "users",
        }
    }

    /// Catalogue `type` listing the features assignable in this scope.
    pub fn catalogue_type(self) -> &'static str {
        match self {
            FeatureScope::Project => "project",
            FeatureScope::User => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub default_backend: String,
}

impl NewProject {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: "poc6months".to_string(),
            default_backend: "snowflake".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub description: String,
    pub can_manage_buckets: bool,
    pub can_read_all_file_uploads: bool,
    pub can_purge_trash: bool,
    pub can_manage_tokens: bool,
    pub bucket_permissions: Value,
    /// Seconds.
    pub expires_in: u64,
}

impl TokenRequest {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            can_manage_buckets: true,
            can_read_all_file_uploads: false,
            can_purge_trash: false,
            can_manage_tokens: false,
            bucket_permissions: json!({"*": "write"}),
            expires_in: 1800,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManageClient {
    api: ApiClient,
}

impl ManageClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn connect(region: &Region, manage_token: &str) -> Result<Self> {
        Ok(Self::new(ApiClient::for_region(
            region,
            Service::Connection,
            Credential::Manage(manage_token.into()),
        )?))
    }

    // -- projects & organizations -------------------------------------------

    pub fn project(&self, project_id: &str) -> Result<Value> {
        self.api.get(&["manage", "projects", project_id])
    }

    pub fn organization(&self, organization_id: &str) -> Result<Value> {
        self.api.get(&["manage", "organizations", organization_id])
    }

    pub fn create_project(&self, organization_id: &str, project: &NewProject) -> Result<Value> {
        self.api
            .post_json(&["manage", "organizations", organization_id, "projects"], project)
    }

    pub fn invite_user(&self, project_id: &str, email: &str) -> Result<Value> {
        self.api.post_json(
            &["manage", "projects", project_id, "users"],
            &json!({ "email": email }),
        )
    }

    pub fn create_project_token(&self, project_id: &str, request: &TokenRequest) -> Result<Value> {
        self.api
            .post_json(&["manage", "projects", project_id, "tokens"], request)
    }

    // -- features -------------------------------------------------------------

    pub fn features(&self, scope: FeatureScope, id: &str) -> Result<Value> {
        self.api.get(&["manage", scope.segment(), id, "features"])
    }

    pub fn add_feature(&self, scope: FeatureScope, id: &str, feature: &str) -> Result<Value> {
        tracing::info!(scope = scope.segment(), id, feature, "adding feature");
        self.api.post_json(
            &["manage", scope.segment(), id, "features"],
            &json!({ "feature": feature }),
        )
    }

    pub fn remove_feature(&self, scope: FeatureScope, id: &str, feature: &str) -> Result<Value> {
        tracing::info!(scope = scope.segment(), id, feature, "removing feature");
        self.api
            .delete(&["manage", scope.segment(), id, "features", feature])
    }

    pub fn feature_catalogue(&self, scope: FeatureScope) -> Result<Vec<Feature>> {
        let body = self
            .api
            .get_with_query(&["manage", "features"], &[("type", scope.catalogue_type())])?;
        Ok(serde_json::from_value(body)?)
    }

    // -- users ------------------------------------------------------------------

    pub fn user(&self, id_or_email: &str) -> Result<User> {
        Ok(serde_json::from_value(self.user_detail(id_or_email)?)?)
    }

    pub fn user_detail(&self, id_or_email: &str) -> Result<Value> {
        self.api.get(&["manage", "users", id_or_email])
    }

    pub fn delete_user(&self, id_or_email: &str) -> Result<Value> {
        tracing::info!(user = id_or_email, "deleting user");
        self.api.delete(&["manage", "users", id_or_email])
    }

    // -- deleted projects -------------------------------------------------------

    pub fn deleted_projects(&self) -> Result<Vec<DeletedProject>> {
        let body = self
            .api
            .get_with_query(&["manage", "deleted-projects"], &[("limit", 1000)])?;
        Ok(serde_json::from_value(body)?)
    }

    pub fn deleted_project(&self, project_id: &str) -> Result<Value> {
        self.api.get(&["manage", "deleted-projects", project_id])
    }

    /// Undelete a project and return its fresh detail. `expiration_days` of
    /// zero keeps the project permanently.
    pub fn restore_project(&self, project_id: &str, expiration_days: u32) -> Result<Value> {
        tracing::info!(project_id, expiration_days, "restoring deleted project");
        self.api.delete_json(
            &["manage", "deleted-projects", project_id],
            &json!({ "expirationDays": expiration_days }),
        )?;
        self.project(project_id)
    }

    // -- maintainers ------------------------------------------------------------

    pub fn maintainers(&self) -> Result<Vec<Maintainer>> {
        Ok(serde_json::from_value(self.api.get(&["manage", "maintainers"])?)?)
    }

    pub fn maintainer_users(&self, maintainer_id: &str) -> Result<Vec<User>> {
        let body = self
            .api
            .get(&["manage", "maintainers", maintainer_id, "users"])?;
        Ok(serde_json::from_value(body)?)
    }

    pub fn add_maintainer_user(&self, maintainer_id: &str, email: &str) -> Result<Value> {
        self.api.post_json(
            &["manage", "maintainers", maintainer_id, "users"],
            &json!({ "email": email }),
        )
    }
}

/// Look a user up before accepting them into a pending grant list.
pub fn validate_user(client: &ManageClient, email: &str) -> Result<User> {
    let user = client.user(email)?;
    if user.id.is_empty() {
        return Err(KbcError::NotFound(format!("user {email}")));
    }
    Ok(user)
}

/// Grant `feature` to each user in order; one outcome per email.
pub fn grant_feature(client: &ManageClient, emails: &[String], feature: &str) -> Vec<(String, Outcome)> {
    emails
        .iter()
        .map(|email| {
            let result = client.add_feature(FeatureScope::User, email, feature);
            (email.clone(), Outcome::from_result(result))
        })
        .collect()
}

/// Delete a user on every listed stack that has a token; keyed by region id.
pub fn delete_user_across<'a>(
    targets: impl IntoIterator<Item = (&'a Region, &'a str)>,
    email: &str,
) -> BTreeMap<String, Outcome> {
    targets
        .into_iter()
        .map(|(region, token)| {
            let result =
                ManageClient::connect(region, token).and_then(|client| client.delete_user(email));
            (region.id.clone(), Outcome::from_result(result))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
