//! Per-invocation context: the selected region, credentials, users queued
//! for a feature grant and the outcomes of earlier steps.

use crate::encryption::EncryptionClient;
use crate::error::{KbcError, Result};
use crate::job::PollPolicy;
use crate::manage::{validate_user, ManageClient};
use crate::orchestrator::{SchedulerClient, SyrupClient};
use crate::outcome::Outcome;
use crate::portal::{PortalClient, DEFAULT_PORTAL_URL};
use crate::region::{Region, RegionTable};
use crate::storage::StorageClient;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Session {
    regions: RegionTable,
    region: Option<Region>,
    manage_token: Option<String>,
    storage_token: Option<String>,
    portal_token: Option<String>,
    branch_id: Option<String>,
    poll: PollPolicy,
    portal_url: String,
    pending_users: Vec<String>,
    outcomes: BTreeMap<String, BTreeMap<String, Outcome>>,
}

impl Session {
    pub fn new(regions: RegionTable) -> Self {
        Self {
            regions,
            region: None,
            manage_token: None,
            storage_token: None,
            portal_token: None,
            branch_id: None,
            poll: PollPolicy::default(),
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            pending_users: Vec::new(),
            outcomes: BTreeMap::new(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_portal_url(mut self, url: &str) -> Self {
        self.portal_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    // -- region & credentials ---------------------------------------------------

    /// Select the working region. Unknown keys fail before any client exists.
    pub fn select_region(&mut self, key: &str) -> Result<&Region> {
        let region = self.regions.resolve(key)?.clone();
        tracing::debug!(region = %region.id, "region selected");
        Ok(self.region.insert(region))
    }

    pub fn region(&self) -> Result<&Region> {
        self.region
            .as_ref()
            .ok_or_else(|| KbcError::missing("region (--region or default_region)"))
    }

    pub fn set_manage_token(&mut self, token: Option<String>) {
        self.manage_token = token.filter(|t| !t.trim().is_empty());
    }

    pub fn set_storage_token(&mut self, token: Option<String>) {
        self.storage_token = token.filter(|t| !t.trim().is_empty());
    }

    pub fn set_portal_token(&mut self, token: Option<String>) {
        self.portal_token = token.filter(|t| !t.trim().is_empty());
    }

    pub fn set_branch(&mut self, branch_id: Option<String>) {
        self.branch_id = branch_id;
    }

    pub fn manage_token(&self) -> Result<&str> {
        self.manage_token
            .as_deref()
            .ok_or_else(|| KbcError::missing("manage token (--manage-token or KBC_MANAGE_TOKEN)"))
    }

    pub fn storage_token(&self) -> Result<&str> {
        self.storage_token
            .as_deref()
            .ok_or_else(|| KbcError::missing("storage token (--storage-token or KBC_STORAGE_TOKEN)"))
    }

    // -- clients ----------------------------------------------------------------

    pub fn manage(&self) -> Result<ManageClient> {
        ManageClient::connect(self.region()?, self.manage_token()?)
    }

    pub fn storage(&self) -> Result<StorageClient> {
        Ok(StorageClient::connect(self.region()?, self.storage_token()?)?
            .with_branch(self.branch_id.clone())
            .with_poll_policy(self.poll.clone()))
    }

    pub fn syrup(&self) -> Result<SyrupClient> {
        SyrupClient::connect(self.region()?, self.storage_token()?)
    }

    pub fn scheduler(&self) -> Result<SchedulerClient> {
        SchedulerClient::connect(self.region()?, self.storage_token()?)
    }

    pub fn encryption(&self) -> Result<EncryptionClient> {
        EncryptionClient::connect(self.region()?)
    }

    pub fn portal(&self) -> Result<PortalClient> {
        let token = self
            .portal_token
            .as_deref()
            .ok_or_else(|| KbcError::missing("developer portal session token"))?;
        PortalClient::with_token(&self.portal_url, token)
    }

    /// Log in to the developer portal and keep the session token.
    pub fn portal_login(&mut self, email: &str, password: &str) -> Result<PortalClient> {
        let (client, token) = PortalClient::login(&self.portal_url, email, password)?;
        self.portal_token = Some(token);
        Ok(client)
    }

    // -- pending users ----------------------------------------------------------

    /// Look the user up and queue them for a grant. Duplicates are ignored.
    pub fn queue_user(&mut self, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(KbcError::missing("user email"));
        }
        if self.pending_users.iter().any(|u| u.eq_ignore_ascii_case(email)) {
            return Ok(());
        }
        let user = validate_user(&self.manage()?, email)?;
        tracing::info!(user = email, id = %user.id, "user queued");
        self.pending_users.push(email.to_string());
        Ok(())
    }

    pub fn pending_users(&self) -> &[String] {
        &self.pending_users
    }

    // -- remembered outcomes ------------------------------------------------------

    pub fn remember(&mut self, operation: &str, outcomes: BTreeMap<String, Outcome>) {
        self.outcomes.insert(operation.to_string(), outcomes);
    }

    pub fn remembered(&self, operation: &str) -> Option<&BTreeMap<String, Outcome>> {
        self.outcomes.get(operation)
    }

    /// Drop everything entered so far; the region table is kept.
    pub fn reset(&mut self) {
        self.region = None;
        self.manage_token = None;
        self.storage_token = None;
        self.portal_token = None;
        self.branch_id = None;
        self.pending_users.clear();
        self.outcomes.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn unknown_region_is_rejected_before_any_request() {
        let mut server = mockito::Server::new();
        let any = server.mock("GET", mockito::Matcher::Any).expect(0).create();

        let mut table = RegionTable::default();
        table.insert(Region::local("mock", &server.url()));
        let mut session = Session::new(table);
        session.set_manage_token(Some("mt".into()));

        let err = session.select_region("mars-1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let err = session.manage().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        any.assert();
    }

    #[test]
    fn missing_tokens_are_configuration_errors() {
        let mut session = Session::new(RegionTable::default());
        session.select_region("EU").unwrap();
        session.set_storage_token(Some("  ".into()));
        assert!(matches!(session.storage(), Err(KbcError::MissingInput(_))));
        assert!(matches!(session.manage(), Err(KbcError::MissingInput(_))));
        assert!(session.encryption().is_ok());
    }

    #[test]
    fn queue_user_validates_and_dedupes() {
        let mut server = mockito::Server::new();
        let lookup = server
            .mock("GET", "/manage/users/a@x.io")
            .with_status(200)
            .with_body(r#"{"id": 10, "email": "a@x.io"}"#)
            .expect(1)
            .create();
        server
            .mock("GET", "/manage/users/ghost@x.io")
            .with_status(404)
            .with_body(r#"{"error": "not found"}"#)
            .create();

        let mut table = RegionTable::empty();
        table.insert(Region::local("mock", &server.url()));
        let mut session = Session::new(table);
        session.select_region("mock").unwrap();
        session.set_manage_token(Some("mt".into()));

        session.queue_user("a@x.io").unwrap();
        session.queue_user("A@x.io").unwrap();
        assert!(session.queue_user("ghost@x.io").is_err());
        assert_eq!(session.pending_users(), ["a@x.io".to_string()]);
        lookup.assert();
    }

    #[test]
    fn reset_clears_inputs() {
        let mut session = Session::new(RegionTable::default());
        session.select_region("US").unwrap();
        session.set_manage_token(Some("mt".into()));
        session.remember(
            "get",
            BTreeMap::from([("us-east-1".to_string(), Outcome::success(json!({})))]),
        );
        assert!(session.remembered("get").is_some());

        session.reset();
        assert!(session.region().is_err());
        assert!(session.manage_token().is_err());
        assert!(session.remembered("get").is_none());
        assert!(session.pending_users().is_empty());
        assert!(session.regions().resolve("US").is_ok());
    }
}
