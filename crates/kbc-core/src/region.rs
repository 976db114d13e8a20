//! Region (stack) lookup shared by every client.
//!
//! A region is identified by its hostname suffix; each remote service lives
//! on `https://<service>.<suffix>`. Regions may carry an endpoint override
//! that routes every service to a single base URL (local proxies, tests).

use crate::error::{KbcError, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    /// Management (`/manage`) and Storage (`/v2/storage`) APIs.
    Connection,
    /// Legacy job runner and orchestrator.
    Syrup,
    Scheduler,
    Oauth,
    Encryption,
}

impl Service {
    pub fn host_prefix(self) -> &'static str {
        match self {
            Service::Connection => "connection",
            Service::Syrup => "syrup",
            Service::Scheduler => "scheduler",
            Service::Oauth => "oauth",
            Service::Encryption => "encryption",
        }
    }
}

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    /// Hostname suffix, e.g. `eu-central-1.keboola.com`.
    pub suffix: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Region {
    pub fn new(id: &str, suffix: &str, label: &str, aliases: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            suffix: suffix.to_string(),
            label: label.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            endpoint: None,
        }
    }

    /// A region whose services are all served from `base_url`.
    pub fn local(id: &str, base_url: &str) -> Self {
        Self {
            id: id.to_string(),
            suffix: "localhost".to_string(),
            label: format!("local ({base_url})"),
            aliases: Vec::new(),
            endpoint: Some(base_url.trim_end_matches('/').to_string()),
        }
    }

    pub fn url(&self, service: Service) -> String {
        match &self.endpoint {
            Some(base) => base.clone(),
            None => format!("https://{}.{}", service.host_prefix(), self.suffix),
        }
    }

    /// GCP stacks speak camelCase on the OAuth registry.
    pub fn is_gcp(&self) -> bool {
        self.suffix.contains("gcp")
    }

    pub fn token_page(&self) -> String {
        format!("{}/admin/account/access-tokens", self.url(Service::Connection))
    }

    fn matches(&self, key: &str) -> bool {
        let key = key.trim();
        let key = key.strip_prefix("connection.").unwrap_or(key);
        self.id.eq_ignore_ascii_case(key)
            || self.suffix.eq_ignore_ascii_case(key)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(key))
    }
}

// ---------------------------------------------------------------------------
// RegionTable
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RegionTable {
    regions: Vec<Region>,
}

impl Default for RegionTable {
    fn default() -> Self {
        Self {
            regions: vec![
                Region::new("us-east-1", "keboola.com", "AWS us-east-1", &["US"]),
                Region::new(
                    "eu-central-1",
                    "eu-central-1.keboola.com",
                    "AWS eu-central-1",
                    &["EU"],
                ),
                Region::new(
                    "north-europe-azure",
                    "north-europe.azure.keboola.com",
                    "Azure North Europe",
                    &["AZURE-EU"],
                ),
                Region::new("us-east4-gcp", "us-east4.gcp.keboola.com", "GCP US East4", &[]),
                Region::new(
                    "europe-west3-gcp",
                    "europe-west3.gcp.keboola.com",
                    "GCP Europe West3",
                    &[],
                ),
                Region::new(
                    "europe-west2-gcp",
                    "europe-west2.gcp.keboola.com",
                    "GCP Europe West2",
                    &[],
                ),
            ],
        }
    }
}

impl RegionTable {
    pub fn empty() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Add a region, replacing any existing entry with the same id.
    pub fn insert(&mut self, region: Region) {
        if let Some(existing) = self.regions.iter_mut().find(|r| r.id == region.id) {
            *existing = region;
        } else {
            self.regions.push(region);
        }
    }

    /// Register the stack the tool runs on (value of `KBC_STACKID`, e.g.
    /// `connection.north-europe.azure.keboola.com`) under the id `current`.
    pub fn with_current_stack(mut self, stack_id: &str) -> Self {
        let suffix = stack_id
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("connection.")
            .trim_end_matches('/');
        if !suffix.is_empty() {
            self.insert(Region::new("current", suffix, "Current stack", &["CURRENT_STACK"]));
        }
        self
    }

    pub fn resolve(&self, key: &str) -> Result<&Region> {
        self.regions
            .iter()
            .find(|r| r.matches(key))
            .ok_or_else(|| KbcError::UnknownRegion(key.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
