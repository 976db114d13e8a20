//! Legacy job runner, orchestrator and scheduler endpoints.

use crate::client::{ApiClient, Credential};
use crate::error::Result;
use crate::region::{Region, Service};
use serde::Serialize;
use serde_json::{json, Value};

/// Scheduler page size; a shorter page ends the listing.
pub const SCHEDULE_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationSpec {
    pub name: String,
    pub tasks: Value,
    pub active: bool,
    pub crontab_record: Option<String>,
    pub crontab_timezone: Option<String>,
    pub variable_values_id: Option<String>,
    pub variable_values_data: Option<Value>,
}

impl OrchestrationSpec {
    pub fn new(name: &str, tasks: Value) -> Self {
        Self {
            name: name.to_string(),
            tasks,
            active: true,
            crontab_record: None,
            crontab_timezone: None,
            variable_values_id: None,
            variable_values_data: None,
        }
    }
}

pub trait OrchestratorApi {
    fn create_orchestration(&self, spec: &OrchestrationSpec) -> Result<Value>;
}

// ---------------------------------------------------------------------------
// SyrupClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SyrupClient {
    api: ApiClient,
}

impl SyrupClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn connect(region: &Region, storage_token: &str) -> Result<Self> {
        Ok(Self::new(ApiClient::for_region(
            region,
            Service::Syrup,
            Credential::Storage(storage_token.into()),
        )?))
    }

    /// Queue a run of one component configuration.
    pub fn run_config(&self, component_id: &str, configuration_id: &str) -> Result<Value> {
        self.api.post_json(
            &["docker", component_id, "run"],
            &json!({ "config": configuration_id }),
        )
    }

    pub fn list_orchestrations(&self) -> Result<Value> {
        self.api.get(&["orchestrator", "orchestrations"])
    }

    pub fn update_orchestration(&self, orchestration_id: &str, spec: &OrchestrationSpec) -> Result<Value> {
        self.api
            .put_json(&["orchestrator", "orchestrations", orchestration_id], spec)
    }

    pub fn run_orchestration(&self, orchestration_id: &str) -> Result<Value> {
        self.api
            .post_empty(&["orchestrator", "orchestrations", orchestration_id, "jobs"])
    }
}

impl OrchestratorApi for SyrupClient {
    fn create_orchestration(&self, spec: &OrchestrationSpec) -> Result<Value> {
        self.api.post_json(&["orchestrator", "orchestrations"], spec)
    }
}

// ---------------------------------------------------------------------------
// SchedulerClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulerClient {
    api: ApiClient,
}

impl SchedulerClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn connect(region: &Region, storage_token: &str) -> Result<Self> {
        Ok(Self::new(ApiClient::for_region(
            region,
            Service::Scheduler,
            Credential::Storage(storage_token.into()),
        )?))
    }

    /// Every schedule of the project, following `limit`/`offset` pages.
    pub fn list_schedules(&self) -> Result<Vec<Value>> {
        let mut all = Vec::new();
        let mut offset = 0usize;
        loop {
            let page = self.api.get_with_query(
                &["schedules"],
                &[("limit", SCHEDULE_PAGE_SIZE), ("offset", offset)],
            )?;
            let rows = match page {
                Value::Array(rows) => rows,
                Value::Null => Vec::new(),
                other => vec![other],
            };
            let last = rows.len() < SCHEDULE_PAGE_SIZE;
            all.extend(rows);
            if last {
                return Ok(all);
            }
            offset += SCHEDULE_PAGE_SIZE;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
