//! Storage API: component configurations, rows, buckets, tables, branches.
//!
//! The migration workflows talk to storage through the [`StorageApi`] trait
//! so they can run against any project; [`StorageClient`] is the HTTP
//! implementation.

use crate::client::{ApiClient, Credential};
use crate::error::{KbcError, Result};
use crate::job::{self, PollPolicy, Sleeper, ThreadSleeper};
use crate::region::{Region, Service};
use crate::types::{Bucket, BucketId, Configuration, ConfigurationRow, Table};
use reqwest::blocking::multipart::Form;
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

// ---------------------------------------------------------------------------
// Creation payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewConfiguration {
    /// Force this id at the destination; `None` lets the API assign one.
    pub configuration_id: Option<String>,
    pub name: String,
    pub description: String,
    pub configuration: Value,
    pub state: Option<Value>,
    pub change_description: String,
    pub is_disabled: bool,
}

impl NewConfiguration {
    pub fn from_source(source: &Configuration, use_source_id: bool) -> Self {
        Self {
            configuration_id: use_source_id.then(|| source.id.clone()),
            name: source.name.clone(),
            description: source.description.clone(),
            configuration: source.configuration.clone(),
            state: non_empty(&source.state),
            change_description: source.change_description.clone(),
            is_disabled: source.is_disabled,
        }
    }

    pub fn form_fields(&self) -> Result<Vec<(&'static str, String)>> {
        let mut fields = Vec::new();
        if let Some(id) = &self.configuration_id {
            fields.push(("configurationId", id.clone()));
        }
        fields.push(("configuration", serde_json::to_string(&self.configuration)?));
        fields.push(("name", self.name.clone()));
        fields.push(("description", self.description.clone()));
        fields.push(("changeDescription", self.change_description.clone()));
        fields.push(("isDisabled", self.is_disabled.to_string()));
        if let Some(state) = &self.state {
            fields.push(("state", serde_json::to_string(state)?));
        }
        Ok(fields)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewConfigurationRow {
    pub row_id: Option<String>,
    pub name: String,
    pub description: String,
    pub configuration: Value,
    pub state: Option<Value>,
    pub change_description: String,
    pub is_disabled: bool,
}

/// Keys that point back at the source row or configuration.
pub const IDENTIFIER_KEYS: &[&str] = &["id", "rowId"];

/// Drop top-level identifier keys from a configuration or state body.
pub fn strip_identifiers(body: &mut Value) {
    if let Value::Object(map) = body {
        for key in IDENTIFIER_KEYS {
            map.shift_remove(*key);
        }
    }
}

impl NewConfigurationRow {
    /// Replay payload for a source row: the row's own id is dropped and
    /// identifier keys are stripped from its bodies, so the destination
    /// assigns fresh ids.
    pub fn from_source(row: &ConfigurationRow) -> Self {
        let mut configuration = row.configuration.clone();
        strip_identifiers(&mut configuration);
        let state = non_empty(&row.state).map(|mut s| {
            strip_identifiers(&mut s);
            s
        });
        Self {
            row_id: None,
            name: row.name.clone(),
            description: row.description.clone(),
            configuration,
            state,
            change_description: String::new(),
            is_disabled: row.is_disabled,
        }
    }

    pub fn form_fields(&self) -> Result<Vec<(&'static str, String)>> {
        let mut fields = vec![
            ("configuration", serde_json::to_string(&self.configuration)?),
            ("name", self.name.clone()),
            ("description", self.description.clone()),
        ];
        if let Some(id) = &self.row_id {
            fields.push(("rowId", id.clone()));
        }
        fields.push(("changeDescription", self.change_description.clone()));
        fields.push(("isDisabled", self.is_disabled.to_string()));
        if let Some(state) = &self.state {
            fields.push(("state", serde_json::to_string(state)?));
        }
        Ok(fields)
    }
}

fn non_empty(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(m) if m.is_empty() => None,
        Value::Array(a) if a.is_empty() => None,
        other => Some(other.clone()),
    }
}

// ---------------------------------------------------------------------------
// StorageApi
// ---------------------------------------------------------------------------

pub trait StorageApi {
    fn get_configuration(&self, component_id: &str, configuration_id: &str)
        -> Result<Configuration>;

    fn list_configuration_rows(
        &self,
        component_id: &str,
        configuration_id: &str,
    ) -> Result<Vec<ConfigurationRow>>;

    fn create_configuration(
        &self,
        component_id: &str,
        new: &NewConfiguration,
    ) -> Result<Configuration>;

    fn create_configuration_row(
        &self,
        component_id: &str,
        configuration_id: &str,
        row: &NewConfigurationRow,
    ) -> Result<ConfigurationRow>;

    fn list_buckets(&self) -> Result<Vec<Bucket>>;

    fn list_bucket_tables(&self, bucket_id: &str) -> Result<Vec<Table>>;

    fn create_bucket(&self, bucket: &BucketId) -> Result<Bucket>;

    /// Write the table's full CSV export to `dest`.
    fn export_table(&self, table_id: &str, dest: &Path) -> Result<()>;

    /// Create `name` in `bucket_id` from a CSV file, keeping the primary key
    /// column order.
    fn create_table_from_file(
        &self,
        bucket_id: &str,
        name: &str,
        file: &Path,
        primary_key: &[String],
    ) -> Result<Table>;
}

// ---------------------------------------------------------------------------
// StorageClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StorageClient {
    api: ApiClient,
    branch_id: Option<String>,
    poll: PollPolicy,
}

impl StorageClient {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            branch_id: None,
            poll: PollPolicy::default(),
        }
    }

    pub fn connect(region: &Region, token: &str) -> Result<Self> {
        let api = ApiClient::for_region(region, Service::Connection, Credential::Storage(token.into()))?;
        Ok(Self::new(api))
    }

    /// Scope configuration calls to a development branch.
    pub fn with_branch(mut self, branch_id: Option<String>) -> Self {
        self.branch_id = branch_id;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn components<'a>(&'a self, rest: &[&'a str]) -> Vec<&'a str> {
        let mut segments = vec!["v2", "storage"];
        if let Some(branch) = &self.branch_id {
            segments.extend(["branch", branch.as_str()]);
        }
        segments.push("components");
        segments.extend_from_slice(rest);
        segments
    }

    fn state_branch(&self) -> &str {
        self.branch_id.as_deref().unwrap_or("default")
    }

    // -- components & configurations ----------------------------------------

    pub fn list_components(&self, component_type: Option<&str>, include: &str) -> Result<Value> {
        let mut query = vec![("include", include)];
        if let Some(kind) = component_type {
            query.push(("componentType", kind));
        }
        self.api.get_with_query(&self.components(&[]), &query)
    }

    pub fn list_configurations(&self, component_id: &str) -> Result<Vec<Configuration>> {
        let body = self.api.get(&self.components(&[component_id, "configs"]))?;
        Ok(serde_json::from_value(body)?)
    }

    pub fn configuration_detail(&self, component_id: &str, configuration_id: &str) -> Result<Value> {
        self.api
            .get(&self.components(&[component_id, "configs", configuration_id]))
    }

    pub fn row_detail(&self, component_id: &str, configuration_id: &str, row_id: &str) -> Result<Value> {
        self.api.get(&self.components(&[
            component_id,
            "configs",
            configuration_id,
            "rows",
            row_id,
        ]))
    }

    pub fn list_versions(&self, component_id: &str, configuration_id: &str, limit: u32) -> Result<Value> {
        self.api.get_with_query(
            &self.components(&[component_id, "configs", configuration_id, "versions"]),
            &[("limit", limit)],
        )
    }

    pub fn update_configuration(
        &self,
        component_id: &str,
        configuration_id: &str,
        update: &NewConfiguration,
    ) -> Result<Value> {
        if let Some(state) = &update.state {
            self.update_configuration_state(component_id, configuration_id, state)?;
        }
        let mut fields = vec![("configurationId", configuration_id.to_string())];
        if !update.configuration.is_null() {
            fields.push(("configuration", serde_json::to_string(&update.configuration)?));
        }
        fields.push(("name", update.name.clone()));
        fields.push(("description", update.description.clone()));
        fields.push(("changeDescription", update.change_description.clone()));
        fields.push(("isDisabled", update.is_disabled.to_string()));
        self.api
            .put_form(&self.components(&[component_id, "configs", configuration_id]), &fields)
    }

    pub fn update_configuration_state(
        &self,
        component_id: &str,
        configuration_id: &str,
        state: &Value,
    ) -> Result<Value> {
        let branch = self.state_branch();
        self.api.put_form(
            &[
                "v2",
                "storage",
                "branch",
                branch,
                "components",
                component_id,
                "configs",
                configuration_id,
                "state",
            ],
            &[("state", serde_json::to_string(state)?)],
        )
    }

    pub fn update_row(
        &self,
        component_id: &str,
        configuration_id: &str,
        row_id: &str,
        update: &NewConfigurationRow,
    ) -> Result<Value> {
        if let Some(state) = &update.state {
            self.update_row_state(component_id, configuration_id, row_id, state)?;
        }
        let mut fields = vec![("configurationId", configuration_id.to_string())];
        if !update.configuration.is_null() {
            fields.push(("configuration", serde_json::to_string(&update.configuration)?));
        }
        fields.push(("name", update.name.clone()));
        fields.push(("description", update.description.clone()));
        fields.push(("changeDescription", update.change_description.clone()));
        fields.push(("isDisabled", update.is_disabled.to_string()));
        self.api.put_form(
            &self.components(&[component_id, "configs", configuration_id, "rows", row_id]),
            &fields,
        )
    }

    pub fn update_row_state(
        &self,
        component_id: &str,
        configuration_id: &str,
        row_id: &str,
        state: &Value,
    ) -> Result<Value> {
        let branch = self.state_branch();
        self.api.put_form(
            &[
                "v2",
                "storage",
                "branch",
                branch,
                "components",
                component_id,
                "configs",
                configuration_id,
                "rows",
                row_id,
                "state",
            ],
            &[("state", serde_json::to_string(state)?)],
        )
    }

    pub fn delete_configuration(&self, component_id: &str, configuration_id: &str) -> Result<Value> {
        self.api
            .delete(&self.components(&[component_id, "configs", configuration_id]))
    }

    /// Copy a configuration inside the same project from its latest version.
    /// Returns the id of the copy.
    pub fn copy_configuration(
        &self,
        component_id: &str,
        configuration_id: &str,
        name: &str,
        description: &str,
    ) -> Result<String> {
        let versions = self.list_versions(component_id, configuration_id, 1)?;
        let latest = versions
            .get(0)
            .and_then(|v| v.get("version"))
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                KbcError::incomplete(format!(
                    "versions for configuration {component_id}/{configuration_id}"
                ))
            })?;
        let latest = latest.to_string();
        let created = self.api.post_form(
            &[
                "v2",
                "storage",
                "components",
                component_id,
                "configs",
                configuration_id,
                "versions",
                &latest,
                "create",
            ],
            &[("name", name.to_string()), ("description", description.to_string())],
        )?;
        created_id(&created)
    }

    // -- branches -------------------------------------------------------------

    /// Create a development branch and wait for the async job; returns the
    /// new branch id.
    pub fn create_branch(&self, name: &str, description: &str, sleeper: &dyn Sleeper) -> Result<String> {
        let accepted = self.api.post_form(
            &["v2", "storage", "dev-branches", ""],
            &[("name", name.to_string()), ("description", description.to_string())],
        )?;
        let job = self.wait(&accepted, sleeper)?;
        job.pointer("/results/id")
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or_else(|| KbcError::incomplete("branch id in finished job"))
    }

    fn wait(&self, accepted: &Value, sleeper: &dyn Sleeper) -> Result<Value> {
        let url = accepted
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| KbcError::incomplete("job status url"))?;
        let job = self.api.wait_for_job(url, &self.poll, sleeper)?;
        job::expect_success(job)
    }

    // -- files ----------------------------------------------------------------

    /// Download an export file. A sliced file is a manifest of headerless
    /// CSV slices; they are concatenated in manifest order under a header
    /// built from the table's columns.
    fn download_file(&self, table_id: &str, file_id: &str, dest: &Path) -> Result<()> {
        let file = self.api.get(&["v2", "storage", "files", file_id])?;
        let url = file
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| KbcError::incomplete(format!("download url for file {file_id}")))?;
        let mut out = BufWriter::new(File::create(dest)?);
        let bytes = if file.get("isSliced").and_then(Value::as_bool).unwrap_or(false) {
            self.download_slices(table_id, file_id, url, &mut out)?
        } else {
            self.api.download(url, &mut out)?
        };
        out.flush()?;
        tracing::debug!(file_id, bytes, path = %dest.display(), "file downloaded");
        Ok(())
    }

    fn download_slices(
        &self,
        table_id: &str,
        file_id: &str,
        manifest_url: &str,
        out: &mut dyn Write,
    ) -> Result<u64> {
        let mut raw = Vec::new();
        self.api.download(manifest_url, &mut raw)?;
        let manifest: Value = serde_json::from_slice(&raw).map_err(|_| KbcError::Decode {
            method: "GET".into(),
            url: manifest_url.to_string(),
            raw: String::from_utf8_lossy(&raw).into_owned(),
        })?;
        let entries = manifest
            .get("entries")
            .and_then(Value::as_array)
            .ok_or_else(|| KbcError::incomplete(format!("slice entries for file {file_id}")))?;

        let table = self.api.get(&["v2", "storage", "tables", table_id])?;
        let columns: Vec<String> = table
            .get("columns")
            .cloned()
            .and_then(|c| serde_json::from_value::<Vec<String>>(c).ok())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| KbcError::incomplete(format!("columns of table {table_id}")))?;
        let header = csv_header(&columns);
        out.write_all(header.as_bytes())?;
        let mut bytes = header.len() as u64;

        for entry in entries {
            let slice = entry
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| KbcError::incomplete(format!("slice url for file {file_id}")))?;
            if !(slice.starts_with("https://") || slice.starts_with("http://")) {
                return Err(KbcError::invalid(format!(
                    "slice '{slice}' of file {file_id} is not downloadable over http"
                )));
            }
            bytes += self.api.download(slice, out)?;
        }
        tracing::debug!(file_id, slices = entries.len(), "slices joined");
        Ok(bytes)
    }

    fn export_table_with(&self, table_id: &str, dest: &Path, sleeper: &dyn Sleeper) -> Result<()> {
        let accepted = self.api.post_form(
            &["v2", "storage", "tables", table_id, "export-async"],
            &[("gzip", "0".to_string())],
        )?;
        let job = self.wait(&accepted, sleeper)?;
        let file_id = match job.pointer("/results/file/id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(KbcError::incomplete(format!("export file for table {table_id}"))),
        };
        self.download_file(table_id, &file_id, dest)
    }
}

fn csv_header(columns: &[String]) -> String {
    let quoted: Vec<String> = columns
        .iter()
        .map(|c| format!("\"{}\"", c.replace('"', "\"\"")))
        .collect();
    format!("{}\n", quoted.join(","))
}

fn created_id(created: &Value) -> Result<String> {
    match created.get("id") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(KbcError::incomplete("id in creation response")),
    }
}

impl StorageApi for StorageClient {
    fn get_configuration(&self, component_id: &str, configuration_id: &str) -> Result<Configuration> {
        let body = self.configuration_detail(component_id, configuration_id)?;
        Ok(serde_json::from_value(body)?)
    }

    fn list_configuration_rows(
        &self,
        component_id: &str,
        configuration_id: &str,
    ) -> Result<Vec<ConfigurationRow>> {
        let body = self
            .api
            .get(&self.components(&[component_id, "configs", configuration_id, "rows"]))?;
        Ok(serde_json::from_value(body)?)
    }

    fn create_configuration(&self, component_id: &str, new: &NewConfiguration) -> Result<Configuration> {
        let body = self
            .api
            .post_form(&self.components(&[component_id, "configs"]), &new.form_fields()?)?;
        Ok(serde_json::from_value(body)?)
    }

    fn create_configuration_row(
        &self,
        component_id: &str,
        configuration_id: &str,
        row: &NewConfigurationRow,
    ) -> Result<ConfigurationRow> {
        let body = self.api.post_form(
            &self.components(&[component_id, "configs", configuration_id, "rows"]),
            &row.form_fields()?,
        )?;
        Ok(serde_json::from_value(body)?)
    }

    fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let body = self.api.get(&["v2", "storage", "buckets"])?;
        Ok(serde_json::from_value(body)?)
    }

    fn list_bucket_tables(&self, bucket_id: &str) -> Result<Vec<Table>> {
        let body = self.api.get(&["v2", "storage", "buckets", bucket_id, "tables"])?;
        Ok(serde_json::from_value(body)?)
    }

    fn create_bucket(&self, bucket: &BucketId) -> Result<Bucket> {
        let body = self.api.post_form(
            &["v2", "storage", "buckets"],
            &[("name", bucket.name.clone()), ("stage", bucket.stage.clone())],
        )?;
        Ok(serde_json::from_value(body)?)
    }

    fn export_table(&self, table_id: &str, dest: &Path) -> Result<()> {
        self.export_table_with(table_id, dest, &ThreadSleeper)
    }

    fn create_table_from_file(
        &self,
        bucket_id: &str,
        name: &str,
        file: &Path,
        primary_key: &[String],
    ) -> Result<Table> {
        let form = Form::new()
            .text("name", name.to_string())
            .text("primaryKey", primary_key.join(","))
            .file("data", file)?;
        let body = self
            .api
            .post_multipart(&["v2", "storage", "buckets", bucket_id, "tables"], form)?;
        Ok(serde_json::from_value(body)?)
    }
}

/// Body of a version-copy or orchestration payload, used in logs.
pub fn describe(new: &NewConfiguration) -> Value {
    json!({
        "configurationId": new.configuration_id,
        "name": new.name,
        "isDisabled": new.is_disabled,
        "hasState": new.state.is_some(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
