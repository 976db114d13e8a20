//! In-memory project used by workflow tests.

use crate::error::{KbcError, Result};
use crate::storage::{NewConfiguration, NewConfigurationRow, StorageApi};
use crate::types::{Bucket, BucketId, Configuration, ConfigurationRow, Table};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct StoredTable {
    pub table: Table,
    pub csv: String,
}

#[derive(Default)]
pub struct MemoryProject {
    pub configurations: RefCell<BTreeMap<(String, String), Configuration>>,
    pub rows: RefCell<BTreeMap<(String, String), Vec<ConfigurationRow>>>,
    pub buckets: RefCell<Vec<Bucket>>,
    pub tables: RefCell<BTreeMap<String, StoredTable>>,
    /// Every mutating or export call, in order.
    pub calls: RefCell<Vec<String>>,
    /// Row payloads received by `create_configuration_row`.
    pub row_payloads: RefCell<Vec<NewConfigurationRow>>,
    fail_row_at: Option<usize>,
    fail_import: Option<String>,
    next_id: RefCell<u64>,
}

impl MemoryProject {
    pub fn new() -> Self {
        Self {
            next_id: RefCell::new(1000),
            ..Default::default()
        }
    }

    /// Fail the n-th (0-based) row creation with HTTP 400.
    pub fn failing_row_at(mut self, index: usize) -> Self {
        self.fail_row_at = Some(index);
        self
    }

    /// Reject imports of the table called `name`.
    pub fn failing_import(mut self, name: &str) -> Self {
        self.fail_import = Some(name.to_string());
        self
    }

    pub fn with_configuration(self, component_id: &str, cfg: Value, rows: Vec<Value>) -> Self {
        let cfg: Configuration = serde_json::from_value(cfg).expect("valid configuration fixture");
        let rows: Vec<ConfigurationRow> = rows
            .into_iter()
            .map(|r| serde_json::from_value(r).expect("valid row fixture"))
            .collect();
        let key = (component_id.to_string(), cfg.id.clone());
        self.rows.borrow_mut().insert(key.clone(), rows);
        self.configurations.borrow_mut().insert(key, cfg);
        self
    }

    pub fn with_table(self, bucket_id: &str, name: &str, primary_key: &[&str], csv: &str) -> Self {
        if !self.buckets.borrow().iter().any(|b| b.id == bucket_id) {
            let parsed = BucketId::parse(bucket_id).expect("valid bucket fixture");
            self.buckets.borrow_mut().push(Bucket {
                id: bucket_id.to_string(),
                name: format!("c-{}", parsed.name),
                stage: parsed.stage,
            });
        }
        let id = format!("{bucket_id}.{name}");
        self.tables.borrow_mut().insert(
            id.clone(),
            StoredTable {
                table: Table {
                    id,
                    name: name.to_string(),
                    primary_key: primary_key.iter().map(|s| s.to_string()).collect(),
                    columns: Vec::new(),
                },
                csv: csv.to_string(),
            },
        );
        self
    }

    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn table_ids(&self) -> Vec<String> {
        self.tables.borrow().keys().cloned().collect()
    }

    fn fresh_id(&self) -> String {
        let mut n = self.next_id.borrow_mut();
        *n += 1;
        n.to_string()
    }

    fn not_found(what: String) -> KbcError {
        KbcError::Api {
            method: "GET".into(),
            url: format!("memory://{what}"),
            status: 404,
            body: json!({"error": format!("{what} not found")}),
        }
    }
}

impl StorageApi for MemoryProject {
    fn get_configuration(&self, component_id: &str, configuration_id: &str) -> Result<Configuration> {
        self.configurations
            .borrow()
            .get(&(component_id.to_string(), configuration_id.to_string()))
            .cloned()
            .ok_or_else(|| Self::not_found(format!("configuration {component_id}/{configuration_id}")))
    }

    fn list_configuration_rows(
        &self,
        component_id: &str,
        configuration_id: &str,
    ) -> Result<Vec<ConfigurationRow>> {
        self.rows
            .borrow()
            .get(&(component_id.to_string(), configuration_id.to_string()))
            .cloned()
            .ok_or_else(|| Self::not_found(format!("rows of {component_id}/{configuration_id}")))
    }

    fn create_configuration(&self, component_id: &str, new: &NewConfiguration) -> Result<Configuration> {
        let id = new.configuration_id.clone().unwrap_or_else(|| self.fresh_id());
        self.calls
            .borrow_mut()
            .push(format!("create_configuration {component_id}/{id}"));
        let cfg = Configuration {
            id: id.clone(),
            name: new.name.clone(),
            description: new.description.clone(),
            configuration: new.configuration.clone(),
            state: new.state.clone().unwrap_or(Value::Null),
            is_disabled: new.is_disabled,
            version: 1,
            change_description: new.change_description.clone(),
            rows: Vec::new(),
        };
        let key = (component_id.to_string(), id);
        self.configurations.borrow_mut().insert(key.clone(), cfg.clone());
        self.rows.borrow_mut().entry(key).or_default();
        Ok(cfg)
    }

    fn create_configuration_row(
        &self,
        component_id: &str,
        configuration_id: &str,
        row: &NewConfigurationRow,
    ) -> Result<ConfigurationRow> {
        let attempt = self.row_payloads.borrow().len();
        self.row_payloads.borrow_mut().push(row.clone());
        self.calls
            .borrow_mut()
            .push(format!("create_row {component_id}/{configuration_id} {}", row.name));
        if self.fail_row_at == Some(attempt) {
            return Err(KbcError::Api {
                method: "POST".into(),
                url: format!("memory://{component_id}/{configuration_id}/rows"),
                status: 400,
                body: json!({"error": "invalid row"}),
            });
        }
        let created = ConfigurationRow {
            id: self.fresh_id(),
            name: row.name.clone(),
            description: row.description.clone(),
            configuration: row.configuration.clone(),
            state: row.state.clone().unwrap_or(Value::Null),
            is_disabled: row.is_disabled,
        };
        self.rows
            .borrow_mut()
            .entry((component_id.to_string(), configuration_id.to_string()))
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    fn list_buckets(&self) -> Result<Vec<Bucket>> {
        Ok(self.buckets.borrow().clone())
    }

    fn list_bucket_tables(&self, bucket_id: &str) -> Result<Vec<Table>> {
        let prefix = format!("{bucket_id}.");
        Ok(self
            .tables
            .borrow()
            .values()
            .filter(|t| t.table.id.starts_with(&prefix))
            .map(|t| t.table.clone())
            .collect())
    }

    fn create_bucket(&self, bucket: &BucketId) -> Result<Bucket> {
        self.calls.borrow_mut().push(format!("create_bucket {bucket}"));
        let created = Bucket {
            id: bucket.to_string(),
            name: format!("c-{}", bucket.name),
            stage: bucket.stage.clone(),
        };
        self.buckets.borrow_mut().push(created.clone());
        Ok(created)
    }

    fn export_table(&self, table_id: &str, dest: &Path) -> Result<()> {
        self.calls.borrow_mut().push(format!("export {table_id}"));
        let csv = self
            .tables
            .borrow()
            .get(table_id)
            .map(|t| t.csv.clone())
            .ok_or_else(|| Self::not_found(format!("table {table_id}")))?;
        std::fs::write(dest, csv)?;
        Ok(())
    }

    fn create_table_from_file(
        &self,
        bucket_id: &str,
        name: &str,
        file: &Path,
        primary_key: &[String],
    ) -> Result<Table> {
        self.calls
            .borrow_mut()
            .push(format!("import {bucket_id}.{name} from {}", file.display()));
        if self.fail_import.as_deref() == Some(name) {
            return Err(KbcError::Api {
                method: "POST".into(),
                url: format!("memory://buckets/{bucket_id}/tables"),
                status: 400,
                body: json!({"error": "invalid csv"}),
            });
        }
        if !self.buckets.borrow().iter().any(|b| b.id == bucket_id) {
            return Err(Self::not_found(format!("bucket {bucket_id}")));
        }
        let csv = std::fs::read_to_string(file)?;
        let table = Table {
            id: format!("{bucket_id}.{name}"),
            name: name.to_string(),
            primary_key: primary_key.to_vec(),
            columns: Vec::new(),
        };
        self.tables.borrow_mut().insert(
            table.id.clone(),
            StoredTable {
                table: table.clone(),
                csv,
            },
        );
        Ok(table)
    }
}
