//! Typed views over the API payloads this crate reads fields from.
//!
//! Everything else stays an opaque `serde_json::Value`: configuration and
//! state bodies are component-defined and never inspected beyond identifier
//! stripping.

use crate::error::{KbcError, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;

/// Ids arrive as JSON numbers from the management API and as strings from
/// storage; normalise both to `String`.
pub fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Storage: configurations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub configuration: Value,
    #[serde(default)]
    pub state: Value,
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default)]
    pub version: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub change_description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<ConfigurationRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationRow {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub configuration: Value,
    #[serde(default)]
    pub state: Value,
    #[serde(default)]
    pub is_disabled: bool,
}

// ---------------------------------------------------------------------------
// Storage: buckets and tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub columns: Vec<String>,
}

/// `<stage>.c-<name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketId {
    pub stage: String,
    pub name: String,
}

static BUCKET_RE: OnceLock<Regex> = OnceLock::new();

fn bucket_re() -> &'static Regex {
    BUCKET_RE.get_or_init(|| {
        Regex::new(r"^(in|out|sys)\.c-([A-Za-z0-9_\-]+)$").expect("bucket id regex is valid")
    })
}

impl BucketId {
    pub fn parse(id: &str) -> Result<Self> {
        let caps = bucket_re().captures(id.trim()).ok_or_else(|| {
            KbcError::invalid(format!(
                "bucket id '{id}': expected '<in|out|sys>.c-<name>'"
            ))
        })?;
        Ok(Self {
            stage: caps[1].to_string(),
            name: caps[2].to_string(),
        })
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.c-{}", self.stage, self.name)
    }
}

// ---------------------------------------------------------------------------
// Management
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maintainer {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRef {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedProject {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub organization: Option<NamedRef>,
}

impl DeletedProject {
    /// `<organization> : <id> - <name>`, as shown in selection lists.
    pub fn display_label(&self) -> String {
        let org = self
            .organization
            .as_ref()
            .map(|o| o.name.as_str())
            .unwrap_or("?");
        format!("{org} : {} - {}", self.id, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_approved: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn configuration_accepts_numeric_ids_and_null_description() {
        let cfg: Configuration = serde_json::from_value(json!({
            "id": 1095794158u64,
            "name": "Postgres",
            "description": null,
            "configuration": {"parameters": {"db": "x"}},
            "isDisabled": true,
            "version": 7,
            "rows": [{"id": "r1", "name": "sample_table", "configuration": {}}]
        }))
        .unwrap();
        assert_eq!(cfg.id, "1095794158");
        assert_eq!(cfg.description, "");
        assert!(cfg.is_disabled);
        assert_eq!(cfg.rows.len(), 1);
        assert!(cfg.state.is_null());
    }

    #[test]
    fn bucket_id_parse_and_display() {
        let id = BucketId::parse("in.c-main").unwrap();
        assert_eq!(id.stage, "in");
        assert_eq!(id.name, "main");
        assert_eq!(id.to_string(), "in.c-main");
        assert_eq!(BucketId::parse("out.c-my-data").unwrap().name, "my-data");
        assert!(BucketId::parse("main").is_err());
        assert!(BucketId::parse("raw.c-x").is_err());
        assert!(BucketId::parse("in.main").is_err());
    }

    #[test]
    fn table_primary_key_order_preserved() {
        let t: Table = serde_json::from_value(json!({
            "id": "in.c-main.orders",
            "name": "orders",
            "primaryKey": ["customer_id", "order_id"]
        }))
        .unwrap();
        assert_eq!(t.primary_key, vec!["customer_id", "order_id"]);
    }

    #[test]
    fn deleted_project_label() {
        let p: DeletedProject = serde_json::from_value(json!({
            "id": 12,
            "name": "Old",
            "organization": {"id": 3, "name": "Acme"}
        }))
        .unwrap();
        assert_eq!(p.display_label(), "Acme : 12 - Old");
    }
}
