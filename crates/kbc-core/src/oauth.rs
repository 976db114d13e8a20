//! OAuth consumer registry, one instance per stack.
//!
//! GCP stacks expose the registry with camelCase keys (`componentId`,
//! `friendlyName`); payloads sent there have their top-level keys converted
//! from snake_case. Other stacks take payloads as given.

use crate::client::{ApiClient, Credential};
use crate::error::{KbcError, Result};
use crate::outcome::Outcome;
use crate::region::{Region, Service};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// `app_secret` -> `appSecret`
pub fn snake_to_camel(name: &str) -> String {
    let mut parts = name.split('_');
    let mut out = parts.next().unwrap_or_default().to_string();
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }
    out
}

/// Convert the top-level keys of a JSON object; nested values are untouched.
pub fn camelize_keys(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (snake_to_camel(k), v.clone()))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

pub trait ConsumerRegistry {
    /// All consumers; `filtered` reduces each to `{component_id, name}`.
    fn list_consumers(&self, filtered: bool) -> Result<Value>;
    fn consumer(&self, component_id: &str) -> Result<Value>;
    fn create_consumer(&self, payload: &Value) -> Result<Value>;
    fn patch_consumer(&self, component_id: &str, payload: &Value) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    api: ApiClient,
    camel_case: bool,
}

impl OAuthClient {
    pub fn new(api: ApiClient, camel_case: bool) -> Self {
        Self { api, camel_case }
    }

    pub fn connect(region: &Region, manage_token: &str) -> Result<Self> {
        let api = ApiClient::for_region(
            region,
            Service::Oauth,
            Credential::Manage(manage_token.into()),
        )?;
        Ok(Self::new(api, region.is_gcp()))
    }

    fn outgoing(&self, payload: &Value) -> Value {
        if self.camel_case {
            camelize_keys(payload)
        } else {
            payload.clone()
        }
    }

    fn summary(&self, consumer: &Value) -> Value {
        let (id_key, name_key) = if self.camel_case {
            ("componentId", "friendlyName")
        } else {
            ("id", "friendly_name")
        };
        json!({
            "component_id": consumer.get(id_key).cloned().unwrap_or(Value::Null),
            "name": consumer.get(name_key).cloned().unwrap_or(Value::Null),
        })
    }
}

impl ConsumerRegistry for OAuthClient {
    fn list_consumers(&self, filtered: bool) -> Result<Value> {
        let raw = self.api.get(&["manage"])?;
        if !filtered {
            return Ok(raw);
        }
        let consumers = raw.as_array().map(Vec::as_slice).unwrap_or_default();
        Ok(Value::Array(consumers.iter().map(|c| self.summary(c)).collect()))
    }

    fn consumer(&self, component_id: &str) -> Result<Value> {
        if !self.camel_case {
            return self.api.get(&["manage", component_id]);
        }
        // no detail endpoint on these stacks; search the listing
        let raw = self.api.get(&["manage"])?;
        raw.as_array()
            .and_then(|all| {
                all.iter()
                    .find(|c| c.get("componentId").and_then(Value::as_str) == Some(component_id))
            })
            .cloned()
            .ok_or_else(|| KbcError::NotFound(format!("consumer {component_id} is not registered")))
    }

    fn create_consumer(&self, payload: &Value) -> Result<Value> {
        self.api.post_json(&["manage"], &self.outgoing(payload))
    }

    fn patch_consumer(&self, component_id: &str, payload: &Value) -> Result<Value> {
        self.api
            .patch_json(&["manage", component_id], &self.outgoing(payload))
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerOperation {
    List { filtered: bool },
    Get { component_id: String },
    Create { payload: Value },
    Patch { component_id: String, payload: Value },
}

impl ConsumerOperation {
    pub fn name(&self) -> &'static str {
        match self {
            ConsumerOperation::List { .. } => "list",
            ConsumerOperation::Get { .. } => "get",
            ConsumerOperation::Create { .. } => "create",
            ConsumerOperation::Patch { .. } => "patch",
        }
    }

    /// Reject inputs the registry would accept but mishandle.
    pub fn validate(&self) -> Result<()> {
        match self {
            ConsumerOperation::List { .. } => Ok(()),
            ConsumerOperation::Get { component_id } => require_component(component_id),
            ConsumerOperation::Create { payload } => require_payload(payload),
            ConsumerOperation::Patch {
                component_id,
                payload,
            } => {
                require_component(component_id)?;
                require_payload(payload)?;
                // PATCH without the secret overwrites it with garbage
                if payload.get("app_secret").is_none() {
                    return Err(KbcError::invalid(
                        "PATCH payload must include app_secret",
                    ));
                }
                Ok(())
            }
        }
    }

    pub fn apply(&self, registry: &dyn ConsumerRegistry) -> Result<Value> {
        match self {
            ConsumerOperation::List { filtered } => registry.list_consumers(*filtered),
            ConsumerOperation::Get { component_id } => registry.consumer(component_id),
            ConsumerOperation::Create { payload } => registry.create_consumer(payload),
            ConsumerOperation::Patch {
                component_id,
                payload,
            } => registry.patch_consumer(component_id, payload),
        }
    }
}

fn require_component(component_id: &str) -> Result<()> {
    if component_id.trim().is_empty() {
        return Err(KbcError::missing("component id"));
    }
    Ok(())
}

fn require_payload(payload: &Value) -> Result<()> {
    match payload.as_object() {
        Some(map) if !map.is_empty() => Ok(()),
        _ => Err(KbcError::missing("consumer payload (non-empty JSON object)")),
    }
}

/// Run `operation` on every stack; one outcome per region id. Validation
/// failures are returned before any stack is contacted.
pub fn run_across_stacks<'a>(
    targets: impl IntoIterator<Item = (&'a Region, &'a str)>,
    operation: &ConsumerOperation,
) -> Result<BTreeMap<String, Outcome>> {
    operation.validate()?;
    Ok(targets
        .into_iter()
        .map(|(region, token)| {
            tracing::info!(stack = %region.id, operation = operation.name(), "oauth consumer operation");
            let result = OAuthClient::connect(region, token)
                .and_then(|client| operation.apply(&client));
            (region.id.clone(), Outcome::from_result(result))
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use mockito::Matcher;

    fn gcp_region(server: &mockito::ServerGuard) -> Region {
        Region {
            endpoint: Some(server.url()),
            ..Region::new("europe-west3-gcp", "europe-west3.gcp.keboola.com", "", &[])
        }
    }

    #[test]
    fn snake_to_camel_conversion() {
        assert_eq!(snake_to_camel("app_secret"), "appSecret");
        assert_eq!(snake_to_camel("component_id"), "componentId");
        assert_eq!(snake_to_camel("friendly_name"), "friendlyName");
        assert_eq!(snake_to_camel("id"), "id");
        assert_eq!(snake_to_camel("oauth_VERSION"), "oauthVersion");
    }

    #[test]
    fn camelize_only_top_level() {
        let out = camelize_keys(&json!({"app_key": "k", "nested_obj": {"inner_key": 1}}));
        assert_eq!(out, json!({"appKey": "k", "nestedObj": {"inner_key": 1}}));
    }

    #[test]
    fn patch_requires_app_secret() {
        let op = ConsumerOperation::Patch {
            component_id: "keboola.ex-google".into(),
            payload: json!({"app_key": "k"}),
        };
        assert_eq!(op.validate().unwrap_err().kind(), ErrorKind::Configuration);

        let ok = ConsumerOperation::Patch {
            component_id: "keboola.ex-google".into(),
            payload: json!({"app_key": "k", "app_secret": "s"}),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn create_requires_payload() {
        let op = ConsumerOperation::Create { payload: json!({}) };
        assert!(op.validate().is_err());
    }

    #[test]
    fn invalid_operation_contacts_no_stack() {
        let mut server = mockito::Server::new();
        let mock = server.mock("PATCH", Matcher::Any).expect(0).create();
        let region = Region::local("a", &server.url());
        let op = ConsumerOperation::Patch {
            component_id: "x.y".into(),
            payload: json!({"app_key": "k"}),
        };
        assert!(run_across_stacks([(&region, "t")], &op).is_err());
        mock.assert();
    }

    #[test]
    fn list_is_filtered_per_stack_flavour() {
        let mut aws = mockito::Server::new();
        aws.mock("GET", "/manage")
            .match_header("x-kbc-manageapitoken", "t1")
            .with_status(200)
            .with_body(r#"[{"id": "keboola.ex-google", "friendly_name": "Google", "app_key": "x"}]"#)
            .create();
        let mut gcp = mockito::Server::new();
        gcp.mock("GET", "/manage")
            .with_status(200)
            .with_body(r#"[{"componentId": "keboola.ex-google", "friendlyName": "Google GCP"}]"#)
            .create();

        let aws_region = Region::local("aws", &aws.url());
        let gcp_region = gcp_region(&gcp);
        let outcomes = run_across_stacks(
            [(&aws_region, "t1"), (&gcp_region, "t2")],
            &ConsumerOperation::List { filtered: true },
        )
        .unwrap();

        assert_eq!(
            outcomes["aws"].response,
            json!([{"component_id": "keboola.ex-google", "name": "Google"}])
        );
        assert_eq!(
            outcomes["europe-west3-gcp"].response,
            json!([{"component_id": "keboola.ex-google", "name": "Google GCP"}])
        );
    }

    #[test]
    fn gcp_detail_is_found_in_listing() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/manage")
            .with_status(200)
            .with_body(r#"[{"componentId": "a.b", "friendlyName": "AB"}]"#)
            .expect(2)
            .create();
        let client = OAuthClient::connect(&gcp_region(&server), "t").unwrap();
        assert_eq!(client.consumer("a.b").unwrap()["friendlyName"], "AB");
        let err = client.consumer("c.d").unwrap_err();
        assert!(matches!(err, KbcError::NotFound(_)));
    }

    #[test]
    fn gcp_patch_payload_is_camel_cased() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("PATCH", "/manage/a.b")
            .match_body(Matcher::Json(json!({"appKey": "k", "appSecret": "s"})))
            .with_status(200)
            .with_body("{}")
            .create();
        let region = gcp_region(&server);
        let op = ConsumerOperation::Patch {
            component_id: "a.b".into(),
            payload: json!({"app_key": "k", "app_secret": "s"}),
        };
        let outcomes = run_across_stacks([(&region, "t")], &op).unwrap();
        assert!(outcomes["europe-west3-gcp"].is_success());
        mock.assert();
    }

    #[test]
    fn failing_stack_does_not_hide_others() {
        let mut ok = mockito::Server::new();
        ok.mock("GET", "/manage/a.b")
            .with_status(200)
            .with_body(r#"{"id": "a.b"}"#)
            .create();
        let mut bad = mockito::Server::new();
        bad.mock("GET", "/manage/a.b")
            .with_status(404)
            .with_body(r#"{"error": "Consumer not found"}"#)
            .create();
        let a = Region::local("a", &ok.url());
        let b = Region::local("b", &bad.url());
        let op = ConsumerOperation::Get {
            component_id: "a.b".into(),
        };
        let outcomes = run_across_stacks([(&a, "t"), (&b, "t")], &op).unwrap();
        assert!(outcomes["a"].is_success());
        assert_eq!(outcomes["b"].http_status, Some(404));
        assert_eq!(outcomes["b"].response, json!({"error": "Consumer not found"}));
    }
}
