//! Developer portal: app permissions and vendor cleanup.

use crate::client::{ApiClient, Credential};
use crate::error::{KbcError, Result};
use crate::types::Vendor;
use serde::Serialize;
use serde_json::{json, Value};

pub const DEFAULT_PORTAL_URL: &str = "https://apps-api.keboola.com";

/// Page size for the admin vendor listing.
pub const VENDOR_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct PortalClient {
    api: ApiClient,
}

impl PortalClient {
    /// Use an existing session token.
    pub fn with_token(base_url: &str, token: &str) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(base_url, Credential::Authorization(token.into()))?,
        })
    }

    /// Exchange service account credentials for a session token.
    pub fn login(base_url: &str, email: &str, password: &str) -> Result<(Self, String)> {
        let anonymous = ApiClient::new(base_url, Credential::Anonymous)?;
        let body = anonymous.post_json(
            &["auth", "login"],
            &json!({ "email": email, "password": password }),
        )?;
        let token = body
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| KbcError::incomplete("token in developer portal login response"))?
            .to_string();
        Ok((Self::with_token(base_url, &token)?, token))
    }

    pub fn app_detail(&self, vendor: &str, component_id: &str) -> Result<Value> {
        self.api.get(&["vendors", vendor, "apps", component_id])
    }

    pub fn permissions(&self, vendor: &str, component_id: &str) -> Result<Vec<Value>> {
        let detail = self.app_detail(vendor, component_id)?;
        Ok(detail
            .get("permissions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    pub fn patch_permissions(&self, vendor: &str, component_id: &str, permissions: &[Value]) -> Result<Value> {
        self.api.patch_json(
            &["vendors", vendor, "apps", component_id],
            &json!({ "permissions": permissions }),
        )
    }

    /// Allow the app on every stack in `stacks` (hostname suffixes) on top of
    /// its current permissions.
    pub fn grant_stacks(&self, component_id: &str, stacks: &[String]) -> Result<Value> {
        let vendor = vendor_of(component_id)?;
        let existing = self.permissions(vendor, component_id)?;
        let merged = merge_stack_permissions(&existing, stacks);
        tracing::info!(
            component_id,
            before = existing.len(),
            after = merged.len(),
            "updating app stack permissions"
        );
        self.patch_permissions(vendor, component_id, &merged)
    }

    // -- vendors ----------------------------------------------------------------

    pub fn vendors_page(&self, offset: usize, limit: usize) -> Result<Vec<Vendor>> {
        let body = self.api.get_with_query(
            &["admin", "vendors"],
            &[("offset", offset), ("limit", limit)],
        )?;
        Ok(serde_json::from_value(body)?)
    }

    pub fn all_vendors(&self) -> Result<Vec<Vendor>> {
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.vendors_page(offset, VENDOR_PAGE_SIZE)?;
            let last = page.len() < VENDOR_PAGE_SIZE;
            all.extend(page);
            if last {
                return Ok(all);
            }
            offset += VENDOR_PAGE_SIZE;
        }
    }

    pub fn delete_vendor(&self, vendor_id: &str) -> Result<Value> {
        self.api.delete(&["admin", "vendors", vendor_id])
    }

    /// Delete the unapproved vendors registered under `email`. Approved
    /// vendors are never deleted.
    pub fn purge_vendors(&self, email: &str) -> Result<VendorPurge> {
        let vendors = self.all_vendors()?;
        let mut purge = VendorPurge {
            scanned: vendors.len(),
            ..VendorPurge::default()
        };
        for vendor in vendors_with_email(&vendors, email) {
            if vendor.is_approved {
                tracing::warn!(vendor = %vendor.id, "vendor is approved, keeping");
                purge.kept_approved.push(vendor.id.clone());
                continue;
            }
            self.delete_vendor(&vendor.id)?;
            tracing::info!(vendor = %vendor.id, "vendor deleted");
            purge.deleted.push(vendor.id.clone());
        }
        Ok(purge)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VendorPurge {
    pub scanned: usize,
    pub deleted: Vec<String>,
    pub kept_approved: Vec<String>,
}

pub fn vendors_with_email<'a>(vendors: &'a [Vendor], email: &str) -> Vec<&'a Vendor> {
    vendors
        .iter()
        .filter(|v| v.email.as_deref() == Some(email))
        .collect()
}

/// `kds-team.ex-hubspot` -> `kds-team`
pub fn vendor_of(component_id: &str) -> Result<&str> {
    match component_id.split_once('.') {
        Some((vendor, app)) if !vendor.is_empty() && !app.is_empty() => Ok(vendor),
        _ => Err(KbcError::invalid(format!(
            "component id '{component_id}': expected '<vendor>.<app>'"
        ))),
    }
}

/// Keep `existing` as is and append `{"stack": "connection.<suffix>"}` for
/// each suffix not already permitted.
pub fn merge_stack_permissions(existing: &[Value], stacks: &[String]) -> Vec<Value> {
    let mut merged = existing.to_vec();
    for suffix in stacks {
        let stack = format!("connection.{suffix}");
        let present = merged
            .iter()
            .any(|p| p.get("stack").and_then(Value::as_str) == Some(stack.as_str()));
        if !present {
            merged.push(json!({ "stack": stack }));
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
