use crate::client::{ApiClient, Credential};
use crate::error::{KbcError, Result};
use crate::region::{Region, Service};

/// Scope a ciphertext is bound to. The component is mandatory; project and
/// configuration narrow it further when given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptionScope {
    pub component_id: String,
    pub project_id: Option<String>,
    pub config_id: Option<String>,
}

impl EncryptionScope {
    fn query(&self) -> Result<Vec<(&'static str, &str)>> {
        if self.component_id.trim().is_empty() {
            return Err(KbcError::missing("component id to encrypt for"));
        }
        let mut query = vec![("componentId", self.component_id.as_str())];
        if let Some(project) = self.project_id.as_deref().filter(|p| !p.is_empty()) {
            query.push(("projectId", project));
        }
        if let Some(config) = self.config_id.as_deref().filter(|c| !c.is_empty()) {
            query.push(("configId", config));
        }
        Ok(query)
    }
}

#[derive(Debug, Clone)]
pub struct EncryptionClient {
    api: ApiClient,
}

impl EncryptionClient {
    pub fn connect(region: &Region) -> Result<Self> {
        Ok(Self {
            api: ApiClient::for_region(region, Service::Encryption, Credential::Anonymous)?,
        })
    }

    /// Returns the `KBC::...` ciphertext.
    pub fn encrypt(&self, scope: &EncryptionScope, plaintext: &str) -> Result<String> {
        let query = scope.query()?;
        let cipher = self.api.post_text(&["encrypt"], &query, plaintext)?;
        Ok(cipher.trim().to_string())
    }
}
