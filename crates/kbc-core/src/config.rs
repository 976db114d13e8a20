use crate::error::{KbcError, Result};
use crate::job::PollPolicy;
use crate::portal::DEFAULT_PORTAL_URL;
use crate::region::{Region, RegionTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

pub const CONFIG_ENV: &str = "KBC_ADMIN_CONFIG";
pub const CONFIG_DIR: &str = ".kbc-admin";
pub const CONFIG_FILE: &str = "config.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PollingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

fn default_max_wait() -> u64 {
    30 * 60
}

fn default_max_delay() -> u64 {
    20
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_wait_secs: default_max_wait(),
            max_attempts: None,
            max_delay_secs: default_max_delay(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Operator settings, `~/.kbc-admin/config.yaml` by default. Tokens are
/// keyed by region id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_region: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub manage_tokens: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub storage_tokens: BTreeMap<String, String>,
    /// Extra regions, or overrides of built-in ones (same id).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_portal_url: Option<String>,
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        home::home_dir().map(|h| h.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// A missing file is an empty config.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        atomic_write(path, data.as_bytes())
    }

    /// Built-in regions, then configured ones, then the stack named by
    /// `current_stack` (`KBC_STACKID`) under the id `current`.
    pub fn region_table(&self, current_stack: Option<&str>) -> RegionTable {
        let mut table = RegionTable::default();
        for region in &self.regions {
            table.insert(region.clone());
        }
        match current_stack {
            Some(stack) => table.with_current_stack(stack),
            None => table,
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            max_wait: Duration::from_secs(self.polling.max_wait_secs),
            max_attempts: self.polling.max_attempts,
            max_delay: Duration::from_secs(self.polling.max_delay_secs),
        }
    }

    pub fn portal_url(&self) -> &str {
        self.developer_portal_url
            .as_deref()
            .unwrap_or(DEFAULT_PORTAL_URL)
    }

    pub fn manage_token(&self, region: &Region) -> Option<&str> {
        self.manage_tokens.get(&region.id).map(String::as_str)
    }

    pub fn storage_token(&self, region: &Region) -> Option<&str> {
        self.storage_tokens.get(&region.id).map(String::as_str)
    }

    /// Regions that have a manage token, in region table order.
    pub fn managed_regions<'a>(&'a self, table: &'a RegionTable) -> Vec<(&'a Region, &'a str)> {
        table
            .iter()
            .filter_map(|r| self.manage_token(r).map(|t| (r, t)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let table = self.region_table(None);

        if let Some(key) = &self.default_region {
            if table.resolve(key).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("default_region '{key}' is not a known region"),
                });
            }
        }

        for (section, tokens) in [
            ("manage_tokens", &self.manage_tokens),
            ("storage_tokens", &self.storage_tokens),
        ] {
            for (region_id, token) in tokens {
                if !table.iter().any(|r| &r.id == region_id) {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!("{section} has a token for unknown region id '{region_id}'"),
                    });
                }
                if token.trim().is_empty() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!("{section}.{region_id} is empty"),
                    });
                }
            }
        }

        for region in &self.regions {
            if region.suffix.trim().is_empty() && region.endpoint.is_none() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("region '{}' has neither suffix nor endpoint", region.id),
                });
            }
            if let Some(endpoint) = &region.endpoint {
                if url::Url::parse(endpoint).is_err() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("region '{}' endpoint '{endpoint}' is not a URL", region.id),
                    });
                }
            }
        }

        if self.polling.max_wait_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "polling.max_wait_secs is 0; no job could ever finish".to_string(),
            });
        }
        if self.polling.max_attempts == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "polling.max_attempts is 0".to_string(),
            });
        }

        warnings
    }

    /// Fail on `Error`-level warnings; `Warning`s are only logged.
    pub fn check(&self) -> Result<()> {
        let mut errors = Vec::new();
        for w in self.validate() {
            match w.level {
                WarnLevel::Warning => tracing::warn!("config: {}", w.message),
                WarnLevel::Error => errors.push(w.message),
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(KbcError::invalid(format!("config: {}", errors.join("; "))))
        }
    }
}

/// Write through a sibling temp file so a crash never leaves half a config.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
