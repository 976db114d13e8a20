use anyhow::Context as _;
use kbc_core::config::{Config, CONFIG_ENV};
use kbc_core::region::{Region, RegionTable};
use kbc_core::session::Session;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub region: Option<String>,
    pub manage_token: Option<String>,
    pub storage_token: Option<String>,
    pub branch: Option<String>,
    /// `KBC_STACKID` of the stack the tool runs on.
    pub current_stack: Option<String>,
}

/// Resolve the config file path.
///
/// Priority:
/// 1. `--config` flag (passed in as `explicit`)
/// 2. `KBC_ADMIN_CONFIG` env var
/// 3. `~/.kbc-admin/config.yaml`
pub fn resolve_config_path(
    explicit: Option<&Path>,
    env: Option<OsString>,
    default: Option<PathBuf>,
) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }
    if let Some(p) = env.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(p));
    }
    default.context("cannot locate home directory; pass --config")
}

/// Loaded config plus the region table built from it.
pub struct Context {
    pub path: PathBuf,
    pub config: Config,
    regions: RegionTable,
}

impl Context {
    pub fn load(globals: &GlobalArgs) -> anyhow::Result<Self> {
        let path = resolve_config_path(
            globals.config.as_deref(),
            std::env::var_os(CONFIG_ENV),
            Config::default_path(),
        )?;
        let config = Config::load_or_default(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        let regions = config.region_table(globals.current_stack.as_deref());
        Ok(Self {
            path,
            config,
            regions,
        })
    }

    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    /// Session for the region named by `--region` (or `default_region`).
    pub fn session(&self, globals: &GlobalArgs) -> anyhow::Result<Session> {
        let region = globals
            .region
            .as_deref()
            .or(self.config.default_region.as_deref());
        let mut session = self.session_for(
            region,
            globals.manage_token.clone(),
            globals.storage_token.clone(),
        )?;
        session.set_branch(globals.branch.clone());
        Ok(session)
    }

    /// Session for an arbitrary region; tokens not given fall back to the
    /// ones stored for that region.
    pub fn session_for(
        &self,
        region: Option<&str>,
        manage_token: Option<String>,
        storage_token: Option<String>,
    ) -> anyhow::Result<Session> {
        self.config.check()?;
        let mut session = Session::new(self.regions.clone())
            .with_poll_policy(self.config.poll_policy())
            .with_portal_url(self.config.portal_url());

        let (mut manage, mut storage) = (manage_token, storage_token);
        if let Some(key) = region {
            let selected = session.select_region(key)?.clone();
            manage = manage.or_else(|| self.config.manage_token(&selected).map(str::to_string));
            storage = storage.or_else(|| self.config.storage_token(&selected).map(str::to_string));
        }
        session.set_manage_token(manage);
        session.set_storage_token(storage);
        Ok(session)
    }

    /// Regions a fan-out command runs on, each with its manage token.
    ///
    /// With no `stacks`, every region that has a token in the config. Named
    /// stacks must resolve and must have a token; `--manage-token` stands in
    /// when exactly one stack is named.
    pub fn fan_out_targets(
        &self,
        stacks: &[String],
        manage_token: Option<&str>,
    ) -> anyhow::Result<Vec<(Region, String)>> {
        self.config.check()?;
        if stacks.is_empty() {
            let targets: Vec<(Region, String)> = self
                .config
                .managed_regions(&self.regions)
                .into_iter()
                .map(|(r, t)| (r.clone(), t.to_string()))
                .collect();
            if targets.is_empty() {
                anyhow::bail!(
                    "no manage tokens configured in {}; add some or pass --stack",
                    self.path.display()
                );
            }
            return Ok(targets);
        }

        let explicit = manage_token.filter(|_| stacks.len() == 1);
        stacks
            .iter()
            .map(|key| -> anyhow::Result<(Region, String)> {
                let region = self.regions.resolve(key)?;
                let token = explicit
                    .or_else(|| self.config.manage_token(region))
                    .with_context(|| format!("no manage token for region {}", region.id))?;
                Ok((region.clone(), token.to_string()))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
