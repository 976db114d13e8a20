use crate::context::{Context, GlobalArgs};
use crate::output::{print_json, print_table, print_value};
use anyhow::Context as _;
use clap::{Args, Subcommand};
use kbc_core::portal::{vendor_of, PortalClient};
use kbc_core::session::Session;

/// Developer portal credentials: a session token, or email and password.
#[derive(Args)]
pub struct PortalAuth {
    #[arg(long = "portal-token", env = "KBC_PORTAL_TOKEN", hide_env_values = true)]
    portal_token: Option<String>,

    #[arg(long = "portal-email", env = "KBC_PORTAL_EMAIL")]
    portal_email: Option<String>,

    #[arg(long = "portal-password", env = "KBC_PORTAL_PASSWORD", hide_env_values = true)]
    portal_password: Option<String>,
}

impl PortalAuth {
    pub fn client(&self, session: &mut Session) -> anyhow::Result<PortalClient> {
        if let Some(token) = &self.portal_token {
            session.set_portal_token(Some(token.clone()));
            return Ok(session.portal()?);
        }
        match (&self.portal_email, &self.portal_password) {
            (Some(email), Some(password)) => session
                .portal_login(email, password)
                .context("developer portal login failed"),
            _ => anyhow::bail!(
                "developer portal needs --portal-token, or --portal-email and --portal-password"
            ),
        }
    }
}

#[derive(Subcommand)]
pub enum PortalSubcommand {
    /// Log in and print the session token
    Login {
        #[command(flatten)]
        auth: PortalAuth,
    },

    /// Show an app's detail and stack permissions
    Permissions {
        /// App id, `<vendor>.<name>`
        component: String,
        #[command(flatten)]
        auth: PortalAuth,
    },

    /// Allow an app on more stacks, keeping its current permissions
    Grant {
        component: String,
        /// Region id, alias or suffix; repeatable
        #[arg(long = "stack", required = true)]
        stacks: Vec<String>,
        #[command(flatten)]
        auth: PortalAuth,
    },

    /// Delete the unapproved vendors registered under an email
    PurgeVendors {
        email: String,
        #[command(flatten)]
        auth: PortalAuth,
    },
}

pub fn run(globals: &GlobalArgs, subcmd: PortalSubcommand, json: bool) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;
    let mut session = ctx.session_for(None, None, None)?;

    match subcmd {
        PortalSubcommand::Login { auth } => {
            let (email, password) = match (auth.portal_email, auth.portal_password) {
                (Some(e), Some(p)) => (e, p),
                _ => anyhow::bail!("login needs --portal-email and --portal-password"),
            };
            let (_, token) = PortalClient::login(
                ctx.config.portal_url(),
                &email,
                &password,
            )
            .context("developer portal login failed")?;
            if json {
                return print_json(&serde_json::json!({ "token": token }));
            }
            println!("{token}");
            Ok(())
        }
        PortalSubcommand::Permissions { component, auth } => {
            let portal = auth.client(&mut session)?;
            let vendor = vendor_of(&component)?;
            let detail = portal
                .app_detail(vendor, &component)
                .with_context(|| format!("failed to load app {component}"))?;
            if json {
                return print_value(&detail);
            }
            let rows = detail
                .get("permissions")
                .and_then(|p| p.as_array())
                .into_iter()
                .flatten()
                .map(|p| {
                    vec![
                        p.get("stack").and_then(|s| s.as_str()).unwrap_or("").to_string(),
                        p.to_string(),
                    ]
                })
                .collect();
            print_table(&["STACK", "PERMISSION"], rows);
            Ok(())
        }
        PortalSubcommand::Grant {
            component,
            stacks,
            auth,
        } => {
            let suffixes = stacks
                .iter()
                .map(|key| -> anyhow::Result<String> { Ok(ctx.regions().resolve(key)?.suffix.clone()) })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let portal = auth.client(&mut session)?;
            let updated = portal
                .grant_stacks(&component, &suffixes)
                .with_context(|| format!("failed to update permissions of {component}"))?;
            print_value(&updated)
        }
        PortalSubcommand::PurgeVendors { email, auth } => {
            let portal = auth.client(&mut session)?;
            let purge = portal
                .purge_vendors(&email)
                .with_context(|| format!("failed to purge vendors of {email}"))?;
            if json {
                return print_json(&purge);
            }
            println!("Scanned {} vendor(s).", purge.scanned);
            println!("Deleted: {}", purge.deleted.join(", "));
            if !purge.kept_approved.is_empty() {
                println!("Kept (approved): {}", purge.kept_approved.join(", "));
            }
            Ok(())
        }
    }
}
