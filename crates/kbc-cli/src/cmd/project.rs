use crate::context::{Context, GlobalArgs};
use crate::output::{print_json, print_table, print_value};
use anyhow::Context as _;
use clap::Subcommand;
use kbc_core::manage::{FeatureScope, NewProject, TokenRequest};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// Show project detail
    Show { project: String },

    /// List features enabled on a project
    Features { project: String },

    /// Enable a feature on a project
    AddFeature { project: String, feature: String },

    /// Disable a feature on a project
    RemoveFeature { project: String, feature: String },

    /// Create a project in an organization
    Create {
        #[arg(long)]
        organization: String,
        name: String,
        /// Project type
        #[arg(long = "type", default_value = "poc6months")]
        kind: String,
        #[arg(long, default_value = "snowflake")]
        backend: String,
    },

    /// Invite a user to a project
    Invite { project: String, email: String },

    /// Create a storage token in a project
    Token {
        project: String,
        #[arg(long, default_value = "kbc-admin")]
        description: String,
        /// Lifetime in seconds
        #[arg(long, default_value_t = 1800)]
        expires_in: u64,
    },
}

#[derive(Subcommand)]
pub enum DeletedSubcommand {
    /// List deleted projects
    List,

    /// Show one deleted project
    Show { project: String },

    /// Restore a deleted project and print the restored project
    Restore {
        project: String,
        /// Days until the restored project expires (0 = never)
        #[arg(long, default_value_t = 0)]
        expiration_days: u32,
    },
}

#[derive(Subcommand)]
pub enum OrgSubcommand {
    /// Show organization detail
    Show { organization: String },
}

// ---------------------------------------------------------------------------
// project
// ---------------------------------------------------------------------------

pub fn run(globals: &GlobalArgs, subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;
    let manage = ctx.session(globals)?.manage()?;

    match subcmd {
        ProjectSubcommand::Show { project } => {
            let detail = manage
                .project(&project)
                .with_context(|| format!("failed to load project {project}"))?;
            print_value(&detail)
        }
        ProjectSubcommand::Features { project } => {
            let detail = manage.features(FeatureScope::Project, &project)?;
            if json {
                return print_value(&detail);
            }
            let names: Vec<Vec<String>> = detail
                .as_array()
                .map(|list| {
                    list.iter()
                        .map(|f| {
                            let name = f
                                .as_str()
                                .or_else(|| f.get("name").and_then(Value::as_str))
                                .unwrap_or_default();
                            vec![name.to_string()]
                        })
                        .collect()
                })
                .unwrap_or_default();
            print_table(&["FEATURE"], names);
            Ok(())
        }
        ProjectSubcommand::AddFeature { project, feature } => {
            let response = manage
                .add_feature(FeatureScope::Project, &project, &feature)
                .with_context(|| format!("failed to add '{feature}' to project {project}"))?;
            if json {
                return print_value(&response);
            }
            println!("Feature '{feature}' added to project {project}.");
            Ok(())
        }
        ProjectSubcommand::RemoveFeature { project, feature } => {
            manage
                .remove_feature(FeatureScope::Project, &project, &feature)
                .with_context(|| format!("failed to remove '{feature}' from project {project}"))?;
            if json {
                return print_json(&serde_json::json!({ "removed": feature }));
            }
            println!("Feature '{feature}' removed from project {project}.");
            Ok(())
        }
        ProjectSubcommand::Create {
            organization,
            name,
            kind,
            backend,
        } => {
            let mut request = NewProject::new(&name);
            request.kind = kind;
            request.default_backend = backend;
            let created = manage
                .create_project(&organization, &request)
                .with_context(|| format!("failed to create project in organization {organization}"))?;
            print_value(&created)
        }
        ProjectSubcommand::Invite { project, email } => {
            let response = manage
                .invite_user(&project, &email)
                .with_context(|| format!("failed to invite {email}"))?;
            if json {
                return print_value(&response);
            }
            println!("Invited {email} to project {project}.");
            Ok(())
        }
        ProjectSubcommand::Token {
            project,
            description,
            expires_in,
        } => {
            let mut request = TokenRequest::new(&description);
            request.expires_in = expires_in;
            let token = manage
                .create_project_token(&project, &request)
                .with_context(|| format!("failed to create token in project {project}"))?;
            print_value(&token)
        }
    }
}

// ---------------------------------------------------------------------------
// deleted
// ---------------------------------------------------------------------------

pub fn run_deleted(globals: &GlobalArgs, subcmd: DeletedSubcommand, json: bool) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;
    let manage = ctx.session(globals)?.manage()?;

    match subcmd {
        DeletedSubcommand::List => {
            let projects = manage
                .deleted_projects()
                .context("failed to list deleted projects")?;
            if json {
                return print_json(&projects);
            }
            if projects.is_empty() {
                println!("No deleted projects.");
                return Ok(());
            }
            let rows = projects
                .iter()
                .map(|p| {
                    let org = p.organization.as_ref().map(|o| o.name.clone()).unwrap_or_default();
                    vec![p.id.clone(), p.name.clone(), org]
                })
                .collect();
            print_table(&["ID", "NAME", "ORGANIZATION"], rows);
            Ok(())
        }
        DeletedSubcommand::Show { project } => {
            let detail = manage
                .deleted_project(&project)
                .with_context(|| format!("failed to load deleted project {project}"))?;
            print_value(&detail)
        }
        DeletedSubcommand::Restore {
            project,
            expiration_days,
        } => {
            let restored = manage
                .restore_project(&project, expiration_days)
                .with_context(|| format!("failed to restore project {project}"))?;
            print_value(&restored)
        }
    }
}

// ---------------------------------------------------------------------------
// org
// ---------------------------------------------------------------------------

pub fn run_org(globals: &GlobalArgs, subcmd: OrgSubcommand, _json: bool) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;
    let manage = ctx.session(globals)?.manage()?;

    match subcmd {
        OrgSubcommand::Show { organization } => {
            let detail = manage
                .organization(&organization)
                .with_context(|| format!("failed to load organization {organization}"))?;
            print_value(&detail)
        }
    }
}
