use crate::cmd::read_json_arg;
use crate::context::{Context, GlobalArgs};
use crate::output::{print_json, print_table, print_value};
use anyhow::Context as _;
use clap::Subcommand;
use kbc_core::job::{expect_success, ThreadSleeper};
use kbc_core::storage::{NewConfiguration, StorageApi};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ComponentSubcommand {
    /// List components that have configurations
    List {
        /// Component type filter (extractor, writer, application, ...)
        #[arg(long = "type")]
        kind: Option<String>,
    },

    /// List configurations of a component
    Configs { component: String },

    /// Show a configuration, or one of its rows
    Show {
        component: String,
        #[arg(value_name = "CONFIG")]
        config_id: String,
        #[arg(long)]
        row: Option<String>,
    },

    /// List configuration versions, newest first
    Versions {
        component: String,
        #[arg(value_name = "CONFIG")]
        config_id: String,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },

    /// Create a configuration
    Create {
        component: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Configuration body: JSON, @file or - for stdin
        #[arg(long)]
        configuration: Option<String>,
    },

    /// Update a configuration; fields not given are kept
    Update {
        component: String,
        #[arg(value_name = "CONFIG")]
        config_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Configuration body: JSON, @file or - for stdin
        #[arg(long)]
        configuration: Option<String>,
        /// State body: JSON, @file or - for stdin
        #[arg(long)]
        state: Option<String>,
        #[arg(long = "change-description", default_value = "updated by kbc-admin")]
        change_description: String,
    },

    /// Delete a configuration
    Delete {
        component: String,
        #[arg(value_name = "CONFIG")]
        config_id: String,
    },

    /// Copy a configuration inside the project from its latest version
    Copy {
        component: String,
        #[arg(value_name = "CONFIG")]
        config_id: String,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Run a configuration as a job
    Run {
        component: String,
        #[arg(value_name = "CONFIG")]
        config_id: String,
        /// Wait for the job to finish
        #[arg(long)]
        wait: bool,
    },

    /// Create a development branch
    Branch {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(globals: &GlobalArgs, subcmd: ComponentSubcommand, json: bool) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;
    let session = ctx.session(globals)?;
    let storage = session.storage()?;

    match subcmd {
        ComponentSubcommand::List { kind } => {
            let components = storage
                .list_components(kind.as_deref(), "")
                .context("failed to list components")?;
            if json {
                return print_value(&components);
            }
            let rows = components
                .as_array()
                .map(|list| {
                    list.iter()
                        .map(|c| {
                            let field = |k: &str| c.get(k).and_then(Value::as_str).unwrap_or("").to_string();
                            let configs = c
                                .get("configurations")
                                .and_then(Value::as_array)
                                .map(|a| a.len())
                                .unwrap_or(0);
                            vec![field("id"), field("type"), configs.to_string()]
                        })
                        .collect()
                })
                .unwrap_or_default();
            print_table(&["ID", "TYPE", "CONFIGS"], rows);
            Ok(())
        }
        ComponentSubcommand::Configs { component } => {
            let configs = storage
                .list_configurations(&component)
                .with_context(|| format!("failed to list configurations of {component}"))?;
            if json {
                return print_json(&configs);
            }
            let rows = configs
                .iter()
                .map(|c| {
                    vec![
                        c.id.clone(),
                        c.name.clone(),
                        c.version.to_string(),
                        if c.is_disabled { "disabled" } else { "" }.to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "NAME", "VERSION", ""], rows);
            Ok(())
        }
        ComponentSubcommand::Show {
            component,
            config_id,
            row,
        } => {
            let detail = match row {
                Some(row) => storage.row_detail(&component, &config_id, &row),
                None => storage.configuration_detail(&component, &config_id),
            }
            .with_context(|| format!("failed to load {component}/{config_id}"))?;
            print_value(&detail)
        }
        ComponentSubcommand::Versions {
            component,
            config_id,
            limit,
        } => {
            let versions = storage.list_versions(&component, &config_id, limit)?;
            print_value(&versions)
        }
        ComponentSubcommand::Create {
            component,
            name,
            description,
            configuration,
        } => {
            let new = NewConfiguration {
                name,
                description,
                configuration: match configuration {
                    Some(arg) => read_json_arg(&arg)?,
                    None => serde_json::json!({}),
                },
                ..NewConfiguration::default()
            };
            let created = storage
                .create_configuration(&component, &new)
                .with_context(|| format!("failed to create configuration of {component}"))?;
            if json {
                return print_json(&created);
            }
            println!("Created configuration {} ({}).", created.id, created.name);
            Ok(())
        }
        ComponentSubcommand::Update {
            component,
            config_id,
            name,
            description,
            configuration,
            state,
            change_description,
        } => {
            let current = storage
                .get_configuration(&component, &config_id)
                .with_context(|| format!("failed to load {component}/{config_id}"))?;
            let mut update = NewConfiguration::from_source(&current, false);
            update.state = None;
            update.change_description = change_description;
            if let Some(name) = name {
                update.name = name;
            }
            if let Some(description) = description {
                update.description = description;
            }
            if let Some(arg) = configuration {
                update.configuration = read_json_arg(&arg)?;
            }
            if let Some(arg) = state {
                update.state = Some(read_json_arg(&arg)?);
            }
            let updated = storage
                .update_configuration(&component, &config_id, &update)
                .with_context(|| format!("failed to update {component}/{config_id}"))?;
            print_value(&updated)
        }
        ComponentSubcommand::Delete {
            component,
            config_id,
        } => {
            storage
                .delete_configuration(&component, &config_id)
                .with_context(|| format!("failed to delete {component}/{config_id}"))?;
            if json {
                return print_json(&serde_json::json!({ "deleted": config_id }));
            }
            println!("Deleted {component}/{config_id}.");
            Ok(())
        }
        ComponentSubcommand::Copy {
            component,
            config_id,
            name,
            description,
        } => {
            let id = storage
                .copy_configuration(&component, &config_id, &name, &description)
                .with_context(|| format!("failed to copy {component}/{config_id}"))?;
            if json {
                return print_json(&serde_json::json!({ "id": id }));
            }
            println!("Copied {component}/{config_id} to {id}.");
            Ok(())
        }
        ComponentSubcommand::Run {
            component,
            config_id,
            wait,
        } => {
            let job = session
                .syrup()?
                .run_config(&component, &config_id)
                .with_context(|| format!("failed to start {component}/{config_id}"))?;
            if !wait {
                return print_value(&job);
            }
            let url = job
                .get("url")
                .and_then(Value::as_str)
                .context("job response has no url to poll")?;
            let finished = storage
                .api()
                .wait_for_job(url, session.poll_policy(), &ThreadSleeper)?;
            print_value(&expect_success(finished)?)
        }
        ComponentSubcommand::Branch { name, description } => {
            let id = storage
                .create_branch(&name, &description, &ThreadSleeper)
                .with_context(|| format!("failed to create branch '{name}'"))?;
            if json {
                return print_json(&serde_json::json!({ "id": id }));
            }
            println!("Created branch {id}.");
            Ok(())
        }
    }
}
