use crate::cmd::read_json_arg;
use crate::context::{Context, GlobalArgs};
use crate::output::{print_json, print_table, print_value};
use anyhow::Context as _;
use clap::Subcommand;
use kbc_core::orchestrator::OrchestrationSpec;
use serde_json::Value;

#[derive(Subcommand)]
pub enum OrchestrationSubcommand {
    /// List orchestrations
    List,

    /// Start an orchestration
    Run { orchestration: String },

    /// Replace an orchestration's definition
    Update {
        orchestration: String,
        #[arg(long)]
        name: String,
        /// Task list: JSON array, @file or - for stdin
        #[arg(long)]
        tasks: String,
        #[arg(long)]
        inactive: bool,
        #[arg(long)]
        crontab: Option<String>,
        #[arg(long)]
        timezone: Option<String>,
    },

    /// List every schedule in the project
    Schedules,
}

pub fn run(globals: &GlobalArgs, subcmd: OrchestrationSubcommand, json: bool) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;
    let session = ctx.session(globals)?;

    match subcmd {
        OrchestrationSubcommand::List => {
            let list = session
                .syrup()?
                .list_orchestrations()
                .context("failed to list orchestrations")?;
            if json {
                return print_value(&list);
            }
            let rows = list
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .map(|o| {
                            vec![
                                scalar(o.get("id")),
                                scalar(o.get("name")),
                                scalar(o.get("active")),
                                scalar(o.get("crontabRecord")),
                            ]
                        })
                        .collect()
                })
                .unwrap_or_default();
            print_table(&["ID", "NAME", "ACTIVE", "CRONTAB"], rows);
            Ok(())
        }
        OrchestrationSubcommand::Run { orchestration } => {
            let job = session
                .syrup()?
                .run_orchestration(&orchestration)
                .with_context(|| format!("failed to run orchestration {orchestration}"))?;
            print_value(&job)
        }
        OrchestrationSubcommand::Update {
            orchestration,
            name,
            tasks,
            inactive,
            crontab,
            timezone,
        } => {
            let tasks = read_json_arg(&tasks)?;
            if !tasks.is_array() {
                anyhow::bail!("--tasks must be a JSON array");
            }
            let mut spec = OrchestrationSpec::new(&name, tasks);
            spec.active = !inactive;
            spec.crontab_record = crontab;
            spec.crontab_timezone = timezone;
            let updated = session
                .syrup()?
                .update_orchestration(&orchestration, &spec)
                .with_context(|| format!("failed to update orchestration {orchestration}"))?;
            print_value(&updated)
        }
        OrchestrationSubcommand::Schedules => {
            let schedules = session
                .scheduler()?
                .list_schedules()
                .context("failed to list schedules")?;
            if json {
                return print_json(&schedules);
            }
            let rows = schedules
                .iter()
                .map(|s| {
                    vec![
                        scalar(s.get("id")),
                        scalar(s.get("configurationId")),
                        scalar(s.pointer("/configuration/schedule/cronTab")),
                    ]
                })
                .collect();
            print_table(&["ID", "CONFIGURATION", "CRONTAB"], rows);
            Ok(())
        }
    }
}

fn scalar(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
