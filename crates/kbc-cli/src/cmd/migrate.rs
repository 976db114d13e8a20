use crate::context::{Context, GlobalArgs};
use crate::output::{print_json, print_value};
use anyhow::Context as _;
use clap::{Args, Subcommand};
use kbc_core::clone::{clone_configuration, clone_orchestration};
use kbc_core::session::Session;
use kbc_core::transfer::transfer_bucket;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

/// Where migrated objects go. The source is the project behind `--region`
/// and `--storage-token`.
#[derive(Args)]
pub struct Destination {
    /// Destination region (default: the source region)
    #[arg(long = "to-region")]
    to_region: Option<String>,

    /// Destination storage token (default: the one stored for the region)
    #[arg(long = "to-token", env = "KBC_DESTINATION_TOKEN", hide_env_values = true)]
    to_token: Option<String>,
}

#[derive(Subcommand)]
pub enum MigrateSubcommand {
    /// Copy a configuration and all of its rows
    Config {
        component: String,
        #[arg(value_name = "CONFIG")]
        config_id: String,
        /// Create the copy under the source configuration id
        #[arg(long)]
        keep_id: bool,
        #[command(flatten)]
        destination: Destination,
    },

    /// Copy every table of a bucket; tables already present are skipped
    Bucket {
        bucket: String,
        /// Destination bucket id (default: same as source)
        #[arg(long = "to-bucket")]
        to_bucket: Option<String>,
        /// Directory for staged CSV exports (default: system temp dir)
        #[arg(long)]
        workdir: Option<PathBuf>,
        #[command(flatten)]
        destination: Destination,
    },

    /// Recreate an orchestration from its stored task list
    Orchestration {
        orchestration: String,
        #[command(flatten)]
        destination: Destination,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(globals: &GlobalArgs, subcmd: MigrateSubcommand, json: bool) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;
    let source = ctx.session(globals)?;

    match subcmd {
        MigrateSubcommand::Config {
            component,
            config_id,
            keep_id,
            destination,
        } => {
            let target = destination_session(&ctx, &source, destination)?;
            let new_id = clone_configuration(
                &source.storage()?,
                &target.storage()?,
                &component,
                &config_id,
                keep_id,
            )
            .with_context(|| format!("failed to migrate {component}/{config_id}"))?;
            if json {
                return print_json(&serde_json::json!({ "id": new_id }));
            }
            println!("Migrated {component}/{config_id} as {new_id}.");
            Ok(())
        }
        MigrateSubcommand::Bucket {
            bucket,
            to_bucket,
            workdir,
            destination,
        } => {
            let target = destination_session(&ctx, &source, destination)?;
            let report = transfer_bucket(
                &source.storage()?,
                &target.storage()?,
                &bucket,
                to_bucket.as_deref(),
                workdir.as_deref(),
            )
            .with_context(|| format!("failed to migrate bucket {bucket}"))?;
            if json {
                return print_json(&report);
            }
            if report.created_bucket {
                println!("Created bucket {}.", report.destination_bucket);
            }
            println!(
                "Transferred {} table(s), skipped {} already present.",
                report.transferred.len(),
                report.skipped.len()
            );
            for id in &report.transferred {
                println!("  + {id}");
            }
            Ok(())
        }
        MigrateSubcommand::Orchestration {
            orchestration,
            destination,
        } => {
            let target = destination_session(&ctx, &source, destination)?;
            let created = clone_orchestration(&source.storage()?, &target.syrup()?, &orchestration)
                .with_context(|| format!("failed to migrate orchestration {orchestration}"))?;
            print_value(&created)
        }
    }
}

fn destination_session(
    ctx: &Context,
    source: &Session,
    destination: Destination,
) -> anyhow::Result<Session> {
    let region = match destination.to_region {
        Some(region) => region,
        None => source.region()?.id.clone(),
    };
    let session = ctx
        .session_for(Some(&region), None, destination.to_token)
        .context("destination")?;
    session
        .storage_token()
        .context("destination needs --to-token or a stored storage token")?;
    Ok(session)
}
