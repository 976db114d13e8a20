use crate::cmd::portal::PortalAuth;
use crate::cmd::read_json_arg;
use crate::context::{Context, GlobalArgs};
use crate::output::{fail_on_errors, print_json, print_outcomes};
use anyhow::Context as _;
use clap::Subcommand;
use kbc_core::oauth::{run_across_stacks, ConsumerOperation};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum OauthSubcommand {
    /// List registered consumers on each stack
    List {
        /// Print full consumer records instead of id and name
        #[arg(long)]
        raw: bool,
        /// Region id, alias or suffix; repeatable (default: every stack with a manage token)
        #[arg(long = "stack")]
        stacks: Vec<String>,
    },

    /// Show one consumer on each stack
    Get {
        component: String,
        #[arg(long = "stack")]
        stacks: Vec<String>,
    },

    /// Register a consumer on each stack
    Create {
        /// Consumer payload (snake_case keys): JSON, @file or - for stdin
        #[arg(long)]
        payload: String,
        #[arg(long = "stack")]
        stacks: Vec<String>,
    },

    /// Patch a consumer on each stack; the payload must carry app_secret
    Patch {
        component: String,
        #[arg(long)]
        payload: String,
        #[arg(long = "stack")]
        stacks: Vec<String>,
    },

    /// Allow an app in the developer portal on every stack where its
    /// consumer is registered
    SyncPortal {
        component: String,
        #[arg(long = "stack")]
        stacks: Vec<String>,
        #[command(flatten)]
        auth: PortalAuth,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(globals: &GlobalArgs, subcmd: OauthSubcommand, json: bool) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;

    let (operation, stacks) = match subcmd {
        OauthSubcommand::List { raw, stacks } => (ConsumerOperation::List { filtered: !raw }, stacks),
        OauthSubcommand::Get { component, stacks } => (
            ConsumerOperation::Get {
                component_id: component,
            },
            stacks,
        ),
        OauthSubcommand::Create { payload, stacks } => (
            ConsumerOperation::Create {
                payload: read_json_arg(&payload)?,
            },
            stacks,
        ),
        OauthSubcommand::Patch {
            component,
            payload,
            stacks,
        } => (
            ConsumerOperation::Patch {
                component_id: component,
                payload: read_json_arg(&payload)?,
            },
            stacks,
        ),
        OauthSubcommand::SyncPortal {
            component,
            stacks,
            auth,
        } => return sync_portal(&ctx, globals, &component, &stacks, &auth, json),
    };

    let targets = ctx.fan_out_targets(&stacks, globals.manage_token.as_deref())?;
    let outcomes = run_across_stacks(
        targets.iter().map(|(region, token)| (region, token.as_str())),
        &operation,
    )
    .with_context(|| format!("oauth {} rejected", operation.name()))?;
    print_outcomes(&outcomes, json)?;
    fail_on_errors(&outcomes)
}

// ---------------------------------------------------------------------------
// sync-portal
// ---------------------------------------------------------------------------

fn sync_portal(
    ctx: &Context,
    globals: &GlobalArgs,
    component: &str,
    stacks: &[String],
    auth: &PortalAuth,
    json: bool,
) -> anyhow::Result<()> {
    let targets = ctx.fan_out_targets(stacks, globals.manage_token.as_deref())?;
    let lookup = ConsumerOperation::Get {
        component_id: component.to_string(),
    };
    let mut session = ctx.session_for(None, None, None)?;
    let outcomes = run_across_stacks(
        targets.iter().map(|(region, token)| (region, token.as_str())),
        &lookup,
    )?;
    session.remember(lookup.name(), outcomes);

    let registered: Vec<String> = session
        .remembered(lookup.name())
        .into_iter()
        .flatten()
        .filter(|(_, outcome)| outcome.is_success())
        .filter_map(|(id, _)| targets.iter().find(|(r, _)| &r.id == id))
        .map(|(region, _)| region.suffix.clone())
        .collect();
    if registered.is_empty() {
        anyhow::bail!("consumer {component} is not registered on any checked stack");
    }
    tracing::info!(component, stacks = registered.len(), "consumer found");

    let portal = auth.client(&mut session)?;
    let updated = portal
        .grant_stacks(component, &registered)
        .with_context(|| format!("failed to update permissions of {component}"))?;

    if json {
        return print_json(&serde_json::json!({
            "stacks": registered,
            "app": updated,
        }));
    }
    println!("Allowed {component} on: {}", registered.join(", "));
    Ok(())
}
