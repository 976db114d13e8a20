use crate::context::{Context, GlobalArgs};
use crate::output::{fail_on_errors, print_json, print_outcomes, print_table, print_value};
use anyhow::Context as _;
use clap::{Subcommand, ValueEnum};
use kbc_core::manage::{delete_user_across, grant_feature, FeatureScope};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum UserSubcommand {
    /// Show user detail
    Show { email: String },

    /// Enable a feature for one user
    AddFeature { email: String, feature: String },

    /// Disable a feature for one user
    RemoveFeature { email: String, feature: String },

    /// Grant a feature to several users; each is looked up first
    Grant {
        feature: String,
        #[arg(long = "user", required = true)]
        users: Vec<String>,
    },

    /// Delete a user on every stack with a manage token (or the --stack list)
    Delete {
        email: String,
        #[arg(long = "stack")]
        stacks: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FeatureScopeArg {
    Project,
    User,
}

impl From<FeatureScopeArg> for FeatureScope {
    fn from(arg: FeatureScopeArg) -> Self {
        match arg {
            FeatureScopeArg::Project => FeatureScope::Project,
            FeatureScopeArg::User => FeatureScope::User,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

pub fn run(globals: &GlobalArgs, subcmd: UserSubcommand, json: bool) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;

    match subcmd {
        UserSubcommand::Show { email } => {
            let detail = ctx
                .session(globals)?
                .manage()?
                .user_detail(&email)
                .with_context(|| format!("failed to load user {email}"))?;
            print_value(&detail)
        }
        UserSubcommand::AddFeature { email, feature } => {
            let response = ctx
                .session(globals)?
                .manage()?
                .add_feature(FeatureScope::User, &email, &feature)
                .with_context(|| format!("failed to add '{feature}' to {email}"))?;
            if json {
                return print_value(&response);
            }
            println!("Feature '{feature}' added to {email}.");
            Ok(())
        }
        UserSubcommand::RemoveFeature { email, feature } => {
            ctx.session(globals)?
                .manage()?
                .remove_feature(FeatureScope::User, &email, &feature)
                .with_context(|| format!("failed to remove '{feature}' from {email}"))?;
            if json {
                return print_json(&serde_json::json!({ "removed": feature }));
            }
            println!("Feature '{feature}' removed from {email}.");
            Ok(())
        }
        UserSubcommand::Grant { feature, users } => grant(&ctx, globals, &feature, &users, json),
        UserSubcommand::Delete { email, stacks } => {
            let targets = ctx.fan_out_targets(&stacks, globals.manage_token.as_deref())?;
            let outcomes = delete_user_across(
                targets.iter().map(|(region, token)| (region, token.as_str())),
                &email,
            );
            print_outcomes(&outcomes, json)?;
            fail_on_errors(&outcomes)
        }
    }
}

fn grant(
    ctx: &Context,
    globals: &GlobalArgs,
    feature: &str,
    users: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let mut session = ctx.session(globals)?;
    for email in users {
        session
            .queue_user(email)
            .with_context(|| format!("user {email} cannot be granted"))?;
    }

    let manage = session.manage()?;
    let outcomes: BTreeMap<_, _> = grant_feature(&manage, session.pending_users(), feature)
        .into_iter()
        .collect();
    session.remember("grant", outcomes);

    let outcomes = session.remembered("grant").cloned().unwrap_or_default();
    print_outcomes(&outcomes, json)?;
    fail_on_errors(&outcomes)
}

pub fn catalogue(globals: &GlobalArgs, scope: FeatureScopeArg, json: bool) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;
    let features = ctx
        .session(globals)?
        .manage()?
        .feature_catalogue(scope.into())
        .context("failed to list features")?;

    if json {
        return print_json(&features);
    }
    let rows = features
        .iter()
        .map(|f| vec![f.name.clone(), f.kind.clone(), f.description.clone()])
        .collect();
    print_table(&["NAME", "TYPE", "DESCRIPTION"], rows);
    Ok(())
}
