use crate::context::{Context, GlobalArgs};
use crate::output::{print_json, print_table};
use anyhow::Context as _;
use clap::Subcommand;
use kbc_core::maintainers::{ensure_membership, membership_for};
use std::collections::BTreeSet;

#[derive(Subcommand)]
pub enum MaintainerSubcommand {
    /// List maintainers
    List,

    /// List the users of one maintainer
    Users { maintainer: String },

    /// Show which maintainers a user belongs to
    Membership { email: String },

    /// Add a user to every listed maintainer; removals are only reported
    Ensure {
        email: String,
        #[arg(long = "maintainer")]
        maintainers: Vec<String>,
    },
}

pub fn run(globals: &GlobalArgs, subcmd: MaintainerSubcommand, json: bool) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;
    let manage = ctx.session(globals)?.manage()?;

    match subcmd {
        MaintainerSubcommand::List => {
            let maintainers = manage.maintainers().context("failed to list maintainers")?;
            if json {
                return print_json(&maintainers);
            }
            let rows = maintainers
                .iter()
                .map(|m| vec![m.id.clone(), m.name.clone()])
                .collect();
            print_table(&["ID", "NAME"], rows);
            Ok(())
        }
        MaintainerSubcommand::Users { maintainer } => {
            let users = manage
                .maintainer_users(&maintainer)
                .with_context(|| format!("failed to list users of maintainer {maintainer}"))?;
            if json {
                return print_json(&users);
            }
            let rows = users
                .iter()
                .map(|u| vec![u.id.clone(), u.email.clone(), u.name.clone()])
                .collect();
            print_table(&["ID", "EMAIL", "NAME"], rows);
            Ok(())
        }
        MaintainerSubcommand::Membership { email } => {
            let memberships = membership_for(&manage, &email)
                .with_context(|| format!("failed to read memberships of {email}"))?;
            if json {
                return print_json(&memberships);
            }
            let rows = memberships
                .iter()
                .map(|m| {
                    vec![
                        m.maintainer.id.clone(),
                        m.maintainer.name.clone(),
                        if m.is_member { "yes" } else { "no" }.to_string(),
                    ]
                })
                .collect();
            print_table(&["ID", "NAME", "MEMBER"], rows);
            Ok(())
        }
        MaintainerSubcommand::Ensure { email, maintainers } => {
            let desired: BTreeSet<String> = maintainers.into_iter().collect();
            let report = ensure_membership(&manage, &email, &desired)
                .with_context(|| format!("failed to update memberships of {email}"))?;
            if json {
                return print_json(&report);
            }
            println!("Added:     {}", list_or_dash(&report.added));
            println!("Unchanged: {}", list_or_dash(&report.unchanged));
            if !report.removal_not_applied.is_empty() {
                println!(
                    "Not removed (no API for removal): {}",
                    report.removal_not_applied.join(", ")
                );
            }
            Ok(())
        }
    }
}

fn list_or_dash(ids: &[String]) -> String {
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.join(", ")
    }
}
