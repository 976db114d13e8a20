use crate::context::{Context, GlobalArgs};
use crate::output::print_json;
use anyhow::Context as _;
use clap::Subcommand;
use kbc_core::config::WarnLevel;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the resolved config path and contents (tokens masked)
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Store a token for a region
    SetToken {
        /// Region id, alias or suffix
        #[arg(value_name = "REGION")]
        target: String,
        #[arg(long)]
        manage: Option<String>,
        #[arg(long)]
        storage: Option<String>,
    },

    /// Set the region used when --region is not given
    SetDefault {
        #[arg(value_name = "REGION")]
        target: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(globals: &GlobalArgs, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    let ctx = Context::load(globals)?;
    match subcmd {
        ConfigSubcommand::Show => show(&ctx, json),
        ConfigSubcommand::Validate => validate(&ctx, json),
        ConfigSubcommand::SetToken {
            target,
            manage,
            storage,
        } => set_token(ctx, &target, manage, storage),
        ConfigSubcommand::SetDefault { target } => set_default(ctx, &target),
    }
}

fn mask(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{visible}****")
}

fn show(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let mut config = ctx.config.clone();
    for token in config
        .manage_tokens
        .values_mut()
        .chain(config.storage_tokens.values_mut())
    {
        *token = mask(token);
    }

    if json {
        let value = serde_json::json!({
            "path": ctx.path,
            "config": config,
        });
        return print_json(&value);
    }

    println!("# {}", ctx.path.display());
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let warnings = ctx.config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// set-token / set-default
// ---------------------------------------------------------------------------

fn set_token(
    mut ctx: Context,
    region: &str,
    manage: Option<String>,
    storage: Option<String>,
) -> anyhow::Result<()> {
    if manage.is_none() && storage.is_none() {
        anyhow::bail!("pass --manage and/or --storage");
    }
    let id = ctx.regions().resolve(region)?.id.clone();
    if let Some(token) = manage {
        ctx.config.manage_tokens.insert(id.clone(), token);
    }
    if let Some(token) = storage {
        ctx.config.storage_tokens.insert(id.clone(), token);
    }
    ctx.config
        .save(&ctx.path)
        .with_context(|| format!("failed to write {}", ctx.path.display()))?;
    println!("Stored token(s) for {id}.");
    Ok(())
}

fn set_default(mut ctx: Context, region: &str) -> anyhow::Result<()> {
    let id = ctx.regions().resolve(region)?.id.clone();
    ctx.config.default_region = Some(id.clone());
    ctx.config
        .save(&ctx.path)
        .with_context(|| format!("failed to write {}", ctx.path.display()))?;
    println!("Default region set to {id}.");
    Ok(())
}
