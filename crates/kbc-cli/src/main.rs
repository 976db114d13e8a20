mod cmd;
mod context;
mod output;

use clap::{Parser, Subcommand};
use cmd::component::ComponentSubcommand;
use cmd::config::ConfigSubcommand;
use cmd::maintainer::MaintainerSubcommand;
use cmd::migrate::MigrateSubcommand;
use cmd::oauth::OauthSubcommand;
use cmd::orchestration::OrchestrationSubcommand;
use cmd::portal::PortalSubcommand;
use cmd::project::{DeletedSubcommand, OrgSubcommand, ProjectSubcommand};
use cmd::user::{FeatureScopeArg, UserSubcommand};
use context::GlobalArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kbc-admin",
    about = "Administrative tooling for projects, users, storage and OAuth across stacks",
    version
)]
struct Cli {
    /// Config file (default: $KBC_ADMIN_CONFIG or ~/.kbc-admin/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Region id, alias or hostname suffix (default: config default_region)
    #[arg(long, short = 'r', global = true, env = "KBC_REGION")]
    region: Option<String>,

    #[arg(long, global = true, env = "KBC_MANAGE_TOKEN", hide_env_values = true)]
    manage_token: Option<String>,

    #[arg(long, global = true, env = "KBC_STORAGE_TOKEN", hide_env_values = true)]
    storage_token: Option<String>,

    /// Development branch id for storage commands
    #[arg(long, global = true)]
    branch: Option<String>,

    /// Output as JSON
    #[arg(long, short = 'j', global = true)]
    json: bool,

    /// Log progress (INFO); RUST_LOG still takes precedence
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known regions
    Regions,

    /// Inspect and edit the config file
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Project details, features, creation and tokens
    Project {
        #[command(subcommand)]
        subcommand: ProjectSubcommand,
    },

    /// Deleted projects: list, inspect, restore
    Deleted {
        #[command(subcommand)]
        subcommand: DeletedSubcommand,
    },

    /// Organization details
    Org {
        #[command(subcommand)]
        subcommand: OrgSubcommand,
    },

    /// User details, features and deletion
    User {
        #[command(subcommand)]
        subcommand: UserSubcommand,
    },

    /// List the feature catalogue
    Features {
        #[arg(value_enum, default_value = "project")]
        scope: FeatureScopeArg,
    },

    /// Maintainers and maintainer membership
    Maintainer {
        #[command(subcommand)]
        subcommand: MaintainerSubcommand,
    },

    /// Components, configurations, jobs and branches in one project
    Component {
        #[command(subcommand)]
        subcommand: ComponentSubcommand,
    },

    /// Copy configurations, buckets and orchestrations between projects
    Migrate {
        #[command(subcommand)]
        subcommand: MigrateSubcommand,
    },

    /// Orchestrations and schedules
    Orchestration {
        #[command(subcommand)]
        subcommand: OrchestrationSubcommand,
    },

    /// OAuth consumer registry across stacks
    Oauth {
        #[command(subcommand)]
        subcommand: OauthSubcommand,
    },

    /// Developer portal: app permissions and vendors
    Portal {
        #[command(subcommand)]
        subcommand: PortalSubcommand,
    },

    /// Encrypt a value for a component (reads stdin when VALUE is omitted)
    Encrypt {
        value: Option<String>,
        #[arg(long)]
        component: String,
        #[arg(long)]
        project: Option<String>,
        #[arg(long = "config-id")]
        config_id: Option<String>,
    },

    /// Print Datadog links for a component or job
    Monitor {
        component: String,
        #[arg(long)]
        job: Option<String>,
        /// Window start, RFC 3339
        #[arg(long, requires = "to")]
        from: Option<chrono::DateTime<chrono::Utc>>,
        /// Window end, RFC 3339
        #[arg(long, requires = "from")]
        to: Option<chrono::DateTime<chrono::Utc>>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let globals = GlobalArgs {
        config: cli.config,
        region: cli.region,
        manage_token: cli.manage_token,
        storage_token: cli.storage_token,
        branch: cli.branch,
        current_stack: std::env::var("KBC_STACKID").ok(),
    };
    let json = cli.json;

    let result = match cli.command {
        Commands::Regions => cmd::regions::run(&globals, json),
        Commands::Config { subcommand } => cmd::config::run(&globals, subcommand, json),
        Commands::Project { subcommand } => cmd::project::run(&globals, subcommand, json),
        Commands::Deleted { subcommand } => cmd::project::run_deleted(&globals, subcommand, json),
        Commands::Org { subcommand } => cmd::project::run_org(&globals, subcommand, json),
        Commands::User { subcommand } => cmd::user::run(&globals, subcommand, json),
        Commands::Features { scope } => cmd::user::catalogue(&globals, scope, json),
        Commands::Maintainer { subcommand } => cmd::maintainer::run(&globals, subcommand, json),
        Commands::Component { subcommand } => cmd::component::run(&globals, subcommand, json),
        Commands::Migrate { subcommand } => cmd::migrate::run(&globals, subcommand, json),
        Commands::Orchestration { subcommand } => {
            cmd::orchestration::run(&globals, subcommand, json)
        }
        Commands::Oauth { subcommand } => cmd::oauth::run(&globals, subcommand, json),
        Commands::Portal { subcommand } => cmd::portal::run(&globals, subcommand, json),
        Commands::Encrypt {
            value,
            component,
            project,
            config_id,
        } => cmd::encrypt::run(&globals, value, component, project, config_id, json),
        Commands::Monitor {
            component,
            job,
            from,
            to,
        } => cmd::monitor::run(&component, job.as_deref(), from.zip(to), json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
