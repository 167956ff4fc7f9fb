mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slotcast::config::Config;
use slotcast::orchestrator::stock::DEFAULT_STOCK_DAYS;

use commands::ServeParams;

#[derive(Parser)]
#[command(
    name = "slotcast",
    version,
    about = "Slot-based multi-tenant publishing orchestrator",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (environment variables still apply on top)
    #[arg(short, long, global = true, env = "SLOTCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to logging.format from config
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Override the bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the bind port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one invocation and print the result as JSON
    Trigger {
        /// Treat the invocation as happening at this RFC 3339 instant
        #[arg(long)]
        at: Option<String>,
    },

    /// Show kill switch, current slot and recent runs
    Status,

    /// Turn the kill switch on (allow publishing)
    Enable,

    /// Turn the kill switch off (suppress all publishing)
    Disable,

    /// Manage tenant pages and credentials
    Tenant {
        #[command(subcommand)]
        action: TenantAction,
    },

    /// Manage content inventory
    Content {
        #[command(subcommand)]
        action: ContentAction,
    },

    /// Print every slot of a day
    Plan {
        /// Local date (YYYY-MM-DD), defaults to today
        date: Option<String>,
    },

    /// Unused content per tenant against the target
    Stock {
        /// Days of publishing the target should cover
        #[arg(short, long, default_value_t = DEFAULT_STOCK_DAYS)]
        days: u32,
    },

    /// Fail stale running slots and prune expired locks
    Sweep,
}

#[derive(Subcommand)]
enum TenantAction {
    /// Create or update a tenant
    Set {
        /// Roster id, e.g. FP_1
        id: String,

        /// Page id on the publishing platform
        #[arg(long)]
        page_id: String,

        /// Page access token
        #[arg(long, env = "SLOTCAST_TENANT_CREDENTIAL", hide_env_values = true)]
        credential: Option<String>,
    },

    /// List roster tenants and whether they have credentials
    List,
}

#[derive(Subcommand)]
enum ContentAction {
    /// Add one content item
    Add {
        /// Owning tenant id
        tenant: String,

        /// URL, file:// path or bare file id
        payload_ref: String,

        #[arg(long, default_value = "")]
        caption: String,
    },

    /// Show a tenant's content in rotation order
    List {
        tenant: String,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;

    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    match cli.command {
        Commands::Serve { host, port } => {
            tracing::info!(host = ?host, port = ?port, "Starting serve command");
            commands::serve(config, ServeParams { host, port }).await?;
        }

        Commands::Trigger { at } => {
            tracing::debug!(at = ?at, "Starting trigger command");
            commands::trigger(config, at).await?;
        }

        Commands::Status => commands::status(config).await?,
        Commands::Enable => commands::set_enabled(config, true).await?,
        Commands::Disable => commands::set_enabled(config, false).await?,

        Commands::Tenant { action } => match action {
            TenantAction::Set {
                id,
                page_id,
                credential,
            } => commands::tenant_set(config, id, page_id, credential).await?,
            TenantAction::List => commands::tenant_list(config).await?,
        },

        Commands::Content { action } => match action {
            ContentAction::Add {
                tenant,
                payload_ref,
                caption,
            } => commands::content_add(config, tenant, payload_ref, caption).await?,
            ContentAction::List { tenant, limit } => {
                commands::content_list(config, tenant, limit).await?
            }
        },

        Commands::Plan { date } => commands::plan(config, date).await?,
        Commands::Stock { days } => commands::stock(config, days).await?,
        Commands::Sweep => commands::sweep(config).await?,
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("slotcast=debug,tower_http=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("slotcast={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
