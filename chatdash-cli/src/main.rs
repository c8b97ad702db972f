//! `chatdash`: drive the dashboard's secret-key layer from a terminal.

mod store;
mod surface;

use std::path::PathBuf;
use std::sync::Arc;

use chatdash_core::{
    platform::MemoryStore, BootOutcome, Dashboard, DashboardConfig, Entry, Environment, Feature,
    GateDecision,
};
use clap::{Parser, Subcommand};
use eyre::{eyre, WrapErr};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use crate::{store::FileStore, surface::TerminalSurface};

#[derive(Parser)]
#[command(name = "chatdash", about = "Chat statistics dashboard: secret-key tools", long_about = None)]
struct Cli {
    /// API deployment.
    #[arg(long, env = "CHATDASH_ENV", default_value = "production")]
    env: Environment,

    /// Overrides the deployment's API base URL.
    #[arg(long, env = "CHATDASH_BASE_URL")]
    base_url: Option<String>,

    /// Where the account id, key and cookie jar are kept.
    #[arg(long, env = "CHATDASH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Allows an `http://` base URL (local development servers).
    #[arg(long)]
    insecure: bool,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the dashboard: reconcile the key and answer any prompt.
    Open {
        /// Account id to sign in as.
        #[arg(long)]
        account: Option<String>,
        /// Treat `--account` as coming from a token link.
        #[arg(long, requires = "account")]
        token_link: bool,
    },
    /// Check the key for one feature (achievements, backgrounds, settings).
    Gate { feature: Feature },
    /// Show the remembered account.
    Whoami,
    /// Forget the account on this machine.
    Logout,
}

fn init_tracing(verbose: bool) -> eyre::Result<()> {
    tracing_log::LogTracer::init().wrap_err("failed to bridge log records")?;
    let default = if verbose { "chatdash=debug,chatdash_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber).wrap_err("failed to install subscriber")
}

fn data_dir(cli: &Cli) -> eyre::Result<PathBuf> {
    if let Some(dir) = &cli.data_dir {
        return Ok(dir.clone());
    }
    dirs::data_local_dir()
        .map(|dir| dir.join("chatdash"))
        .ok_or_else(|| eyre!("no data directory; pass --data-dir"))
}

fn dashboard(cli: &Cli) -> eyre::Result<Dashboard> {
    let mut config = DashboardConfig::from_environment(&cli.env);
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url);
    }
    config.allow_insecure_http = cli.insecure;

    let dir = data_dir(cli)?;
    let local = FileStore::open(dir.join("local.json"))?;
    let cookies = FileStore::open(dir.join("cookies.json"))?;
    debug!(local = %local.path().display(), cookies = %cookies.path().display(), "opened stores");

    Ok(Dashboard::connect(
        config,
        Arc::new(local),
        Arc::new(cookies),
        Arc::new(MemoryStore::new()),
        Arc::new(TerminalSurface),
    )?)
}

async fn open(dashboard: &Dashboard, account: Option<String>, token_link: bool) -> eyre::Result<()> {
    let entry = match account {
        Some(account_id) if token_link => Entry::TokenLink { account_id },
        Some(account_id) => {
            dashboard.capture_account_id(&account_id)?;
            Entry::Normal
        }
        None => Entry::Normal,
    };

    match dashboard.load(entry).await {
        BootOutcome::Ready { account_id } => println!("ready: {account_id}"),
        BootOutcome::Degraded { account_id } => {
            println!("signed in as {account_id} without a verified secret key");
        }
        BootOutcome::NeedsAccountId => {
            println!("no account; run `chatdash open --account <id>`");
        }
        BootOutcome::Busy => println!("another load is in progress"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    info!(env = %cli.env, "starting");

    let dashboard = dashboard(&cli)?;
    match cli.command {
        Command::Open {
            account,
            token_link,
        } => open(&dashboard, account, token_link).await?,
        Command::Gate { feature } => match dashboard.gate(feature).await {
            GateDecision::Granted { .. } => println!("{feature}: granted"),
            GateDecision::Blocked => println!("{feature}: blocked"),
        },
        Command::Whoami => match dashboard.context().identity.account_id() {
            Some(account_id) => {
                let admin = dashboard.is_admin().await;
                let name = dashboard.user_name().unwrap_or_default();
                println!("{account_id} {name}{}", if admin { " (admin)" } else { "" });
            }
            None => println!("no account"),
        },
        Command::Logout => {
            dashboard.escape();
            println!("logged out");
        }
    }
    Ok(())
}
