mod render;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sm_common::EnvConfig;
use sm_servers::{Action, ActionRequest, Backends, Fleet};
use sm_settings::Settings;
use tracing::{debug, info};

#[derive(Parser)]
#[command(
    name = "servermanager",
    version,
    about = "Status and power control for a fleet of ssh-managed servers"
)]
struct Cli {
    /// Fleet settings file (overrides SERVERMANAGER_SETTINGS)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Environment file to load instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Status of every server and service
    Overview,
    /// Process one request: powerbutton, status or service-status
    Action {
        action: String,
        host: String,
        service: Option<String>,
    },
    /// Create a server directory with default settings
    CreateHost { id: String },
    /// Create a service settings file on an existing server
    CreateService { host: String, id: String },
    /// Read one setting of the fleet, a server or a service
    Get {
        key: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long, requires = "host")]
        service: Option<String>,
    },
    /// Write one setting; refused if the file changed since it was read
    Set {
        key: String,
        value: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long, requires = "host")]
        service: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, results to stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,servermanager=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut env = EnvConfig::load(cli.env_file.as_deref());
    if let Some(path) = cli.settings.clone() {
        env.settings_path = path;
    }
    debug!(settings = %env.settings_path.display(), "Configuration loaded");

    let mut fleet = Fleet::open(&env.settings_path, Backends::from_config(&env))
        .with_context(|| format!("failed to open {}", env.settings_path.display()))?;

    match cli.command {
        Command::Overview => {
            let overview = fleet.overview().await?;
            if cli.json {
                println!("{}", render::json(&overview)?);
            } else {
                print!("{}", render::overview_text(&overview));
            }
        }
        Command::Action {
            action,
            host,
            service,
        } => {
            let action: Action = action.parse()?;
            let mut request = ActionRequest::new(action, host);
            if let Some(service) = service {
                request = request.with_service(service);
            }
            let outcome = fleet
                .process_action(&request)
                .await
                .with_context(|| format!("{} on {} failed", request.action, request.host_id))?;
            if cli.json {
                println!("{}", render::json(&outcome)?);
            } else {
                println!("{}", outcome);
            }
        }
        Command::CreateHost { id } => {
            let host = fleet.create_host(&id)?;
            info!(host = %id, "Created");
            println!("{}", host.settings().path().display());
        }
        Command::CreateService { host, id } => {
            let service = fleet.create_service(&host, &id)?;
            println!("{}", service.settings().path().display());
        }
        Command::Get { key, host, service } => {
            let settings = select_settings(&fleet, host.as_deref(), service.as_deref())?;
            let value = settings.get(&key)?;
            if cli.json {
                println!("{}", render::json(&value)?);
            } else {
                println!("{}", value);
            }
        }
        Command::Set {
            key,
            value,
            host,
            service,
        } => {
            let settings = select_settings(&fleet, host.as_deref(), service.as_deref())?;
            let outcome = settings.set(&key, value)?;
            if cli.json {
                println!("{}", render::json(&outcome)?);
            } else {
                println!("{:?}", outcome);
            }
            if !outcome.is_success() {
                anyhow::bail!(
                    "{} changed since it was read, setting not written",
                    settings.path().display()
                );
            }
        }
    }

    Ok(())
}

fn select_settings<'a>(
    fleet: &'a Fleet,
    host: Option<&str>,
    service: Option<&str>,
) -> anyhow::Result<&'a Settings> {
    Ok(match (host, service) {
        (None, _) => fleet.settings(),
        (Some(host), None) => fleet.host(host)?.settings(),
        (Some(host), Some(service)) => fleet.host(host)?.service(service)?.settings(),
    })
}
