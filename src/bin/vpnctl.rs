//! vpnctl - VPN client control CLI
//!
//! Inspect and edit the persisted server list: default server, default
//! container per server and route mode.

use clap::{Parser, Subcommand};
use libvpnctl::*;
use std::path::PathBuf;
use std::process;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "vpnctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "VPN client control - manage provisioned servers and containers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file
    #[arg(long, default_value = "/etc/vpnctl/vpnctl.toml")]
    config: PathBuf,

    /// Terse output mode
    #[arg(short = 't', long)]
    terse: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored servers
    Servers,

    /// Show the protocols of a server
    Show {
        /// Server index
        server: usize,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Make a server the default
    DefaultServer {
        server: usize,
    },

    /// Set the default container of a server ("none" only when nothing is installed)
    DefaultContainer {
        server: usize,
        container: String,
    },

    /// Show or change the route mode (all-sites, forward-sites, except-sites)
    RouteMode {
        mode: Option<RouteMode>,
    },

    /// Remove a server from the local list
    Forget {
        server: usize,
    },
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.verbose {
        "debug"
    } else {
        &cli.log_level
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            EnvFilter::new(format!("vpnctl={},libvpnctl={}", log_level, log_level))
        });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> VpnResult<()> {
    let config = VpnctlConfig::load_or_default(&cli.config)?;
    debug!("Using server store {:?}", config.paths.store_file);
    let store = ServerStore::open(&config.paths.store_file).await?;

    match cli.command.as_ref().unwrap_or(&Commands::Servers) {
        Commands::Servers => handle_servers(&store, cli).await,
        Commands::Show { server, json } => handle_show(&store, ServerId(*server), *json, cli).await,
        Commands::DefaultServer { server } => {
            store.set_default_server(ServerId(*server)).await?;
            if !cli.terse {
                println!("Default server set to {}", server);
            }
            Ok(())
        }
        Commands::DefaultContainer { server, container } => {
            let kind = match container.as_str() {
                "none" => None,
                name => Some(name.parse::<ContainerKind>()?),
            };
            store.set_default_container(ServerId(*server), kind).await?;
            if !cli.terse {
                match kind {
                    Some(kind) => println!("Default container of server {} set to {}", server, kind.display_name()),
                    None => println!("Default container of server {} cleared", server),
                }
            }
            Ok(())
        }
        Commands::RouteMode { mode } => {
            match mode {
                Some(mode) => {
                    store.set_route_mode(*mode).await?;
                    if !cli.terse {
                        println!("Route mode set to {}", mode.as_str());
                    }
                }
                None => println!("{}", store.route_mode().await.as_str()),
            }
            Ok(())
        }
        Commands::Forget { server } => {
            let record = store.server(ServerId(*server)).await?;
            store.remove_server(ServerId(*server)).await?;
            if !cli.terse {
                println!("Removed server {} ({})", server, record.credentials.host_name);
            }
            Ok(())
        }
    }
}

async fn handle_servers(store: &ServerStore, cli: &Cli) -> VpnResult<()> {
    let count = store.servers_count().await;
    let default_server = store.default_server().await;

    if count == 0 && !cli.terse {
        println!("No servers configured");
        return Ok(());
    }
    if !cli.terse {
        println!("Servers:");
    }

    for index in 0..count {
        let id = ServerId(index);
        let record = store.server(id).await?;
        let is_default = default_server == Some(id);
        let container = record
            .default_container
            .map(|kind| kind.as_str())
            .unwrap_or("none");

        if cli.terse {
            println!(
                "{}:{}:{}:{}:{}",
                index,
                record.description,
                record.credentials.host_name,
                container,
                if is_default { "*" } else { "" }
            );
        } else {
            println!(
                "  {}{} - {} ({}) [{}]",
                if is_default { "* " } else { "  " },
                index,
                record.description,
                record.credentials.host_name,
                container
            );
        }
    }
    Ok(())
}

async fn handle_show(store: &ServerStore, server: ServerId, json: bool, cli: &Cli) -> VpnResult<()> {
    let overview = ProtocolsOverview::load(store, server).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    if cli.terse {
        for status in &overview.protocols {
            println!(
                "{}:{}:{}",
                status.container.as_str(),
                if status.installed { "installed" } else { "-" },
                if status.is_default { "default" } else { "" }
            );
        }
        return Ok(());
    }

    println!("Server {} - {} ({})", overview.server, overview.description, overview.host_name);
    if !overview.have_auth_data {
        println!("  (no credentials stored, protocols cannot be managed)");
    }
    for status in &overview.protocols {
        let state = match (status.installed, status.is_default) {
            (true, true) => "installed, default",
            (true, false) => "installed",
            (false, _) => "not installed",
        };
        println!("  {:<26} {}", status.container.display_name(), state);
    }
    Ok(())
}
