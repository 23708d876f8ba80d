//! PingMesh command-line entry point.
//!
//! `init` and `join` bootstrap a node, `agent` runs it, and the remaining
//! commands are thin clients of the local admin API.

mod admin_client;
mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use pingmesh_model::{DEFAULT_ADMIN_ADDR, DEFAULT_DATA_DIR, DEFAULT_LISTEN_ADDR};

#[derive(Parser, Debug)]
#[command(
    name = "pingmesh",
    version,
    about = "Distributed availability monitoring with quorum-based alerting"
)]
struct Cli {
    /// Data directory holding the store, certificates, and config.
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR, env = "PINGMESH_DATA_DIR")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize this node as the cluster coordinator.
    Init {
        /// Peer API listen address.
        #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
        listen: String,
        /// Node name (defaults to the host name).
        #[arg(long)]
        name: Option<String>,
    },
    /// Join an existing cluster with a one-time token.
    Join {
        /// The join token handed out by the coordinator.
        token: String,
        /// Node name (defaults to the host name).
        #[arg(long)]
        name: Option<String>,
        /// Peer API listen address.
        #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
        listen: String,
        /// Admin API listen address.
        #[arg(long, default_value = DEFAULT_ADMIN_ADDR)]
        cli_addr: String,
    },
    /// Run the agent daemon.
    Agent,
    /// Join-token management (coordinator only).
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },
    /// Show the cluster overview.
    Status,
    /// Monitor management.
    Monitor {
        #[command(subcommand)]
        command: MonitorCommand,
    },
    /// List incidents.
    Incidents {
        /// Only non-resolved incidents.
        #[arg(long)]
        active: bool,
    },
    /// Show recent check results.
    History {
        /// Filter by monitor id.
        #[arg(long)]
        monitor: Option<String>,
        /// Filter by node id.
        #[arg(long)]
        node: Option<String>,
        /// Maximum rows.
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Show local node health.
    Health,
    /// Show recent agent logs.
    Logs {
        /// Number of lines.
        #[arg(long, default_value_t = 100)]
        lines: usize,
    },
    /// Probe peer reachability.
    TestPeer {
        /// Only probe this node id.
        #[arg(long)]
        node: Option<String>,
    },
    /// Alert channel management.
    Alert {
        #[command(subcommand)]
        command: AlertCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Mint a new single-use join token.
    New {
        /// Token lifetime in hours.
        #[arg(long, default_value_t = 24)]
        ttl_hours: u32,
        /// Coordinator address to embed (defaults to the listen address).
        #[arg(long)]
        addr: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum MonitorCommand {
    /// Create a monitor.
    Add(commands::monitor::AddArgs),
    /// List monitors.
    List {
        /// Filter by group.
        #[arg(long)]
        group: Option<String>,
    },
    /// Delete a monitor.
    Remove {
        /// Monitor id.
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum AlertCommand {
    /// List alert channels.
    List,
    /// Create an alert channel.
    Add {
        /// Channel name.
        #[arg(long)]
        name: String,
        /// Channel type: webhook or email.
        #[arg(long, value_name = "TYPE")]
        kind: String,
        /// Transport configuration as JSON.
        #[arg(long, default_value = "{}")]
        config: String,
    },
    /// Delete an alert channel.
    Remove {
        /// Channel id.
        id: String,
    },
    /// Send a test notification through a channel.
    Test {
        /// Channel id.
        id: String,
    },
    /// Show the delivery journal.
    History {
        /// Filter by channel id.
        #[arg(long)]
        channel: Option<String>,
        /// Maximum rows.
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Init { listen, name } => commands::init::run(&cli.data_dir, &listen, name),
        Command::Join {
            token,
            name,
            listen,
            cli_addr,
        } => commands::join::run(&cli.data_dir, &token, name, &listen, &cli_addr).await,
        Command::Agent => commands::agent::run(&cli.data_dir).await,
        Command::Token {
            command: TokenCommand::New { ttl_hours, addr },
        } => commands::token::new_token(&cli.data_dir, ttl_hours, addr),
        Command::Status => commands::admin::status(&cli.data_dir).await,
        Command::Monitor { command } => match command {
            MonitorCommand::Add(args) => commands::monitor::add(&cli.data_dir, args).await,
            MonitorCommand::List { group } => commands::monitor::list(&cli.data_dir, group).await,
            MonitorCommand::Remove { id } => commands::monitor::remove(&cli.data_dir, &id).await,
        },
        Command::Incidents { active } => commands::admin::incidents(&cli.data_dir, active).await,
        Command::History {
            monitor,
            node,
            limit,
        } => commands::admin::history(&cli.data_dir, monitor, node, limit).await,
        Command::Health => commands::admin::health(&cli.data_dir).await,
        Command::Logs { lines } => commands::admin::logs(&cli.data_dir, lines).await,
        Command::TestPeer { node } => commands::admin::test_peer(&cli.data_dir, node).await,
        Command::Alert { command } => match command {
            AlertCommand::List => commands::alert::list(&cli.data_dir).await,
            AlertCommand::Add { name, kind, config } => {
                commands::alert::add(&cli.data_dir, &name, &kind, &config).await
            }
            AlertCommand::Remove { id } => commands::alert::remove(&cli.data_dir, &id).await,
            AlertCommand::Test { id } => commands::alert::test(&cli.data_dir, &id).await,
            AlertCommand::History { channel, limit } => {
                commands::alert::history(&cli.data_dir, channel, limit).await
            }
        },
    }
}
