use std::path::PathBuf;
use std::time::Duration;

use agora::model::{AgentProfile, MessageQuery};
use agora::output::Format;
use agora::{Agora, StoreConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "agora",
    version = agora::build_info::version(),
    about = "File-backed chat rooms for cooperating agents"
)]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value = "json")]
    format: Format,
    /// Shorthand for --format pretty
    #[arg(long, global = true, hide = true)]
    pretty: bool,
    /// Data directory (default: $AGORA_DATA_DIR or ./.agora)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Give up waiting for a file lock after this many milliseconds
    #[arg(long, global = true)]
    lock_timeout_ms: Option<u64>,
    /// Log lock and cache activity to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage rooms
    Room {
        #[command(subcommand)]
        action: RoomAction,
    },
    /// Enter a room (or come back online in it)
    Enter {
        room: String,
        agent: String,
        /// Role advertised to other agents
        #[arg(long)]
        role: Option<String>,
        /// Free-form self description
        #[arg(long, short)]
        description: Option<String>,
        /// Capability tag (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,
    },
    /// Leave a room (kept as offline)
    Leave { room: String, agent: String },
    /// List every agent known to a room
    Who { room: String },
    /// Remove offline agents that have been gone longer than a threshold
    Prune {
        room: String,
        #[arg(long, default_value_t = 86_400)]
        older_than_secs: u64,
    },
    /// Send a message to a room
    Send {
        room: String,
        agent: String,
        message: String,
        /// Extra JSON object stored with the message
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Read a page of messages, oldest first
    Read {
        room: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Requesting agent (used with --mentions-only)
        #[arg(long)]
        agent: Option<String>,
        /// Only messages that @-mention --agent
        #[arg(long)]
        mentions_only: bool,
    },
    /// Count messages in a room
    Count { room: String },
    /// Delete every message in a room
    Clear { room: String },
}

#[derive(Subcommand)]
enum RoomAction {
    /// Create a new room
    Create {
        name: String,
        #[arg(long, short)]
        description: Option<String>,
    },
    /// List all rooms
    List,
    /// Show one room
    Show { name: String },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("AGORA_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn resolve_config(cli: &Cli) -> agora::Result<StoreConfig> {
    let mut config = StoreConfig::from_env()?;
    if let Some(ref dir) = cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(ms) = cli.lock_timeout_ms {
        config.lock_timeout = Duration::from_millis(ms);
    }
    Ok(config)
}

fn parse_metadata(
    raw: Option<String>,
) -> agora::Result<Option<serde_json::Map<String, serde_json::Value>>> {
    raw.map(|s| {
        serde_json::from_str(&s).map_err(|e| {
            agora::AgoraError::Validation(format!("--metadata must be a JSON object: {e}"))
        })
    })
    .transpose()
}

fn run(cli: Cli, format: Format) -> agora::Result<()> {
    let config = resolve_config(&cli)?;
    let agora = Agora::open(&config);

    match cli.command {
        Commands::Room { action } => match action {
            RoomAction::Create { name, description } => {
                agora::commands::room::create(&agora, &name, description.as_deref(), format)
            }
            RoomAction::List => agora::commands::room::list(&agora, format),
            RoomAction::Show { name } => agora::commands::room::show(&agora, &name, format),
        },
        Commands::Enter {
            room,
            agent,
            role,
            description,
            capabilities,
        } => {
            let profile = if role.is_none() && description.is_none() && capabilities.is_empty() {
                None
            } else {
                Some(AgentProfile {
                    role,
                    description,
                    capabilities,
                    ..AgentProfile::default()
                })
            };
            agora::commands::presence::enter(&agora, &room, &agent, profile, format)
        }
        Commands::Leave { room, agent } => {
            agora::commands::presence::leave(&agora, &room, &agent, format)
        }
        Commands::Who { room } => agora::commands::presence::who(&agora, &room, format),
        Commands::Prune {
            room,
            older_than_secs,
        } => agora::commands::presence::prune(
            &agora,
            &room,
            Duration::from_secs(older_than_secs),
            format,
        ),
        Commands::Send {
            room,
            agent,
            message,
            metadata,
        } => {
            let metadata = parse_metadata(metadata)?;
            agora::commands::messages::send(&agora, &room, &agent, &message, metadata, format)
        }
        Commands::Read {
            room,
            limit,
            offset,
            agent,
            mentions_only,
        } => {
            let query = MessageQuery {
                limit,
                offset,
                agent_name: agent,
                mentions_only,
            };
            agora::commands::messages::read(&agora, &room, &query, format)
        }
        Commands::Count { room } => agora::commands::messages::count(&agora, &room, format),
        Commands::Clear { room } => agora::commands::messages::clear(&agora, &room, format),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let format = if cli.pretty {
        Format::Pretty
    } else {
        cli.format
    };
    if let Err(e) = run(cli, format) {
        match format {
            Format::Json => {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.code(),
                        "message": e.to_string(),
                        "retryable": e.is_retryable(),
                    })
                );
            }
            _ => eprintln!("error: {e}"),
        }
        std::process::exit(1);
    }
}
