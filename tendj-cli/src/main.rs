//! Main entry point for the tendj terminal client.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use dotenv::dotenv;
use shared::config::client::Config;
use std::path::PathBuf;
use url::Url;

mod commands;
mod logging;
mod render;

use commands::App;

/// tendj CLI
#[derive(Parser, Debug)]
#[command(name = "tendj", version)]
#[command(about = "Terminal client for tendj chat", long_about = None)]
struct Cli {
    /// Path to the configuration file (optional)
    #[arg(
        long,
        short,
        global = true,
        help = "Path to the configuration file (e.g., config.yaml, config.json or config.toml). If not provided, defaults will be used."
    )]
    config: Option<PathBuf>,

    /// Backend base URL, overriding the configuration
    #[arg(
        long,
        global = true,
        help = "Backend base URL (e.g., http://localhost:8005). Overrides api.base_url."
    )]
    server: Option<Url>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for the tendj CLI
#[derive(Subcommand, Debug)]
enum Commands {
    /// List conversations, marking the active one
    Chats,

    /// Open a conversation and print its transcript
    Open {
        /// Conversation identifier
        id: String,
    },

    /// Forget the active conversation so the next message starts a new one
    New,

    /// Send a message to the active conversation
    Send {
        /// Message text
        text: String,

        /// Return once the backend accepts the message, without reloading the reply
        #[arg(long)]
        no_wait: bool,
    },

    /// Start an interactive chat session with streamed replies
    Chat,

    /// Follow the push stream for the active conversation
    Follow,

    /// Store a bearer token for subsequent requests
    Login {
        /// Token to store; prompted for when omitted
        #[arg(long)]
        token: Option<String>,
    },

    /// Remove the stored bearer token
    Logout,

    /// Generate a configuration file
    Config {
        /// Format of the configuration file to generate (yaml, json or toml). Defaults to yaml.
        #[arg(
            long,
            short,
            default_value = "yaml",
            help = "Format of the configuration file to generate (yaml, json or toml)."
        )]
        format: String,
    },

    /// Generate shell completion scripts for the CLI
    Completion {
        /// The shell type for which to generate the completion script (e.g., bash, zsh, fish, powershell)
        #[arg(long, short, value_enum)]
        shell: Shell,
    },
}

fn load_config(path: Option<PathBuf>, server: Option<Url>) -> Result<Config> {
    let config = Config::load_config(path, server).context("failed to load configuration")?;
    config
        .validate()
        .map_err(|errors| anyhow!("invalid configuration:\n  {}", errors.join("\n  ")))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Completion { shell } => {
            commands::completion::generate_completion(shell);
            return Ok(());
        }
        Commands::Config { format } => {
            let directory = std::env::current_dir().context("failed to resolve current directory")?;
            return commands::config::generate_config(&format, &directory);
        }
        _ => {}
    }

    let config = load_config(cli.config, cli.server)?;
    logging::initialize_tracing(&config.logging);
    let app = App::new(config);

    match cli.command {
        Commands::Chats => commands::history::list_chats(&app).await,
        Commands::Open { id } => commands::history::open(&app, &id).await,
        Commands::New => commands::history::new_chat(&app),
        Commands::Send { text, no_wait } => commands::chat::send(&app, &text, no_wait).await,
        Commands::Chat => commands::chat::interactive(&app).await,
        Commands::Follow => commands::chat::follow(&app).await,
        Commands::Login { token } => commands::session::login(&app, token),
        Commands::Logout => commands::session::logout(&app),
        Commands::Config { .. } | Commands::Completion { .. } => Ok(()),
    }
}
