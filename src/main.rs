use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ada_agent::api::issue_token;
use ada_agent::{Config, Daemon};

/// ADA - voice assistant agent
#[derive(Parser)]
#[command(name = "ada", version, about)]
struct Cli {
    /// Room the agent joins
    #[arg(short, long, env = "ADA_ROOM")]
    room: Option<String>,

    /// Control plane port
    #[arg(long, env = "ADA_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent (default)
    Run,
    /// Print a signed room access token
    Token {
        /// Room to grant access to
        #[arg(long)]
        room: String,
        /// Participant identity
        #[arg(long)]
        identity: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,ada_agent=info",
        1 => "info,ada_agent=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(room) = cli.room {
        config.room.name = room;
    }
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Token { room, identity } => {
            let token = issue_token(&config.livekit, &room, &identity)?;
            println!("{token}");
            Ok(())
        }
        Command::Run => {
            tracing::info!(
                room = %config.room.name,
                port = config.api_server.port,
                stt = ?config.voice.stt_provider,
                tts = ?config.voice.tts_provider,
                model = %config.llm.model,
                "starting ada agent"
            );
            tracing::debug!(?config, "loaded configuration");

            Daemon::new(config)?.run().await?;
            Ok(())
        }
    }
}
