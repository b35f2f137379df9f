//! Notary session command line.
//!
//! Runs the WebSocket relay, joins a relay as the notary or the client,
//! or plays a two-participant session in one process.

mod command;
mod demo;
mod interactive;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;
use notary_collab::{RelayConfig, RelayServer, SessionConfig};
use notary_core::Role;

#[derive(Parser)]
#[command(name = "notary", version, about = "Shared document annotation for remote notarization")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the session relay")]
    Relay {
        #[arg(help = "JSON relay configuration file", long)]
        config: Option<PathBuf>,

        #[arg(help = "Listen address, overrides the configuration", long)]
        bind: Option<String>,
    },

    #[command(about = "Join a relay and annotate from stdin")]
    Session {
        #[arg(help = "JSON session configuration file", long)]
        config: Option<PathBuf>,

        #[arg(help = "Participant identity", long)]
        identity: Option<String>,

        #[arg(help = "Participant role (notary or client)", long)]
        role: Option<Role>,

        #[arg(help = "Room to join", long)]
        room: Option<String>,

        #[arg(help = "Relay WebSocket URL", long)]
        url: Option<String>,

        #[arg(help = "PNG page or directory of PNG pages", long)]
        document: Option<PathBuf>,
    },

    #[command(about = "Run a notary and a client in one process and save their pages")]
    Demo {
        #[arg(help = "Output directory", long, default_value = "notary-demo")]
        out: PathBuf,

        #[arg(help = "PNG page or directory of PNG pages", long)]
        document: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();
    match args.command {
        Commands::Relay { config, bind } => {
            let mut config = match config {
                Some(path) => RelayConfig::from_file(path)?,
                None => RelayConfig::default(),
            }
            .apply_env()?;
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            config.validate()?;

            let server = RelayServer::from_config(config);
            tokio::select! {
                result = server.run() => result?,
                _ = tokio::signal::ctrl_c() => info!("Relay shutting down"),
            }
        }
        Commands::Session {
            config,
            identity,
            role,
            room,
            url,
            document,
        } => {
            let mut config = match config {
                Some(path) => SessionConfig::from_file(path)?,
                None => SessionConfig::default(),
            }
            .apply_env()?;
            if let Some(identity) = identity {
                config.identity = identity;
            }
            if let Some(role) = role {
                config.role = role;
            }
            if let Some(room) = room {
                config.room = room;
            }
            if let Some(url) = url {
                config.relay_url = url;
            }
            if document.is_some() {
                config.document = document;
            }
            interactive::run(config).await?;
        }
        Commands::Demo { out, document } => demo::run(&out, document).await?,
    }
    Ok(())
}
