use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod chat;
pub mod extract;
pub mod serve;
pub mod settings;

#[derive(Subcommand)]
enum Command {
    /// Run the API server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: String,
    },
    /// Start an interactive chat against a running server
    Chat {
        /// Base URL of the chat server
        #[arg(long, default_value = "http://127.0.0.1:2222")]
        server: String,

        /// JSON file listing the study queue
        #[arg(long)]
        queue: Option<PathBuf>,
    },
    /// Print the text extracted from a file or URL
    Extract { source: String },
    /// Show or change the chat provider and credential
    Settings {
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        credential: Option<String>,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();

    // Handle each sub command
    match args.command {
        Some(Command::Serve { host, port }) => {
            serve::run(host, port).await?;
        }
        Some(Command::Chat { server, queue }) => {
            chat::run(&server, queue).await?;
        }
        Some(Command::Extract { source }) => {
            extract::run(&source).await?;
        }
        Some(Command::Settings {
            provider,
            credential,
        }) => {
            settings::run(provider, credential)?;
        }
        None => {}
    }

    Ok(())
}
