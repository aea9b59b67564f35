//! Go2 CLI - inspect the command catalog and dispatch requests
//!
//! Envelopes are written to stdout as newline-delimited wire JSON, ready to be
//! piped into a data-channel relay. Logs go to stderr.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use go2_dispatch::control::call::parse_argument;
use go2_dispatch::control::{
    Catalog, CommandCall, Dispatcher, DispatcherConfig, RequestBuilder, WriterChannel,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "go2-cli")]
#[command(about = "Build and dispatch sport-mode requests", long_about = None)]
struct Cli {
    /// Dispatcher configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every command with its action id and parameters
    List,

    /// Print the envelope for a call without dispatching it
    Build {
        /// Command name
        name: String,

        /// Argument as name=value (repeatable)
        #[arg(short, long = "arg")]
        args: Vec<String>,

        /// Priority override
        #[arg(long)]
        priority: Option<u8>,

        /// Session id override
        #[arg(long)]
        session: Option<u64>,
    },

    /// Dispatch a call, holding continuous commands for a while
    Send {
        /// Command name
        name: String,

        /// Argument as name=value (repeatable)
        #[arg(short, long = "arg")]
        args: Vec<String>,

        /// Priority override
        #[arg(long)]
        priority: Option<u8>,

        /// How long to keep a continuous command streaming
        #[arg(long, default_value = "1000")]
        hold_ms: u64,
    },
}

fn call_from(name: String, args: &[String], priority: Option<u8>) -> Result<CommandCall> {
    let mut call = CommandCall::new(name);
    for text in args {
        let (field, value) =
            parse_argument(text).ok_or_else(|| anyhow!("expected name=value, got '{text}'"))?;
        call = call.arg(field, value);
    }
    call.priority_override = priority;
    Ok(call)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => DispatcherConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DispatcherConfig::default(),
    };

    match cli.command {
        Commands::List => {
            for spec in Catalog::global().all_commands() {
                let fields: Vec<_> = spec
                    .parameters
                    .iter()
                    .map(|field| format!("{}: {:?}", field.name, field.kind))
                    .collect();
                let marker = if spec.continuous { " [continuous]" } else { "" };
                println!(
                    "{:>5}  {:<22} ({}) -> {}{}",
                    spec.action_id,
                    spec.name,
                    fields.join(", "),
                    spec.family,
                    marker
                );
            }
        }

        Commands::Build {
            name,
            args,
            priority,
            session,
        } => {
            let mut call = call_from(name, &args, priority)?;
            call.session_id = session;
            let builder = RequestBuilder::new(Catalog::global(), config.session_id);
            let envelope = builder.build(&call)?;
            println!("{}", envelope.to_wire()?);
        }

        Commands::Send {
            name,
            args,
            priority,
            hold_ms,
        } => {
            let call = call_from(name.clone(), &args, priority)?;
            let channel = Arc::new(WriterChannel::new(std::io::stdout()));
            let dispatcher = Dispatcher::new(channel, config)?;

            let outcome = dispatcher.send(call).await?;
            tracing::info!(envelope = %outcome.envelope, attempts = outcome.attempts, "sent");

            if dispatcher.stream_status(&name).await.is_some() {
                tokio::time::sleep(Duration::from_millis(hold_ms)).await;
                dispatcher.stop(&name).await?;
            }
            dispatcher.shutdown().await;
        }
    }

    Ok(())
}
