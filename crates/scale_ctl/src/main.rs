//! # scale_ctl — bridge controller
//!
//! Sends one request to a running host over the byte-stream transport and
//! prints the reply as JSON. Exits non-zero unless the host reports success.

use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use scale_net::connection::{DEFAULT_PIPE_ADDR, PIPE_ADDR_ENV};
use scale_net::names;
use scale_net::{PipeConnection, ScaleEntry, validate_command_name};

#[derive(Parser)]
#[command(name = "scale_ctl", about = "Talk to a running scale host")]
struct Args {
    /// Byte-stream address of the host
    #[arg(short, long, env = PIPE_ADDR_ENV, default_value = DEFAULT_PIPE_ADDR)]
    addr: String,

    /// Print the reply on one line
    #[arg(long)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the game code and shared table addresses
    Settings,
    /// List the character ids currently on screen
    Active,
    /// List the stored scale factors
    Scales,
    /// Store scale factors
    Set {
        /// Entry as `id=scale`; repeatable
        #[arg(short, long = "entry", value_parser = parse_entry, required = true)]
        entries: Vec<ScaleEntry>,
        /// Replace the whole table instead of merging
        #[arg(long)]
        overwrite: bool,
    },
    /// Save the current scales, or delete the saved file
    Persist {
        /// Delete the saved file instead of writing it
        #[arg(long)]
        clear: bool,
    },
    /// Send any command with an optional JSON `data` object
    Raw {
        command: String,
        data: Option<String>,
    },
}

impl Command {
    fn into_request(self) -> Result<(String, Option<Value>)> {
        Ok(match self {
            Self::Settings => (names::GET_GAME_SETTINGS.to_string(), None),
            Self::Active => (names::GET_ACTIVE_CHARACTER_IDS.to_string(), None),
            Self::Scales => (names::GET_CURRENT_SCALES.to_string(), None),
            Self::Set { entries, overwrite } => (
                names::SET_SCALES.to_string(),
                Some(json!({ "scales": entries, "overwrite": overwrite })),
            ),
            Self::Persist { clear } => (
                names::UPDATE_PERSISTENCE.to_string(),
                Some(json!({ "clear": clear })),
            ),
            Self::Raw { command, data } => {
                validate_command_name(&command)?;
                let data = data
                    .map(|raw| serde_json::from_str::<Value>(&raw))
                    .transpose()
                    .context("data is not valid JSON")?;
                (command, data)
            }
        })
    }
}

fn parse_entry(raw: &str) -> Result<ScaleEntry> {
    let (id, scale) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected `id=scale`, got `{raw}`"))?;
    let id = id.trim().parse().with_context(|| format!("bad id `{id}`"))?;
    let scale = scale.trim().parse().with_context(|| format!("bad scale `{scale}`"))?;
    Ok(ScaleEntry { id, scale })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (command, data) = args.command.into_request()?;

    let connection = PipeConnection::new(args.addr);
    debug!(addr = connection.addr(), %command, "sending request");
    let reply = connection
        .request(&command, data)
        .await
        .with_context(|| format!("request to {} failed", connection.addr()))?;

    let rendered = if args.compact {
        serde_json::to_string(&reply)?
    } else {
        serde_json::to_string_pretty(&reply)?
    };
    println!("{rendered}");

    Ok(if reply.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
