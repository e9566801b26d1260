//! Catch-all request handler driven by a reasoning agent.
//!
//! Answers one request (`METHOD PATH`) by letting the agent write and run
//! fragments until one of them responds, then prints the response body.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use hallucinate::core::types::{Request, ResponseBody};
use hallucinate::exit_codes;
use hallucinate::io::agent::{Agent, CompletionClient};
use hallucinate::io::config::load_config;
use hallucinate::io::console::{TerminalConsole, echo_observer};
use hallucinate::io::prerecording::load_prerecording;
use hallucinate::logging;
use hallucinate::looping::{Collaborators, LoopConfig, LoopError, run_request, run_shell};

#[derive(Parser, Debug)]
#[command(
    name = "hallucinate",
    version,
    about = "Answer a request by letting an agent write the handler"
)]
struct Cli {
    /// Answer the request by hand in an interactive session instead of asking the agent.
    #[arg(long)]
    shell: bool,

    /// Wait for the operator to accept each live agent turn before running it.
    #[arg(long)]
    confirm: bool,

    /// Use a prerecorded conversation from a file.
    #[arg(long, value_name = "FILE")]
    prerecording: Option<PathBuf>,

    /// Open an interactive session once the prerecording is exhausted.
    #[arg(long)]
    debug_prerecording: bool,

    /// Handler configuration.
    #[arg(long, value_name = "FILE", default_value = "hallucinate.toml")]
    config: PathBuf,

    /// Agent turns allowed per request (0 = unbounded). Overrides the config.
    #[arg(long, value_name = "N")]
    max_turns: Option<u32>,

    /// Request method, e.g. GET or POST.
    method: String,

    /// Request path, optionally with a query string.
    path: String,
}

fn main() {
    logging::init();
    match run() {
        Ok(body) => {
            eprintln!("{} {}", body.status, body.content_type);
            println!("{}", body.body);
            std::process::exit(exit_codes::OK);
        }
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_code(&err));
        }
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<LoopError>() {
        Some(LoopError::TurnBudgetExhausted(_) | LoopError::ReplayExhausted) => {
            exit_codes::EXHAUSTED
        }
        _ => exit_codes::INVALID,
    }
}

fn run() -> Result<ResponseBody> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let registry = Rc::new(config.registry().context("seed model store")?);
    let request = Request::new(cli.method, cli.path);
    let mut console = TerminalConsole::new();

    if cli.shell {
        return run_shell(&request, registry, &mut console);
    }

    let prerecording = load_prerecording(&request, &config.prompts, cli.prerecording.as_deref())?;
    let loop_config = LoopConfig {
        max_turns: cli.max_turns.unwrap_or(config.turns.max_turns),
        confirm: cli.confirm,
        debug_prerecording: cli.debug_prerecording,
    };

    let mut client = match CompletionClient::from_env(config.agent.clone()) {
        Ok(client) => Some(client),
        Err(err) => {
            warn!(error = %err, "live agent unavailable; replaying prerecording only");
            None
        }
    };

    run_request(
        &request,
        registry,
        prerecording,
        &loop_config,
        Collaborators {
            agent: client.as_mut().map(|client| client as &mut dyn Agent),
            console: &mut console,
            observer: Some(echo_observer()),
        },
    )
}
