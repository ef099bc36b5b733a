mod logging;

use std::{
    io::{stdin, stdout},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use scribe_core::meta;
use scribe_proxy::Gateway;
use tracing::{error, info};

use crate::{
    config::Config,
    dispatch::{Dispatcher, USAGE},
    generation::GenerationClient,
};

#[derive(Parser, Debug, Default)]
#[command(name = "scribe", version = meta::VERSION)]
#[command(about = "Edit and explain the current Neovim buffer with a language model")]
pub struct Cli {
    /// Editor RPC socket, defaults to $NVIM_LISTEN_ADDRESS
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Chat completion model
    #[arg(long)]
    pub model: Option<String>,

    /// Base URL of the chat completion API
    #[arg(long)]
    pub base_url: Option<String>,

    /// Proxy for API requests
    #[arg(long)]
    pub proxy: Option<String>,

    /// Seconds to wait for a completion
    #[arg(long)]
    pub timeout: Option<u64>,
}

pub fn launch() {
    let cli = Cli::parse();
    let guard = logging::logging();
    logging::panic_hook();

    if let Err(err) = run(cli) {
        error!("{err:#}");
        eprintln!("{err:#}");
        // exit skips destructors, flush the log writer first
        drop(guard);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli)?;
    info!("{} {} starting", meta::NAME, meta::VERSION);

    let assistant = GenerationClient::new(&config)?;
    let gateway = Gateway::connect(&config.socket).with_context(|| {
        format!("Failed to connect to Neovim at {}", config.socket.display())
    })?;
    let mut dispatcher = Dispatcher::new(gateway, assistant);

    println!("DeepSeek Neovim Agent started!");
    println!("{USAGE}");
    dispatcher.run(stdin().lock(), stdout().lock())
}
