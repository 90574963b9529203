mod cli;
mod client;
mod commands;
mod config;
mod dispatcher;
mod error;
mod logging;
mod output;
mod retry;
mod sink;
mod source;
mod types;

use std::io;

use clap::{CommandFactory, Parser};
use clap_complete::generate;

use cli::{Cli, Commands};
use config::Config;
use error::Result;
use std::error::Error;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");

        // Show error chain if verbose flag was passed
        if std::env::args().any(|arg| arg == "--verbose" || arg == "-v") {
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("Caused by: {cause}");
                source = std::error::Error::source(cause);
            }
        }

        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    output::set_json_output(cli.json);

    match cli.command {
        // Commands that don't require config
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "user-dispatcher", &mut io::stdout());
        }
        Commands::Init => {
            commands::init::run().await?;
        }
        Commands::Run(args) => {
            logging::init(cli.log_format, cli.verbose)?;
            let config = Config::load()?;
            commands::run::run(&config, &args).await?;
        }
    }

    Ok(())
}
