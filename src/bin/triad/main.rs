//! Triad CLI - build, live-reload and packaging orchestrator

use std::io::IsTerminal;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use triad::ops::control::TerminalWriter;
use triad::util::diagnostic;
use triad::{Mode, TriadError};

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("triad=debug")
    } else {
        EnvFilter::new("triad=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(TerminalWriter::stderr)
        .init();

    let debug = cli.debug;
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            let color = std::io::stderr().is_terminal();
            diagnostic::emit(&err.to_diagnostic(debug), color);
            1
        }
    };

    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32, TriadError> {
    let Cli {
        config: config_path,
        command,
        ..
    } = cli;

    if let Commands::Completions(args) = command {
        commands::completions::execute(args);
        return Ok(0);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start async runtime: {}", err);
            return Ok(1);
        }
    };

    let config = config_path.as_deref();

    runtime.block_on(async move {
        match command {
            Commands::Dev => commands::run::execute(config, Mode::Development).await,
            Commands::Preview => commands::run::execute(config, Mode::Preview).await,
            Commands::Start => commands::run::execute(config, Mode::Production).await,
            Commands::Build(args) => commands::build::execute(config, args).await,
            Commands::Pack => commands::pack::execute(config).await,
            Commands::Inspect(args) => commands::inspect::execute(config, args),
            Commands::Completions(_) => Ok(0),
        }
    })
}
