mod cli;
mod commands;
mod config;
mod executor;
mod paths;
mod runner;
mod state;
mod store;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: cli.config,
    };
    log::trace!("Verbosity {}", ctx.verbose);

    match cli.command {
        Command::Apply(args) => commands::apply::apply(&ctx, &args),
        Command::Undo(args) => commands::apply::undo(&ctx, &args),
        Command::Redo(args) => commands::apply::redo(&ctx, &args),
        Command::List(args) => commands::list::run(&ctx, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "patchwork", &mut io::stdout());
            Ok(())
        }
    }
}
