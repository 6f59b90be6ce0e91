use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use std::path::PathBuf;
use std::process::ExitCode;

use mailsy::commands;
use mailsy::config::ConfigStore;

#[derive(Parser)]
#[command(name = "mailsy", version)]
#[command(about = "Personal command-line email client", long_about = None)]
struct Cli {
    /// Read and write this config file instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Configure the account (prompts for name, email, password)
    Setup,

    /// List a page of recent inbox messages
    List {
        /// Page number, 1 = newest
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        page: u32,
    },

    /// Compose and send an email
    Send,
}

fn run(cli: Cli) -> Result<()> {
    let store = match cli.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::default_location()?,
    };

    match cli.cmd {
        Command::Setup => {
            commands::setup(&store)?;
        }

        Command::List { page } => {
            let cfg = store.load()?;
            commands::list(&cfg, page).with_context(|| format!("listing page {page}"))?;
        }

        Command::Send => {
            let cfg = store.load()?;
            commands::send(&cfg, store.dir())?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\n\t{}", format!("{e:#}").red().bold());
            ExitCode::FAILURE
        }
    }
}
