pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use chatcart_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "chatcart",
    about = "Chatcart operator CLI",
    long_about = "Inspect configuration, validate shop catalogs, migrate the order ledger, and chat with the bot locally.",
    after_help = "Examples:\n  chatcart config\n  chatcart catalog --file demos/catalog.toml\n  chatcart chat --catalog demos/catalog.toml --customer U-local"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Apply pending order ledger migrations")]
    Migrate,
    #[command(about = "Validate a catalog file and summarize products, aliases, promotions and FAQ rules")]
    Catalog {
        #[arg(long, help = "Catalog file (.toml or .json); defaults to catalog.path from config")]
        file: Option<PathBuf>,
    },
    #[command(about = "Chat with the bot in the terminal using in-memory collaborators")]
    Chat {
        #[arg(long, help = "Catalog file; defaults to catalog.path from config")]
        catalog: Option<PathBuf>,
        #[arg(long, default_value = "U-local", help = "Customer id the session is keyed by")]
        customer: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::CommandResult { exit_code: 0, output: commands::config::run() },
        Command::Migrate => commands::migrate::run(),
        Command::Catalog { file } => match catalog_path(file, "catalog") {
            Ok(path) => commands::catalog::run(&path),
            Err(failure) => failure,
        },
        Command::Chat { catalog, customer } => match catalog_path(catalog, "chat") {
            Ok(path) => commands::chat::run(&path, &customer),
            Err(failure) => failure,
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn catalog_path(
    explicit: Option<PathBuf>,
    command: &str,
) -> Result<PathBuf, commands::CommandResult> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    AppConfig::load(LoadOptions::default()).map(|config| config.catalog.path).map_err(|error| {
        commands::CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}
