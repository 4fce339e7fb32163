mod cli;
mod commands;
mod logging;

use clap::Parser;
use std::process::ExitCode;

use crate::cli::{Cli, Command};
use crate::commands::Context;

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::init_logging(cli.log_level);

    let root = match cli.root {
        Some(root) => root,
        None => commands::default_root()?,
    };
    let ctx = Context::load(&root).await?;

    match cli.command {
        Command::Run {
            file,
            script_type,
            format,
            args,
        } => commands::run(&ctx, &file, script_type, format, &args).await,
        Command::Stop { process_id } => commands::stop(&ctx, process_id).await,
        Command::List { json } => commands::list(&ctx, json).await,
        Command::Show { process_id } => commands::show(&ctx, process_id).await,
    }
}
