use std::{path::Path, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod contacts;
mod eid;
mod lock;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use app::AppFactory;
use cli::commands::{self, AddCommand, DeleteCommand, EditCommand, SearchCommand, SearchCommandParams};
use lock::DataDirLock;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();

    let paths = AppFactory::get_paths()?;
    let config = AppFactory::load_config(&paths)?;

    // held until main returns, for the daemon that is its whole lifetime
    let _lock = DataDirLock::claim(Path::new(&paths.base_path))
        .with_context(|| format!("couldnt lock {}", paths.base_path))?;

    let app = Arc::new(AppFactory::create_local_app(&paths, &config)?);

    match args.command {
        cli::Command::Daemon {} => {
            web::start_daemon(app.clone(), &config.listen_addr)?;
        }

        cli::Command::Add { name, number } => {
            AddCommand::new(name, number)?.execute(app.as_ref())?;
        }

        cli::Command::Search {
            name,
            number,
            keyword,
            id,
            exact,
            count,
            repeating,
            action,
        } => {
            SearchCommand::new(SearchCommandParams {
                name,
                number,
                keyword,
                id,
                exact,
                count,
                repeating,
                action,
            })?
            .execute(app.as_ref())?;
        }

        cli::Command::Edit {
            number,
            name,
            new_number,
        } => {
            EditCommand::new(number, name, new_number)?.execute(app.as_ref())?;
        }

        cli::Command::Delete { number, yes } => {
            DeleteCommand { number, yes }.execute(app.as_ref())?;
        }

        cli::Command::List { repeating } => commands::list(app.as_ref(), repeating)?,

        cli::Command::Export { dest, repeating } => {
            commands::export(app.as_ref(), &dest, repeating)?
        }

        cli::Command::Semantic { action } => commands::semantic(app.as_ref(), action)?,
    }

    Ok(())
}
