pub mod cli;
mod config_commands;
pub mod db;
pub mod feed;
pub mod geo;
pub mod location;
pub mod notify;
pub mod reports;
pub mod settings;
pub mod utils;

use std::{fs, path::Path};

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Command};
use db::Database;
use reports::ImageStore;
use settings::SettingsStore;

pub struct AppState {
    pub db: Database,
    pub settings: SettingsStore,
    pub images: ImageStore,
}

impl AppState {
    /// Opens (creating if needed) the database, settings and photo folder under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join("beachwatch.sqlite3"))?;
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let images = ImageStore::new(data_dir.join("images"));

        Ok(Self {
            db,
            settings,
            images,
        })
    }
}

pub async fn run() -> Result<()> {
    // Reads RUST_LOG, defaulting to info.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let cli = Cli::parse();
    log::debug!("using data directory {}", cli.data_dir.display());

    let state = AppState::open(&cli.data_dir)?;

    match cli.command {
        Command::Submit(args) => reports::commands::submit(&state, args).await,
        Command::List(args) => reports::commands::list(&state, args).await,
        Command::Status(args) => reports::commands::set_status(&state, args).await,
        Command::Edit(args) => reports::commands::edit(&state, args).await,
        Command::Watch(args) => feed::commands::watch(&state, args).await,
        Command::Config { action } => config_commands::run_config(&state, action),
    }
}
