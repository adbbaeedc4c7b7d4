use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::db::ReportStatus;

#[derive(Debug, Parser)]
#[command(
    name = "beachwatch",
    version,
    about = "Report beach pollution and follow nearby reports live"
)]
pub struct Cli {
    /// Folder holding the report database, photos and settings.
    #[arg(
        long,
        global = true,
        env = "BEACHWATCH_DATA_DIR",
        default_value = "beachwatch-data"
    )]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a new pollution report with a photo.
    Submit(SubmitArgs),
    /// List every report, most recent first.
    List(ListArgs),
    /// Move a report to the next status.
    Status(StatusArgs),
    /// Correct the details of a report.
    Edit(EditArgs),
    /// Follow reports near a position as they come in.
    ///
    /// Reads positions from stdin while running: "lat,lon", "lat lon" or
    /// "unavailable". "reload" refetches, "quit" stops.
    Watch(WatchArgs),
    /// Show or change feed settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// Photo of the problem.
    #[arg(long)]
    pub photo: Option<PathBuf>,
    #[arg(long, allow_negative_numbers = true)]
    pub lat: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub lon: Option<f64>,
    /// Place name; defaults to the coordinates.
    #[arg(long)]
    pub location_name: Option<String>,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long, env = "BEACHWATCH_REPORTER")]
    pub reporter: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    InProgress,
    Completed,
}

impl From<StatusArg> for ReportStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::InProgress => ReportStatus::InProgress,
            StatusArg::Completed => ReportStatus::Completed,
        }
    }
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    pub id: String,
    #[arg(value_enum)]
    pub status: StatusArg,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub id: String,
    #[arg(long, allow_negative_numbers = true)]
    pub lat: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub lon: Option<f64>,
    #[arg(long)]
    pub location_name: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[arg(long, allow_negative_numbers = true)]
    pub lat: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub lon: Option<f64>,
    /// Override the radius from settings for this session.
    #[arg(long)]
    pub radius_km: Option<f64>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    Show,
    Set(ConfigSetArgs),
}

#[derive(Debug, Args)]
pub struct ConfigSetArgs {
    #[arg(long)]
    pub radius_km: Option<f64>,
    #[arg(long)]
    pub notifications: Option<bool>,
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
}
