//! `config` subcommand: feed settings stored in `settings.json`.

use anyhow::Result;

use crate::{
    cli::{ConfigAction, ConfigSetArgs},
    settings::FeedSettings,
    AppState,
};

pub fn run_config(state: &AppState, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => show(state),
        ConfigAction::Set(args) => set(state, args),
    }
}

fn show(state: &AppState) -> Result<()> {
    println!("# {}", state.settings.path().display());
    println!("{}", serde_json::to_string_pretty(&state.settings.feed())?);
    Ok(())
}

fn set(state: &AppState, args: ConfigSetArgs) -> Result<()> {
    let updated = apply_overrides(state.settings.feed(), &args);
    state.settings.update_feed(updated.clone())?;
    println!("{}", serde_json::to_string_pretty(&updated)?);
    Ok(())
}

fn apply_overrides(mut settings: FeedSettings, args: &ConfigSetArgs) -> FeedSettings {
    if let Some(radius_km) = args.radius_km {
        settings.radius_km = radius_km;
    }
    if let Some(enabled) = args.notifications {
        settings.notifications_enabled = enabled;
    }
    if let Some(poll_interval_ms) = args.poll_interval_ms {
        settings.poll_interval_ms = poll_interval_ms;
    }
    settings
}
