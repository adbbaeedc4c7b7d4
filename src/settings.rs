use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
    time::Duration,
};

use crate::feed::proximity::NEARBY_RADIUS_KM;

const MIN_POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedSettings {
    pub radius_km: f64,
    pub notifications_enabled: bool,
    pub poll_interval_ms: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            radius_km: NEARBY_RADIUS_KM,
            notifications_enabled: true,
            poll_interval_ms: 500,
        }
    }
}

impl FeedSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.radius_km.is_finite() || self.radius_km < 0.0 {
            bail!("radius must be a non-negative number of kilometers, got {}", self.radius_km);
        }
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            bail!("poll interval must be at least {MIN_POLL_INTERVAL_MS} ms");
        }
        Ok(())
    }

    /// Replaces unusable values read from disk with defaults.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !self.radius_km.is_finite() || self.radius_km < 0.0 {
            warn!("Ignoring invalid radius {} in settings", self.radius_km);
            self.radius_km = defaults.radius_km;
        }
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            self.poll_interval_ms = MIN_POLL_INTERVAL_MS;
        }
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    feed: FeedSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            read_settings(&path)?
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn feed(&self) -> FeedSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .feed
            .clone()
    }

    pub fn update_feed(&self, settings: FeedSettings) -> Result<()> {
        settings.validate()?;
        {
            let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
            guard.feed = settings;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

fn read_settings(path: &Path) -> Result<UserSettings> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let mut data: UserSettings = serde_json::from_str(&contents).unwrap_or_else(|err| {
        warn!("Settings file {} is invalid ({err}); using defaults", path.display());
        UserSettings::default()
    });
    data.feed = data.feed.sanitized();
    Ok(data)
}
