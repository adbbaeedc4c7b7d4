//! Citizen report submission.

use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};

use crate::{
    db::{Database, NewReport, Report},
    geo::Coordinate,
    reports::images::{ImageStore, ANONYMOUS_REPORTER},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// What a citizen filled in. Everything is optional here so that missing pieces
/// are reported in the same order the form checks them.
#[derive(Debug, Clone, Default)]
pub struct ReportDraft {
    pub reporter_id: Option<String>,
    pub photo: Option<PathBuf>,
    pub coordinate: Option<Coordinate>,
    pub location_name: Option<String>,
    pub description: String,
}

/// A draft that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedDraft {
    pub reporter_id: String,
    pub photo: PathBuf,
    pub coordinate: Coordinate,
    pub location_name: String,
    pub description: String,
}

impl ReportDraft {
    /// Photo first, then location, then a non-blank description.
    pub fn check(&self) -> Result<CheckedDraft> {
        let Some(photo) = &self.photo else {
            bail!("Please attach a photo of the problem");
        };
        let Some(coordinate) = self.coordinate else {
            bail!("Please share your location");
        };
        let coordinate = coordinate.validate().context("location is not usable")?;
        let description = self.description.trim();
        if description.is_empty() {
            bail!("Please describe the problem");
        }

        let location_name = self
            .location_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| coordinate.short_label());
        let reporter_id = self
            .reporter_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(ANONYMOUS_REPORTER)
            .to_string();

        Ok(CheckedDraft {
            reporter_id,
            photo: photo.clone(),
            coordinate,
            location_name,
            description: description.to_string(),
        })
    }
}

/// Validates the draft, stores the photo and records a pending report.
pub async fn submit_report(db: &Database, images: &ImageStore, draft: &ReportDraft) -> Result<Report> {
    let checked = draft.check()?;

    let bytes = fs::read(&checked.photo)
        .with_context(|| format!("failed to read photo {}", checked.photo.display()))?;
    let image_ref = images.store(&checked.reporter_id, &bytes)?;

    let input = NewReport {
        reporter_id: Some(checked.reporter_id),
        coordinate: checked.coordinate,
        location_name: checked.location_name,
        description: checked.description,
        image_url: Some(image_ref.clone()),
    };

    match db.insert_report(&input).await {
        Ok(report) => {
            log_info!("report {} submitted at {}", report.id, report.location_name);
            Ok(report)
        }
        Err(err) => {
            if let Err(cleanup) = images.remove(&image_ref) {
                log_warn!("orphaned photo {image_ref} left behind: {cleanup:#}");
            }
            Err(err)
        }
    }
}
