//! Report data models.
//!
//! Field names follow the backend row shape (`location_name`, `image_url`, ...)
//! because the same structs are decoded from change-feed payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    InProgress,
    Completed,
}

impl Default for ReportStatus {
    fn default() -> Self {
        ReportStatus::Pending
    }
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::InProgress => "in_progress",
            ReportStatus::Completed => "completed",
        }
    }

    /// Human-readable label for listings.
    pub fn label(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "Pending",
            ReportStatus::InProgress => "In progress",
            ReportStatus::Completed => "Completed",
        }
    }

    /// The only status a report may move to from this one.
    pub fn next(&self) -> Option<ReportStatus> {
        match self {
            ReportStatus::Pending => Some(ReportStatus::InProgress),
            ReportStatus::InProgress => Some(ReportStatus::Completed),
            ReportStatus::Completed => None,
        }
    }

    pub fn can_advance_to(&self, target: ReportStatus) -> bool {
        self.next() == Some(target)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub id: String,
    #[serde(default)]
    pub reporter_id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub location_name: String,
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Input for a new report; id, status and creation time are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReport {
    pub reporter_id: Option<String>,
    pub coordinate: Coordinate,
    pub location_name: String,
    pub description: String,
    pub image_url: Option<String>,
}

/// Changed fields carried by an update event. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReportStatus>,
}

impl ReportPatch {
    pub fn status(status: ReportStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn moves(&self) -> bool {
        self.latitude.is_some() || self.longitude.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Coordinate the report would have after this patch.
    pub fn resulting_coordinate(&self, report: &Report) -> Coordinate {
        Coordinate::new(
            self.latitude.unwrap_or(report.latitude),
            self.longitude.unwrap_or(report.longitude),
        )
    }

    pub fn apply_to(&self, report: &mut Report) {
        if let Some(latitude) = self.latitude {
            report.latitude = latitude;
        }
        if let Some(longitude) = self.longitude {
            report.longitude = longitude;
        }
        if let Some(location_name) = &self.location_name {
            report.location_name = location_name.clone();
        }
        if let Some(description) = &self.description {
            report.description = description.clone();
        }
        if let Some(image_url) = &self.image_url {
            report.image_url = Some(image_url.clone());
        }
        if let Some(status) = self.status {
            report.status = status;
        }
    }
}

/// Per-status totals shown above the staff report list.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl StatusCounts {
    pub fn tally<'a>(statuses: impl IntoIterator<Item = &'a ReportStatus>) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            match status {
                ReportStatus::Pending => counts.pending += 1,
                ReportStatus::InProgress => counts.in_progress += 1,
                ReportStatus::Completed => counts.completed += 1,
            }
        }
        counts
    }
}
