//! Alerts for new reports that land inside the staff member's radius.

use anyhow::Result;
use log::info;
use serde::Serialize;

use crate::db::Report;

pub const NEW_REPORT_TITLE: &str = "New report nearby";

const BODY_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new_report(report: &Report) -> Self {
        let preview: String = report.description.chars().take(BODY_PREVIEW_CHARS).collect();
        Self {
            title: NEW_REPORT_TITLE.to_string(),
            body: format!("{} - {}...", report.location_name, preview),
        }
    }
}

/// Destination for notifications. Delivery is fire-and-forget: callers log and
/// ignore any error.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<()> {
        info!("[{}] {}", notification.title, notification.body);
        Ok(())
    }
}

/// Drops everything. Used when notifications are switched off in settings.
pub struct SilentNotifier;

impl NotificationSink for SilentNotifier {
    fn notify(&self, _notification: &Notification) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ReportStatus;
    use chrono::Utc;

    #[test]
    fn body_previews_first_fifty_characters() {
        let report = Report {
            id: "r1".into(),
            reporter_id: None,
            latitude: 40.88,
            longitude: 29.2,
            location_name: "Kalamis".into(),
            description: "ş".repeat(80),
            image_url: None,
            status: ReportStatus::Pending,
            created_at: Utc::now(),
        };

        let notification = Notification::new_report(&report);
        assert_eq!(notification.title, NEW_REPORT_TITLE);
        assert_eq!(notification.body, format!("Kalamis - {}...", "ş".repeat(50)));
    }
}
