use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use crate::{
    cli::{EditArgs, ListArgs, StatusArgs, SubmitArgs},
    db::{Report, ReportPatch, ReportStatus, StatusCounts},
    geo::Coordinate,
    reports::submission::{submit_report, ReportDraft},
    utils::time::format_time_ago,
    AppState,
};

pub async fn submit(state: &AppState, args: SubmitArgs) -> Result<()> {
    let coordinate = match (args.lat, args.lon) {
        (Some(latitude), Some(longitude)) => Some(Coordinate::new(latitude, longitude)),
        (None, None) => None,
        _ => bail!("--lat and --lon must be given together"),
    };

    let draft = ReportDraft {
        reporter_id: args.reporter,
        photo: args.photo,
        coordinate,
        location_name: args.location_name,
        description: args.description,
    };

    let report = submit_report(&state.db, &state.images, &draft).await?;
    println!("Report submitted: {}", report.id);
    println!("{}", report_line(&report, None, Utc::now()));
    Ok(())
}

pub async fn list(state: &AppState, args: ListArgs) -> Result<()> {
    let reports = state.db.list_reports().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    let counts = StatusCounts::tally(reports.iter().map(|report| &report.status));
    println!("{}", counts_line(reports.len(), &counts));
    let now = Utc::now();
    for report in &reports {
        println!("{}", report_line(report, None, now));
    }
    Ok(())
}

pub async fn set_status(state: &AppState, args: StatusArgs) -> Result<()> {
    let status = ReportStatus::from(args.status);
    let report = state.db.update_report_status(&args.id, status).await?;
    println!("{} is now {}", report.id, report.status.label());
    Ok(())
}

pub async fn edit(state: &AppState, args: EditArgs) -> Result<()> {
    let patch = ReportPatch {
        latitude: args.lat,
        longitude: args.lon,
        location_name: args.location_name,
        description: args.description,
        ..ReportPatch::default()
    };
    if patch.is_empty() {
        bail!("nothing to change; pass at least one of --lat, --lon, --location-name, --description");
    }

    let report = state.db.update_report(&args.id, patch).await?;
    println!("{}", report_line(&report, None, Utc::now()));
    Ok(())
}

/// One listing line: optional distance, status, place, age and id, then the description.
pub(crate) fn report_line(report: &Report, distance_km: Option<f64>, now: DateTime<Utc>) -> String {
    let distance = distance_km
        .map(|km| format!("{km:>6.2} km  "))
        .unwrap_or_default();
    format!(
        "{distance}[{}] {} ({})  {}  id={}\n    {}",
        report.status.label(),
        report.location_name,
        report.coordinate().short_label(),
        format_time_ago(report.created_at, now),
        report.id,
        report.description
    )
}

pub(crate) fn counts_line(total: usize, counts: &StatusCounts) -> String {
    format!(
        "{total} reports | pending {} | in progress {} | completed {}",
        counts.pending, counts.in_progress, counts.completed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn report_line_shows_status_place_and_age() {
        let now = Utc::now();
        let report = Report {
            id: "r-1".into(),
            reporter_id: None,
            latitude: 40.98,
            longitude: 29.03,
            location_name: "Moda".into(),
            description: "bottles under the pier".into(),
            image_url: None,
            status: ReportStatus::InProgress,
            created_at: now - Duration::minutes(90),
        };

        assert_eq!(
            report_line(&report, None, now),
            "[In progress] Moda (40.9800, 29.0300)  1 h ago  id=r-1\n    bottles under the pier"
        );
        assert!(report_line(&report, Some(1.234), now).starts_with("  1.23 km  [In progress]"));
    }

    #[test]
    fn counts_line_lists_every_status() {
        let counts = StatusCounts {
            pending: 2,
            in_progress: 1,
            completed: 0,
        };
        assert_eq!(
            counts_line(3, &counts),
            "3 reports | pending 2 | in progress 1 | completed 0"
        );
    }
}
