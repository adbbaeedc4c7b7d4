use anyhow::{anyhow, bail, Context, Result};
use chrono::{SubsecRound, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::{
    changes::{record_change, ChangePayload},
    helpers::{format_datetime, parse_datetime, parse_status},
    models::{NewReport, Report, ReportPatch, ReportStatus},
    Database,
};

const REPORT_COLUMNS: &str =
    "id, reporter_id, latitude, longitude, location_name, description, image_url, status, created_at";

fn row_to_report(row: &Row) -> Result<Report> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;

    Ok(Report {
        id: row.get("id")?,
        reporter_id: row.get("reporter_id")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        location_name: row.get("location_name")?,
        description: row.get("description")?,
        image_url: row.get("image_url")?,
        status: parse_status(&status)?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn load_report(conn: &Connection, report_id: &str) -> Result<Option<Report>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![report_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_report(row)?)),
        None => Ok(None),
    }
}

impl Database {
    /// Stores a new pending report and announces it on the change stream.
    pub async fn insert_report(&self, input: &NewReport) -> Result<Report> {
        let coordinate = input
            .coordinate
            .validate()
            .context("report coordinate rejected")?;
        let report = Report {
            id: Uuid::new_v4().to_string(),
            reporter_id: input.reporter_id.clone(),
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            location_name: input.location_name.clone(),
            description: input.description.clone(),
            image_url: input.image_url.clone(),
            status: ReportStatus::Pending,
            // Stored timestamps carry microseconds.
            created_at: Utc::now().trunc_subsecs(6),
        };

        let record = report.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO reports (id, reporter_id, latitude, longitude, location_name, description, image_url, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.reporter_id,
                    record.latitude,
                    record.longitude,
                    record.location_name,
                    record.description,
                    record.image_url,
                    record.status.as_str(),
                    format_datetime(&record.created_at),
                ],
            )
            .with_context(|| "failed to insert report")?;
            record_change(&tx, &record.id, &ChangePayload::insert(&record)?)?;
            tx.commit().context("failed to commit report insert")?;
            Ok(())
        })
        .await?;

        Ok(report)
    }

    /// All reports, most recent first.
    pub async fn list_reports(&self) -> Result<Vec<Report>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REPORT_COLUMNS} FROM reports ORDER BY created_at DESC, rowid DESC"
            ))?;

            let mut rows = stmt.query([])?;
            let mut reports = Vec::new();
            while let Some(row) = rows.next()? {
                reports.push(row_to_report(row)?);
            }

            Ok(reports)
        })
        .await
    }

    pub async fn get_report(&self, report_id: &str) -> Result<Option<Report>> {
        let report_id = report_id.to_string();
        self.execute(move |conn| load_report(conn, &report_id)).await
    }

    /// Advances a report one step along pending -> in_progress -> completed.
    pub async fn update_report_status(
        &self,
        report_id: &str,
        status: ReportStatus,
    ) -> Result<Report> {
        self.update_report(report_id, ReportPatch::status(status))
            .await
    }

    /// Applies a partial edit. Status changes must be a single forward step and
    /// coordinates must stay valid.
    pub async fn update_report(&self, report_id: &str, patch: ReportPatch) -> Result<Report> {
        if patch.is_empty() {
            bail!("No fields to update");
        }

        let report_id = report_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let mut report = load_report(&tx, &report_id)?
                .ok_or_else(|| anyhow!("report {report_id} not found"))?;

            if let Some(status) = patch.status {
                if !report.status.can_advance_to(status) {
                    bail!(
                        "cannot move report {} from {} to {}",
                        report_id,
                        report.status.as_str(),
                        status.as_str()
                    );
                }
            }
            if patch.moves() {
                patch
                    .resulting_coordinate(&report)
                    .validate()
                    .context("report coordinate rejected")?;
            }

            patch.apply_to(&mut report);

            let rows_affected = tx.execute(
                "UPDATE reports
                 SET latitude = ?1,
                     longitude = ?2,
                     location_name = ?3,
                     description = ?4,
                     image_url = ?5,
                     status = ?6
                 WHERE id = ?7",
                params![
                    report.latitude,
                    report.longitude,
                    report.location_name,
                    report.description,
                    report.image_url,
                    report.status.as_str(),
                    report.id,
                ],
            )?;
            if rows_affected == 0 {
                return Err(anyhow!("report {report_id} not found"));
            }

            record_change(&tx, &report.id, &ChangePayload::update(&report.id, &patch)?)?;
            tx.commit().context("failed to commit report update")?;

            Ok(report)
        })
        .await
    }

    #[cfg(test)]
    pub(crate) async fn count_reports(&self) -> Result<i64> {
        self.execute(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?;
            Ok(count)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use tempfile::tempdir;

    fn new_report(name: &str, latitude: f64) -> NewReport {
        NewReport {
            reporter_id: Some("citizen-7".into()),
            coordinate: Coordinate::new(latitude, 29.20),
            location_name: name.into(),
            description: "oil residue along the shoreline".into(),
            image_url: Some("images/citizen-7/1.png".into()),
        }
    }

    #[tokio::test]
    async fn insert_then_list_most_recent_first() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("reports.sqlite3")).unwrap();

        let first = db.insert_report(&new_report("Moda", 40.98)).await.unwrap();
        let second = db.insert_report(&new_report("Suadiye", 40.95)).await.unwrap();

        let reports = db.list_reports().await.unwrap();
        let ids: Vec<_> = reports.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
        assert_eq!(reports[1], first);
        assert_eq!(first.status, ReportStatus::Pending);
        assert_eq!(db.count_reports().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn status_advances_one_step_at_a_time() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("reports.sqlite3")).unwrap();
        let report = db.insert_report(&new_report("Moda", 40.98)).await.unwrap();

        assert!(db
            .update_report_status(&report.id, ReportStatus::Completed)
            .await
            .is_err());

        let updated = db
            .update_report_status(&report.id, ReportStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(updated.status, ReportStatus::InProgress);

        let done = db
            .update_report_status(&report.id, ReportStatus::Completed)
            .await
            .unwrap();
        assert_eq!(done.status, ReportStatus::Completed);

        assert!(db
            .update_report_status(&report.id, ReportStatus::Pending)
            .await
            .is_err());

        let stored = db.get_report(&report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Completed);
    }

    #[tokio::test]
    async fn edit_rejects_invalid_coordinates_and_unknown_ids() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("reports.sqlite3")).unwrap();
        let report = db.insert_report(&new_report("Moda", 40.98)).await.unwrap();

        let bad = ReportPatch {
            latitude: Some(123.0),
            ..ReportPatch::default()
        };
        assert!(db.update_report(&report.id, bad).await.is_err());

        let missing = db
            .update_report("no-such-report", ReportPatch::status(ReportStatus::InProgress))
            .await;
        assert!(missing.is_err());

        assert!(db.update_report(&report.id, ReportPatch::default()).await.is_err());

        let moved = db
            .update_report(
                &report.id,
                ReportPatch {
                    latitude: Some(41.0),
                    location_name: Some("Fenerbahce".into()),
                    ..ReportPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.latitude, 41.0);
        assert_eq!(moved.longitude, 29.20);
        assert_eq!(moved.location_name, "Fenerbahce");
    }

    #[tokio::test]
    async fn insert_rejects_non_finite_coordinates() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("reports.sqlite3")).unwrap();

        let mut input = new_report("Nowhere", 40.0);
        input.coordinate = Coordinate::new(f64::NAN, 29.0);
        assert!(db.insert_report(&input).await.is_err());
        assert_eq!(db.count_reports().await.unwrap(), 0);
    }
}
