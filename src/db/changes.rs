//! Realtime change stream over the `report_changes` log.
//!
//! Every report mutation appends a JSON payload to the log inside the same
//! transaction. A [`Subscription`] tails the log from the position it was created
//! at and hands raw payload text to the consumer in commit order.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::db::{
    helpers::format_datetime,
    models::{Report, ReportPatch},
    Database,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const INSERT_EVENT: &str = "INSERT";
pub const UPDATE_EVENT: &str = "UPDATE";

/// Change log entries older than this are dropped when the database opens.
pub(crate) const CHANGE_LOG_RETENTION_DAYS: i64 = 7;

const POLL_BATCH_SIZE: i64 = 200;
const SUBSCRIPTION_BUFFER: usize = 256;

/// One entry of the change log as it travels over the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangePayload {
    pub event_type: String,
    pub new: Value,
}

impl ChangePayload {
    pub fn insert(report: &Report) -> Result<Self> {
        Ok(Self {
            event_type: INSERT_EVENT.to_string(),
            new: serde_json::to_value(report).context("failed to encode inserted report")?,
        })
    }

    pub fn update(report_id: &str, patch: &ReportPatch) -> Result<Self> {
        let mut new = serde_json::to_value(patch).context("failed to encode report patch")?;
        if let Value::Object(fields) = &mut new {
            fields.insert("id".to_string(), Value::String(report_id.to_string()));
        }
        Ok(Self {
            event_type: UPDATE_EVENT.to_string(),
            new,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// Raw payload text; decoding (and rejecting) it is up to the consumer.
    Change(String),
    /// The transport failed. No further items follow.
    Disconnected(String),
}

/// Appends a payload to the change log. Call from inside the mutating transaction.
pub(crate) fn record_change(conn: &Connection, report_id: &str, payload: &ChangePayload) -> Result<()> {
    let text = serde_json::to_string(payload).context("failed to serialize change payload")?;
    conn.execute(
        "INSERT INTO report_changes (report_id, payload, recorded_at)
         VALUES (?1, ?2, ?3)",
        params![report_id, text, format_datetime(&Utc::now())],
    )
    .context("failed to append change log entry")?;
    Ok(())
}

/// Deletes entries recorded before `cutoff`. The newest entry always survives so
/// `latest_change_seq` never moves backwards.
pub(crate) fn prune_change_log(conn: &Connection, cutoff: DateTime<Utc>) -> Result<usize> {
    let pruned = conn
        .execute(
            "DELETE FROM report_changes
             WHERE recorded_at < ?1
               AND seq < (SELECT MAX(seq) FROM report_changes)",
            params![format_datetime(&cutoff)],
        )
        .context("failed to prune the change log")?;
    Ok(pruned)
}

impl Database {
    pub async fn latest_change_seq(&self) -> Result<i64> {
        self.execute(|conn| {
            let seq = conn.query_row(
                "SELECT COALESCE(MAX(seq), 0) FROM report_changes",
                [],
                |row| row.get(0),
            )?;
            Ok(seq)
        })
        .await
    }

    /// Change log entries strictly after `after_seq`, oldest first.
    pub async fn changes_since(&self, after_seq: i64, limit: i64) -> Result<Vec<(i64, String)>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, payload FROM report_changes
                 WHERE seq > ?1
                 ORDER BY seq ASC
                 LIMIT ?2",
            )?;
            let mut rows = stmt.query(params![after_seq, limit])?;
            let mut changes = Vec::new();
            while let Some(row) = rows.next()? {
                changes.push((row.get(0)?, row.get(1)?));
            }
            Ok(changes)
        })
        .await
    }

    /// Starts tailing the change log from its current end.
    pub async fn subscribe_changes(&self, poll_interval: Duration) -> Result<Subscription> {
        let start_seq = self
            .latest_change_seq()
            .await
            .context("failed to read change log position")?;

        let (item_tx, item_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(poll_changes(
            self.clone(),
            start_seq,
            poll_interval,
            item_tx,
            cancel_token.clone(),
        ));

        log_debug!("change subscription started at seq {start_seq}");

        Ok(Subscription {
            receiver: Some(item_rx),
            cancel_token,
            handle: Some(handle),
        })
    }
}

async fn poll_changes(
    db: Database,
    mut last_seq: i64,
    poll_interval: Duration,
    item_tx: mpsc::Sender<StreamItem>,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                match db.changes_since(last_seq, POLL_BATCH_SIZE).await {
                    Ok(changes) => {
                        for (seq, payload) in changes {
                            last_seq = seq;
                            if item_tx.send(StreamItem::Change(payload)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        log_warn!("change stream poll failed after seq {last_seq}: {err:#}");
                        let _ = item_tx.send(StreamItem::Disconnected(format!("{err:#}"))).await;
                        break;
                    }
                }
            }
        }
    }

    log_debug!("change subscription stopped at seq {last_seq}");
}

/// A live handle on the change stream. Must be released with [`Subscription::unsubscribe`]
/// (dropping it does the same).
pub struct Subscription {
    receiver: Option<mpsc::Receiver<StreamItem>>,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Next stream item in commit order. `None` once unsubscribed or after the
    /// poller has stopped.
    pub async fn next(&mut self) -> Option<StreamItem> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => None,
        }
    }

    /// Stops the poller. Returns `false` if the subscription was already released.
    pub fn unsubscribe(&mut self) -> bool {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.receiver.take().is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::models::NewReport, geo::Coordinate};
    use tempfile::tempdir;

    const POLL: Duration = Duration::from_millis(10);

    fn new_report(name: &str) -> NewReport {
        NewReport {
            reporter_id: Some("citizen-1".into()),
            coordinate: Coordinate::new(40.88, 29.20),
            location_name: name.into(),
            description: "fishing nets on the rocks".into(),
            image_url: None,
        }
    }

    async fn next_item(subscription: &mut Subscription) -> StreamItem {
        time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .expect("stream item in time")
            .expect("subscription still open")
    }

    #[tokio::test]
    async fn delivers_only_changes_after_subscribing() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("reports.sqlite3")).unwrap();

        db.insert_report(&new_report("before")).await.unwrap();
        let mut subscription = db.subscribe_changes(POLL).await.unwrap();
        let inserted = db.insert_report(&new_report("after")).await.unwrap();

        let StreamItem::Change(raw) = next_item(&mut subscription).await else {
            panic!("expected a change");
        };
        let payload: ChangePayload = serde_json::from_str(&raw).unwrap();
        assert_eq!(payload.event_type, INSERT_EVENT);
        assert_eq!(payload.new["id"], Value::String(inserted.id.clone()));
        assert_eq!(payload.new["location_name"], "after");
    }

    #[tokio::test]
    async fn preserves_commit_order() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("reports.sqlite3")).unwrap();
        let mut subscription = db.subscribe_changes(POLL).await.unwrap();

        let report = db.insert_report(&new_report("order")).await.unwrap();
        db.update_report_status(&report.id, crate::db::ReportStatus::InProgress)
            .await
            .unwrap();

        let mut kinds = Vec::new();
        for _ in 0..2 {
            let StreamItem::Change(raw) = next_item(&mut subscription).await else {
                panic!("expected a change");
            };
            let payload: ChangePayload = serde_json::from_str(&raw).unwrap();
            kinds.push(payload.event_type);
        }
        assert_eq!(kinds, vec![INSERT_EVENT.to_string(), UPDATE_EVENT.to_string()]);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("reports.sqlite3")).unwrap();
        let mut subscription = db.subscribe_changes(POLL).await.unwrap();

        assert!(subscription.is_active());
        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
        assert!(!subscription.is_active());
        assert_eq!(subscription.next().await, None);
    }

    #[tokio::test]
    async fn pruning_drops_old_entries_and_keeps_the_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports.sqlite3");
        let db = Database::new(path.clone()).unwrap();

        let stale = db.insert_report(&new_report("stale")).await.unwrap();
        db.insert_report(&new_report("fresh")).await.unwrap();
        let before = db.latest_change_seq().await.unwrap();

        let stale_id = stale.id.clone();
        db.execute(move |conn| {
            conn.execute(
                "UPDATE report_changes SET recorded_at = '2000-01-01T00:00:00.000000Z'
                 WHERE report_id = ?1",
                params![stale_id],
            )?;
            Ok(())
        })
        .await
        .unwrap();
        drop(db);

        // Reopening prunes.
        let db = Database::new(path).unwrap();
        let remaining = db.changes_since(0, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].1.contains("fresh"));
        assert_eq!(db.latest_change_seq().await.unwrap(), before);
        assert_eq!(db.list_reports().await.unwrap().len(), 2);

        let next = db.insert_report(&new_report("next")).await.unwrap();
        let after = db.changes_since(before, 10).await.unwrap();
        assert_eq!(after.len(), 1);
        assert!(after[0].1.contains(&next.id));
    }

    #[tokio::test]
    async fn pruning_never_empties_the_log() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("reports.sqlite3")).unwrap();
        db.insert_report(&new_report("only")).await.unwrap();

        let pruned = db
            .execute(|conn| prune_change_log(conn, Utc::now() + chrono::Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(pruned, 0);
        assert_eq!(db.changes_since(0, 10).await.unwrap().len(), 1);
    }

    #[test]
    fn update_payload_carries_the_id() {
        let patch = ReportPatch::status(crate::db::ReportStatus::Completed);
        let payload = ChangePayload::update("abc", &patch).unwrap();

        assert_eq!(payload.event_type, UPDATE_EVENT);
        assert_eq!(payload.new["id"], "abc");
        assert_eq!(payload.new["status"], "completed");
        assert!(payload.new.get("latitude").is_none());
    }
}
