//! SQLite report store.
//!
//! A single connection lives on its own thread. Async callers hand it closures
//! and await the outcome on a oneshot channel, so no caller ever blocks the
//! runtime on disk I/O.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

pub mod changes;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use changes::{ChangePayload, StreamItem, Subscription};
pub use models::{NewReport, Report, ReportPatch, ReportStatus, StatusCounts};

use changes::{prune_change_log, CHANGE_LOG_RETENTION_DAYS};
use migrations::run_migrations;

const WORKER_THREAD_NAME: &str = "beachwatch-db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum WorkerMessage {
    Run(Job),
    Stop,
}

/// The connection thread. Dropping it stops the thread after queued jobs ran.
struct Worker {
    jobs: mpsc::Sender<WorkerMessage>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(db_path: PathBuf) -> Result<Self> {
        let (jobs_tx, jobs_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || match open_connection(&db_path) {
                Ok(mut conn) => {
                    if ready_tx.send(Ok(())).is_ok() {
                        serve(&mut conn, jobs_rx);
                    }
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .context("failed to spawn the database thread")?;

        ready_rx
            .recv()
            .context("database thread exited during startup")??;

        Ok(Self {
            jobs: jobs_tx,
            thread: Some(thread),
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if self.jobs.send(WorkerMessage::Stop).is_err() {
            error!("Database thread was already gone at shutdown");
        }
        if thread.join().is_err() {
            error!("Database thread panicked");
        }
    }
}

fn open_connection(db_path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(db_path)
        .with_context(|| format!("failed to open report database {}", db_path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("Write-ahead logging unavailable: {err}");
    }
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set the busy timeout")?;

    run_migrations(&mut conn).context("failed to migrate the report database")?;

    let cutoff = Utc::now() - chrono::Duration::days(CHANGE_LOG_RETENTION_DAYS);
    match prune_change_log(&conn, cutoff) {
        Ok(0) => {}
        Ok(pruned) => info!("Pruned {pruned} change log entries older than {CHANGE_LOG_RETENTION_DAYS} days"),
        Err(err) => warn!("Change log pruning failed: {err:#}"),
    }

    Ok(conn)
}

fn serve(conn: &mut Connection, jobs: mpsc::Receiver<WorkerMessage>) {
    for message in jobs {
        match message {
            WorkerMessage::Run(job) => job(conn),
            WorkerMessage::Stop => break,
        }
    }
    info!("Database thread stopped");
}

/// Handle to the report store. Clones share one connection thread, which stops
/// when the last clone is dropped.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let worker = Worker::spawn(db_path.clone())?;
        info!("Report database ready at {}", db_path.display());

        Ok(Self {
            worker: Arc::new(worker),
            path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Runs `job` on the connection thread and returns its result.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let message = WorkerMessage::Run(Box::new(move |conn| {
            if reply_tx.send(job(conn)).is_err() {
                warn!("Database caller went away before its reply");
            }
        }));

        self.worker
            .jobs
            .send(message)
            .map_err(|_| anyhow!("database thread is not running"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread dropped the job"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reopening_keeps_data_and_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("reports.sqlite3");

        let db = Database::new(path.clone()).unwrap();
        assert_eq!(db.path(), path.as_path());
        db.execute(|conn| {
            conn.execute(
                "INSERT INTO reports (id, latitude, longitude, location_name, description, created_at)
                 VALUES ('r1', 40.0, 29.0, 'Moda', 'cans', '2024-06-01T09:30:00.000000Z')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();
        drop(db);

        let reopened = Database::new(path).unwrap();
        assert_eq!(reopened.list_reports().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn job_errors_reach_the_caller() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("reports.sqlite3")).unwrap();

        let result: Result<()> = db
            .execute(|conn| {
                conn.execute("INSERT INTO no_such_table VALUES (1)", [])?;
                Ok(())
            })
            .await;
        assert!(result.is_err());
        assert!(db.list_reports().await.is_ok());
    }
}
