//! Async session that drives a [`LiveFeedStore`] from the report store.
//!
//! One task owns the store and handles the bulk fetch, change-stream items,
//! position updates and reload requests strictly one at a time. Consumers only
//! see owned [`FeedSnapshot`]s published on a watch channel.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    db::{Database, StreamItem, Subscription},
    feed::state::{FeedSnapshot, LiveFeedStore},
    geo::Coordinate,
    notify::NotificationSink,
    settings::FeedSettings,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
enum FeedCommand {
    /// `None` means the position source reported "unavailable".
    Origin(Option<Coordinate>),
    Reload,
}

pub struct FeedController {
    commands: mpsc::Sender<FeedCommand>,
    snapshots: watch::Receiver<FeedSnapshot>,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FeedController {
    /// Spawns the feed session. Must be called from within a tokio runtime.
    pub fn start(
        db: Database,
        settings: &FeedSettings,
        notifier: Arc<dyn NotificationSink>,
        origin: Option<Coordinate>,
    ) -> Self {
        let mut store = LiveFeedStore::new(settings.radius_km, notifier);
        if let Some(origin) = origin {
            store.current_origin_changed(origin);
        }

        let (snapshot_tx, snapshot_rx) = watch::channel(store.snapshot());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel_token = CancellationToken::new();

        let session = FeedSession {
            db,
            store,
            poll_interval: settings.poll_interval(),
            subscription: None,
            snapshot_tx,
        };
        let handle = tokio::spawn(session.run(command_rx, cancel_token.clone()));

        Self {
            commands: command_tx,
            snapshots: snapshot_rx,
            cancel_token,
            handle: Some(handle),
        }
    }

    /// Feeds a new observer position (or `None` for "unavailable") to the session.
    pub async fn update_origin(&self, origin: Option<Coordinate>) -> Result<()> {
        self.send(FeedCommand::Origin(origin)).await
    }

    /// Drops the subscription and bulk-fetches again. Also the retry path after a
    /// failed fetch or a lost change stream.
    pub async fn reload(&self) -> Result<()> {
        self.send(FeedCommand::Reload).await
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that wakes on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.snapshots.clone()
    }

    /// Stops the session and releases its change subscription. Safe to call twice.
    pub async fn close(&mut self) -> Result<()> {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.await.context("feed session task failed to join")?;
        }
        Ok(())
    }

    async fn send(&self, command: FeedCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow!("feed session is closed"))
    }
}

impl Drop for FeedController {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

struct FeedSession {
    db: Database,
    store: LiveFeedStore,
    poll_interval: std::time::Duration,
    subscription: Option<Subscription>,
    snapshot_tx: watch::Sender<FeedSnapshot>,
}

impl FeedSession {
    async fn run(mut self, mut commands: mpsc::Receiver<FeedCommand>, cancel_token: CancellationToken) {
        self.open().await;
        self.publish();

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                item = next_item(&mut self.subscription) => self.handle_stream_item(item),
            }
            self.publish();
        }

        self.release_subscription();
        self.store.close();
        self.publish();
        log_info!("feed session closed");
    }

    /// Subscribes first, then fetches, so nothing committed in between is missed.
    async fn open(&mut self) {
        self.release_subscription();

        match self.db.subscribe_changes(self.poll_interval).await {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.store.stream_connected();
            }
            Err(err) => self.store.stream_disconnected(&format!("{err:#}")),
        }

        if !self.store.begin_loading() {
            return;
        }
        self.publish();

        match self.db.list_reports().await {
            Ok(reports) => {
                let origin = self.store.origin();
                self.store.load(reports, origin);
            }
            Err(err) => self.store.fail_load(&err),
        }
    }

    async fn handle_command(&mut self, command: FeedCommand) {
        match command {
            FeedCommand::Origin(Some(origin)) => {
                self.store.current_origin_changed(origin);
            }
            FeedCommand::Origin(None) => {
                log_debug!("position unavailable; keeping the last known origin");
            }
            FeedCommand::Reload => {
                log_info!("reloading feed");
                self.open().await;
            }
        }
    }

    fn handle_stream_item(&mut self, item: Option<StreamItem>) {
        match item {
            Some(StreamItem::Change(raw)) => {
                self.store.apply_payload(&raw);
            }
            Some(StreamItem::Disconnected(reason)) => {
                self.release_subscription();
                self.store.stream_disconnected(&reason);
            }
            None => {
                log_warn!("change stream ended unexpectedly");
                self.release_subscription();
                self.store.stream_disconnected("change stream closed");
            }
        }
    }

    fn release_subscription(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.store.snapshot());
    }
}

/// Next item from the active subscription; never resolves when there is none.
async fn next_item(subscription: &mut Option<Subscription>) -> Option<StreamItem> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}
