//! The live feed store: the staff member's ordered view of nearby reports.
//!
//! The store keeps every report it has seen this session (the bulk load plus
//! anything inserted since) in fetch order, and derives the visible view from it:
//!
//! * with an observer position, the reports within the radius sorted by distance;
//! * without one (degraded mode), every report, most recent first.
//!
//! The visible view stays filtered and sorted after every single mutation.

use std::sync::Arc;

use serde::Serialize;

use crate::{
    db::{Report, ReportPatch, StatusCounts},
    feed::{
        events::FeedEvent,
        proximity::{
            filter_within_radius, insertion_index, sort_by_distance, AnnotatedReport,
            NEARBY_RADIUS_KM,
        },
    },
    geo::Coordinate,
    notify::{Notification, NotificationSink},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FeedPhase {
    Uninitialized,
    Loading,
    Ready,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "reports", rename_all = "camelCase")]
pub enum FeedView {
    /// Degraded mode: no observer position, every report in fetch order.
    Unfiltered(Vec<Report>),
    /// Reports within the radius, nearest first.
    Nearby(Vec<AnnotatedReport>),
}

impl FeedView {
    pub fn len(&self) -> usize {
        match self {
            FeedView::Unfiltered(reports) => reports.len(),
            FeedView::Nearby(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_nearby(&self) -> bool {
        matches!(self, FeedView::Nearby(_))
    }

    pub fn reports(&self) -> Vec<&Report> {
        match self {
            FeedView::Unfiltered(reports) => reports.iter().collect(),
            FeedView::Nearby(entries) => entries.iter().map(|entry| &entry.report).collect(),
        }
    }

    pub fn ids(&self) -> Vec<&str> {
        self.reports().into_iter().map(|report| report.id.as_str()).collect()
    }

    pub fn status_counts(&self) -> StatusCounts {
        StatusCounts::tally(self.reports().into_iter().map(|report| &report.status))
    }
}

/// Read-only copy of the store handed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub phase: FeedPhase,
    pub origin: Option<Coordinate>,
    pub radius_km: f64,
    pub view: FeedView,
    /// Last fetch or transport failure, cleared by the next successful load.
    pub last_error: Option<String>,
    pub stream_connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Degraded mode: placed at the front.
    Prepended,
    /// Within the radius, placed at `index` of the nearby view.
    Inserted { index: usize },
    /// Outside the radius: remembered but not shown.
    OutOfRadius,
    /// The id was already known; the stored copy was replaced.
    Replaced,
    /// Coordinate was not finite or out of range.
    Rejected,
    /// The store is not accepting events (not loaded yet, or closed).
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No report with that id in this session.
    Unknown,
    /// Fields merged; position in the view unchanged.
    Merged,
    /// Moved into the radius, now at `index`.
    Entered { index: usize },
    /// Moved out of the radius and removed from the view.
    Left,
    /// Moved within the radius, now at `index`.
    Moved { index: usize },
    Rejected,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Insert(InsertOutcome),
    Update(UpdateOutcome),
    /// The payload could not be decoded and was dropped.
    Dropped,
}

pub struct LiveFeedStore {
    phase: FeedPhase,
    radius_km: f64,
    origin: Option<Coordinate>,
    /// Everything seen this session, most recent first.
    known: Vec<Report>,
    /// Filtered and sorted view; only meaningful while `origin` is set.
    nearby: Vec<AnnotatedReport>,
    has_loaded: bool,
    last_error: Option<String>,
    stream_connected: bool,
    notifier: Arc<dyn NotificationSink>,
}

impl LiveFeedStore {
    pub fn new(radius_km: f64, notifier: Arc<dyn NotificationSink>) -> Self {
        let radius_km = if radius_km.is_finite() && radius_km >= 0.0 {
            radius_km
        } else {
            log_warn!("invalid feed radius {radius_km}; using {NEARBY_RADIUS_KM} km");
            NEARBY_RADIUS_KM
        };

        Self {
            phase: FeedPhase::Uninitialized,
            radius_km,
            origin: None,
            known: Vec::new(),
            nearby: Vec::new(),
            has_loaded: false,
            last_error: None,
            stream_connected: false,
            notifier,
        }
    }

    pub fn phase(&self) -> FeedPhase {
        self.phase
    }

    pub fn origin(&self) -> Option<Coordinate> {
        self.origin
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let view = if self.origin.is_some() {
            FeedView::Nearby(self.nearby.clone())
        } else {
            FeedView::Unfiltered(self.known.clone())
        };

        FeedSnapshot {
            phase: self.phase,
            origin: self.origin,
            radius_km: self.radius_km,
            view,
            last_error: self.last_error.clone(),
            stream_connected: self.stream_connected,
        }
    }

    /// Marks a bulk fetch as in flight. The current view is kept until it lands.
    pub fn begin_loading(&mut self) -> bool {
        if self.phase == FeedPhase::Closed {
            return false;
        }
        self.phase = FeedPhase::Loading;
        true
    }

    /// Replaces the session's reports with a fresh bulk fetch.
    ///
    /// With an origin the view becomes the nearby reports sorted by distance,
    /// without one it is `all_reports` as fetched.
    pub fn load(&mut self, all_reports: Vec<Report>, origin: Option<Coordinate>) {
        if self.phase == FeedPhase::Closed {
            log_debug!("ignoring bulk load on a closed feed");
            return;
        }

        self.origin = origin.and_then(|candidate| match candidate.validate() {
            Ok(valid) => Some(valid),
            Err(err) => {
                log_warn!("ignoring unusable origin for bulk load: {err:#}");
                None
            }
        });
        self.known = all_reports;
        self.has_loaded = true;
        self.phase = FeedPhase::Ready;
        self.last_error = None;
        self.rebuild_view();

        match self.origin {
            Some(_) => log_info!(
                "feed loaded: {} of {} reports within {} km",
                self.nearby.len(),
                self.known.len(),
                self.radius_km
            ),
            None => log_info!(
                "feed loaded without a position: showing all {} reports",
                self.known.len()
            ),
        }
    }

    /// Records a failed bulk fetch. The store stays in `Loading` until the caller retries.
    pub fn fail_load(&mut self, err: &anyhow::Error) {
        if self.phase == FeedPhase::Closed {
            return;
        }
        log_error!("bulk fetch failed: {err:#}");
        self.phase = FeedPhase::Loading;
        self.last_error = Some(format!("{err:#}"));
    }

    pub fn stream_connected(&mut self) {
        if self.phase != FeedPhase::Closed {
            self.stream_connected = true;
        }
    }

    /// The change stream dropped. The current view stays as the last known good state.
    pub fn stream_disconnected(&mut self, reason: &str) {
        log_warn!("change stream disconnected: {reason}");
        self.stream_connected = false;
        if self.phase != FeedPhase::Closed {
            self.last_error = Some(format!("change stream disconnected: {reason}"));
        }
    }

    pub fn close(&mut self) {
        self.phase = FeedPhase::Closed;
        self.stream_connected = false;
    }

    /// Decodes a raw change payload and applies it. Malformed payloads are dropped.
    pub fn apply_payload(&mut self, raw: &str) -> EventOutcome {
        match FeedEvent::parse(raw) {
            Ok(event) => self.apply_event(event),
            Err(err) => {
                log_warn!("dropping malformed change event: {err:#}");
                EventOutcome::Dropped
            }
        }
    }

    pub fn apply_event(&mut self, event: FeedEvent) -> EventOutcome {
        match event {
            FeedEvent::Insert(report) => EventOutcome::Insert(self.apply_insert(report)),
            FeedEvent::Update { id, changes } => {
                EventOutcome::Update(self.apply_update(&id, &changes))
            }
        }
    }

    pub fn apply_insert(&mut self, report: Report) -> InsertOutcome {
        if !self.accepts_events() {
            log_debug!("ignoring insert of report {} in phase {:?}", report.id, self.phase);
            return InsertOutcome::Ignored;
        }
        if let Err(err) = report.coordinate().validate() {
            log_warn!("dropping insert of report {}: {err:#}", report.id);
            return InsertOutcome::Rejected;
        }

        if let Some(position) = self.known.iter().position(|known| known.id == report.id) {
            log_debug!("insert for already known report {}; replacing", report.id);
            let moved = self.known[position].coordinate() != report.coordinate();
            self.known[position] = report.clone();
            if let Some(origin) = self.origin {
                if moved {
                    self.reposition(report, origin);
                } else if let Some(entry) = self
                    .nearby
                    .iter_mut()
                    .find(|entry| entry.report.id == report.id)
                {
                    entry.report = report;
                }
            }
            return InsertOutcome::Replaced;
        }

        self.known.insert(0, report.clone());

        let Some(origin) = self.origin else {
            return InsertOutcome::Prepended;
        };

        let entry = AnnotatedReport::measured_from(report, origin);
        if entry.distance_km > self.radius_km {
            log_debug!(
                "report {} is {:.2} km away; outside the {} km radius",
                entry.report.id,
                entry.distance_km,
                self.radius_km
            );
            return InsertOutcome::OutOfRadius;
        }

        self.announce(&entry.report);
        let index = insertion_index(&self.nearby, entry.distance_km);
        self.nearby.insert(index, entry);
        InsertOutcome::Inserted { index }
    }

    pub fn apply_update(&mut self, report_id: &str, changes: &ReportPatch) -> UpdateOutcome {
        if !self.accepts_events() {
            log_debug!("ignoring update of report {report_id} in phase {:?}", self.phase);
            return UpdateOutcome::Ignored;
        }

        let Some(position) = self.known.iter().position(|known| known.id == report_id) else {
            log_debug!("update for unknown report {report_id} dropped");
            return UpdateOutcome::Unknown;
        };

        if changes.moves() {
            if let Err(err) = changes.resulting_coordinate(&self.known[position]).validate() {
                log_warn!("dropping update of report {report_id}: {err:#}");
                return UpdateOutcome::Rejected;
            }
        }

        changes.apply_to(&mut self.known[position]);

        let Some(origin) = self.origin else {
            return UpdateOutcome::Merged;
        };

        if changes.moves() {
            let updated = self.known[position].clone();
            return match self.reposition(updated, origin) {
                (None, None) => UpdateOutcome::Merged,
                (Some(_), None) => UpdateOutcome::Left,
                (None, Some(index)) => UpdateOutcome::Entered { index },
                (Some(_), Some(index)) => UpdateOutcome::Moved { index },
            };
        }

        if let Some(entry) = self
            .nearby
            .iter_mut()
            .find(|entry| entry.report.id == report_id)
        {
            changes.apply_to(&mut entry.report);
        }
        UpdateOutcome::Merged
    }

    /// New observer position: every distance is recomputed and the view is rebuilt
    /// from all reports known this session, not just the visible ones. Repeating
    /// the current position leaves the view untouched.
    pub fn current_origin_changed(&mut self, origin: Coordinate) -> bool {
        if self.phase == FeedPhase::Closed {
            return false;
        }
        let origin = match origin.validate() {
            Ok(origin) => origin,
            Err(err) => {
                log_warn!("ignoring unusable observer position: {err:#}");
                return false;
            }
        };

        if self.origin == Some(origin) {
            return true;
        }

        self.origin = Some(origin);
        if self.has_loaded {
            self.rebuild_view();
            log_debug!(
                "origin moved to {}; {} reports nearby",
                origin.short_label(),
                self.nearby.len()
            );
        }
        true
    }

    fn accepts_events(&self) -> bool {
        self.has_loaded && self.phase != FeedPhase::Closed
    }

    fn rebuild_view(&mut self) {
        self.nearby = match self.origin {
            Some(origin) => {
                sort_by_distance(filter_within_radius(&self.known, origin, self.radius_km))
            }
            None => Vec::new(),
        };
    }

    /// Removes `report` from the nearby view if present and re-inserts it at its
    /// sorted position when it is within the radius. Returns (old index, new index).
    fn reposition(&mut self, report: Report, origin: Coordinate) -> (Option<usize>, Option<usize>) {
        let previous = self
            .nearby
            .iter()
            .position(|entry| entry.report.id == report.id);
        if let Some(index) = previous {
            self.nearby.remove(index);
        }

        let entry = AnnotatedReport::measured_from(report, origin);
        if entry.distance_km > self.radius_km {
            return (previous, None);
        }

        let index = insertion_index(&self.nearby, entry.distance_km);
        self.nearby.insert(index, entry);
        (previous, Some(index))
    }

    fn announce(&self, report: &Report) {
        if let Err(err) = self.notifier.notify(&Notification::new_report(report)) {
            log_warn!("notification for report {} failed: {err:#}", report.id);
        }
    }
}
