use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::warn;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    cli::WatchArgs,
    feed::{
        controller::FeedController,
        state::{FeedPhase, FeedSnapshot, FeedView},
    },
    location::{initial_position, parse_position_line, PositionUpdate},
    notify::{LogNotifier, NotificationSink, SilentNotifier},
    reports::commands::{counts_line, report_line},
    AppState,
};

/// A line typed into a running `watch` session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WatchInput {
    Position(PositionUpdate),
    Reload,
    Quit,
    Blank,
}

pub fn parse_watch_input(line: &str) -> Result<WatchInput> {
    let trimmed = line.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => Ok(WatchInput::Blank),
        "reload" | "r" => Ok(WatchInput::Reload),
        "quit" | "q" | "exit" => Ok(WatchInput::Quit),
        _ => parse_position_line(trimmed).map(WatchInput::Position),
    }
}

pub async fn watch(state: &AppState, args: WatchArgs) -> Result<()> {
    let mut settings = state.settings.feed();
    if let Some(radius_km) = args.radius_km {
        settings.radius_km = radius_km;
        settings.validate().context("invalid --radius-km")?;
    }
    let origin = initial_position(args.lat, args.lon)?;

    let notifier: Arc<dyn NotificationSink> = if settings.notifications_enabled {
        Arc::new(LogNotifier)
    } else {
        Arc::new(SilentNotifier)
    };

    let mut feed = FeedController::start(state.db.clone(), &settings, notifier, origin);
    let mut snapshots = feed.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    println!("{}", render_snapshot(&snapshots.borrow_and_update(), Utc::now()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                println!("{}", render_snapshot(&snapshot, Utc::now()));
                if snapshot.phase == FeedPhase::Closed {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_watch_input(&line) {
                    Ok(WatchInput::Position(update)) => feed.update_origin(update.coordinate()).await?,
                    Ok(WatchInput::Reload) => feed.reload().await?,
                    Ok(WatchInput::Quit) => break,
                    Ok(WatchInput::Blank) => {}
                    Err(err) => eprintln!("{err:#}"),
                },
                Ok(None) => stdin_open = false,
                Err(err) => {
                    warn!("Stopped reading positions from stdin: {err}");
                    stdin_open = false;
                }
            },
        }
    }

    feed.close().await
}

pub fn render_snapshot(snapshot: &FeedSnapshot, now: DateTime<Utc>) -> String {
    let mut out = String::new();

    let heading = match (&snapshot.view, snapshot.origin) {
        (FeedView::Nearby(_), Some(origin)) => format!(
            "== Reports within {} km of {}",
            snapshot.radius_km,
            origin.short_label()
        ),
        _ => "== All reports (position unavailable)".to_string(),
    };
    out.push_str(&heading);

    match snapshot.phase {
        FeedPhase::Uninitialized | FeedPhase::Loading => out.push_str(" - loading"),
        FeedPhase::Closed => out.push_str(" - closed"),
        FeedPhase::Ready => {}
    }
    out.push('\n');

    if let Some(error) = &snapshot.last_error {
        out.push_str(&format!("! {error} (type 'reload' to retry)\n"));
    }
    if snapshot.phase == FeedPhase::Ready && !snapshot.stream_connected {
        out.push_str("! live updates paused\n");
    }

    out.push_str(&counts_line(snapshot.view.len(), &snapshot.view.status_counts()));

    match &snapshot.view {
        FeedView::Nearby(entries) => {
            for entry in entries {
                out.push('\n');
                out.push_str(&report_line(&entry.report, Some(entry.distance_km), now));
            }
        }
        FeedView::Unfiltered(reports) => {
            for report in reports {
                out.push('\n');
                out.push_str(&report_line(report, None, now));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{Report, ReportStatus},
        feed::proximity::AnnotatedReport,
        geo::Coordinate,
    };

    fn report(id: &str) -> Report {
        Report {
            id: id.into(),
            reporter_id: None,
            latitude: 40.89,
            longitude: 29.2,
            location_name: "Kalamis".into(),
            description: "nets".into(),
            image_url: None,
            status: ReportStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn parses_control_words_before_positions() {
        assert_eq!(parse_watch_input("  ").unwrap(), WatchInput::Blank);
        assert_eq!(parse_watch_input("Reload").unwrap(), WatchInput::Reload);
        assert_eq!(parse_watch_input("q").unwrap(), WatchInput::Quit);
        assert_eq!(
            parse_watch_input("unavailable").unwrap(),
            WatchInput::Position(PositionUpdate::Unavailable)
        );
        assert_eq!(
            parse_watch_input("40.88, 29.2").unwrap(),
            WatchInput::Position(PositionUpdate::Fix(Coordinate::new(40.88, 29.2)))
        );
        assert!(parse_watch_input("somewhere").is_err());
    }

    #[test]
    fn renders_nearby_view_with_distances() {
        let origin = Coordinate::new(40.88, 29.2);
        let snapshot = FeedSnapshot {
            phase: FeedPhase::Ready,
            origin: Some(origin),
            radius_km: 5.0,
            view: FeedView::Nearby(vec![AnnotatedReport::measured_from(report("a"), origin)]),
            last_error: None,
            stream_connected: true,
        };

        let text = render_snapshot(&snapshot, Utc::now());
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("== Reports within 5 km of 40.8800, 29.2000"));
        assert_eq!(
            lines.next(),
            Some("1 reports | pending 1 | in progress 0 | completed 0")
        );
        assert!(lines.next().unwrap().contains("1.11 km  [Pending] Kalamis"));
    }

    #[test]
    fn renders_degraded_and_failed_states() {
        let snapshot = FeedSnapshot {
            phase: FeedPhase::Loading,
            origin: None,
            radius_km: 5.0,
            view: FeedView::Unfiltered(vec![]),
            last_error: Some("database is locked".into()),
            stream_connected: false,
        };

        let text = render_snapshot(&snapshot, Utc::now());
        assert!(text.starts_with("== All reports (position unavailable) - loading\n"));
        assert!(text.contains("! database is locked (type 'reload' to retry)"));
        assert!(!text.contains("live updates paused"));
    }
}
