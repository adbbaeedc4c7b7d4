//! Decoding of raw change-stream payloads into feed events.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use crate::{
    db::{
        changes::{ChangePayload, INSERT_EVENT, UPDATE_EVENT},
        Report, ReportPatch,
    },
    geo::Coordinate,
};

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Insert(Report),
    Update { id: String, changes: ReportPatch },
}

impl FeedEvent {
    /// Decodes one payload as written to the change log.
    pub fn parse(raw: &str) -> Result<Self> {
        let payload: ChangePayload =
            serde_json::from_str(raw).context("change payload is not valid JSON")?;
        Self::from_payload(payload)
    }

    pub fn from_payload(payload: ChangePayload) -> Result<Self> {
        match payload.event_type.as_str() {
            INSERT_EVENT => {
                require_id(&payload.new)?;
                let report: Report = serde_json::from_value(payload.new)
                    .context("inserted record is malformed")?;
                Coordinate::validated(report.latitude, report.longitude)
                    .with_context(|| format!("inserted report {} has a bad coordinate", report.id))?;
                Ok(FeedEvent::Insert(report))
            }
            UPDATE_EVENT => {
                let id = require_id(&payload.new)?.to_string();
                let changes: ReportPatch = serde_json::from_value(payload.new)
                    .with_context(|| format!("update for report {id} is malformed"))?;
                validate_patch_coordinates(&changes)
                    .with_context(|| format!("update for report {id} has a bad coordinate"))?;
                Ok(FeedEvent::Update { id, changes })
            }
            other => Err(anyhow!("unsupported change event type '{other}'")),
        }
    }
}

fn require_id(record: &Value) -> Result<&str> {
    match record.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => bail!("change record has no identifier"),
    }
}

fn validate_patch_coordinates(patch: &ReportPatch) -> Result<()> {
    if let Some(latitude) = patch.latitude {
        Coordinate::validated(latitude, 0.0)?;
    }
    if let Some(longitude) = patch.longitude {
        Coordinate::validated(0.0, longitude)?;
    }
    Ok(())
}
