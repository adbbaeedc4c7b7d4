//! Observer position input.
//!
//! Positions come from `--lat/--lon` at startup and from text lines while a feed
//! is running: `lat,lon`, `lat lon`, or `unavailable`.

use anyhow::{bail, Context, Result};

use crate::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionUpdate {
    Fix(Coordinate),
    /// The position source lost its fix or was denied.
    Unavailable,
}

impl PositionUpdate {
    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            PositionUpdate::Fix(coordinate) => Some(*coordinate),
            PositionUpdate::Unavailable => None,
        }
    }
}

/// Startup position from optional CLI flags. Both or neither must be given.
pub fn initial_position(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<Coordinate>> {
    match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Ok(Some(Coordinate::validated(latitude, longitude)?)),
        (None, None) => Ok(None),
        _ => bail!("--lat and --lon must be given together"),
    }
}

pub fn parse_position_line(line: &str) -> Result<PositionUpdate> {
    let trimmed = line.trim();
    if trimmed.eq_ignore_ascii_case("unavailable") || trimmed.eq_ignore_ascii_case("none") {
        return Ok(PositionUpdate::Unavailable);
    }

    let parts: Vec<&str> = trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect();
    let [latitude, longitude] = parts.as_slice() else {
        bail!("expected 'lat,lon', 'lat lon' or 'unavailable', got '{trimmed}'");
    };

    let latitude: f64 = latitude
        .parse()
        .with_context(|| format!("invalid latitude '{latitude}'"))?;
    let longitude: f64 = longitude
        .parse()
        .with_context(|| format!("invalid longitude '{longitude}'"))?;

    Ok(PositionUpdate::Fix(Coordinate::validated(latitude, longitude)?))
}
