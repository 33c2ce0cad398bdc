//! Named GPS locations (`locations`).
//!
//! Stored as `name → "lat,lon,radius"` with six decimals.

use serde::{Deserialize, Serialize};

use crate::error::{CfgError, CfgResult, FieldError, ValidationErrors};
use crate::store::{ParamMap, ParamStore};

pub const LOCATIONS_NAMESPACE: &str = "locations";

const DEFAULT_RADIUS: u32 = 100;

/// Submitted row. Rows with an empty `latlon` are skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRow {
    /// `"latitude,longitude"`.
    pub latlon: String,
    /// Meters; 0 selects the default.
    #[serde(default)]
    pub radius: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub radius: u32,
}

pub fn list_locations(store: &ParamStore) -> Vec<Location> {
    store
        .snapshot(LOCATIONS_NAMESPACE)
        .iter()
        .filter_map(|(name, value)| {
            let mut parts = value.split(',');
            let lat = parts.next()?.trim().parse().ok()?;
            let lon = parts.next()?.trim().parse().ok()?;
            let radius = parts
                .next()
                .and_then(|r| r.trim().parse().ok())
                .unwrap_or(DEFAULT_RADIUS);
            Some(Location {
                name: name.clone(),
                lat,
                lon,
                radius,
            })
        })
        .collect()
}

/// Replace the location list.
pub fn save_locations(store: &ParamStore, rows: &[LocationRow]) -> CfgResult<()> {
    let mut errors = ValidationErrors::new();
    let mut next = ParamMap::new();

    for (i, row) in rows.iter().enumerate() {
        if row.latlon.trim().is_empty() {
            continue;
        }
        let coords = parse_latlon(&row.latlon);
        if coords.is_none() {
            errors.push(FieldError::on(
                format!("rows[{}].latlon", i),
                "Invalid coordinates (enter latitude,longitude)",
            ));
        }
        if row.name.is_empty() {
            errors.push(FieldError::on(
                format!("rows[{}].name", i),
                "Name must not be empty",
            ));
        }
        if let Some((lat, lon)) = coords {
            let radius = if row.radius == 0 {
                DEFAULT_RADIUS
            } else {
                row.radius
            };
            next.insert(row.name.clone(), format!("{:.6},{:.6},{}", lat, lon, radius));
        }
    }
    if !errors.is_empty() {
        return Err(CfgError::Validation(errors));
    }

    store.set_map(LOCATIONS_NAMESPACE, next)?;
    tracing::info!(locations = rows.len(), "Locations saved");
    Ok(())
}

/// Zero in either coordinate counts as unset.
fn parse_latlon(latlon: &str) -> Option<(f64, f64)> {
    let (lat, lon) = latlon.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    let valid = lat != 0.0
        && lon != 0.0
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon);
    valid.then_some((lat, lon))
}
