//! Pivot `(time, code, value)` records into one series per code

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{TimeSeries, Timestamp};
use crate::error::{ForecastError, Result};

/// A single record as returned by the data service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub time: Timestamp,
    pub code: String,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Pivot observations into per-code series over the union of timestamps.
///
/// A code with no record at some timestamp gets a NaN there. When `offset`
/// is `None` the offset of the first record is used.
pub fn pivot_observations(
    observations: &[Observation],
    offset: Option<FixedOffset>,
) -> Result<BTreeMap<String, TimeSeries>> {
    let Some(first) = observations.first() else {
        return Ok(BTreeMap::new());
    };
    let offset = offset.unwrap_or(*first.time.offset());

    let mut times: BTreeSet<Timestamp> = BTreeSet::new();
    let mut cells: BTreeMap<String, BTreeMap<Timestamp, f64>> = BTreeMap::new();

    for obs in observations {
        let ts = obs.time.with_timezone(&offset);
        times.insert(ts);
        let column = cells.entry(obs.code.clone()).or_default();
        if column
            .insert(ts, obs.value.unwrap_or(f64::NAN))
            .is_some()
        {
            return Err(ForecastError::DuplicateObservation {
                code: obs.code.clone(),
                timestamp: ts,
            });
        }
    }

    let mut pivoted = BTreeMap::new();
    for (code, column) in cells {
        let points = times
            .iter()
            .map(|ts| (*ts, column.get(ts).copied().unwrap_or(f64::NAN)));
        let series = TimeSeries::new(code.clone(), offset, points)?;
        pivoted.insert(code, series);
    }

    tracing::debug!(
        "Pivoted {} observations into {} series over {} timestamps",
        observations.len(),
        pivoted.len(),
        times.len()
    );

    Ok(pivoted)
}
