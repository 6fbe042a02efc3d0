//! Recursive multi-step forecasting
//!
//! The forecaster walks the window one hour at a time. Each step builds its
//! feature row from a working copy of the history, scores every quantile
//! model, and writes the reference-quantile prediction back into the
//! working copy so later steps can use it as a lag input.
//!
//! A step whose row cannot be resolved emits NaN for every level and
//! writes nothing, so every later step whose lag or rolling window covers
//! that hour is unresolved as well.


use chrono::FixedOffset;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{ForecastError, Result};
use crate::features::{FeatureBuilder, FeatureRow, FeatureTable};
use crate::model::{QuantileEnsemble, QuantileLevel};
use crate::series::{hour, normalize_timestamp, BoundaryTimestamp, TimeSeries, Timestamp};

/// Predicted quantiles for one hour; all NaN when the hour was unpredictable
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPoint {
    pub timestamp: Timestamp,
    values: Vec<(QuantileLevel, f64)>,
}

impl ForecastPoint {
    pub fn new(timestamp: Timestamp, values: Vec<(QuantileLevel, f64)>) -> Self {
        Self { timestamp, values }
    }

    /// Point with every level set to NaN
    pub fn missing(timestamp: Timestamp, levels: &[QuantileLevel]) -> Self {
        Self {
            timestamp,
            values: levels.iter().map(|&l| (l, f64::NAN)).collect(),
        }
    }

    pub fn values(&self) -> &[(QuantileLevel, f64)] {
        &self.values
    }

    /// Value for `level`, `None` if the level is not part of the point
    pub fn get(&self, level: f64) -> Option<f64> {
        self.values
            .iter()
            .find(|(l, _)| l.value() == level)
            .map(|(_, v)| *v)
    }

    pub fn is_resolved(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(|(_, v)| v.is_finite())
    }
}

impl Serialize for ForecastPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        map.serialize_entry("timestamp", &self.timestamp.to_rfc3339())?;
        for (level, value) in &self.values {
            let value = value.is_finite().then_some(*value);
            map.serialize_entry(&level.label(), &value)?;
        }
        map.end()
    }
}

/// Beyond this many hours the result vectors grow as the window is walked
const MAX_PREALLOCATED_HOURS: usize = 366 * 24;

/// Closed hourly interval, expressed in the series' offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl ForecastWindow {
    pub fn new(
        start: impl Into<BoundaryTimestamp>,
        end: impl Into<BoundaryTimestamp>,
        tz: FixedOffset,
    ) -> Result<Self> {
        let start = normalize_timestamp(start.into(), tz);
        let end = normalize_timestamp(end.into(), tz);
        if start > end {
            return Err(ForecastError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Every hour from `start` to `end` inclusive
    pub fn hours(&self) -> impl Iterator<Item = Timestamp> {
        let end = self.end;
        std::iter::successors(Some(self.start), |t| t.checked_add_signed(hour()))
            .take_while(move |t| *t <= end)
    }

    /// Number of hourly steps in the window
    pub fn hour_count(&self) -> usize {
        ((self.end - self.start).num_seconds() / 3600) as usize + 1
    }
}

/// Result of one forecast call
#[derive(Debug, Clone, serde::Serialize)]
pub struct Forecast {
    pub target: String,
    pub levels: Vec<QuantileLevel>,
    pub points: Vec<ForecastPoint>,
    /// Rows built at each step, with the observed target where known
    #[serde(skip)]
    pub features: FeatureTable,
}

impl Forecast {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn resolved_count(&self) -> usize {
        self.points.iter().filter(|p| p.is_resolved()).count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.len() - self.resolved_count()
    }

    pub fn point(&self, timestamp: &Timestamp) -> Option<&ForecastPoint> {
        self.points.iter().find(|p| &p.timestamp == timestamp)
    }
}

/// History extended with fed-back predictions during one forecast call
struct WorkingSeries {
    series: TimeSeries,
    fed_back: usize,
}

impl WorkingSeries {
    fn new(history: &TimeSeries, start: &Timestamp) -> Self {
        Self {
            series: history.truncated_before(start),
            fed_back: 0,
        }
    }

    fn feed_back(&mut self, timestamp: Timestamp, value: f64) {
        self.series.insert(timestamp, value);
        self.fed_back += 1;
    }
}

/// Steps an ensemble forward hour by hour
pub struct RecursiveForecaster<'a> {
    ensemble: &'a QuantileEnsemble,
    features: FeatureBuilder,
}

impl<'a> RecursiveForecaster<'a> {
    pub fn new(ensemble: &'a QuantileEnsemble, features: FeatureBuilder) -> Self {
        Self { ensemble, features }
    }

    /// Forecast every hour in `[start, end]`, normalizing both bounds to
    /// the history's offset.
    pub fn forecast(
        &self,
        history: &TimeSeries,
        start: impl Into<BoundaryTimestamp>,
        end: impl Into<BoundaryTimestamp>,
    ) -> Result<Forecast> {
        let window = ForecastWindow::new(start, end, history.offset())?;
        self.forecast_window(history, &window)
    }

    pub fn forecast_window(&self, history: &TimeSeries, window: &ForecastWindow) -> Result<Forecast> {
        let levels = self.ensemble.levels();
        let reference = self.ensemble.reference_level();
        let mut working = WorkingSeries::new(history, &window.start);

        let capacity = window.hour_count().min(MAX_PREALLOCATED_HOURS);
        let mut points = Vec::with_capacity(capacity);
        let mut rows: Vec<FeatureRow> = Vec::with_capacity(capacity);

        for t in window.hours() {
            let mut row = self.features.row_at(&working.series, t);

            match self.ensemble.predict_row(&row)? {
                Some(values) => {
                    if let Some(&(_, fed)) = values.iter().find(|(l, _)| *l == reference) {
                        working.feed_back(t, fed);
                    }
                    points.push(ForecastPoint::new(t, values));
                }
                None => {
                    tracing::trace!("Unresolved inputs at {}: {:?}", t, row.unresolved());
                    points.push(ForecastPoint::missing(t, &levels));
                }
            }

            row.target = history.get(&t);
            rows.push(row);
        }

        let forecast = Forecast {
            target: self.ensemble.target().to_string(),
            levels,
            points,
            features: FeatureTable {
                columns: self.features.columns(),
                rows,
            },
        };

        let unresolved = forecast.unresolved_count();
        if unresolved > 0 {
            tracing::warn!(
                "{} of {} forecast hours for '{}' had unresolved inputs",
                unresolved,
                forecast.len(),
                forecast.target
            );
        }
        tracing::info!(
            "Forecast '{}' from {} to {}: {} points, {} predictions fed back",
            forecast.target,
            window.start,
            window.end,
            forecast.len(),
            working.fed_back
        );

        Ok(forecast)
    }
}
