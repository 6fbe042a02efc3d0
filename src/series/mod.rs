//! Hourly time series and timestamp normalization
//!
//! A [`TimeSeries`] is a strictly increasing run of `(timestamp, value)`
//! pairs expressed in one fixed UTC offset. Gaps are allowed; a missing
//! hour (or a non-finite value) simply resolves to nothing when a feature
//! looks it up.
//!
//! Forecast boundaries enter through [`normalize_timestamp`], the single
//! place where naive timestamps are localized and aware ones converted.

mod ingest;

pub use ingest::{pivot_observations, Observation};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{ForecastError, Result};

/// Timestamp as used throughout the engine
pub type Timestamp = DateTime<FixedOffset>;

/// One hour, the nominal series period
pub fn hour() -> Duration {
    Duration::hours(1)
}

/// Single-observable hourly series
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    name: String,
    offset: FixedOffset,
    points: BTreeMap<Timestamp, f64>,
}

impl TimeSeries {
    /// Build a series; timestamps must be strictly increasing and are
    /// re-expressed in `offset`.
    pub fn new(
        name: impl Into<String>,
        offset: FixedOffset,
        points: impl IntoIterator<Item = (Timestamp, f64)>,
    ) -> Result<Self> {
        let name = name.into();
        let mut map = BTreeMap::new();
        let mut previous: Option<Timestamp> = None;

        for (ts, value) in points {
            if let Some(prev) = previous {
                if ts <= prev {
                    return Err(ForecastError::InvalidSeries(format!(
                        "'{}': timestamp {} does not follow {}",
                        name, ts, prev
                    )));
                }
            }
            previous = Some(ts);
            map.insert(ts.with_timezone(&offset), value);
        }

        Ok(Self {
            name,
            offset,
            points: map,
        })
    }

    /// Empty series, used as an accumulator
    pub fn empty(name: impl Into<String>, offset: FixedOffset) -> Self {
        Self {
            name: name.into(),
            offset,
            points: BTreeMap::new(),
        }
    }

    /// Regular hourly series starting at `start`
    pub fn hourly(
        name: impl Into<String>,
        start: Timestamp,
        values: impl IntoIterator<Item = f64>,
    ) -> Self {
        let offset = *start.offset();
        let points = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (start + Duration::hours(i as i64), v))
            .collect();
        Self {
            name: name.into(),
            offset,
            points,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference offset for calendar fields and boundary normalization
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Finite value at `ts`, if any
    pub fn get(&self, ts: &Timestamp) -> Option<f64> {
        self.points.get(ts).copied().filter(|v| v.is_finite())
    }

    /// Raw stored value at `ts`, including NaN placeholders
    pub fn raw(&self, ts: &Timestamp) -> Option<f64> {
        self.points.get(ts).copied()
    }

    pub fn contains(&self, ts: &Timestamp) -> bool {
        self.points.contains_key(ts)
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.points.keys().next().copied()
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.points.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, f64)> + '_ {
        self.points.iter().map(|(ts, v)| (*ts, *v))
    }

    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.points.keys().copied()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.values().copied().collect()
    }

    /// Number of missing (non-finite) values
    pub fn missing_count(&self) -> usize {
        self.points.values().filter(|v| !v.is_finite()).count()
    }

    /// Copy holding only points strictly before `ts`
    pub fn truncated_before(&self, ts: &Timestamp) -> Self {
        Self {
            name: self.name.clone(),
            offset: self.offset,
            points: self.points.range(..*ts).map(|(k, v)| (*k, *v)).collect(),
        }
    }

    /// Insert or overwrite a value
    pub fn insert(&mut self, ts: Timestamp, value: f64) {
        self.points.insert(ts.with_timezone(&self.offset), value);
    }

    /// Replace every value, keeping timestamps
    pub(crate) fn with_values(&self, values: Vec<f64>) -> Self {
        let points = self.points.keys().copied().zip(values).collect();
        Self {
            name: self.name.clone(),
            offset: self.offset,
            points,
        }
    }
}

/// Forecast boundary as supplied by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryTimestamp {
    /// Wall-clock time with no zone; taken to be in the series' offset
    Naive(NaiveDateTime),
    /// Instant with its own offset; converted to the series' offset
    Aware(DateTime<FixedOffset>),
}

impl From<NaiveDateTime> for BoundaryTimestamp {
    fn from(ts: NaiveDateTime) -> Self {
        BoundaryTimestamp::Naive(ts)
    }
}

impl From<DateTime<FixedOffset>> for BoundaryTimestamp {
    fn from(ts: DateTime<FixedOffset>) -> Self {
        BoundaryTimestamp::Aware(ts)
    }
}

impl From<DateTime<chrono::Utc>> for BoundaryTimestamp {
    fn from(ts: DateTime<chrono::Utc>) -> Self {
        BoundaryTimestamp::Aware(ts.fixed_offset())
    }
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

impl FromStr for BoundaryTimestamp {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
            return Ok(BoundaryTimestamp::Aware(ts));
        }
        for fmt in NAIVE_FORMATS {
            if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(BoundaryTimestamp::Naive(ts));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            if let Some(ts) = date.and_hms_opt(0, 0, 0) {
                return Ok(BoundaryTimestamp::Naive(ts));
            }
        }
        Err(ForecastError::InvalidTimestamp(s.to_string()))
    }
}

/// Express a boundary in the series' reference offset.
///
/// Naive timestamps are localized to `tz`; aware timestamps are converted.
pub fn normalize_timestamp(ts: BoundaryTimestamp, tz: FixedOffset) -> Timestamp {
    match ts {
        BoundaryTimestamp::Naive(naive) => tz.from_utc_datetime(&(naive - tz_delta(tz))),
        BoundaryTimestamp::Aware(aware) => aware.with_timezone(&tz),
    }
}

fn tz_delta(tz: FixedOffset) -> Duration {
    Duration::seconds(tz.local_minus_utc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn cet() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    fn ts(s: &str) -> Timestamp {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_new_rejects_non_increasing() {
        let points = vec![
            (ts("2024-01-01T01:00:00Z"), 1.0),
            (ts("2024-01-01T00:00:00Z"), 2.0),
        ];
        let err = TimeSeries::new("load", utc(), points).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidSeries(_)));

        let dup = vec![
            (ts("2024-01-01T00:00:00Z"), 1.0),
            (ts("2024-01-01T00:00:00Z"), 2.0),
        ];
        assert!(TimeSeries::new("load", utc(), dup).is_err());
    }

    #[test]
    fn test_series_converts_to_reference_offset() {
        let points = vec![(ts("2024-01-01T00:00:00Z"), 1.0)];
        let series = TimeSeries::new("load", cet(), points).unwrap();
        let first = series.first_timestamp().unwrap();
        assert_eq!(first.offset(), &cet());
        assert_eq!(first.format("%H").to_string(), "01");
        // Same instant regardless of offset
        assert_eq!(series.get(&ts("2024-01-01T00:00:00Z")), Some(1.0));
    }

    #[test]
    fn test_get_skips_non_finite() {
        let start = ts("2024-01-01T00:00:00Z");
        let series = TimeSeries::hourly("load", start, vec![1.0, f64::NAN, 3.0]);
        assert_eq!(series.get(&start), Some(1.0));
        assert_eq!(series.get(&(start + hour())), None);
        assert!(series.contains(&(start + hour())));
        assert_eq!(series.missing_count(), 1);
    }

    #[test]
    fn test_truncated_before() {
        let start = ts("2024-01-01T00:00:00Z");
        let series = TimeSeries::hourly("load", start, (0..10).map(|i| i as f64));
        let cut = series.truncated_before(&(start + Duration::hours(4)));
        assert_eq!(cut.len(), 4);
        assert_eq!(cut.last_timestamp(), Some(start + Duration::hours(3)));
    }

    #[test]
    fn test_normalize_naive_localizes() {
        let naive = NaiveDateTime::parse_from_str("2024-03-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let normalized = normalize_timestamp(naive.into(), cet());
        assert_eq!(normalized, ts("2024-03-01T12:00:00+01:00"));
        assert_eq!(normalized.offset(), &cet());
    }

    #[test]
    fn test_normalize_aware_converts() {
        let aware = ts("2024-03-01T12:00:00Z");
        let normalized = normalize_timestamp(aware.into(), cet());
        assert_eq!(normalized, aware);
        assert_eq!(normalized.format("%H").to_string(), "13");
    }

    #[test]
    fn test_boundary_parsing() {
        assert!(matches!(
            "2024-04-22".parse::<BoundaryTimestamp>().unwrap(),
            BoundaryTimestamp::Naive(_)
        ));
        assert!(matches!(
            "2024-04-22 06:00".parse::<BoundaryTimestamp>().unwrap(),
            BoundaryTimestamp::Naive(_)
        ));
        assert!(matches!(
            "2024-04-22T06:00:00+02:00".parse::<BoundaryTimestamp>().unwrap(),
            BoundaryTimestamp::Aware(_)
        ));
        let err = "next tuesday".parse::<BoundaryTimestamp>().unwrap_err();
        assert!(matches!(err, ForecastError::InvalidTimestamp(_)));
    }
}
