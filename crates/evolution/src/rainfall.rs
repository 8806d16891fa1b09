//! Rainfall driver
//!
//! Produces the ordered forcing steps of a run, either by subdividing one
//! storm into fixed intervals or by replaying a precipitation log. Timestamps
//! are parsed once, here; everything downstream works with `NaiveDateTime`
//! and `TimeDelta` arithmetic.

use std::vec;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EvolutionError, Result};

const TIMESTAMP_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse a timestamp such as `2015-10-06 00:00:00`.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(ts);
        }
    }
    Err(EvolutionError::Timestamp {
        value: value.to_string(),
        reason: "expected YYYY-MM-DD HH:MM[:SS]".into(),
    })
}

/// Convert a duration in minutes to a `TimeDelta` with millisecond precision.
///
/// Values beyond the `TimeDelta` range saturate.
pub fn minutes(value: f64) -> TimeDelta {
    let ms = (value * 60_000.0).round() as i64;
    TimeDelta::milliseconds(ms.max(-i64::MAX))
}

/// End of a step that starts at `start` and lasts `interval`.
///
/// Fails when the end falls outside the calendar range of `NaiveDateTime`.
pub fn step_end(start: NaiveDateTime, interval: TimeDelta) -> Result<NaiveDateTime> {
    start
        .checked_add_signed(interval)
        .ok_or_else(|| EvolutionError::Timestamp {
            value: format!("{start} + {} min", as_minutes(interval)),
            reason: "step ends outside the supported calendar range".into(),
        })
}

/// Length of a `TimeDelta` in minutes
pub fn as_minutes(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 60_000.0
}

/// How long each record of a precipitation log lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesInterval {
    /// Every record lasts the configured rainfall interval
    #[default]
    Fixed,
    /// Each record lasts until the next one; the last lasts the configured interval
    RecordSpacing,
}

/// One line of a precipitation log
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecipitationEntry {
    pub timestamp: NaiveDateTime,
    /// Rainfall intensity (mm/h)
    pub intensity: f64,
}

/// Parse a precipitation log of `timestamp, intensity` records.
///
/// Fields may be quoted. Blank lines are ignored. A first record whose
/// timestamp does not parse is taken as a header.
pub fn parse_precipitation(text: &str) -> Result<Vec<PrecipitationEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut entries = Vec::new();
    let mut first = true;

    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            EvolutionError::config(format!("precipitation record {}", idx + 1), e.to_string())
        })?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line_no = record.position().map_or(idx as u64 + 1, |p| p.line());

        let (Some(ts), Some(value)) = (record.get(0), record.get(1)) else {
            if first {
                debug!(line = line_no, "skipping precipitation header");
                first = false;
                continue;
            }
            return Err(EvolutionError::config(
                format!("precipitation line {line_no}"),
                "expected 'timestamp, intensity'",
            ));
        };

        let timestamp = match parse_timestamp(ts) {
            Ok(t) => t,
            Err(_) if first => {
                debug!(line = line_no, header = ts, "skipping precipitation header");
                first = false;
                continue;
            }
            Err(e) => return Err(e),
        };
        first = false;

        let intensity: f64 = value.parse().map_err(|_| {
            EvolutionError::config(
                format!("precipitation line {line_no}"),
                format!("'{value}' is not a number"),
            )
        })?;

        entries.push(PrecipitationEntry { timestamp, intensity });
    }

    Ok(entries)
}

/// One forcing step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RainfallRecord {
    /// Start of the step
    pub timestamp: NaiveDateTime,
    /// Nominal rainfall intensity (mm/h)
    pub intensity: f64,
    /// Length of the step
    pub interval: TimeDelta,
}

impl RainfallRecord {
    /// End of the step
    pub fn end(&self) -> Result<NaiveDateTime> {
        step_end(self.timestamp, self.interval)
    }
}

#[derive(Debug)]
enum Source {
    Event {
        next_start: NaiveDateTime,
        intensity: f64,
        interval: TimeDelta,
        count: usize,
        emitted: usize,
    },
    Series(vec::IntoIter<RainfallRecord>),
}

/// Ordered sequence of [`RainfallRecord`]s, consumed once.
#[derive(Debug)]
pub struct RainfallDriver {
    source: Source,
}

impl RainfallDriver {
    /// Subdivide one storm into `floor(duration / interval)` equal steps.
    ///
    /// A trailing partial interval is not simulated. The end of the last
    /// step must be a representable timestamp.
    pub fn event(
        start: NaiveDateTime,
        intensity: f64,
        duration: TimeDelta,
        interval: TimeDelta,
    ) -> Result<Self> {
        if interval <= TimeDelta::zero() {
            return Err(EvolutionError::config("rain_interval", "must be positive"));
        }
        check_intensity(intensity, "rain_intensity")?;
        let count = (duration.num_milliseconds() / interval.num_milliseconds()).max(0) as usize;
        if count == 0 {
            return Err(EvolutionError::config(
                "rain_duration",
                "storm is shorter than one rainfall interval",
            ));
        }
        let end = interval
            .num_milliseconds()
            .checked_mul(count as i64)
            .and_then(TimeDelta::try_milliseconds)
            .and_then(|span| start.checked_add_signed(span));
        let Some(end) = end else {
            return Err(EvolutionError::config(
                "rain_duration",
                "storm ends outside the supported calendar range",
            ));
        };
        debug!(count, %end, "event rainfall driver");
        Ok(Self {
            source: Source::Event {
                next_start: start,
                intensity,
                interval,
                count,
                emitted: 0,
            },
        })
    }

    /// Replay a precipitation log, one step per entry.
    ///
    /// Entries must be strictly increasing in time.
    pub fn series(
        entries: &[PrecipitationEntry],
        policy: SeriesInterval,
        interval: TimeDelta,
    ) -> Result<Self> {
        if interval <= TimeDelta::zero() {
            return Err(EvolutionError::config("rain_interval", "must be positive"));
        }
        if entries.is_empty() {
            return Err(EvolutionError::config("precipitation", "log has no records"));
        }

        for pair in entries.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(EvolutionError::TimeOrdering {
                    series: "precipitation".into(),
                    previous: pair[0].timestamp,
                    next: pair[1].timestamp,
                });
            }
        }

        let mut records = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            check_intensity(entry.intensity, "precipitation intensity")?;
            let step = match (policy, entries.get(i + 1)) {
                (SeriesInterval::RecordSpacing, Some(next)) => next.timestamp - entry.timestamp,
                _ => interval,
            };
            records.push(RainfallRecord {
                timestamp: entry.timestamp,
                intensity: entry.intensity,
                interval: step,
            });
        }

        if let Some(last) = records.last() {
            last.end()?;
        }

        debug!(count = records.len(), ?policy, "series rainfall driver");
        Ok(Self {
            source: Source::Series(records.into_iter()),
        })
    }

    /// Records not yet handed out
    pub fn remaining(&self) -> usize {
        match &self.source {
            Source::Event { count, emitted, .. } => count - emitted,
            Source::Series(iter) => iter.len(),
        }
    }
}

impl Iterator for RainfallDriver {
    type Item = RainfallRecord;

    fn next(&mut self) -> Option<RainfallRecord> {
        match &mut self.source {
            Source::Event {
                next_start,
                intensity,
                interval,
                count,
                emitted,
            } => {
                if *emitted >= *count {
                    return None;
                }
                let record = RainfallRecord {
                    timestamp: *next_start,
                    intensity: *intensity,
                    interval: *interval,
                };
                // The constructor checked that the last step end fits
                *next_start = next_start.checked_add_signed(*interval)?;
                *emitted += 1;
                Some(record)
            }
            Source::Series(iter) => iter.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

fn check_intensity(value: f64, field: &str) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(EvolutionError::config(
            field,
            format!("{value} is not a non-negative rainfall intensity"),
        ));
    }
    Ok(())
}
