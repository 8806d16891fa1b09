//! Output time series registry
//!
//! The simulation loop appends every produced field to a named series.
//! Registration is append-only and strictly ordered per series; an entry
//! that does not follow the last one is refused.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use terraflux_core::Raster;
use tracing::trace;

use crate::error::{EvolutionError, Result};

/// Output series of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesName {
    Elevation,
    Depth,
    ErosionDeposition,
    Flux,
    Difference,
}

impl SeriesName {
    pub const ALL: [SeriesName; 5] = [
        SeriesName::Elevation,
        SeriesName::Depth,
        SeriesName::ErosionDeposition,
        SeriesName::Flux,
        SeriesName::Difference,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SeriesName::Elevation => "elevation",
            SeriesName::Depth => "depth",
            SeriesName::ErosionDeposition => "erdep",
            SeriesName::Flux => "flux",
            SeriesName::Difference => "difference",
        }
    }
}

impl fmt::Display for SeriesName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a registered map: `<series>_YYYY_MM_DD_HH_MM_SS`
pub fn map_id(series: SeriesName, timestamp: NaiveDateTime) -> String {
    format!("{}_{}", series, timestamp.format("%Y_%m_%d_%H_%M_%S"))
}

/// Temporal dataset store the loop writes into
pub trait TemporalRegistry {
    /// Append `field` to `series` at `timestamp`, returning the map id.
    fn register(
        &mut self,
        series: SeriesName,
        field: &Raster<f64>,
        timestamp: NaiveDateTime,
        interval: TimeDelta,
    ) -> Result<String>;
}

/// One registered field
#[derive(Debug, Clone)]
pub struct RegisteredMap {
    pub id: String,
    pub timestamp: NaiveDateTime,
    pub interval: TimeDelta,
    pub field: Raster<f64>,
}

/// Registry keeping every series in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    series: BTreeMap<SeriesName, Vec<RegisteredMap>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries of one series in registration order
    pub fn entries(&self, series: SeriesName) -> &[RegisteredMap] {
        self.series.get(&series).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn timestamps(&self, series: SeriesName) -> Vec<NaiveDateTime> {
        self.entries(series).iter().map(|m| m.timestamp).collect()
    }

    pub fn latest(&self, series: SeriesName) -> Option<&RegisteredMap> {
        self.entries(series).last()
    }

    /// Series with at least one entry
    pub fn series(&self) -> impl Iterator<Item = SeriesName> + '_ {
        self.series.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TemporalRegistry for InMemoryRegistry {
    fn register(
        &mut self,
        series: SeriesName,
        field: &Raster<f64>,
        timestamp: NaiveDateTime,
        interval: TimeDelta,
    ) -> Result<String> {
        let entries = self.series.entry(series).or_default();
        if let Some(last) = entries.last() {
            if timestamp <= last.timestamp {
                return Err(EvolutionError::TimeOrdering {
                    series: series.to_string(),
                    previous: last.timestamp,
                    next: timestamp,
                });
            }
        }

        let id = map_id(series, timestamp);
        trace!(%id, "registered map");
        entries.push(RegisteredMap {
            id: id.clone(),
            timestamp,
            interval,
            field: field.clone(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rainfall::parse_timestamp;

    #[test]
    fn test_map_id() {
        let ts = parse_timestamp("2015-10-06 00:10:00").unwrap();
        assert_eq!(map_id(SeriesName::ErosionDeposition, ts), "erdep_2015_10_06_00_10_00");
    }

    #[test]
    fn test_register_in_order() {
        let mut registry = InMemoryRegistry::new();
        let field = Raster::filled(2, 2, 1.0);
        let t0 = parse_timestamp("2015-10-06 00:10:00").unwrap();
        let step = TimeDelta::minutes(10);

        registry.register(SeriesName::Elevation, &field, t0, step).unwrap();
        registry.register(SeriesName::Elevation, &field, t0 + step, step).unwrap();
        registry.register(SeriesName::Flux, &field, t0, step).unwrap();

        assert_eq!(registry.timestamps(SeriesName::Elevation), vec![t0, t0 + step]);
        assert_eq!(registry.len(), 3);
        assert!(registry.entries(SeriesName::Depth).is_empty());
        assert_eq!(
            registry.series().collect::<Vec<_>>(),
            vec![SeriesName::Elevation, SeriesName::Flux]
        );
    }

    #[test]
    fn test_register_rejects_out_of_order() {
        let mut registry = InMemoryRegistry::new();
        let field = Raster::filled(2, 2, 1.0);
        let t0 = parse_timestamp("2015-10-06 00:10:00").unwrap();
        let step = TimeDelta::minutes(10);

        registry.register(SeriesName::Depth, &field, t0, step).unwrap();
        let err = registry.register(SeriesName::Depth, &field, t0, step).unwrap_err();
        assert!(matches!(err, EvolutionError::TimeOrdering { .. }));
        assert!(registry
            .register(SeriesName::Depth, &field, t0 - step, step)
            .is_err());
        assert_eq!(registry.entries(SeriesName::Depth).len(), 1, "refused entries are not stored");
    }
}
