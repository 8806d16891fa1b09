//! Neighborhood smoothing engine

mod focal;

pub use focal::{focal_mean, focal_statistics, FocalParams, FocalStatistic, FocalStatistics};
