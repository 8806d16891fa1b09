//! Run configuration
//!
//! [`SimulationParameters`] holds every scalar of one run and is immutable
//! once validated. Spatially variable coefficients travel separately in
//! [`CoefficientFields`] and are resolved against the analysis region into
//! [`Coefficients`], where every unset coefficient becomes a uniform field.

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use terraflux_algorithms::terrain::{DerivativeMethod, DerivativeParams};
use terraflux_core::{AnalysisRegion, Raster};

use crate::error::{EvolutionError, Result};
use crate::rainfall::{self, SeriesInterval};

/// Upper bound of the walker budget accepted by the particle solvers
pub const MAX_WALKERS: u64 = 7_000_000;

/// Physical model selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Erosion-deposition or detachment-flux, chosen by the regime classifier
    #[default]
    #[serde(alias = "simwe_mode")]
    Simwe,
    #[serde(alias = "erosion_deposition_mode")]
    ErosionDeposition,
    #[serde(alias = "flux_mode")]
    DetachmentFlux,
    #[serde(alias = "usped_mode")]
    Usped,
    #[serde(alias = "rusle_mode")]
    Rusle,
}

/// Comparison of the mean σ against the regime threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeComparison {
    #[default]
    Greater,
    GreaterOrEqual,
}

impl RegimeComparison {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            RegimeComparison::Greater => value > threshold,
            RegimeComparison::GreaterOrEqual => value >= threshold,
        }
    }
}

/// Scalar parameters of one simulation run.
///
/// Units follow the field names: intensities in mm/h, durations and
/// intervals in minutes, densities in kg/m³, mass in kg/m², erosion-deposition
/// in kg/m²s, flux in kg/ms and diffusion in m²/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParameters {
    /// Start timestamp, `YYYY-MM-DD HH:MM:SS`
    pub start: String,
    pub mode: Mode,
    pub rain_intensity: f64,
    pub rain_duration: f64,
    pub rain_interval: f64,
    pub runoff: f64,
    pub mannings: f64,
    pub detachment: f64,
    pub transport: f64,
    pub shearstress: f64,
    pub density: f64,
    pub mass: f64,
    pub erdep_min: f64,
    pub erdep_max: f64,
    pub flux_min: f64,
    pub flux_max: f64,
    pub grav_diffusion: f64,
    /// Odd side of the smoothing window, 1 disables smoothing
    pub smoothing: usize,
    pub walkers: u64,
    /// USPED/RUSLE soil erodibility
    pub k_factor: f64,
    /// USPED/RUSLE cover management
    pub c_factor: f64,
    /// USPED/RUSLE prevention practices
    pub p_factor: f64,
    /// Contributing area exponent
    pub m: f64,
    /// Slope exponent
    pub n: f64,
    /// Search window of the derivative operators, odd and at least 3
    pub search_window: usize,
    pub regime_threshold: f64,
    pub regime_comparison: RegimeComparison,
    pub series_interval: SeriesInterval,
    /// Per-step wall-clock limit; unset waits indefinitely
    pub step_timeout_secs: Option<f64>,
    /// Register the initial elevation at the start timestamp
    pub register_initial_elevation: bool,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            start: "2015-10-06 00:00:00".into(),
            mode: Mode::Simwe,
            rain_intensity: 155.0,
            rain_duration: 60.0,
            rain_interval: 10.0,
            runoff: 0.35,
            mannings: 0.04,
            detachment: 0.01,
            transport: 0.01,
            shearstress: 0.0,
            density: 1400.0,
            mass: 116.0,
            erdep_min: -1.0,
            erdep_max: 1.0,
            flux_min: -3.0,
            flux_max: 3.0,
            grav_diffusion: 0.2,
            smoothing: 3,
            walkers: 10_000,
            k_factor: 0.25,
            c_factor: 0.1,
            p_factor: 1.0,
            m: 1.0,
            n: 1.0,
            search_window: 3,
            regime_threshold: 1e-3,
            regime_comparison: RegimeComparison::Greater,
            series_interval: SeriesInterval::Fixed,
            step_timeout_secs: None,
            register_initial_elevation: false,
        }
    }
}

impl SimulationParameters {
    /// Parse and validate parameters from JSON; missing keys take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)
            .map_err(|e| EvolutionError::config("parameters", e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    /// Check every configuration rule. Event-mode duration is checked by
    /// [`SimulationParameters::validate_event`].
    pub fn validate(&self) -> Result<()> {
        let start = self.start_time()?;

        if !(self.rain_interval.is_finite() && self.rain_interval > 0.0) {
            return Err(EvolutionError::config("rain_interval", "must be positive"));
        }
        // Sub-millisecond intervals vanish in timestamp arithmetic
        if rainfall::minutes(self.rain_interval) <= TimeDelta::zero() {
            return Err(EvolutionError::config("rain_interval", "shorter than one millisecond"));
        }
        if rainfall::step_end(start, self.interval()).is_err() {
            return Err(EvolutionError::config(
                "rain_interval",
                "first step ends outside the supported calendar range",
            ));
        }

        let finite = [
            ("rain_intensity", self.rain_intensity),
            ("rain_duration", self.rain_duration),
            ("runoff", self.runoff),
            ("mannings", self.mannings),
            ("detachment", self.detachment),
            ("transport", self.transport),
            ("shearstress", self.shearstress),
            ("density", self.density),
            ("mass", self.mass),
            ("erdep_min", self.erdep_min),
            ("erdep_max", self.erdep_max),
            ("flux_min", self.flux_min),
            ("flux_max", self.flux_max),
            ("grav_diffusion", self.grav_diffusion),
            ("k_factor", self.k_factor),
            ("c_factor", self.c_factor),
            ("p_factor", self.p_factor),
            ("m", self.m),
            ("n", self.n),
            ("regime_threshold", self.regime_threshold),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                return Err(EvolutionError::config(field, format!("{value} is not finite")));
            }
        }

        for (field, value) in [
            ("rain_intensity", self.rain_intensity),
            ("runoff", self.runoff),
            ("detachment", self.detachment),
            ("transport", self.transport),
            ("shearstress", self.shearstress),
            ("grav_diffusion", self.grav_diffusion),
        ] {
            if value < 0.0 {
                return Err(EvolutionError::config(field, "must not be negative"));
            }
        }

        for (field, value) in [
            ("density", self.density),
            ("mass", self.mass),
            ("mannings", self.mannings),
        ] {
            if value <= 0.0 {
                return Err(EvolutionError::config(field, "must be positive"));
            }
        }

        if self.erdep_min > self.erdep_max {
            return Err(EvolutionError::config("erdep_min", "exceeds erdep_max"));
        }
        if self.flux_min > self.flux_max {
            return Err(EvolutionError::config("flux_min", "exceeds flux_max"));
        }
        if self.smoothing == 0 || self.smoothing % 2 == 0 {
            return Err(EvolutionError::config("smoothing", "window must be odd and at least 1"));
        }
        if self.search_window < 3 || self.search_window % 2 == 0 {
            return Err(EvolutionError::config(
                "search_window",
                "window must be odd and at least 3",
            ));
        }
        if self.walkers == 0 || self.walkers > MAX_WALKERS {
            return Err(EvolutionError::config(
                "walkers",
                format!("must be in 1..={MAX_WALKERS}"),
            ));
        }
        if let Some(limit) = self.step_timeout_secs {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(EvolutionError::config("step_timeout_secs", "must be positive"));
            }
        }
        Ok(())
    }

    /// Extra rules for a single storm event
    pub fn validate_event(&self) -> Result<()> {
        if self.rain_duration < self.rain_interval {
            return Err(EvolutionError::config(
                "rain_duration",
                "storm is shorter than one rainfall interval",
            ));
        }
        let start = self.start_time()?;
        if rainfall::step_end(start, self.duration()).is_err() {
            return Err(EvolutionError::config(
                "rain_duration",
                "storm ends outside the supported calendar range",
            ));
        }
        Ok(())
    }

    pub fn start_time(&self) -> Result<NaiveDateTime> {
        rainfall::parse_timestamp(&self.start)
    }

    pub fn interval(&self) -> TimeDelta {
        rainfall::minutes(self.rain_interval)
    }

    pub fn duration(&self) -> TimeDelta {
        rainfall::minutes(self.rain_duration)
    }

    pub fn step_timeout(&self) -> Option<std::time::Duration> {
        self.step_timeout_secs.map(std::time::Duration::from_secs_f64)
    }

    pub fn derivative_params(&self) -> DerivativeParams {
        DerivativeParams {
            method: DerivativeMethod::EvansYoung,
            window: self.search_window,
        }
    }
}

/// Optional spatially variable coefficients; `None` means "use the scalar".
#[derive(Debug, Clone, Default)]
pub struct CoefficientFields {
    pub rain_intensity: Option<Raster<f64>>,
    pub runoff: Option<Raster<f64>>,
    pub mannings: Option<Raster<f64>>,
    pub detachment: Option<Raster<f64>>,
    pub transport: Option<Raster<f64>>,
    pub shearstress: Option<Raster<f64>>,
    pub density: Option<Raster<f64>>,
    pub mass: Option<Raster<f64>>,
    pub k_factor: Option<Raster<f64>>,
    pub c_factor: Option<Raster<f64>>,
}

/// Coefficient fields on the analysis region
#[derive(Debug, Clone)]
pub struct Coefficients {
    /// Event rainfall intensity field, when one was supplied
    pub rain_intensity: Option<Raster<f64>>,
    pub runoff: Raster<f64>,
    pub mannings: Raster<f64>,
    pub detachment: Raster<f64>,
    pub transport: Raster<f64>,
    pub shearstress: Raster<f64>,
    pub density: Raster<f64>,
    pub mass: Raster<f64>,
    pub k_factor: Raster<f64>,
    pub c_factor: Raster<f64>,
}

impl Coefficients {
    /// Expand unset coefficients to uniform fields and check supplied ones
    /// lie on `region`.
    pub fn resolve(
        params: &SimulationParameters,
        fields: CoefficientFields,
        region: &AnalysisRegion,
    ) -> Result<Self> {
        let field = |name: &str, supplied: Option<Raster<f64>>, value: f64| -> Result<Raster<f64>> {
            match supplied {
                Some(mut raster) => {
                    region.ensure_matches(&raster).map_err(|e| {
                        EvolutionError::config(name, format!("coefficient field: {e}"))
                    })?;
                    raster.set_transform(*region.transform());
                    if raster.nodata().is_none() {
                        raster.set_nodata(Some(f64::NAN));
                    }
                    Ok(raster)
                }
                None => Ok(region.uniform(value)),
            }
        };

        let rain_intensity = match fields.rain_intensity {
            Some(r) => Some(field("rain_intensity", Some(r), params.rain_intensity)?),
            None => None,
        };

        let resolved = Self {
            rain_intensity,
            runoff: field("runoff", fields.runoff, params.runoff)?,
            mannings: field("mannings", fields.mannings, params.mannings)?,
            detachment: field("detachment", fields.detachment, params.detachment)?,
            transport: field("transport", fields.transport, params.transport)?,
            shearstress: field("shearstress", fields.shearstress, params.shearstress)?,
            density: field("density", fields.density, params.density)?,
            mass: field("mass", fields.mass, params.mass)?,
            k_factor: field("k_factor", fields.k_factor, params.k_factor)?,
            c_factor: field("c_factor", fields.c_factor, params.c_factor)?,
        };

        for (name, raster) in [
            ("density", &resolved.density),
            ("mass", &resolved.mass),
            ("mannings", &resolved.mannings),
        ] {
            let nonpositive = raster
                .data()
                .iter()
                .any(|&v| !raster.is_nodata(v) && v <= 0.0);
            if nonpositive {
                return Err(EvolutionError::config(name, "field must be positive"));
            }
        }

        Ok(resolved)
    }
}
