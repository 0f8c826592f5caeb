//! Evaluation options and the requested frequency grid.

use crate::error::{RespError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inclusive range of stage sequence numbers taking part in an evaluation.
///
/// An omitted bound is open: `start: None` means "from the first stage",
/// `stop: None` means "to the last stage".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageRange {
    pub start: Option<u32>,
    pub stop: Option<u32>,
}

impl StageRange {
    /// The whole chain.
    pub fn all() -> Self {
        Self::default()
    }

    /// A single stage.
    pub fn only(stage: u32) -> Self {
        Self {
            start: Some(stage),
            stop: Some(stage),
        }
    }

    pub fn new(start: Option<u32>, stop: Option<u32>) -> Self {
        Self { start, stop }
    }

    /// True when no bound is set.
    pub fn is_all(&self) -> bool {
        self.start.is_none() && self.stop.is_none()
    }

    pub fn contains(&self, sequence: u32) -> bool {
        self.start.is_none_or(|start| sequence >= start)
            && self.stop.is_none_or(|stop| sequence <= stop)
    }
}

impl fmt::Display for StageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.stop) {
            (None, None) => write!(f, "[all stages]"),
            (Some(start), None) => write!(f, "[{}..]", start),
            (None, Some(stop)) => write!(f, "[..{}]", stop),
            (Some(start), Some(stop)) => write!(f, "[{}..{}]", start, stop),
        }
    }
}

/// Units the response is expressed in on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputUnit {
    Displacement,
    #[default]
    Velocity,
    Acceleration,
    /// No conversion: the response stays in the units of the first stage.
    Default,
}

impl OutputUnit {
    pub fn short_name(&self) -> &'static str {
        match self {
            OutputUnit::Displacement => "dis",
            OutputUnit::Velocity => "vel",
            OutputUnit::Acceleration => "acc",
            OutputUnit::Default => "def",
        }
    }
}

impl FromStr for OutputUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dis" | "displacement" => Ok(OutputUnit::Displacement),
            "vel" | "velocity" => Ok(OutputUnit::Velocity),
            "acc" | "acceleration" => Ok(OutputUnit::Acceleration),
            "def" | "default" => Ok(OutputUnit::Default),
            other => Err(format!(
                "unknown output unit '{}', expected one of dis, vel, acc, def",
                other
            )),
        }
    }
}

/// How a response-list (table form) channel is mapped onto the output frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ListMode {
    /// Report the table at its own frequencies.
    #[default]
    Native,
    /// Spline-interpolate the table onto the requested frequencies.
    InterpolateInput,
    /// Report the table at its own frequencies, replacing the request.
    InterpolateOutput,
}

/// Options threaded through parsing, normalization and evaluation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Stages included in the evaluation
    pub stages: StageRange,
    /// Scale by the documented (stage 0) sensitivity instead of the computed one
    pub use_documented_sensitivity: bool,
    /// Use the estimated delay of decimation stages instead of
    /// (applied correction - calculated delay) for asymmetric FIR filters
    pub use_estimated_delay: bool,
    /// Handling of response-list channels
    pub list_mode: ListMode,
    /// Units of the output response
    pub output_unit: OutputUnit,
    /// Input value (counts or volts) at which polynomial stages are evaluated
    pub polynomial_operating_point: Option<f64>,
    /// Skip unit decoding; every stage reports [`crate::Units::Default`]
    pub default_units: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            stages: StageRange::all(),
            use_documented_sensitivity: false,
            use_estimated_delay: false,
            list_mode: ListMode::Native,
            output_unit: OutputUnit::Velocity,
            polynomial_operating_point: None,
            default_units: false,
        }
    }
}

impl Options {
    /// Loads options from a JSON document; missing keys keep their default.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| RespError::Config(e.to_string()))
    }
}

/// Spacing of a generated frequency grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Spacing {
    #[default]
    Log,
    Linear,
}

impl FromStr for Spacing {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(Spacing::Log),
            "lin" | "linear" => Ok(Spacing::Linear),
            other => Err(format!("unknown spacing '{}', expected log or lin", other)),
        }
    }
}

/// Description of a regular frequency grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyGrid {
    pub min_freq: f64,
    pub max_freq: f64,
    pub count: usize,
    pub spacing: Spacing,
}

impl Default for FrequencyGrid {
    fn default() -> Self {
        Self {
            min_freq: 1.0,
            max_freq: 1.0,
            count: 1,
            spacing: Spacing::Log,
        }
    }
}

impl FrequencyGrid {
    /// Generates the grid, swapping reversed bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the count is zero, or if log spacing is
    /// requested with a non-positive lower bound.
    pub fn frequencies(&self) -> Result<Array1<f64>> {
        let (lo, hi) = if self.max_freq < self.min_freq {
            (self.max_freq, self.min_freq)
        } else {
            (self.min_freq, self.max_freq)
        };
        if self.count < 1 {
            return Err(RespError::Config(
                "frequency grid needs at least one frequency".to_string(),
            ));
        }
        if !lo.is_finite() || !hi.is_finite() {
            return Err(RespError::Config(format!(
                "frequency bounds must be finite (got {} and {})",
                lo, hi
            )));
        }
        match self.spacing {
            Spacing::Linear => Ok(Array1::linspace(lo, hi, self.count)),
            Spacing::Log => {
                if lo <= 0.0 {
                    return Err(RespError::Config(
                        "cannot use a non-positive frequency with logarithmic spacing".to_string(),
                    ));
                }
                if self.count == 1 {
                    return Ok(Array1::from_elem(1, lo));
                }
                Ok(Array1::logspace(10.0, lo.log10(), hi.log10(), self.count))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * b.abs().max(1.0)
    }

    #[test]
    fn test_stage_range_bounds() {
        let all = StageRange::all();
        assert!(all.contains(0) && all.contains(42));

        let from_two = StageRange::new(Some(2), None);
        assert!(!from_two.contains(1));
        assert!(from_two.contains(2) && from_two.contains(9));

        let up_to_three = StageRange::new(None, Some(3));
        assert!(up_to_three.contains(0) && up_to_three.contains(3));
        assert!(!up_to_three.contains(4));

        let only = StageRange::only(5);
        assert!(only.contains(5) && !only.contains(4) && !only.contains(6));
    }

    #[test]
    fn test_log_grid() {
        let grid = FrequencyGrid {
            min_freq: 0.01,
            max_freq: 100.0,
            count: 5,
            spacing: Spacing::Log,
        };
        let freqs = grid.frequencies().unwrap();
        let expected = [0.01, 0.1, 1.0, 10.0, 100.0];
        assert_eq!(freqs.len(), 5);
        for (f, e) in freqs.iter().zip(expected.iter()) {
            assert!(approx_eq(*f, *e, 1e-12), "got {} expected {}", f, e);
        }
    }

    #[test]
    fn test_reversed_linear_grid_is_swapped() {
        let grid = FrequencyGrid {
            min_freq: 10.0,
            max_freq: 0.0,
            count: 3,
            spacing: Spacing::Linear,
        };
        let freqs = grid.frequencies().unwrap();
        assert_eq!(freqs.to_vec(), vec![0.0, 5.0, 10.0]);
    }

    #[test]
    fn test_grid_errors() {
        let zero_log = FrequencyGrid {
            min_freq: 0.0,
            max_freq: 10.0,
            count: 10,
            spacing: Spacing::Log,
        };
        assert!(matches!(zero_log.frequencies(), Err(RespError::Config(_))));

        let empty = FrequencyGrid {
            count: 0,
            ..Default::default()
        };
        assert!(matches!(empty.frequencies(), Err(RespError::Config(_))));
    }

    #[test]
    fn test_single_frequency_grid() {
        let grid = FrequencyGrid {
            min_freq: 2.5,
            max_freq: 2.5,
            count: 1,
            spacing: Spacing::Log,
        };
        assert_eq!(grid.frequencies().unwrap().to_vec(), vec![2.5]);
    }

    #[test]
    fn test_options_from_json_keeps_defaults() {
        let options = Options::from_json_str(
            r#"{"use_estimated_delay": true, "output_unit": "Acceleration",
                "stages": {"start": 1, "stop": 3}}"#,
        )
        .unwrap();
        assert!(options.use_estimated_delay);
        assert_eq!(options.output_unit, OutputUnit::Acceleration);
        assert_eq!(options.stages, StageRange::new(Some(1), Some(3)));
        assert_eq!(options.list_mode, ListMode::Native);
        assert!(!options.use_documented_sensitivity);

        assert!(Options::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_output_unit_parsing() {
        assert_eq!("DIS".parse::<OutputUnit>(), Ok(OutputUnit::Displacement));
        assert_eq!("acc".parse::<OutputUnit>(), Ok(OutputUnit::Acceleration));
        assert_eq!("def".parse::<OutputUnit>(), Ok(OutputUnit::Default));
        assert!("joules".parse::<OutputUnit>().is_err());
    }
}
