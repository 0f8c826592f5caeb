//! Channel model: a response chain of stages holding filter elements.
//!
//! A [`Channel`] is created by the reader, canonicalized in place by the
//! validator and only read by the calculator.

use crate::units::Units;
use chrono::NaiveDateTime;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Station, network, location and channel codes identifying a channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sncl {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

impl fmt::Display for Sncl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

/// Kind of a pole-zero filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoleZeroKind {
    /// Roots in rad/s, evaluated at s = j2πf
    Laplace,
    /// Roots in Hz, evaluated at s = jf
    Analog,
    /// Roots in the z plane, evaluated on the unit circle
    DigitalIir,
}

/// Pole-zero transfer function `a0 * Π(s - z) / Π(s - p)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoleZero {
    pub kind: PoleZeroKind,
    pub a0: f64,
    pub a0_freq: f64,
    pub zeros: Vec<Complex64>,
    pub poles: Vec<Complex64>,
}

/// Symmetry of a FIR filter's taps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FirSymmetry {
    /// Odd number of taps; the first half plus the center tap are stored
    SymOdd,
    /// Even number of taps; the first half is stored
    SymEven,
    /// Every tap is stored
    Asym,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fir {
    pub symmetry: FirSymmetry,
    pub coefficients: Vec<f64>,
    pub h0: f64,
}

impl Fir {
    /// Length of the full impulse response the stored taps describe.
    pub fn full_length(&self) -> usize {
        let n = self.coefficients.len();
        match self.symmetry {
            FirSymmetry::SymOdd => (2 * n).saturating_sub(1),
            FirSymmetry::SymEven => 2 * n,
            FirSymmetry::Asym => n,
        }
    }
}

/// Digital IIR filter given by numerator and denominator coefficients in z⁻¹.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IirCoefficients {
    pub numerator: Vec<f64>,
    pub denominator: Vec<f64>,
    pub h0: f64,
}

/// Tabulated response: amplitude and phase (degrees) at given frequencies.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResponseList {
    pub frequencies: Vec<f64>,
    pub amplitudes: Vec<f64>,
    pub phases: Vec<f64>,
}

impl ResponseList {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn extend(&mut self, other: ResponseList) {
        self.frequencies.extend(other.frequencies);
        self.amplitudes.extend(other.amplitudes);
        self.phases.extend(other.phases);
    }
}

/// Corner frequencies and slopes of a generic response; informational only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Generic {
    pub corner_freqs: Vec<f64>,
    pub corner_slopes: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decimation {
    /// Input sample interval in seconds (0 when the input rate is 0)
    pub sample_interval: f64,
    pub factor: u32,
    pub offset: u32,
    pub estimated_delay: f64,
    pub applied_correction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gain {
    pub value: f64,
    pub frequency: f64,
}

/// MacLaurin polynomial response of a non-linear sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    pub approximation_type: char,
    pub frequency_units: char,
    pub lower_valid_freq: f64,
    pub upper_valid_freq: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub max_error: f64,
    pub coefficients: Vec<f64>,
    pub coefficient_errors: Vec<f64>,
}

/// One element of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    PoleZero(PoleZero),
    Fir(Fir),
    IirCoefficients(IirCoefficients),
    List(ResponseList),
    Generic(Generic),
    Decimation(Decimation),
    Gain(Gain),
    Polynomial(Polynomial),
}

impl Filter {
    /// Get the short name of the filter kind (e.g., "PZ", "FIR")
    pub fn short_name(&self) -> &'static str {
        match self {
            Filter::PoleZero(pz) => match pz.kind {
                PoleZeroKind::Laplace => "PZ-LAPLACE",
                PoleZeroKind::Analog => "PZ-ANALOG",
                PoleZeroKind::DigitalIir => "PZ-IIR",
            },
            Filter::Fir(fir) => match fir.symmetry {
                FirSymmetry::SymOdd => "FIR-SYM1",
                FirSymmetry::SymEven => "FIR-SYM2",
                FirSymmetry::Asym => "FIR-ASYM",
            },
            Filter::IirCoefficients(_) => "IIR-COEFFS",
            Filter::List(_) => "LIST",
            Filter::Generic(_) => "GENERIC",
            Filter::Decimation(_) => "DECIMATION",
            Filter::Gain(_) => "GAIN",
            Filter::Polynomial(_) => "POLYNOMIAL",
        }
    }

    /// True for elements that shape the response (everything but decimation and gain).
    pub fn is_main(&self) -> bool {
        !matches!(self, Filter::Decimation(_) | Filter::Gain(_))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::PoleZero(pz) => write!(
                f,
                "{} A0={:.6E} at {:.6E} Hz, {} zeros, {} poles",
                self.short_name(),
                pz.a0,
                pz.a0_freq,
                pz.zeros.len(),
                pz.poles.len()
            ),
            Filter::Fir(fir) => write!(
                f,
                "{} {} coefficients",
                self.short_name(),
                fir.coefficients.len()
            ),
            Filter::IirCoefficients(iir) => write!(
                f,
                "{} {} numerators, {} denominators",
                self.short_name(),
                iir.numerator.len(),
                iir.denominator.len()
            ),
            Filter::List(list) => write!(f, "{} {} values", self.short_name(), list.len()),
            Filter::Generic(generic) => write!(
                f,
                "{} {} corners",
                self.short_name(),
                generic.corner_freqs.len()
            ),
            Filter::Decimation(deci) => write!(
                f,
                "{} factor {}, input interval {:.6E} s",
                self.short_name(),
                deci.factor,
                deci.sample_interval
            ),
            Filter::Gain(gain) => write!(
                f,
                "{} {:.6E} at {:.6E} Hz",
                self.short_name(),
                gain.value,
                gain.frequency
            ),
            Filter::Polynomial(poly) => write!(
                f,
                "{} {} coefficients",
                self.short_name(),
                poly.coefficients.len()
            ),
        }
    }
}

/// A filter stage: a sequence number, its units and its elements.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Stage {
    pub sequence: u32,
    pub input: Units,
    pub output: Units,
    /// Raw input unit description, kept for the unit scale of the first stage
    pub input_name: String,
    pub filters: Vec<Filter>,
}

impl Stage {
    pub fn new(sequence: u32) -> Self {
        Self {
            sequence,
            ..Default::default()
        }
    }

    /// The element that shapes the response, if any.
    pub fn main_filter(&self) -> Option<&Filter> {
        self.filters.iter().find(|filter| filter.is_main())
    }

    pub fn decimation(&self) -> Option<&Decimation> {
        self.filters.iter().find_map(|filter| match filter {
            Filter::Decimation(deci) => Some(deci),
            _ => None,
        })
    }

    pub fn gain(&self) -> Option<&Gain> {
        self.filters.iter().find_map(|filter| match filter {
            Filter::Gain(gain) => Some(gain),
            _ => None,
        })
    }

    /// A stage holding nothing but a gain.
    pub fn is_gain_only(&self) -> bool {
        !self.filters.is_empty() && self.filters.iter().all(|f| matches!(f, Filter::Gain(_)))
    }

    /// True when the stage carries unit information.
    pub fn has_units(&self) -> bool {
        self.input != Units::Undefined || self.output != Units::Undefined
    }
}

/// One channel epoch and its response chain.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Channel {
    pub sncl: Sncl,
    pub start: Option<NaiveDateTime>,
    /// `None` for an open epoch ("No Ending Time")
    pub end: Option<NaiveDateTime>,
    pub stages: Vec<Stage>,
    /// Documented overall sensitivity (stage 0), 0 when absent
    pub sensitivity: f64,
    pub sensitivity_freq: f64,
    pub calc_sensitivity: f64,
    /// Accumulated FIR group delay in seconds
    pub calc_delay: f64,
    pub estimated_delay: f64,
    pub applied_correction: f64,
    /// Output sample interval of the whole chain
    pub sample_interval: f64,
    /// Multiplier turning nm, mm or cm based responses into per-meter ones
    pub unit_scale: f64,
}

impl Channel {
    pub fn new(sncl: Sncl) -> Self {
        Self {
            sncl,
            unit_scale: 1.0,
            ..Default::default()
        }
    }

    /// True when the chain is a single response list.
    pub fn is_list(&self) -> bool {
        self.list().is_some()
    }

    /// The response list of a table-form channel.
    pub fn list(&self) -> Option<&ResponseList> {
        self.stages
            .iter()
            .flat_map(|stage| stage.filters.iter())
            .find_map(|filter| match filter {
                Filter::List(list) => Some(list),
                _ => None,
            })
    }

    pub fn is_polynomial(&self) -> bool {
        self.stages
            .iter()
            .flat_map(|stage| stage.filters.iter())
            .any(|filter| matches!(filter, Filter::Polynomial(_)))
    }

    /// Input units of the first stage that declares units.
    pub fn input_units(&self) -> Units {
        self.stages
            .iter()
            .find(|stage| stage.has_units())
            .map(|stage| stage.input)
            .unwrap_or_default()
    }
}

fn format_epoch(epoch: Option<NaiveDateTime>, open: &str) -> String {
    epoch
        .map(|t| t.format("%Y,%j,%H:%M:%S").to_string())
        .unwrap_or_else(|| open.to_string())
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--------------------------------------------------")?;
        writeln!(f, "  {}", self.sncl)?;
        writeln!(
            f,
            "  epoch: {} -> {}",
            format_epoch(self.start, "?"),
            format_epoch(self.end, "No Ending Time")
        )?;
        writeln!(
            f,
            "  input units: {}, output units: {}",
            self.input_units(),
            self.stages
                .iter()
                .rev()
                .find(|stage| stage.has_units())
                .map(|stage| stage.output)
                .unwrap_or_default()
        )?;
        writeln!(
            f,
            "  documented sensitivity: {:.6E} at {:.6E} Hz",
            self.sensitivity, self.sensitivity_freq
        )?;
        writeln!(f, "  computed sensitivity: {:.6E}", self.calc_sensitivity)?;
        writeln!(
            f,
            "  delays (s): computed {:.6E}, estimated {:.6E}, applied {:.6E}",
            self.calc_delay, self.estimated_delay, self.applied_correction
        )?;
        if self.sample_interval > 0.0 {
            writeln!(f, "  output sample rate: {:.6E} Hz", 1.0 / self.sample_interval)?;
        }
        for stage in &self.stages {
            let kinds: Vec<String> = stage.filters.iter().map(|filter| filter.to_string()).collect();
            writeln!(f, "  stage {:>2}: {}", stage.sequence, kinds.join("; "))?;
        }
        write!(f, "--------------------------------------------------")
    }
}
