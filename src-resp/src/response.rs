//! Computed responses and their text renderings.

use crate::interpolate::unwrap_phase;
use crate::model::Sncl;
use ndarray::Array1;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::str::FromStr;

/// Frequency response of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub sncl: Sncl,
    /// Frequencies in Hz
    pub frequencies: Array1<f64>,
    /// Complex response at each frequency
    pub values: Array1<Complex64>,
}

/// Text layouts of a response, named after the classic output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// frequency, amplitude, phase
    Fap,
    Amplitude,
    Phase,
    /// frequency, real, imaginary
    Spectra,
}

impl OutputFormat {
    pub fn prefix(&self) -> &'static str {
        match self {
            OutputFormat::Fap => "FAP",
            OutputFormat::Amplitude => "AMP",
            OutputFormat::Phase => "PHASE",
            OutputFormat::Spectra => "SPECTRA",
        }
    }
}

/// Response type flag: `ap` (amplitude and phase files), `cs` (complex
/// spectra) or `fap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseType {
    AmplitudePhase,
    ComplexSpectra,
    #[default]
    Fap,
}

impl ResponseType {
    /// Formats written for this response type.
    pub fn formats(&self) -> &'static [OutputFormat] {
        match self {
            ResponseType::AmplitudePhase => &[OutputFormat::Amplitude, OutputFormat::Phase],
            ResponseType::ComplexSpectra => &[OutputFormat::Spectra],
            ResponseType::Fap => &[OutputFormat::Fap],
        }
    }
}

impl FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ap" => Ok(ResponseType::AmplitudePhase),
            "cs" => Ok(ResponseType::ComplexSpectra),
            "fap" => Ok(ResponseType::Fap),
            _ => Err(format!("unknown response type '{}' (expected ap, cs or fap)", s)),
        }
    }
}

/// Formats like C's `%.6E`: six decimals and an exponent of at least two digits.
pub fn format_exp(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string().to_uppercase();
    }
    let formatted = format!("{:.6E}", value);
    match formatted.split_once('E') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}E{}{:02}", mantissa, sign, exponent.abs())
        }
        None => formatted,
    }
}

impl Response {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn amplitudes(&self) -> Array1<f64> {
        self.values.mapv(|v| v.norm())
    }

    /// Phase in degrees, in (-180°, 180°].
    pub fn phases(&self) -> Array1<f64> {
        self.values.mapv(|v| v.im.atan2(v.re + 1e-200).to_degrees())
    }

    /// Phase in degrees without 360° jumps.
    pub fn unwrapped_phases(&self) -> Array1<f64> {
        let phases = self.phases();
        let (values, _) = unwrap_phase(phases.as_slice().unwrap_or(&[]));
        Array1::from_vec(values)
    }

    /// Name of the file holding this response in `format`, e.g. `FAP.IU.ANMO.00.BHZ`.
    pub fn file_name(&self, format: OutputFormat) -> String {
        format!("{}.{}", format.prefix(), self.sncl)
    }

    /// Renders the response as text, one line per frequency.
    pub fn render(&self, format: OutputFormat, unwrap: bool) -> String {
        let amplitudes = self.amplitudes();
        let phases = if unwrap {
            self.unwrapped_phases()
        } else {
            self.phases()
        };
        let mut out = String::with_capacity(self.len() * 45);
        for (i, freq) in self.frequencies.iter().enumerate() {
            let columns = match format {
                OutputFormat::Fap => vec![*freq, amplitudes[i], phases[i]],
                OutputFormat::Amplitude => vec![*freq, amplitudes[i]],
                OutputFormat::Phase => vec![*freq, phases[i]],
                OutputFormat::Spectra => vec![*freq, self.values[i].re, self.values[i].im],
            };
            let line: Vec<String> = columns.into_iter().map(format_exp).collect();
            // writing to a String cannot fail
            let _ = writeln!(out, "{}", line.join("  "));
        }
        out
    }
}
