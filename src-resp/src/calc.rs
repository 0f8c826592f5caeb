//! Transfer functions of the filter elements and their composition.

use crate::error::{RespError, Result};
use crate::model::{
    Channel, Filter, Fir, FirSymmetry, IirCoefficients, PoleZero, PoleZeroKind, Polynomial,
    ResponseList, Stage,
};
use crate::options::{Options, OutputUnit, StageRange};
use crate::units::Units;
use ndarray::Array1;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Response of an analog or Laplace pole-zero filter at `freq` Hz.
///
/// Laplace roots are in rad/s and use s = j2πf, analog roots are in Hz and use s = jf.
pub fn analog_response(pz: &PoleZero, freq: f64) -> Complex64 {
    let omega = match pz.kind {
        PoleZeroKind::Laplace => 2.0 * PI * freq,
        _ => freq,
    };
    let s = Complex64::new(0.0, omega);
    let numerator: Complex64 = pz.zeros.iter().map(|z| s - z).product();
    let denominator: Complex64 = pz.poles.iter().map(|p| s - p).product();
    numerator / denominator * pz.a0
}

/// Response of a digital pole-zero filter on the unit circle at angular frequency `w`.
pub fn iir_pole_zero_response(pz: &PoleZero, w: f64, sample_interval: f64) -> Complex64 {
    let wt = w * sample_interval;
    let (s, c) = wt.sin_cos();
    let mut modulus = 1.0;
    let mut phase = 0.0;
    for zero in &pz.zeros {
        let (re, im) = (c - zero.re, s - zero.im);
        modulus *= re.hypot(im);
        if re != 0.0 || im != 0.0 {
            phase += im.atan2(re);
        }
    }
    for pole in &pz.poles {
        let (re, im) = (c - pole.re, s - pole.im);
        modulus /= re.hypot(im);
        if re != 0.0 || im != 0.0 {
            phase -= im.atan2(re);
        }
    }
    Complex64::from_polar(modulus, phase) * pz.a0
}

/// Response of a symmetric FIR filter (zero phase, the delay is implied).
pub fn fir_symmetric_response(fir: &Fir, w: f64, sample_interval: f64) -> Complex64 {
    let wt = w * sample_interval;
    let a = &fir.coefficients;
    let na = a.len();
    if na == 0 {
        return Complex64::new(0.0, 0.0);
    }
    let re = match fir.symmetry {
        FirSymmetry::SymOdd => {
            let r: f64 = a[..na - 1]
                .iter()
                .enumerate()
                .map(|(k, c)| c * (wt * (na - k - 1) as f64).cos())
                .sum();
            a[na - 1] + 2.0 * r
        }
        _ => {
            let r: f64 = a
                .iter()
                .enumerate()
                .map(|(k, c)| c * (wt * ((na - k - 1) as f64 + 0.5)).cos())
                .sum();
            2.0 * r
        }
    };
    Complex64::new(re * fir.h0, 0.0)
}

/// Response of an asymmetric FIR filter, with the linear-phase term of its
/// group delay added back.
pub fn fir_asymmetric_response(fir: &Fir, w: f64, sample_interval: f64) -> Complex64 {
    let wt = w * sample_interval;
    let a = &fir.coefficients;
    let na = a.len();
    if na == 0 {
        return Complex64::new(0.0, 0.0);
    }
    if a.iter().all(|&c| c == a[0]) {
        // boxcar: closed form of the geometric sum
        let re = if wt == 0.0 {
            1.0
        } else {
            (wt / 2.0 * na as f64).sin() / (wt / 2.0).sin() * a[0]
        };
        return Complex64::new(re, 0.0);
    }
    let (mut re, mut im) = (0.0, 0.0);
    for (k, c) in a.iter().enumerate() {
        let (s, co) = (wt * k as f64).sin_cos();
        re += c * co;
        im -= c * s;
    }
    let modulus = re.hypot(im);
    let phase = im.atan2(re) + w * ((na - 1) as f64 / 2.0) * sample_interval;
    Complex64::from_polar(modulus, phase) * fir.h0
}

/// Response of a digital IIR filter given by its coefficients in z⁻¹.
pub fn iir_coefficients_response(iir: &IirCoefficients, w: f64, sample_interval: f64) -> Complex64 {
    let wt = w * sample_interval;
    let polynomial = |coefficients: &[f64]| -> Complex64 {
        coefficients
            .iter()
            .enumerate()
            .map(|(k, c)| Complex64::from_polar(*c, -(k as f64) * wt))
            .sum()
    };
    let numerator = polynomial(iir.numerator.as_slice());
    let denominator = polynomial(iir.denominator.as_slice());
    let amplitude = numerator.norm() / denominator.norm();
    let phase = numerator.im.atan2(numerator.re) - denominator.im.atan2(denominator.re);
    Complex64::from_polar(amplitude, phase) * iir.h0
}

/// Derivative of the MacLaurin series at the operating point `x`.
///
/// # Errors
///
/// Returns a domain error when `x <= 0`.
pub fn polynomial_response(poly: &Polynomial, x: f64) -> Result<Complex64> {
    if x <= 0.0 || !x.is_finite() {
        return Err(RespError::Domain(format!(
            "cannot compute a polynomial response for a non-positive input ({})",
            x
        )));
    }
    let amplitude: f64 = poly
        .coefficients
        .iter()
        .enumerate()
        .skip(1)
        .map(|(j, c)| c * j as f64 * x.powi(j as i32 - 1))
        .sum();
    let phase = if amplitude >= 0.0 { 0.0 } else { PI };
    Ok(Complex64::from_polar(amplitude.abs(), phase))
}

/// Value of a response list at row `index`, phase given in degrees.
pub fn list_response(list: &ResponseList, index: usize) -> Option<Complex64> {
    let amplitude = list.amplitudes.get(index)?;
    let phase = list.phases.get(index)?;
    Some(Complex64::from_polar(*amplitude, phase.to_radians()))
}

/// Phase shift equivalent to a time shift of `delay` seconds.
pub fn time_shift(delay: f64, w: f64) -> Complex64 {
    Complex64::from_polar(1.0, w * delay)
}

/// Sample interval of a stage, taken from its decimation (0 without one).
pub(crate) fn stage_interval(stage: &Stage) -> f64 {
    stage.decimation().map_or(0.0, |deci| deci.sample_interval)
}

/// Evaluates a main filter element at `freq` Hz.
///
/// Returns `None` for elements that do not shape the response: digital
/// pole-zero filters without roots, FIR filters without taps, generic
/// responses, and the elements that need more context (lists, polynomials).
pub(crate) fn main_response(filter: &Filter, freq: f64, sample_interval: f64) -> Option<Complex64> {
    let w = 2.0 * PI * freq;
    match filter {
        Filter::PoleZero(pz) => match pz.kind {
            PoleZeroKind::Laplace | PoleZeroKind::Analog => Some(analog_response(pz, freq)),
            PoleZeroKind::DigitalIir => {
                if pz.zeros.is_empty() && pz.poles.is_empty() {
                    None
                } else {
                    Some(iir_pole_zero_response(pz, w, sample_interval))
                }
            }
        },
        Filter::Fir(fir) if fir.coefficients.is_empty() => None,
        Filter::Fir(fir) => Some(match fir.symmetry {
            FirSymmetry::Asym => fir_asymmetric_response(fir, w, sample_interval),
            _ => fir_symmetric_response(fir, w, sample_interval),
        }),
        Filter::IirCoefficients(iir) => Some(iir_coefficients_response(iir, w, sample_interval)),
        _ => None,
    }
}

/// Delay correction of a decimation following `main`.
///
/// Only asymmetric FIR filters need one; symmetric ones are zero phase and
/// IIR coefficient filters have no group delay to compensate.
fn decimation_delay(main: Option<&Filter>, stage: &Stage, use_estimated_delay: bool) -> Option<f64> {
    let deci = stage.decimation()?;
    let taps = match main? {
        Filter::Fir(fir) => fir.full_length(),
        Filter::IirCoefficients(_) => 1,
        _ => 0,
    };
    if taps == 0 {
        return None;
    }
    match main {
        Some(Filter::Fir(fir)) if fir.symmetry == FirSymmetry::Asym && !fir.coefficients.is_empty() => {
            if use_estimated_delay {
                Some(deci.estimated_delay)
            } else {
                let calculated = (taps as f64 - 1.0) / 2.0 * deci.sample_interval;
                Some(deci.applied_correction - calculated)
            }
        }
        _ => Some(0.0),
    }
}

/// Response of one stage at row `index` of `frequencies`.
fn stage_response(
    stage: &Stage,
    freq: f64,
    index: usize,
    options: &Options,
) -> Result<Complex64> {
    let w = 2.0 * PI * freq;
    let dt = stage_interval(stage);
    let main = stage.main_filter();
    let mut value = Complex64::new(1.0, 0.0);
    for filter in &stage.filters {
        let factor = match filter {
            Filter::List(list) => Some(list_response(list, index).ok_or_else(|| {
                RespError::structure(
                    stage.sequence,
                    format!("response list has no row {} for {} Hz", index, freq),
                )
            })?),
            Filter::Polynomial(poly) => {
                let x = options.polynomial_operating_point.ok_or_else(|| {
                    RespError::Domain(
                        "a polynomial stage needs a positive operating point".to_string(),
                    )
                })?;
                Some(polynomial_response(poly, x)?)
            }
            Filter::Decimation(_) => decimation_delay(main, stage, options.use_estimated_delay)
                .map(|delay| time_shift(delay, w)),
            Filter::Gain(_) => None,
            other => main_response(other, freq, dt),
        };
        if let Some(factor) = factor {
            value *= factor;
        }
    }
    Ok(value)
}

/// Converts a response to the requested output units.
///
/// Only ground-motion inputs are converted. At ω = 0, results in
/// displacement or acceleration that need a division by ω are exactly 0.
pub fn convert_units(value: Complex64, input: Units, output: OutputUnit, w: f64) -> Complex64 {
    if output == OutputUnit::Default || !input.is_ground_motion() {
        return value;
    }
    let target = match output {
        OutputUnit::Displacement => Units::Displacement,
        OutputUnit::Velocity => Units::Velocity,
        OutputUnit::Acceleration => Units::Acceleration,
        OutputUnit::Default => return value,
    };
    if input == target {
        return value;
    }
    let integrate = |v: Complex64| {
        if w != 0.0 {
            v * Complex64::new(0.0, -1.0 / w)
        } else {
            Complex64::new(0.0, 0.0)
        }
    };
    let differentiate = |v: Complex64| v * Complex64::new(0.0, w);
    // to velocity first
    let velocity = match input {
        Units::Displacement => integrate(value),
        Units::Acceleration => differentiate(value),
        _ => value,
    };
    match target {
        Units::Displacement => differentiate(velocity),
        Units::Acceleration => integrate(velocity),
        _ => velocity,
    }
}

fn has_match(channel: &Channel, range: &StageRange) -> bool {
    channel.stages.iter().any(|stage| range.contains(stage.sequence))
}

/// Evaluates a validated and normalized channel at `frequencies`.
///
/// Gains are not applied per stage: the product of the transfer functions is
/// scaled by the computed sensitivity (the product of the gains of the
/// stages in range, see [`crate::normalize`]) or by the documented one.
///
/// # Errors
///
/// * `NoStageMatched` when the stage range selects nothing
/// * `Domain` when a polynomial stage cannot be evaluated
pub fn calculate(
    channel: &Channel,
    frequencies: &Array1<f64>,
    options: &Options,
) -> Result<Array1<Complex64>> {
    let range = options.stages;
    if !has_match(channel, &range) {
        return Err(RespError::NoStageMatched {
            range: range.to_string(),
        });
    }
    let input = channel.input_units();
    let sensitivity = if options.use_documented_sensitivity {
        channel.sensitivity
    } else {
        channel.calc_sensitivity
    };
    let mut values = Array1::from_elem(frequencies.len(), Complex64::new(0.0, 0.0));
    for (index, (&freq, value)) in frequencies.iter().zip(values.iter_mut()).enumerate() {
        let mut total = Complex64::new(1.0, 0.0);
        for stage in channel.stages.iter().filter(|s| range.contains(s.sequence)) {
            total *= stage_response(stage, freq, index, options)?;
        }
        let w = 2.0 * PI * freq;
        *value = convert_units(total * sensitivity * channel.unit_scale, input, options.output_unit, w);
    }
    Ok(values)
}
