//! Resampling of response lists onto requested frequencies.

use crate::error::{RespError, Result};
use crate::model::ResponseList;
use crate::spline::CubicSpline;

/// Relative distance under which a clipped frequency snaps to the list boundary.
const SNAP_TOL: f64 = 1e-6;

/// Removes 360° jumps from a phase sequence in degrees.
///
/// Each value is shifted by multiples of 360° until it is within 180° of the
/// previous unwrapped value (0 before the first one). The flag tells whether
/// any value was shifted.
pub fn unwrap_phase(phases: &[f64]) -> (Vec<f64>, bool) {
    let mut offset = 0.0;
    let mut previous = 0.0;
    let mut unwrapped = false;
    let values = phases
        .iter()
        .map(|&phase| {
            let mut value = phase + offset;
            while value - previous > 180.0 {
                offset -= 360.0;
                value -= 360.0;
            }
            while value - previous < -180.0 {
                offset += 360.0;
                value += 360.0;
            }
            unwrapped |= offset != 0.0;
            previous = value;
            value
        })
        .collect();
    (values, unwrapped)
}

/// Brings a phase in degrees into (-180°, 180°].
pub fn wrap_phase(phase: f64) -> f64 {
    phase - 360.0 * ((phase - 180.0) / 360.0).ceil()
}

/// Keeps the requested frequencies inside `[min, max]`.
///
/// A value just outside a boundary (within 1e-6 relative) is replaced by the
/// boundary itself.
fn clip_frequencies(requested: &[f64], min: f64, max: f64) -> Result<Vec<f64>> {
    let kept: Vec<f64> = requested
        .iter()
        .filter_map(|&f| {
            if f < min && (min - f).abs() < min.abs() * SNAP_TOL {
                Some(min)
            } else if f > max && (f - max).abs() < max.abs() * SNAP_TOL {
                Some(max)
            } else if (min..=max).contains(&f) {
                Some(f)
            } else {
                None
            }
        })
        .collect();
    if kept.is_empty() {
        return Err(RespError::NoFrequenciesInRange {
            requested: requested.len(),
            min,
            max,
        });
    }
    let clipped = requested.len() - kept.len();
    if clipped > 0 {
        log::warn!(
            "{} frequenc{} clipped outside the response list range [{:E}, {:E}] Hz",
            clipped,
            if clipped == 1 { "y" } else { "ies" },
            min,
            max
        );
    }
    Ok(kept)
}

/// Interpolates a response list at the requested frequencies.
///
/// Amplitude and unwrapped phase are fitted with natural cubic splines.
/// Frequencies outside the native range are dropped, so the result may be
/// shorter than the request.
///
/// # Errors
///
/// Returns `NoFrequenciesInRange` when no requested frequency falls inside the
/// native range.
pub fn interpolate_list(list: &ResponseList, requested: &[f64]) -> Result<ResponseList> {
    if list.is_empty() {
        return Err(RespError::NoFrequenciesInRange {
            requested: requested.len(),
            min: 0.0,
            max: 0.0,
        });
    }

    // the spline wants increasing knots
    let mut native = list.clone();
    if native.frequencies.first() > native.frequencies.last() {
        native.frequencies.reverse();
        native.amplitudes.reverse();
        native.phases.reverse();
    }
    let min = native.frequencies[0];
    let max = native.frequencies[native.len() - 1];
    let frequencies = clip_frequencies(requested, min, max)?;

    if native.len() == 1 {
        let n = frequencies.len();
        return Ok(ResponseList {
            frequencies,
            amplitudes: vec![native.amplitudes[0]; n],
            phases: vec![native.phases[0]; n],
        });
    }

    let amplitude_spline = CubicSpline::new(&native.frequencies, &native.amplitudes)?;
    let mut amplitudes = amplitude_spline.evaluate_all(&frequencies);
    let min_amplitude = native.amplitudes.iter().copied().fold(f64::INFINITY, f64::min);
    if min_amplitude > 0.0 {
        let floor = min_amplitude / 10.0;
        amplitudes
            .iter_mut()
            .filter(|a| **a <= 0.0)
            .for_each(|a| *a = floor);
    }

    let (unwrapped, was_unwrapped) = unwrap_phase(&native.phases);
    let phase_spline = CubicSpline::new(&native.frequencies, &unwrapped)?;
    let mut phases = phase_spline.evaluate_all(&frequencies);
    if was_unwrapped {
        phases.iter_mut().for_each(|p| *p = wrap_phase(*p));
    }

    Ok(ResponseList {
        frequencies,
        amplitudes,
        phases,
    })
}
