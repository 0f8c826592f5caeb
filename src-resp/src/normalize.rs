//! Gain normalization at the sensitivity frequency.
//!
//! After [`normalize`], every filter whose gain was reported at another
//! frequency is rescaled so that its transfer function has unit modulus at
//! the sensitivity frequency, and its gain is moved to that frequency. The
//! overall computed sensitivity is then simply the product of the stage gains.

use crate::calc::{main_response, stage_interval};
use crate::error::{RespError, Result};
use crate::model::{Channel, Filter, Gain};
use crate::options::StageRange;

/// Relative difference between computed and documented sensitivity above
/// which a warning is logged.
const SENSITIVITY_TOL: f64 = 0.05;

/// Sets the scale factor (a0 or h0) of a filter that has one.
fn set_scale(filter: &mut Filter, scale: f64) {
    match filter {
        Filter::PoleZero(pz) => pz.a0 = scale,
        Filter::Fir(fir) => fir.h0 = scale,
        Filter::IirCoefficients(iir) => iir.h0 = scale,
        _ => {}
    }
}

fn stage_gain_mut(filters: &mut [Filter]) -> Option<&mut Gain> {
    filters.iter_mut().find_map(|filter| match filter {
        Filter::Gain(gain) => Some(gain),
        _ => None,
    })
}

/// Frequency all gains are brought to: the documented sensitivity frequency,
/// or the last non-zero gain frequency when there is no sensitivity.
fn reference_frequency(channel: &Channel) -> f64 {
    if channel.sensitivity != 0.0 {
        return channel.sensitivity_freq;
    }
    channel
        .stages
        .iter()
        .rev()
        .filter_map(|stage| stage.gain())
        .find(|gain| gain.frequency != 0.0)
        .map_or(channel.sensitivity_freq, |gain| gain.frequency)
}

/// Normalizes the stages in `range` and computes the channel sensitivity.
///
/// Running it twice leaves the channel unchanged.
///
/// # Errors
///
/// Returns `Structure` when a gain is zero, when a lone stage has no gain,
/// or when a filter has a null response at one of the frequencies involved.
pub fn normalize(channel: &mut Channel, range: &StageRange) -> Result<()> {
    let functional: Vec<usize> = channel
        .stages
        .iter()
        .enumerate()
        .filter(|(_, stage)| stage.sequence != 0)
        .map(|(idx, _)| idx)
        .collect();

    if let [only] = functional.as_slice() {
        let stage = &channel.stages[*only];
        if stage.gain().is_none() && !channel.is_polynomial() {
            return Err(RespError::structure(stage.sequence, "stage has no gain"));
        }
    }

    if let Some(stage) = channel
        .stages
        .iter()
        .find(|stage| stage.gain().is_some_and(|gain| gain.value == 0.0))
    {
        return Err(RespError::structure(stage.sequence, "zero stage gain"));
    }

    let freq = reference_frequency(channel);
    let sncl = channel.sncl.to_string();
    let mut calc_sensitivity = 1.0;
    let mut skipped = false;

    for stage in channel.stages.iter_mut().filter(|stage| stage.sequence != 0) {
        if !range.contains(stage.sequence) {
            skipped = true;
            continue;
        }
        let sequence = stage.sequence;
        let dt = stage_interval(stage);
        let Some(gain) = stage.gain().copied() else {
            continue;
        };
        let a0_freq = match stage.main_filter() {
            Some(Filter::PoleZero(pz)) => Some(pz.a0_freq),
            _ => None,
        };

        let stale = gain.frequency != freq || a0_freq.is_some_and(|f| f != freq);
        let main = stage.filters.iter_mut().find(|filter| filter.is_main());
        let gain = match main {
            Some(main) if stale && main_response(main, freq, dt).is_some() => {
                set_scale(main, 1.0);
                // both are Some: the response only depends on the filter kind
                let at_gain = main_response(main, gain.frequency, dt).map_or(0.0, |h| h.norm());
                let at_freq = main_response(main, freq, dt).map_or(0.0, |h| h.norm());
                if at_gain == 0.0 || at_freq == 0.0 {
                    return Err(RespError::structure(
                        sequence,
                        format!(
                            "null {} response at {:E} Hz or {:E} Hz, cannot normalize the gain",
                            main.short_name(),
                            gain.frequency,
                            freq
                        ),
                    ));
                }
                set_scale(main, 1.0 / at_freq);
                if let Filter::PoleZero(pz) = main {
                    pz.a0_freq = freq;
                }
                log::debug!(
                    "stage {} of {}: gain {:E} at {:E} Hz moved to {:E} Hz",
                    sequence,
                    sncl,
                    gain.value,
                    gain.frequency,
                    freq
                );
                Gain {
                    value: gain.value / at_gain * at_freq,
                    frequency: freq,
                }
            }
            _ => gain,
        };
        if let Some(slot) = stage_gain_mut(&mut stage.filters) {
            *slot = gain;
        }
        calc_sensitivity *= gain.value;
    }

    channel.calc_sensitivity = calc_sensitivity;
    if functional.len() == 1 {
        channel.sensitivity = calc_sensitivity;
    }
    if !skipped && channel.sensitivity != 0.0 {
        let diff = (channel.sensitivity - calc_sensitivity).abs() / channel.sensitivity.abs();
        if diff >= SENSITIVITY_TOL {
            log::warn!(
                "computed sensitivity {:E} differs from the documented {:E} by {:.1}% for {}",
                calc_sensitivity,
                channel.sensitivity,
                diff * 100.0,
                sncl
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::analog_response;
    use crate::model::{PoleZero, PoleZeroKind, Stage};
    use crate::units::Units;
    use num_complex::Complex64;
    use std::f64::consts::PI;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * b.abs().max(1e-12)
    }

    fn pole_zero(a0: f64, a0_freq: f64) -> PoleZero {
        PoleZero {
            kind: PoleZeroKind::Laplace,
            a0,
            a0_freq,
            zeros: vec![Complex64::new(0.0, 0.0)],
            poles: vec![Complex64::new(-2.0 * PI, 0.0), Complex64::new(-20.0, 5.0)],
        }
    }

    fn gain(value: f64, frequency: f64) -> Filter {
        Filter::Gain(Gain { value, frequency })
    }

    fn seismometer(stage_gain: f64, gain_freq: f64, sensitivity: f64, sens_freq: f64) -> Channel {
        Channel {
            stages: vec![
                Stage {
                    sequence: 1,
                    input: Units::Velocity,
                    output: Units::Volts,
                    input_name: "M/S".to_string(),
                    filters: vec![
                        Filter::PoleZero(pole_zero(7.0, gain_freq)),
                        gain(stage_gain, gain_freq),
                    ],
                },
                Stage {
                    sequence: 2,
                    input: Units::Volts,
                    output: Units::Counts,
                    input_name: "V".to_string(),
                    filters: vec![gain(10.0, 1.0)],
                },
                Stage {
                    sequence: 0,
                    filters: vec![gain(sensitivity, sens_freq)],
                    ..Default::default()
                },
            ],
            sensitivity,
            sensitivity_freq: sens_freq,
            unit_scale: 1.0,
            ..Default::default()
        }
    }

    fn main_pz(channel: &Channel) -> &PoleZero {
        match channel.stages[0].main_filter() {
            Some(Filter::PoleZero(pz)) => pz,
            other => panic!("expected a pole-zero filter, got {:?}", other),
        }
    }

    #[test]
    fn test_gain_moved_to_sensitivity_frequency() {
        let mut channel = seismometer(100.0, 1.0, 1000.0, 5.0);
        normalize(&mut channel, &StageRange::all()).unwrap();

        let pz = main_pz(&channel);
        assert_eq!(pz.a0_freq, 5.0);
        assert!(approx_eq(analog_response(pz, 5.0).norm(), 1.0, 1e-12));

        let unity = pole_zero(1.0, 1.0);
        let expected = 100.0 / analog_response(&unity, 1.0).norm()
            * analog_response(&unity, 5.0).norm();
        let stage_gain = channel.stages[0].gain().unwrap();
        assert!(approx_eq(stage_gain.value, expected, 1e-12));
        assert_eq!(stage_gain.frequency, 5.0);
        assert!(approx_eq(channel.calc_sensitivity, expected * 10.0, 1e-12));
        // two functional stages: the documented value is kept
        assert_eq!(channel.sensitivity, 1000.0);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut channel = seismometer(100.0, 1.0, 1000.0, 5.0);
        normalize(&mut channel, &StageRange::all()).unwrap();
        let once = channel.clone();
        normalize(&mut channel, &StageRange::all()).unwrap();
        assert_eq!(channel, once);
    }

    #[test]
    fn test_consistent_gain_is_not_rescaled() {
        let mut channel = seismometer(100.0, 5.0, 1000.0, 5.0);
        let before = main_pz(&channel).clone();
        normalize(&mut channel, &StageRange::all()).unwrap();
        assert_eq!(main_pz(&channel), &before);
        assert_eq!(channel.calc_sensitivity, 1000.0);
    }

    #[test]
    fn test_missing_sensitivity_uses_last_gain_frequency() {
        let mut channel = seismometer(100.0, 1.0, 0.0, 0.0);
        channel.stages.pop();
        channel.stages[1].filters = vec![gain(10.0, 2.0)];
        normalize(&mut channel, &StageRange::all()).unwrap();
        assert_eq!(main_pz(&channel).a0_freq, 2.0);
    }

    #[test]
    fn test_zero_gain_is_rejected() {
        let mut channel = seismometer(0.0, 1.0, 1000.0, 5.0);
        assert!(matches!(
            normalize(&mut channel, &StageRange::all()),
            Err(RespError::Structure { stage: 1, .. })
        ));
    }

    #[test]
    fn test_single_stage_sensitivity_is_computed() {
        let mut channel = seismometer(100.0, 5.0, 1000.0, 5.0);
        channel.stages.remove(1);
        normalize(&mut channel, &StageRange::all()).unwrap();
        assert_eq!(channel.calc_sensitivity, 100.0);
        assert_eq!(channel.sensitivity, 100.0);
    }

    #[test]
    fn test_stages_out_of_range_are_not_counted() {
        let mut channel = seismometer(100.0, 5.0, 1000.0, 5.0);
        normalize(&mut channel, &StageRange::only(2)).unwrap();
        assert_eq!(channel.calc_sensitivity, 10.0);
        assert_eq!(main_pz(&channel).a0, 7.0);
    }

    #[test]
    fn test_missing_first_gain_is_not_taken_from_the_sensitivity() {
        let mut channel = seismometer(100.0, 5.0, 1000.0, 5.0);
        channel.stages[0]
            .filters
            .retain(|filter| !matches!(filter, Filter::Gain(_)));
        normalize(&mut channel, &StageRange::all()).unwrap();
        assert!(channel.stages[0].gain().is_none());
        assert_eq!(channel.calc_sensitivity, 10.0);
    }

    #[test]
    fn test_lone_stage_without_gain_is_rejected() {
        let mut channel = seismometer(100.0, 5.0, 1000.0, 5.0);
        channel.stages.remove(1);
        channel.stages[0]
            .filters
            .retain(|filter| !matches!(filter, Filter::Gain(_)));
        assert!(matches!(
            normalize(&mut channel, &StageRange::all()),
            Err(RespError::Structure { stage: 1, .. })
        ));
    }
}
