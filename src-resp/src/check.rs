//! Validation and canonicalization of a parsed channel.

use crate::error::{RespError, Result};
use crate::model::{Channel, Decimation, Filter, Fir, FirSymmetry, Gain, PoleZeroKind};
use crate::units::Units;

/// Tolerance on the sum of FIR taps before they are renormalized.
const FIR_NORM_TOL: f64 = 0.02;

/// Relative tolerance when comparing mirrored FIR taps.
const SYMMETRY_TOL: f64 = 1e-9;

fn nearly_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= SYMMETRY_TOL * a.abs().max(b.abs())
}

/// Renormalizes the taps of an asymmetric FIR filter whose DC gain is not 1,
/// then stores it in symmetric form when its taps are mirrored.
fn canonical_fir(fir: &mut Fir, sncl: &str) {
    if fir.symmetry != FirSymmetry::Asym {
        return;
    }
    let sum: f64 = fir.coefficients.iter().sum();
    if !fir.coefficients.is_empty() && sum != 0.0 && (sum - 1.0).abs() > FIR_NORM_TOL {
        log::warn!("FIR normalized: sum[coef]={:E}; {}", sum, sncl);
        fir.coefficients.iter_mut().for_each(|c| *c /= sum);
    }

    let c = &fir.coefficients;
    let nc = c.len();
    if nc % 2 == 0 {
        let n0 = nc / 2;
        if (0..n0).all(|k| nearly_equal(c[n0 + k], c[n0 - k - 1])) {
            fir.symmetry = FirSymmetry::SymEven;
            fir.coefficients.truncate(n0);
        }
    } else {
        let n0 = (nc - 1) / 2;
        if (1..nc - n0).all(|k| nearly_equal(c[n0 + k], c[n0 - k])) {
            fir.symmetry = FirSymmetry::SymOdd;
            fir.coefficients.truncate(nc - n0);
        }
    }
}

/// Joins continuation elements: consecutive lists, and consecutive FIR
/// blocks of the same symmetry.
fn merge_continuations(filters: Vec<Filter>, sequence: u32) -> Result<Vec<Filter>> {
    let mut merged: Vec<Filter> = Vec::with_capacity(filters.len());
    for filter in filters {
        match (merged.last_mut(), filter) {
            (Some(Filter::List(last)), Filter::List(next)) => last.extend(next),
            (Some(Filter::Fir(last)), Filter::Fir(next)) if last.symmetry == next.symmetry => {
                last.coefficients.extend(next.coefficients)
            }
            (Some(Filter::Generic(_)), Filter::Generic(_)) => {
                return Err(RespError::structure(
                    sequence,
                    "multiple generic blockettes in one stage are not supported",
                ));
            }
            (Some(Filter::IirCoefficients(_)), Filter::IirCoefficients(_)) => {
                return Err(RespError::structure(
                    sequence,
                    "multiple coefficient blockettes in IIR stages are not supported",
                ));
            }
            (_, filter) => merged.push(filter),
        }
    }
    Ok(merged)
}

/// True when the main filter works on samples and so needs a decimation.
fn needs_decimation(main: &Filter) -> bool {
    match main {
        Filter::Fir(fir) => !fir.coefficients.is_empty(),
        Filter::PoleZero(pz) => {
            pz.kind == PoleZeroKind::DigitalIir && !(pz.zeros.is_empty() && pz.poles.is_empty())
        }
        Filter::IirCoefficients(_) => true,
        _ => false,
    }
}

/// Delay-related sums and the last sample interval of the chain.
#[derive(Default)]
struct Delays {
    calculated: f64,
    estimated: f64,
    applied: f64,
    sample_interval: f64,
}

/// Validates and canonicalizes a channel in place.
///
/// Each functional stage ends up ordered as main filter, optional
/// decimation, gain. The channel's documented sensitivity (stage 0), delay
/// sums and output sample interval are filled in. Running it twice leaves
/// the channel unchanged.
///
/// # Errors
///
/// Returns `Structure` for stages that break the chain rules and
/// `UnitsMismatch` when a stage's input does not match the output of the
/// previous functional stage.
pub fn check(channel: &mut Channel) -> Result<()> {
    let sncl = channel.sncl.to_string();
    let functional_stages = channel
        .stages
        .iter()
        .filter(|stage| !stage.is_gain_only())
        .count();

    let mut delays = Delays::default();
    let mut sensitivity = None;
    let mut previous: Option<(u32, Units)> = None;

    for stage in channel.stages.iter_mut() {
        let sequence = stage.sequence;
        let filters = merge_continuations(std::mem::take(&mut stage.filters), sequence)?;

        let mut main: Option<Filter> = None;
        let mut decimation: Option<Decimation> = None;
        let mut gain: Option<Gain> = None;
        let mut taps = 0usize;

        for filter in filters {
            match filter {
                Filter::Decimation(deci) => {
                    if decimation.is_some() {
                        return Err(RespError::structure(sequence, "more than one decimation"));
                    }
                    decimation = Some(deci);
                }
                Filter::Gain(g) => {
                    if gain.is_some() {
                        return Err(RespError::structure(sequence, "more than one gain"));
                    }
                    if sequence == 0 {
                        sensitivity = Some(g);
                    }
                    gain = Some(g);
                }
                mut filter => {
                    if main.is_some() {
                        return Err(RespError::structure(sequence, "more than one filter type"));
                    }
                    match &mut filter {
                        Filter::Fir(fir) => {
                            canonical_fir(fir, &sncl);
                            taps = fir.full_length();
                        }
                        Filter::IirCoefficients(_) => taps = 1,
                        Filter::Generic(_) => {
                            log::warn!(
                                "generic response detected in stage {} of {}; content is ignored",
                                sequence,
                                sncl
                            );
                        }
                        Filter::List(_) if functional_stages > 1 => {
                            return Err(RespError::structure(
                                sequence,
                                "a response list cannot be mixed with other filter stages",
                            ));
                        }
                        _ => {}
                    }
                    main = Some(filter);
                }
            }
        }

        let Some(main) = main else {
            if decimation.is_some() {
                return Err(RespError::structure(
                    sequence,
                    "decimation with no associated filter",
                ));
            }
            // gain-only stage, skipped by the unit checks
            stage.filters.extend(gain.map(Filter::Gain));
            continue;
        };
        if let Some(deci) = &decimation {
            if taps > 0 {
                delays.calculated += (taps as f64 - 1.0) / 2.0 * deci.sample_interval;
            }
            delays.estimated += deci.estimated_delay;
            delays.applied += deci.applied_correction;
            delays.sample_interval = deci.sample_interval * f64::from(deci.factor);
        }

        if stage.input == Units::Undefined || stage.output == Units::Undefined {
            return Err(RespError::structure(sequence, "undefined units"));
        }
        if decimation.is_none() && needs_decimation(&main) {
            return Err(RespError::structure(
                sequence,
                format!(
                    "required decimation missing after {} filter",
                    main.short_name()
                ),
            ));
        }
        if let Some((previous_stage, output)) = previous {
            if output != stage.input {
                return Err(RespError::UnitsMismatch {
                    previous_stage,
                    output: output.to_string(),
                    stage: sequence,
                    input: stage.input.to_string(),
                });
            }
        }
        if sequence != 0 {
            previous = Some((sequence, stage.output));
        }

        let gain = gain.unwrap_or_else(|| {
            log::warn!(
                "stage {} of {} has no gain; using 1.0 at 1 Hz",
                sequence,
                sncl
            );
            Gain {
                value: 1.0,
                frequency: 1.0,
            }
        });
        stage.filters.push(main);
        stage.filters.extend(decimation.map(Filter::Decimation));
        stage.filters.push(Filter::Gain(gain));
    }

    let (value, frequency) = sensitivity.map_or((0.0, 0.0), |g| (g.value, g.frequency));
    channel.sensitivity = value;
    channel.sensitivity_freq = frequency;
    channel.calc_delay = delays.calculated;
    channel.estimated_delay = delays.estimated;
    channel.applied_correction = delays.applied;
    channel.sample_interval = delays.sample_interval;
    Ok(())
}
