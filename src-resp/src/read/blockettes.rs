//! Per-blockette decoders.
//!
//! Stage blockettes (B053 to B062) and their dictionary counterparts
//! (B041 to B048, only found inside a B060 reference) share their layout
//! from the input units onward; the dictionary form has no sequence number
//! and starts two fields later.

use super::cursor::{Cursor, Line};
use crate::error::{RespError, Result};
use crate::model::{
    Decimation, Filter, Fir, FirSymmetry, Gain, Generic, IirCoefficients, PoleZero, PoleZeroKind,
    Polynomial, ResponseList, Stage,
};
use crate::units::{Units, decode_units};
use num_complex::Complex64;

/// Where a blockette is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layout {
    /// Inline stage blockette (B05x, B06x)
    Stage,
    /// Dictionary blockette inside a response reference (B04x)
    Dictionary,
}

impl Layout {
    fn pick<T>(self, stage: T, dictionary: T) -> T {
        match self {
            Layout::Stage => stage,
            Layout::Dictionary => dictionary,
        }
    }
}

/// Input and output units of a stage.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StageUnits {
    pub input: Units,
    pub output: Units,
    pub input_name: String,
}

/// One decoded filter element and the stage it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Element {
    /// `None` for dictionary blockettes, whose sequence comes from the reference
    pub sequence: Option<u32>,
    pub units: Option<StageUnits>,
    pub filter: Filter,
}

impl Stage {
    /// Adds an element, taking the units of the first element that carries them.
    pub(crate) fn absorb(&mut self, element: Element) {
        if let Some(units) = element.units {
            if !self.has_units() {
                self.input = units.input;
                self.output = units.output;
                self.input_name = units.input_name;
            }
        }
        self.filters.push(element.filter);
    }
}

/// A decoded record of a channel body.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Record {
    Element(Element),
    /// Stages expanded from a B060 response reference
    Reference(Vec<Stage>),
}

/// Decodes the record starting at the pending line.
///
/// Returns `Ok(None)` when the blockette is not part of a response chain;
/// the caller skips such lines.
pub(crate) fn decode_record(cursor: &mut Cursor<'_>, default_units: bool) -> Result<Option<Record>> {
    let Some(line) = cursor.peek()? else {
        return Ok(None);
    };
    let element = match line.blockette {
        53 => pole_zero(cursor, Layout::Stage, default_units)?,
        54 => coefficients(cursor, Layout::Stage, default_units)?,
        55 => response_list(cursor, Layout::Stage, default_units)?,
        56 => generic(cursor, Layout::Stage, default_units)?,
        57 => decimation(cursor, Layout::Stage)?,
        58 => gain(cursor, Layout::Stage)?,
        61 => fir(cursor, Layout::Stage, default_units)?,
        62 => polynomial(cursor, Layout::Stage, default_units)?,
        60 => return Ok(Some(Record::Reference(reference(cursor, default_units)?))),
        _ => return Ok(None),
    };
    Ok(Some(Record::Element(element)))
}

fn sequence(line: &Line<'_>) -> Result<u32> {
    let value = line.int()?;
    u32::try_from(value).map_err(|_| line.error(format!("invalid stage sequence number {}", value)))
}

fn stage_sequence(cursor: &mut Cursor<'_>, layout: Layout, blockette: u32, field: u32) -> Result<Option<u32>> {
    match layout {
        Layout::Stage => Ok(Some(sequence(&cursor.take(blockette, field)?)?)),
        Layout::Dictionary => Ok(None),
    }
}

fn decode_unit_line(line: &Line<'_>, default_units: bool) -> Result<(Units, String)> {
    let name = line.value()?.to_string();
    let units = if default_units {
        Units::Default
    } else {
        decode_units(&name)
    };
    Ok((units, name))
}

fn stage_units(
    cursor: &mut Cursor<'_>,
    blockette: u32,
    field: u32,
    default_units: bool,
) -> Result<StageUnits> {
    let (input, input_name) = decode_unit_line(&cursor.take(blockette, field)?, default_units)?;
    let (output, _) = decode_unit_line(&cursor.take(blockette, field + 1)?, default_units)?;
    Ok(StageUnits {
        input,
        output,
        input_name,
    })
}

fn code_char(line: &Line<'_>) -> Result<char> {
    line.first_value()?
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase())
        .ok_or_else(|| line.error("empty code"))
}

/// Value of an `index value [error]` row.
fn indexed_value(line: &Line<'_>, tokens: &[&str]) -> Result<f64> {
    let index = if tokens.len() >= 2 { 1 } else { 0 };
    line.token_float(tokens, index)
}

fn indexed_error(line: &Line<'_>, tokens: &[&str]) -> Result<f64> {
    if tokens.len() >= 3 {
        line.token_float(tokens, 2)
    } else {
        Ok(0.0)
    }
}

fn complex_root(line: &Line<'_>, tokens: &[&str]) -> Result<Complex64> {
    Ok(Complex64::new(
        line.token_float(tokens, 1)?,
        line.token_float(tokens, 2)?,
    ))
}

/// B053 / B043: poles and zeros.
pub(crate) fn pole_zero(cursor: &mut Cursor<'_>, layout: Layout, default_units: bool) -> Result<Element> {
    let blockette = layout.pick(53, 43);
    let (type_field, first) = layout.pick((3, 5), (5, 6));
    let type_line = cursor.take(blockette, type_field)?;
    let kind = match code_char(&type_line)? {
        'A' => PoleZeroKind::Laplace,
        'B' => PoleZeroKind::Analog,
        'D' => PoleZeroKind::DigitalIir,
        other => {
            return Err(type_line.error(format!("unsupported transfer function type '{}'", other)));
        }
    };
    let sequence = stage_sequence(cursor, layout, blockette, 4)?;
    let units = stage_units(cursor, blockette, first, default_units)?;
    let a0 = cursor.take(blockette, first + 2)?.float()?;
    let a0_freq = cursor.take(blockette, first + 3)?.float()?;
    // both counts come before the two tables
    let zero_count = cursor.take(blockette, first + 4)?.count()?;
    let pole_count = cursor.take(blockette, first + 9)?.count()?;
    let zeros = cursor.take_table(blockette, first + 5, zero_count, "zeros", complex_root)?;
    let poles = cursor.take_table(blockette, first + 10, pole_count, "poles", complex_root)?;
    Ok(Element {
        sequence,
        units: Some(units),
        filter: Filter::PoleZero(PoleZero {
            kind,
            a0,
            a0_freq,
            zeros,
            poles,
        }),
    })
}

/// B054 / B044: numerator and denominator coefficients.
///
/// Without denominators the element is an asymmetric FIR filter.
pub(crate) fn coefficients(
    cursor: &mut Cursor<'_>,
    layout: Layout,
    default_units: bool,
) -> Result<Element> {
    let blockette = layout.pick(54, 44);
    let (type_field, first) = layout.pick((3, 5), (5, 6));
    let type_line = cursor.take(blockette, type_field)?;
    let code = code_char(&type_line)?;
    if code != 'D' {
        return Err(type_line.error(format!(
            "unsupported transfer function type '{}' for coefficients, expected 'D'",
            code
        )));
    }
    let sequence = stage_sequence(cursor, layout, blockette, 4)?;
    let units = stage_units(cursor, blockette, first, default_units)?;
    let numerator_count = cursor.take(blockette, first + 2)?.count()?;
    let denominator_count = cursor.take(blockette, first + 5)?.count()?;
    let numerator = cursor.take_table(
        blockette,
        first + 3,
        numerator_count,
        "numerators",
        indexed_value,
    )?;
    let denominator = cursor.take_table(
        blockette,
        first + 6,
        denominator_count,
        "denominators",
        indexed_value,
    )?;
    let filter = if denominator.is_empty() {
        Filter::Fir(Fir {
            symmetry: FirSymmetry::Asym,
            coefficients: numerator,
            h0: 1.0,
        })
    } else {
        Filter::IirCoefficients(IirCoefficients {
            numerator,
            denominator,
            h0: 1.0,
        })
    };
    Ok(Element {
        sequence,
        units: Some(units),
        filter,
    })
}

/// B055 / B045: tabulated amplitude and phase.
pub(crate) fn response_list(
    cursor: &mut Cursor<'_>,
    layout: Layout,
    default_units: bool,
) -> Result<Element> {
    let blockette = layout.pick(55, 45);
    let first = layout.pick(4, 5);
    let sequence = stage_sequence(cursor, layout, blockette, 3)?;
    let units = stage_units(cursor, blockette, first, default_units)?;
    let count = cursor.take(blockette, first + 2)?.count()?;
    let rows = cursor.take_table(blockette, first + 3, count, "response list rows", |line, tokens| {
        // rows may or may not start with an index
        let offset = match tokens.len() {
            6 => 1,
            5 => 0,
            n => return Err(line.error(format!("unknown response list row format ({} values)", n))),
        };
        Ok((
            line.token_float(tokens, offset)?,
            line.token_float(tokens, offset + 1)?,
            line.token_float(tokens, offset + 3)?,
        ))
    })?;
    let mut list = ResponseList::default();
    for (freq, amp, phase) in rows {
        list.frequencies.push(freq);
        list.amplitudes.push(amp);
        list.phases.push(phase);
    }
    Ok(Element {
        sequence,
        units: Some(units),
        filter: Filter::List(list),
    })
}

/// B056 / B046: corner frequencies and slopes.
pub(crate) fn generic(cursor: &mut Cursor<'_>, layout: Layout, default_units: bool) -> Result<Element> {
    let blockette = layout.pick(56, 46);
    let first = layout.pick(4, 5);
    let sequence = stage_sequence(cursor, layout, blockette, 3)?;
    let units = stage_units(cursor, blockette, first, default_units)?;
    let count = cursor.take(blockette, first + 2)?.count()?;
    let corners = cursor.take_table(blockette, first + 3, count, "corners", |line, tokens| {
        let offset = if tokens.len() >= 3 { 1 } else { 0 };
        Ok((
            line.token_float(tokens, offset)?,
            line.token_float(tokens, offset + 1)?,
        ))
    })?;
    let (corner_freqs, corner_slopes) = corners.into_iter().unzip();
    Ok(Element {
        sequence,
        units: Some(units),
        filter: Filter::Generic(Generic {
            corner_freqs,
            corner_slopes,
        }),
    })
}

/// B057 / B047: decimation.
pub(crate) fn decimation(cursor: &mut Cursor<'_>, layout: Layout) -> Result<Element> {
    let blockette = layout.pick(57, 47);
    let first = layout.pick(4, 5);
    let sequence = stage_sequence(cursor, layout, blockette, 3)?;
    let rate = cursor.take(blockette, first)?.float()?;
    let factor_line = cursor.take(blockette, first + 1)?;
    let factor = u32::try_from(factor_line.int()?)
        .map_err(|_| factor_line.error("invalid decimation factor"))?;
    let offset_line = cursor.take(blockette, first + 2)?;
    let offset = u32::try_from(offset_line.int()?)
        .map_err(|_| offset_line.error("invalid decimation offset"))?;
    let estimated_delay = cursor.take(blockette, first + 3)?.float()?;
    let applied_correction = cursor.take(blockette, first + 4)?.float()?;
    Ok(Element {
        sequence,
        units: None,
        filter: Filter::Decimation(Decimation {
            sample_interval: if rate != 0.0 { 1.0 / rate } else { 0.0 },
            factor,
            offset,
            estimated_delay,
            applied_correction,
        }),
    })
}

/// B058 / B048: gain (sensitivity for stage 0). Calibration history is skipped.
pub(crate) fn gain(cursor: &mut Cursor<'_>, layout: Layout) -> Result<Element> {
    let blockette = layout.pick(58, 48);
    let first = layout.pick(4, 5);
    let sequence = stage_sequence(cursor, layout, blockette, 3)?;
    let value = cursor.take(blockette, first)?.float()?;
    let frequency = cursor.take(blockette, first + 1)?.float()?;
    let history = cursor.take(blockette, first + 2)?.count()?;
    cursor.take_table(blockette, first + 3, history, "calibrations", |_, _| Ok(()))?;
    Ok(Element {
        sequence,
        units: None,
        filter: Filter::Gain(Gain { value, frequency }),
    })
}

/// B061 / B041: FIR coefficients.
pub(crate) fn fir(cursor: &mut Cursor<'_>, layout: Layout, default_units: bool) -> Result<Element> {
    let blockette = layout.pick(61, 41);
    let sequence = stage_sequence(cursor, layout, blockette, 3)?;
    let symmetry_line = cursor.take(blockette, 5)?;
    let symmetry = match code_char(&symmetry_line)? {
        'A' => FirSymmetry::Asym,
        'B' => FirSymmetry::SymOdd,
        'C' => FirSymmetry::SymEven,
        other => {
            return Err(symmetry_line.error(format!("unsupported FIR symmetry code '{}'", other)));
        }
    };
    let units = stage_units(cursor, blockette, 6, default_units)?;
    let count = cursor.take(blockette, 8)?.count()?;
    let coefficients = cursor.take_table(blockette, 9, count, "FIR coefficients", indexed_value)?;
    Ok(Element {
        sequence,
        units: Some(units),
        filter: Filter::Fir(Fir {
            symmetry,
            coefficients,
            h0: 1.0,
        }),
    })
}

/// B062 / B042: polynomial response.
pub(crate) fn polynomial(
    cursor: &mut Cursor<'_>,
    layout: Layout,
    default_units: bool,
) -> Result<Element> {
    let blockette = layout.pick(62, 42);
    let (type_field, first) = layout.pick((3, 5), (5, 6));
    let type_line = cursor.take(blockette, type_field)?;
    let code = code_char(&type_line)?;
    if code != 'P' {
        return Err(type_line.error(format!(
            "unsupported transfer function type '{}' for a polynomial, expected 'P'",
            code
        )));
    }
    let sequence = stage_sequence(cursor, layout, blockette, 4)?;
    let units = stage_units(cursor, blockette, first, default_units)?;
    let approximation_type = code_char(&cursor.take(blockette, first + 2)?)?;
    let frequency_units = code_char(&cursor.take(blockette, first + 3)?)?;
    let lower_valid_freq = cursor.take(blockette, first + 4)?.float()?;
    let upper_valid_freq = cursor.take(blockette, first + 5)?.float()?;
    let lower_bound = cursor.take(blockette, first + 6)?.float()?;
    let upper_bound = cursor.take(blockette, first + 7)?.float()?;
    let max_error = cursor.take(blockette, first + 8)?.float()?;
    let count = cursor.take(blockette, first + 9)?.count()?;
    let rows = cursor.take_table(blockette, first + 10, count, "polynomial coefficients", |line, tokens| {
        Ok((indexed_value(line, tokens)?, indexed_error(line, tokens)?))
    })?;
    let (coefficients, coefficient_errors) = rows.into_iter().unzip();
    Ok(Element {
        sequence,
        units: Some(units),
        filter: Filter::Polynomial(Polynomial {
            approximation_type,
            frequency_units,
            lower_valid_freq,
            upper_valid_freq,
            lower_bound,
            upper_bound,
            max_error,
            coefficients,
            coefficient_errors,
        }),
    })
}

/// B060: response reference, expanded into the stages it describes.
pub(crate) fn reference(cursor: &mut Cursor<'_>, default_units: bool) -> Result<Vec<Stage>> {
    let stage_count = cursor.take(60, 3)?.count()?;
    let mut stages = Vec::new();
    stages.try_reserve(stage_count).map_err(|_| RespError::Resource {
        what: "referenced stages".to_string(),
        count: stage_count,
    })?;
    for index in 0..stage_count {
        if index > 0 {
            let line = cursor.take(60, 3)?;
            let again = line.count()?;
            if again != stage_count {
                return Err(line.error(format!(
                    "response reference declares {} stages, expected {}",
                    again, stage_count
                )));
            }
        }
        let mut stage = Stage::new(sequence(&cursor.take(60, 4)?)?);
        let responses = cursor.take(60, 5)?.count()?;
        for _ in 0..responses {
            let line = cursor.peek()?.ok_or_else(|| cursor.eof_error(60, 5))?;
            let element = match line.blockette {
                43 => pole_zero(cursor, Layout::Dictionary, default_units)?,
                44 => coefficients(cursor, Layout::Dictionary, default_units)?,
                45 => response_list(cursor, Layout::Dictionary, default_units)?,
                46 => generic(cursor, Layout::Dictionary, default_units)?,
                47 => decimation(cursor, Layout::Dictionary)?,
                48 => gain(cursor, Layout::Dictionary)?,
                41 => fir(cursor, Layout::Dictionary, default_units)?,
                42 => polynomial(cursor, Layout::Dictionary, default_units)?,
                60 => return Err(line.error("unexpected end of stage in response reference")),
                other => {
                    return Err(line.error(format!(
                        "unexpected filter type B{:03} in response reference",
                        other
                    )));
                }
            };
            stage.absorb(element);
        }
        stages.push(stage);
    }
    Ok(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * b.abs().max(1e-30)
    }

    #[test]
    fn test_pole_zero_stage() {
        let text = "\
B053F03     Transfer function type:                A [Laplace Transform (Rad/sec)]
B053F04     Stage sequence number:                 1
B053F05     Response in units lookup:              M/S - Velocity in Meters Per Second
B053F06     Response out units lookup:             V - Volts
B053F07     A0 normalization factor:               +3.948580E+03
B053F08     Normalization frequency:               +2.000000E-02
B053F09     Number of zeroes:                      2
B053F14     Number of poles:                       2
#              Complex zeroes:
#              i  real          imag          real_error    imag_error
B053F10-13     0  +0.000000E+00 +0.000000E+00 +0.000000E+00 +0.000000E+00
B053F10-13     1  +0.000000E+00 +0.000000E+00 +0.000000E+00 +0.000000E+00
#              Complex poles:
B053F15-18     0  -1.234000E-02 +1.234000E-02 +0.000000E+00 +0.000000E+00
B053F15-18     1  -1.234000E-02 -1.234000E-02 +0.000000E+00 +0.000000E+00
";
        let mut cursor = Cursor::new(text);
        let element = pole_zero(&mut cursor, Layout::Stage, false).unwrap();
        assert_eq!(element.sequence, Some(1));
        let units = element.units.unwrap();
        assert_eq!(units.input, Units::Velocity);
        assert_eq!(units.output, Units::Volts);
        match element.filter {
            Filter::PoleZero(pz) => {
                assert_eq!(pz.kind, PoleZeroKind::Laplace);
                assert!(approx_eq(pz.a0, 3948.58, 1e-12));
                assert_eq!(pz.zeros.len(), 2);
                assert_eq!(pz.poles[1], Complex64::new(-0.01234, -0.01234));
            }
            other => panic!("expected poles and zeros, got {:?}", other),
        }
    }

    #[test]
    fn test_fir_without_denominators_from_coefficients() {
        let text = "\
B054F03     Transfer function type:                D
B054F04     Stage sequence number:                 3
B054F05     Response in units lookup:              COUNTS - Digital Counts
B054F06     Response out units lookup:             COUNTS - Digital Counts
B054F07     Number of numerators:                  2
B054F10     Number of denominators:                0
B054F08-09  0  +5.000000E-01  +0.000000E+00
B054F08-09  1  +5.000000E-01  +0.000000E+00
";
        let mut cursor = Cursor::new(text);
        let element = coefficients(&mut cursor, Layout::Stage, false).unwrap();
        assert_eq!(element.sequence, Some(3));
        assert_eq!(
            element.filter,
            Filter::Fir(Fir {
                symmetry: FirSymmetry::Asym,
                coefficients: vec![0.5, 0.5],
                h0: 1.0
            })
        );
    }

    #[test]
    fn test_list_rows_with_and_without_index() {
        let text = "\
B055F03     Stage sequence number:                 1
B055F04     Response in units lookup:              M/S - Velocity
B055F05     Response out units lookup:             COUNTS - Digital Counts
B055F06     Number of responses listed:            2
B055F07-11  0  1.000000E-01  2.000000E+00  0.0  -9.000000E+01  0.0
B055F07-11     1.000000E+00  4.000000E+00  0.0  -4.500000E+01  0.0
";
        let mut cursor = Cursor::new(text);
        let element = response_list(&mut cursor, Layout::Stage, false).unwrap();
        match element.filter {
            Filter::List(list) => {
                assert_eq!(list.frequencies, vec![0.1, 1.0]);
                assert_eq!(list.amplitudes, vec![2.0, 4.0]);
                assert_eq!(list.phases, vec![-90.0, -45.0]);
            }
            other => panic!("expected a list, got {:?}", other),
        }
    }

    #[test]
    fn test_gain_skips_calibration_history() {
        let text = "\
B058F03     Stage sequence number:                 0
B058F04     Sensitivity:                           +6.291E+08
B058F05     Frequency of sensitivity:              +2.000E-02 HZ
B058F06     Number of calibrations:                1
B058F07-09  0  +6.0E+08  +2.0E-02  1999,001
B050F03     Station:     NEXT
";
        let mut cursor = Cursor::new(text);
        let element = gain(&mut cursor, Layout::Stage).unwrap();
        assert_eq!(element.sequence, Some(0));
        assert_eq!(
            element.filter,
            Filter::Gain(Gain {
                value: 6.291e8,
                frequency: 0.02
            })
        );
        assert!(cursor.peek().unwrap().unwrap().is(50, 3));
    }

    #[test]
    fn test_decimation_zero_rate() {
        let text = "\
B057F03     Stage sequence number:                 2
B057F04     Input sample rate (HZ):                0.0000E+00
B057F05     Decimation factor:                     00001
B057F06     Decimation offset:                     00000
B057F07     Estimated delay (seconds):             +0.0000E+00
B057F08     Correction applied (seconds):          +0.0000E+00
";
        let mut cursor = Cursor::new(text);
        let element = decimation(&mut cursor, Layout::Stage).unwrap();
        match element.filter {
            Filter::Decimation(deci) => {
                assert_eq!(deci.sample_interval, 0.0);
                assert_eq!(deci.factor, 1);
            }
            other => panic!("expected a decimation, got {:?}", other),
        }
    }

    #[test]
    fn test_reference_expands_dictionary_stages() {
        let text = "\
B060F03     Number of stages:                      1
B060F04     Stage sequence number:                 2
B060F05     Number of responses:                   2
B041F03     Response Lookup Key:                   7
B041F04     Response Name:                         FIR_2
B041F05     Symmetry Code:                         B
B041F06     Response in units lookup:              COUNTS
B041F07     Response out units lookup:             COUNTS
B041F08     Number of Coefficients:                2
B041F09     0  2.500000E-01
B041F09     1  5.000000E-01
B048F03     Response Lookup Key:                   8
B048F05     Sensitivity:                           1.0
B048F06     Frequency of sensitivity:              0.0
B048F07     Number of calibrations:                0
";
        let mut cursor = Cursor::new(text);
        let stages = reference(&mut cursor, false).unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].sequence, 2);
        assert_eq!(stages[0].input, Units::Counts);
        assert_eq!(stages[0].filters.len(), 2);
        assert!(matches!(
            &stages[0].filters[0],
            Filter::Fir(fir) if fir.symmetry == FirSymmetry::SymOdd
        ));
    }

    #[test]
    fn test_reference_rejects_nested_reference() {
        let text = "\
B060F03     Number of stages:                      1
B060F04     Stage sequence number:                 1
B060F05     Number of responses:                   1
B060F03     Number of stages:                      1
";
        let mut cursor = Cursor::new(text);
        assert!(matches!(
            reference(&mut cursor, false),
            Err(RespError::Parse { blockette: 60, .. })
        ));
    }

    #[test]
    fn test_default_units_are_not_decoded() {
        let text = "\
B061F03     Stage sequence number:                 1
B061F05     Symmetry Code:                         A
B061F06     Response in units lookup:              FURLONGS
B061F07     Response out units lookup:             COUNTS
B061F08     Number of Coefficients:                0
";
        let mut cursor = Cursor::new(text);
        let element = fir(&mut cursor, Layout::Stage, true).unwrap();
        let units = element.units.unwrap();
        assert_eq!(units.input, Units::Default);
        assert_eq!(units.output, Units::Default);
        assert_eq!(units.input_name, "FURLONGS");
    }
}
