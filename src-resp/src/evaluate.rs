//! End-to-end evaluation: parse, check, normalize and compute.

use crate::calc::calculate;
use crate::check::check;
use crate::error::Result;
use crate::interpolate::interpolate_list;
use crate::model::{Channel, Filter, ResponseList};
use crate::normalize::normalize;
use crate::options::{ListMode, Options};
use crate::read::{ChannelReader, parse_channel};
use crate::response::Response;
use crate::select::ChannelFilter;
use ndarray::Array1;

fn list_mut(channel: &mut Channel) -> Option<&mut ResponseList> {
    channel
        .stages
        .iter_mut()
        .flat_map(|stage| stage.filters.iter_mut())
        .find_map(|filter| match filter {
            Filter::List(list) => Some(list),
            _ => None,
        })
}

/// Aligns a response-list channel with the frequencies it will be evaluated at.
///
/// Returns the frequencies of the response, which differ from the request
/// unless the list is interpolated onto it.
fn align_list(
    channel: &mut Channel,
    frequencies: &Array1<f64>,
    mode: ListMode,
) -> Result<Array1<f64>> {
    let sncl = channel.sncl.to_string();
    let Some(list) = list_mut(channel) else {
        return Ok(frequencies.clone());
    };
    match mode {
        ListMode::InterpolateInput => {
            let requested = frequencies.to_vec();
            *list = interpolate_list(list, &requested)?;
        }
        ListMode::Native | ListMode::InterpolateOutput => {
            log::warn!(
                "{} is a response list; computed only at its {} tabulated frequencies",
                sncl,
                list.len()
            );
        }
    }
    Ok(Array1::from_vec(list.frequencies.clone()))
}

/// Evaluates a parsed channel at `frequencies`.
///
/// The channel is checked and normalized in place, so the caller can print
/// its canonical form afterwards.
///
/// # Errors
///
/// Any validation or calculation error of this channel.
pub fn evaluate_channel(
    channel: &mut Channel,
    frequencies: &Array1<f64>,
    options: &Options,
) -> Result<Response> {
    check(channel)?;
    let frequencies = if channel.is_list() {
        align_list(channel, frequencies, options.list_mode)?
    } else {
        frequencies.clone()
    };
    normalize(channel, &options.stages)?;
    let values = calculate(channel, &frequencies, options)?;
    Ok(Response {
        sncl: channel.sncl.clone(),
        frequencies,
        values,
    })
}

/// Evaluates the first channel of a RESP text.
///
/// # Errors
///
/// `NoChannel` when the text holds no channel, otherwise any parse,
/// validation or calculation error.
pub fn evaluate(text: &str, frequencies: &Array1<f64>, options: &Options) -> Result<Response> {
    let mut channel = parse_channel(text, options.default_units)?;
    evaluate_channel(&mut channel, frequencies, options)
}

/// Evaluates every channel of a RESP text accepted by `filter`.
///
/// Each channel yields its own result; an error never stops the stream.
pub fn evaluate_all(
    text: &str,
    filter: &ChannelFilter,
    frequencies: &Array1<f64>,
    options: &Options,
) -> Vec<Result<Response>> {
    ChannelReader::new(text, options.default_units)
        .select(filter.clone())
        .map(|parsed| {
            let mut channel = parsed?;
            let result = evaluate_channel(&mut channel, frequencies, options);
            if let Err(e) = &result {
                log::warn!("{}: {}", channel.sncl, e);
            }
            result
        })
        .collect()
}
