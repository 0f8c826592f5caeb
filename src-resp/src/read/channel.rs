//! Channel assembly: header, body and the multi-channel stream.

use super::blockettes::{Record, decode_record};
use super::cursor::{Cursor, Line};
use crate::error::{RespError, Result};
use crate::model::{Channel, Sncl, Stage};
use crate::select::ChannelFilter;
use crate::units::scale_to_meters;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Parses a RESP epoch such as `2001,215,12:30:00.0000` (time part optional).
pub fn parse_resp_time(text: &str) -> Option<NaiveDateTime> {
    let mut parts = text.trim().splitn(3, ',');
    let year: i32 = parts.next()?.trim().parse().ok()?;
    let day: u32 = parts.next()?.trim().parse().ok()?;
    let date = NaiveDate::from_yo_opt(year, day)?;
    let time = match parts.next().map(str::trim).filter(|t| !t.is_empty()) {
        Some(clock) => parse_clock(clock)?,
        None => NaiveTime::from_hms_opt(0, 0, 0)?,
    };
    Some(date.and_time(time))
}

/// Parses `HH[:MM[:SS[.ffff]]]`.
pub fn parse_clock(text: &str) -> Option<NaiveTime> {
    let mut parts = text.trim().splitn(3, ':');
    let hour: u32 = parts.next()?.parse().ok()?;
    let minute: u32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    let seconds: f64 = match parts.next() {
        Some(s) => s.parse().ok()?,
        None => 0.0,
    };
    if !(0.0..60.0).contains(&seconds) {
        return None;
    }
    let whole = seconds.trunc() as u32;
    let micro = ((seconds - seconds.trunc()) * 1e6).round().min(999_999.0) as u32;
    NaiveTime::from_hms_micro_opt(hour, minute, whole, micro)
}

fn optional_code(value: &str) -> String {
    if value == "??" {
        String::new()
    } else {
        value.to_string()
    }
}

fn epoch(line: &Line<'_>) -> Result<NaiveDateTime> {
    let value = line.value()?;
    parse_resp_time(value).ok_or_else(|| line.error(format!("'{}' is not a valid date", value)))
}

/// Reads the station, network, location, channel and epoch lines.
pub(crate) fn read_channel_header(cursor: &mut Cursor<'_>) -> Result<Channel> {
    let station = cursor.take(50, 3)?.value()?.to_string();
    let network = optional_code(cursor.take(50, 16)?.value()?);
    let location = match cursor.peek()? {
        Some(line) if line.is(52, 3) => {
            cursor.next_line()?;
            optional_code(line.value()?)
        }
        _ => String::new(),
    };
    let channel_code = cursor.take(52, 4)?.value()?.to_string();
    let start = epoch(&cursor.take(52, 22)?)?;
    let end_line = cursor.take(52, 23)?;
    let end = if end_line.value()?.eq_ignore_ascii_case("No Ending Time") {
        None
    } else {
        Some(epoch(&end_line)?)
    };
    let mut channel = Channel::new(Sncl {
        network,
        station,
        location,
        channel: channel_code,
    });
    channel.start = Some(start);
    channel.end = end;
    Ok(channel)
}

/// Appends the stages of a response reference after the ones already read.
///
/// When the first referenced stage continues the last stage read, its
/// elements join that stage.
fn splice(stages: &mut Vec<Stage>, referenced: Vec<Stage>) {
    let mut referenced = referenced.into_iter();
    let Some(first) = referenced.next() else {
        return;
    };
    match stages.last_mut() {
        Some(last) if last.sequence == first.sequence => {
            if !last.has_units() && first.has_units() {
                last.input = first.input;
                last.output = first.output;
                last.input_name = first.input_name;
            }
            last.filters.extend(first.filters);
        }
        _ => stages.push(first),
    }
    stages.extend(referenced);
}

/// Reads filter records until the next channel header or the end of input.
pub(crate) fn read_channel_body(
    cursor: &mut Cursor<'_>,
    channel: &mut Channel,
    default_units: bool,
) -> Result<()> {
    let mut stages: Vec<Stage> = Vec::new();
    while let Some(line) = cursor.peek()? {
        if line.blockette == 50 {
            break;
        }
        match decode_record(cursor, default_units)? {
            Some(Record::Element(element)) => {
                let sequence = element
                    .sequence
                    .unwrap_or_else(|| stages.last().map_or(0, |s| s.sequence));
                if stages.last().is_none_or(|s| s.sequence != sequence) {
                    stages.push(Stage::new(sequence));
                }
                if let Some(stage) = stages.last_mut() {
                    stage.absorb(element);
                }
            }
            Some(Record::Reference(referenced)) => splice(&mut stages, referenced),
            None => {
                log::debug!(
                    "skipping unsupported blockette B{:03} at line {}",
                    line.blockette,
                    line.number
                );
                cursor.next_line()?;
            }
        }
    }
    if !default_units {
        if let Some(first) = stages.iter().find(|stage| stage.has_units()) {
            channel.unit_scale = scale_to_meters(&first.input_name);
        }
    }
    channel.stages = stages;
    Ok(())
}

/// Streams the channels of a RESP text.
///
/// A channel that fails to parse yields its error; reading resumes at the
/// next channel header. With [`ChannelReader::select`], channels whose
/// header does not match the filter are skipped without reading their
/// filters, so their errors are never reported.
///
/// # Example
///
/// ```
/// use evalresp_core::ChannelReader;
///
/// let text = "B050F03 Station: ANMO\nB050F16 Network: IU\nB052F03 Location: 00\n\
///             B052F04 Channel: BHZ\nB052F22 Start date: 2020,001,00:00:00\n\
///             B052F23 End date: No Ending Time\n";
/// let channels: Vec<_> = ChannelReader::new(text, false).collect();
/// assert_eq!(channels.len(), 1);
/// assert_eq!(channels[0].as_ref().unwrap().sncl.to_string(), "IU.ANMO.00.BHZ");
/// ```
pub struct ChannelReader<'a> {
    cursor: Cursor<'a>,
    default_units: bool,
    filter: Option<ChannelFilter>,
}

impl<'a> ChannelReader<'a> {
    pub fn new(text: &'a str, default_units: bool) -> Self {
        Self {
            cursor: Cursor::new(text),
            default_units,
            filter: None,
        }
    }

    /// Only yield the channels matched by `filter`.
    pub fn select(mut self, filter: ChannelFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Moves the cursor to the next channel header.
    fn seek_header(&mut self) -> Option<Result<()>> {
        loop {
            match self.cursor.peek() {
                Ok(None) => return None,
                Ok(Some(line)) if line.is(50, 3) => return Some(Ok(())),
                Ok(Some(line)) => {
                    log::debug!("ignoring line {} outside of a channel", line.number);
                    self.cursor.skip_to_header();
                }
                Err(e) => {
                    self.cursor.skip_to_header();
                    return Some(Err(e));
                }
            }
        }
    }
}

impl Iterator for ChannelReader<'_> {
    type Item = Result<Channel>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Err(e) = self.seek_header()? {
                return Some(Err(e));
            }
            let mut channel = match read_channel_header(&mut self.cursor) {
                Ok(channel) => channel,
                Err(e) => {
                    self.cursor.skip_to_header();
                    return Some(Err(e));
                }
            };
            if let Some(filter) = &self.filter {
                if !filter.matches(&channel) {
                    log::debug!("{} does not match the selection", channel.sncl);
                    self.cursor.skip_to_header();
                    continue;
                }
            }
            let result = read_channel_body(&mut self.cursor, &mut channel, self.default_units)
                .map(|()| channel);
            if result.is_err() {
                self.cursor.skip_to_header();
            }
            return Some(result);
        }
    }
}

/// Parses every channel of a RESP text.
pub fn parse_channels(text: &str, default_units: bool) -> Vec<Result<Channel>> {
    ChannelReader::new(text, default_units).collect()
}

/// Parses the first channel of a RESP text.
pub fn parse_channel(text: &str, default_units: bool) -> Result<Channel> {
    ChannelReader::new(text, default_units)
        .next()
        .unwrap_or(Err(RespError::NoChannel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Filter, FirSymmetry};
    use crate::units::Units;
    use chrono::{Datelike, Timelike};

    const HEADER: &str = "\
B050F03     Station:     ANMO
B050F16     Network:     IU
B052F03     Location:    ??
B052F04     Channel:     BHZ
B052F22     Start date:  2002,323,21:07:00.0000
B052F23     End date:    No Ending Time
";

    const FIR_STAGE: &str = "\
B061F03     Stage sequence number:                 2
B061F05     Symmetry Code:                         A
B061F06     Response in units lookup:              COUNTS - Digital Counts
B061F07     Response out units lookup:             COUNTS - Digital Counts
B061F08     Number of Coefficients:                2
B061F09    0  5.000000E-01
B061F09    1  5.000000E-01
";

    #[test]
    fn test_parse_resp_time() {
        let t = parse_resp_time("2002,323,21:07:30.5000").unwrap();
        assert_eq!((t.year(), t.ordinal(), t.hour(), t.minute(), t.second()), (2002, 323, 21, 7, 30));
        assert_eq!(t.nanosecond(), 500_000_000);
        let midnight = parse_resp_time("1999,001").unwrap();
        assert_eq!((midnight.hour(), midnight.minute()), (0, 0));
        assert!(parse_resp_time("1999,400,00:00:00").is_none());
        assert!(parse_resp_time("garbage").is_none());
    }

    #[test]
    fn test_header_codes() {
        let channel = parse_channel(HEADER, false).unwrap();
        assert_eq!(channel.sncl.station, "ANMO");
        assert_eq!(channel.sncl.network, "IU");
        assert_eq!(channel.sncl.location, "");
        assert_eq!(channel.sncl.channel, "BHZ");
        assert!(channel.end.is_none());
        assert!(channel.stages.is_empty());
    }

    #[test]
    fn test_header_without_location_line() {
        let text = HEADER.replace("B052F03     Location:    ??\n", "");
        let channel = parse_channel(&text, false).unwrap();
        assert_eq!(channel.sncl.location, "");
        assert_eq!(channel.sncl.channel, "BHZ");
    }

    #[test]
    fn test_continuation_records_share_a_stage() {
        let text = format!("{}{}{}", HEADER, FIR_STAGE, FIR_STAGE);
        let channel = parse_channel(&text, false).unwrap();
        assert_eq!(channel.stages.len(), 1);
        assert_eq!(channel.stages[0].sequence, 2);
        assert_eq!(channel.stages[0].filters.len(), 2);
        assert_eq!(channel.stages[0].input, Units::Counts);
    }

    #[test]
    fn test_reference_splices_into_current_stage() {
        let text = format!(
            "{}{}{}",
            HEADER,
            FIR_STAGE,
            "\
B060F03     Number of stages:                      2
B060F04     Stage sequence number:                 2
B060F05     Number of responses:                   1
B048F05     Sensitivity:                           1.0
B048F06     Frequency of sensitivity:              0.0
B048F07     Number of calibrations:                0
B060F03     Number of stages:                      2
B060F04     Stage sequence number:                 3
B060F05     Number of responses:                   1
B041F05     Symmetry Code:                         C
B041F06     Response in units lookup:              COUNTS
B041F07     Response out units lookup:             COUNTS
B041F08     Number of Coefficients:                1
B041F09     0  5.000000E-01
"
        );
        let channel = parse_channel(&text, false).unwrap();
        assert_eq!(channel.stages.len(), 2);
        assert_eq!(channel.stages[0].filters.len(), 2);
        assert!(matches!(channel.stages[0].filters[1], Filter::Gain(_)));
        assert_eq!(channel.stages[1].sequence, 3);
        assert!(matches!(
            &channel.stages[1].filters[0],
            Filter::Fir(fir) if fir.symmetry == FirSymmetry::SymEven
        ));
    }

    #[test]
    fn test_unknown_blockettes_are_skipped() {
        let text = format!(
            "{}B059F05     Comment: something\n{}",
            HEADER, FIR_STAGE
        );
        let channel = parse_channel(&text, false).unwrap();
        assert_eq!(channel.stages.len(), 1);
    }

    #[test]
    fn test_stream_resumes_after_bad_channel() {
        let bad = FIR_STAGE.replace("5.000000E-01", "five");
        let second = HEADER.replace("ANMO", "COLA");
        let text = format!("{}{}{}{}", HEADER, bad, second, FIR_STAGE);
        let results = parse_channels(&text, false);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(RespError::Parse { blockette: 61, .. })));
        let channel = results[1].as_ref().unwrap();
        assert_eq!(channel.sncl.station, "COLA");
        assert_eq!(channel.stages.len(), 1);
    }

    #[test]
    fn test_selection_skips_unmatched_channels_before_their_filters() {
        let bad = FIR_STAGE.replace("5.000000E-01", "five");
        let second = HEADER.replace("ANMO", "COLA");
        let text = format!("{}{}{}{}", HEADER, bad, second, FIR_STAGE);

        let cola = ChannelFilter::new("COLA", "*", "*", "*", None).unwrap();
        let results: Vec<_> = ChannelReader::new(&text, false).select(cola).collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().sncl.station, "COLA");

        let anmo = ChannelFilter::new("ANMO", "*", "*", "*", None).unwrap();
        let results: Vec<_> = ChannelReader::new(&text, false).select(anmo).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(RespError::Parse { blockette: 61, .. })));
    }

    #[test]
    fn test_empty_input_has_no_channel() {
        assert!(matches!(parse_channel("# nothing\n", false), Err(RespError::NoChannel)));
    }

    #[test]
    fn test_unit_scale_from_first_stage() {
        let text = format!(
            "{}{}",
            HEADER,
            FIR_STAGE
                .replace("COUNTS - Digital Counts\nB061F07", "NM/S - Velocity in nanometers\nB061F07")
        );
        let channel = parse_channel(&text, false).unwrap();
        assert_eq!(channel.unit_scale, 1.0e9);
        let channel = parse_channel(&text, true).unwrap();
        assert_eq!(channel.unit_scale, 1.0);
        assert_eq!(channel.stages[0].input, Units::Default);
    }
}
