//! evalresp - frequency responses of seismic instruments
//! Command-line interface definitions
//!
//! Copyright (C) 2025 Pierre Aubert pierre(at)spinorama(dot)org
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful,
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License
//! along with this program.  If not, see <https://www.gnu.org/licenses/>.

use chrono::NaiveDate;
use clap::Parser;
use evalresp_core::read::parse_clock;
use evalresp_core::{
    ChannelFilter, FrequencyGrid, ListMode, Options, OutputUnit, ResponseType, Spacing,
    StageRange,
};
use std::error::Error;
use std::path::PathBuf;
use std::process;

/// Evaluate the response of seismic channels described in RESP files.
///
/// If `--file` is a directory, it is searched for files named
/// `RESP.NET.STA.LOC.CHA` or `RESP.NET.STA.CHA`. Without `--file`, the current
/// directory and the directory named by `SEEDRESP` are searched; local files
/// take precedence.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Station list, comma separated; `*` and `?` globs are allowed
    #[arg(value_name = "STALST")]
    pub stations: String,

    /// Channel list, comma separated; `*` and `?` globs are allowed
    #[arg(value_name = "CHALST")]
    pub channels: String,

    /// Year of the instant the channel epoch must contain
    #[arg(value_name = "YEAR")]
    pub year: i32,

    /// Day of the year (1-366)
    #[arg(value_name = "JDAY")]
    pub julian_day: u32,

    /// Lowest frequency in Hz
    #[arg(value_name = "MINFREQ", allow_negative_numbers = true)]
    pub min_freq: Option<f64>,

    /// Highest frequency in Hz
    #[arg(value_name = "MAXFREQ", allow_negative_numbers = true)]
    pub max_freq: Option<f64>,

    /// Number of frequencies
    #[arg(value_name = "NFREQ")]
    pub nfreq: Option<usize>,

    /// RESP file, or directory searched for RESP files
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Output units: dis, vel, acc or def
    #[arg(short, long)]
    pub units: Option<OutputUnit>,

    /// Time of day, HH[:MM[:SS[.ffff]]]
    #[arg(short, long, default_value = "00:00:00")]
    pub time: String,

    /// Frequency spacing: log or lin
    #[arg(short, long, default_value = "log")]
    pub spacing: Spacing,

    /// Network list
    #[arg(short, long, default_value = "*")]
    pub network: String,

    /// Location list; `??` or an empty string selects blank locations
    #[arg(short, long, default_value = "*")]
    pub location: String,

    /// Output type: ap (AMP and PHASE files), cs (complex spectra) or fap
    #[arg(short, long, default_value = "fap")]
    pub response: ResponseType,

    /// Stage range: a single stage, or START and STOP (inclusive)
    #[arg(long, num_args = 1..=2, value_names = ["START", "STOP"])]
    pub stage: Vec<u32>,

    /// Read RESP text from stdin and write responses to stdout
    #[arg(long, default_value_t = false)]
    pub stdio: bool,

    /// Use the estimated delay of FIR stages instead of the applied correction
    #[arg(long, default_value_t = false)]
    pub use_estimated_delay: bool,

    /// Report response lists at their tabulated frequencies
    #[arg(long = "il", default_value_t = false)]
    pub interpolate_output: bool,

    /// Interpolate response lists onto the requested frequencies
    #[arg(long = "ii", default_value_t = false)]
    pub interpolate_input: bool,

    /// Unwrap the phase on output
    #[arg(long, default_value_t = false)]
    pub unwrap: bool,

    /// Scale by the documented total sensitivity instead of the computed one
    #[arg(long = "ts", default_value_t = false)]
    pub total_sensitivity: bool,

    /// Input value at which polynomial stages are evaluated
    #[arg(long = "b62-x", allow_negative_numbers = true)]
    pub b62_x: Option<f64>,

    /// Print a summary of every evaluated channel
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// JSON file with evaluation options; flags given on the command line win
    #[arg(long)]
    pub options: Option<PathBuf>,
}

impl Args {
    /// Stage range from `--stage`, with the bounds sorted.
    pub fn stage_range(&self) -> Option<StageRange> {
        match self.stage.as_slice() {
            [] => None,
            [only] => Some(StageRange::only(*only)),
            [a, b, ..] => Some(StageRange::new(Some(*a.min(b)), Some(*a.max(b)))),
        }
    }

    /// Frequency grid from the positional bounds; a single 1 Hz frequency
    /// when they are omitted.
    pub fn frequency_grid(&self) -> FrequencyGrid {
        match (self.min_freq, self.max_freq, self.nfreq) {
            (Some(min_freq), Some(max_freq), Some(count)) => FrequencyGrid {
                min_freq,
                max_freq,
                count,
                spacing: self.spacing,
            },
            _ => FrequencyGrid {
                spacing: self.spacing,
                ..Default::default()
            },
        }
    }

    /// Channel selection from the code lists and the requested instant.
    pub fn channel_filter(&self) -> Result<ChannelFilter, Box<dyn Error>> {
        let date = NaiveDate::from_yo_opt(self.year, self.julian_day).ok_or_else(|| {
            format!("invalid date: year {} day {}", self.year, self.julian_day)
        })?;
        let clock = parse_clock(&self.time).ok_or_else(|| {
            format!(
                "time of day must have format HH[:MM[:SS[.ffff]]], found '{}'",
                self.time
            )
        })?;
        let filter = ChannelFilter::new(
            &self.stations,
            &self.channels,
            &self.network,
            &self.location,
            Some(date.and_time(clock)),
        )?;
        Ok(filter)
    }

    /// Evaluation options: the `--options` file if any, then the flags.
    pub fn to_options(&self) -> Result<Options, Box<dyn Error>> {
        let mut options = match &self.options {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| format!("cannot read options file {}: {}", path.display(), e))?;
                Options::from_json_str(&text)?
            }
            None => Options::default(),
        };
        if let Some(range) = self.stage_range() {
            options.stages = range;
        }
        if let Some(unit) = self.units {
            options.output_unit = unit;
        }
        if self.interpolate_input {
            options.list_mode = ListMode::InterpolateInput;
        } else if self.interpolate_output {
            options.list_mode = ListMode::InterpolateOutput;
        }
        if let Some(x) = self.b62_x {
            options.polynomial_operating_point = Some(x);
        }
        options.use_estimated_delay |= self.use_estimated_delay;
        options.use_documented_sensitivity |= self.total_sensitivity;
        Ok(options)
    }
}

/// Validate CLI arguments
pub fn validate_args(args: &Args) -> Result<(), String> {
    let bounds = [
        args.min_freq.is_some(),
        args.max_freq.is_some(),
        args.nfreq.is_some(),
    ];
    if bounds.iter().any(|b| *b) && !bounds.iter().all(|b| *b) {
        return Err("MINFREQ, MAXFREQ and NFREQ must be given together".to_string());
    }
    if args.nfreq == Some(0) {
        return Err("NFREQ must be positive".to_string());
    }
    if args.spacing == Spacing::Log
        && (args.min_freq == Some(0.0) || args.max_freq == Some(0.0))
    {
        return Err("frequency limits cannot be 0 with log spacing".to_string());
    }
    if args.interpolate_input && args.interpolate_output {
        return Err("--il and --ii cannot be used together".to_string());
    }
    if !(1..=366).contains(&args.julian_day) {
        return Err(format!(
            "JDAY must be between 1 and 366, found {}",
            args.julian_day
        ));
    }
    if args.stdio && args.file.is_some() {
        log::warn!("reading from stdin, --file is ignored");
    }
    Ok(())
}

/// Validate CLI arguments and exit with an error message if validation fails
pub fn validate_args_or_exit(args: &Args) {
    if let Err(error) = validate_args(args) {
        eprintln!("❌ Validation Error: {}", error);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["evalresp", "ANMO", "BHZ", "2010", "32"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_positional_arguments() {
        let args = parse(&["0.01", "10", "50"]);
        assert_eq!(args.stations, "ANMO");
        assert_eq!(args.channels, "BHZ");
        let grid = args.frequency_grid();
        assert_eq!(grid.min_freq, 0.01);
        assert_eq!(grid.max_freq, 10.0);
        assert_eq!(grid.count, 50);
        assert_eq!(grid.spacing, Spacing::Log);
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_missing_frequency_bounds() {
        let args = parse(&[]);
        assert!(validate_args(&args).is_ok());
        assert_eq!(args.frequency_grid().count, 1);

        let partial = parse(&["0.1", "10"]);
        assert!(validate_args(&partial).is_err());
    }

    #[test]
    fn test_log_spacing_rejects_zero() {
        let args = parse(&["0", "10", "5"]);
        assert!(validate_args(&args).is_err());
        let args = parse(&["0", "10", "5", "--spacing", "lin"]);
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_stage_range() {
        assert_eq!(parse(&[]).stage_range(), None);
        assert_eq!(parse(&["--stage", "2"]).stage_range(), Some(StageRange::only(2)));
        assert_eq!(
            parse(&["--stage", "4", "1"]).stage_range(),
            Some(StageRange::new(Some(1), Some(4)))
        );
    }

    #[test]
    fn test_options_from_flags() {
        let args = parse(&[
            "1", "10", "3", "--units", "acc", "--ii", "--ts", "--b62-x", "-2.5",
            "--use-estimated-delay",
        ]);
        let options = args.to_options().unwrap();
        assert_eq!(options.output_unit, OutputUnit::Acceleration);
        assert_eq!(options.list_mode, ListMode::InterpolateInput);
        assert!(options.use_documented_sensitivity);
        assert!(options.use_estimated_delay);
        assert_eq!(options.polynomial_operating_point, Some(-2.5));

        let both = parse(&["--il", "--ii"]);
        assert!(validate_args(&both).is_err());
    }

    #[test]
    fn test_options_file_is_overridden_by_flags() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(
            &path,
            r#"{"output_unit": "Displacement", "use_estimated_delay": true}"#,
        )
        .unwrap();
        let path = path.to_string_lossy().to_string();

        let options = parse(&["--options", &path]).to_options().unwrap();
        assert_eq!(options.output_unit, OutputUnit::Displacement);
        assert!(options.use_estimated_delay);

        let options = parse(&["--options", &path, "--units", "vel"]).to_options().unwrap();
        assert_eq!(options.output_unit, OutputUnit::Velocity);
    }

    #[test]
    fn test_channel_filter_uses_date_and_time() {
        let args = parse(&["--time", "12:30", "--network", "IU", "--location", "00"]);
        let filter = args.channel_filter().unwrap();
        let expected = NaiveDate::from_yo_opt(2010, 32)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(filter.time(), Some(expected));

        let bad_time = parse(&["--time", "25:00"]);
        assert!(bad_time.channel_filter().is_err());

        let bad_day = Args::try_parse_from(["evalresp", "ANMO", "BHZ", "2010", "367"]).unwrap();
        assert!(bad_day.channel_filter().is_err());
        assert!(validate_args(&bad_day).is_err());
    }

    #[test]
    fn test_response_type_flag() {
        assert_eq!(parse(&[]).response, ResponseType::Fap);
        assert_eq!(parse(&["-r", "cs"]).response, ResponseType::ComplexSpectra);
        assert!(
            Args::try_parse_from(["evalresp", "ANMO", "BHZ", "2010", "32", "-r", "xx"]).is_err()
        );
    }
}
