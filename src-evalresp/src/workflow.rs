//! Shared workflow helpers used by the evalresp binary
//!
//! This module centralizes the pipeline steps: locating the RESP input,
//! evaluating every selected channel and writing the responses.

use crate::cli::Args;
use crate::output;
use evalresp_core::{
    ChannelFilter, ChannelReader, Options, RespError, Response, evaluate_channel,
};
use ndarray::Array1;
use std::error::Error;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// One RESP text and where it came from.
#[derive(Debug, Clone)]
pub struct Input {
    pub origin: String,
    pub text: String,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub responses: usize,
    pub failures: usize,
}

/// Load the RESP texts to evaluate, from stdin or from the file search path.
pub fn load_inputs(args: &Args, filter: &ChannelFilter) -> Result<Vec<Input>, Box<dyn Error>> {
    if args.stdio {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        return Ok(vec![Input {
            origin: "stdin".to_string(),
            text,
        }]);
    }
    let local = std::env::current_dir()?;
    let seedresp = evalresp_env::seedresp_dir()?;
    let files = evalresp_env::find_resp_files(
        args.file.as_deref(),
        filter,
        &local,
        seedresp.as_deref(),
    )?;
    if files.is_empty() {
        return Err("no RESP file found for the requested channels".into());
    }
    read_inputs(&files)
}

/// Read every file into an [`Input`].
pub fn read_inputs(files: &[PathBuf]) -> Result<Vec<Input>, Box<dyn Error>> {
    files
        .iter()
        .map(|path| {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
            Ok(Input {
                origin: path.display().to_string(),
                text,
            })
        })
        .collect()
}

/// Evaluate the channels of `input` selected by `filter`.
///
/// With `verbose`, the canonical form of each channel is printed to stderr
/// after evaluation.
pub fn evaluate_input(
    input: &Input,
    filter: &ChannelFilter,
    frequencies: &Array1<f64>,
    options: &Options,
    verbose: bool,
) -> Vec<Result<Response, RespError>> {
    log::debug!("reading channels from {}", input.origin);
    let mut results = Vec::new();
    let reader = ChannelReader::new(&input.text, options.default_units).select(filter.clone());
    for parsed in reader {
        let mut channel = match parsed {
            Ok(channel) => channel,
            Err(e) => {
                log::warn!("{}: {}", input.origin, e);
                results.push(Err(e));
                continue;
            }
        };
        let result = evaluate_channel(&mut channel, frequencies, options);
        if verbose {
            eprintln!("{}", channel);
        }
        if let Err(e) = &result {
            log::warn!("{} ({}): {}", channel.sncl, input.origin, e);
        }
        results.push(result);
    }
    results
}

/// Where the responses go.
pub enum Sink<'a> {
    Stream(&'a mut dyn Write),
    Directory(&'a Path),
}

/// Evaluate all inputs and write each response to `sink`.
pub fn process(
    inputs: &[Input],
    args: &Args,
    sink: &mut Sink<'_>,
) -> Result<RunSummary, Box<dyn Error>> {
    let filter = args.channel_filter()?;
    let options = args.to_options()?;
    let frequencies = args.frequency_grid().frequencies()?;

    let mut summary = RunSummary::default();
    for input in inputs {
        for result in evaluate_input(input, &filter, &frequencies, &options, args.verbose) {
            let response = match result {
                Ok(response) => response,
                Err(_) => {
                    summary.failures += 1;
                    continue;
                }
            };
            match sink {
                Sink::Stream(out) => {
                    output::write_stream(&mut **out, &response, args.response, args.unwrap)?
                }
                Sink::Directory(dir) => {
                    output::write_files(*dir, &response, args.response, args.unwrap)?;
                }
            }
            summary.responses += 1;
        }
    }
    Ok(summary)
}

/// Run the full command: load, evaluate and write.
pub fn run(args: &Args) -> Result<RunSummary, Box<dyn Error>> {
    let filter = args.channel_filter()?;
    let inputs = load_inputs(args, &filter)?;
    let summary = if args.stdio {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        let summary = process(&inputs, args, &mut Sink::Stream(&mut lock))?;
        lock.flush()?;
        summary
    } else {
        let cwd = std::env::current_dir()?;
        process(&inputs, args, &mut Sink::Directory(&cwd))?
    };
    if summary.responses == 0 {
        return Err(format!(
            "no response computed ({} channel(s) failed)",
            summary.failures
        )
        .into());
    }
    Ok(summary)
}
