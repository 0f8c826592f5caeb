//! evalresp-core - frequency responses of seismic instruments
//!
//! This crate reads channel responses written in the SEED RESP text format
//! and evaluates them at arbitrary frequencies:
//!
//! - `read`: RESP grammar, stage assembly and the multi-channel stream
//! - `check` and `normalize`: canonical stage chains and sensitivities
//! - `calc`: transfer functions of every filter kind
//! - `interpolate` and `spline`: resampling of tabulated responses
//! - `response`: amplitude/phase views and text renderings
//!
//! ```
//! use evalresp_core::{Options, evaluate};
//! use ndarray::Array1;
//!
//! let text = "\
//! B050F03 Station: ANMO
//! B050F16 Network: IU
//! B052F03 Location: 00
//! B052F04 Channel: BHZ
//! B052F22 Start date: 2020,001,00:00:00
//! B052F23 End date: No Ending Time
//! B053F03 Transfer function type: A [Laplace Transform (Rad/sec)]
//! B053F04 Stage sequence number: 1
//! B053F05 Response in units lookup: M/S - Velocity in Meters Per Second
//! B053F06 Response out units lookup: V - Volts
//! B053F07 A0 normalization factor: 1.0
//! B053F08 Normalization frequency: 1.0
//! B053F09 Number of zeroes: 0
//! B053F14 Number of poles: 0
//! B058F03 Stage sequence number: 1
//! B058F04 Sensitivity: 1500.0
//! B058F05 Frequency of sensitivity: 1.0
//! B058F06 Number of calibrations: 0
//! ";
//! let freqs = Array1::from_vec(vec![0.1, 1.0, 10.0]);
//! let response = evaluate(text, &freqs, &Options::default()).unwrap();
//! assert!((response.amplitudes()[1] - 1500.0).abs() < 1e-9);
//! ```

/// Transfer functions and their composition
pub mod calc;
/// Validation and canonicalization of stage chains
pub mod check;
/// Error type
pub mod error;
/// End-to-end evaluation
pub mod evaluate;
/// Response-list resampling
pub mod interpolate;
/// Channel, stage and filter model
pub mod model;
/// Gain normalization
pub mod normalize;
/// Evaluation options and frequency grids
pub mod options;
/// RESP text reader
pub mod read;
/// Computed responses and output formats
pub mod response;
/// Channel selection
pub mod select;
/// Natural cubic spline
pub mod spline;
/// Unit names and codes
pub mod units;

// Re-export commonly used items
pub use error::{RespError, Result};
pub use evaluate::{evaluate, evaluate_all, evaluate_channel};
pub use model::{Channel, Filter, Sncl, Stage};
pub use options::{FrequencyGrid, ListMode, Options, OutputUnit, Spacing, StageRange};
pub use read::{ChannelReader, parse_channel, parse_channels, parse_resp_time};
pub use response::{OutputFormat, Response, ResponseType};
pub use select::ChannelFilter;
pub use units::Units;
