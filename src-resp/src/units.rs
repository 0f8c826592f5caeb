//! Physical units of stage inputs and outputs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Unit category of a stage input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Units {
    /// Unit name not recognized
    #[default]
    Undefined,
    /// Displacement (m, cm, mm, nm)
    Displacement,
    /// Velocity (m/s ...)
    Velocity,
    /// Acceleration (m/s**2 ...)
    Acceleration,
    /// Digital counts
    Counts,
    /// Volts
    Volts,
    /// Units were not decoded (default-units policy)
    Default,
    /// Pressure (Pa)
    Pressure,
    /// Magnetic flux density (T)
    Tesla,
    /// Temperature (degrees centigrade)
    Centigrade,
}

impl Units {
    /// Returns the short code used in diagnostics (e.g., "VEL").
    pub fn code(&self) -> &'static str {
        match self {
            Units::Undefined => "UNDEF",
            Units::Displacement => "DIS",
            Units::Velocity => "VEL",
            Units::Acceleration => "ACC",
            Units::Counts => "COUNTS",
            Units::Volts => "VOLTS",
            Units::Default => "DEF",
            Units::Pressure => "PA",
            Units::Tesla => "T",
            Units::Centigrade => "C",
        }
    }

    /// True for the three ground-motion categories.
    pub fn is_ground_motion(&self) -> bool {
        matches!(
            self,
            Units::Displacement | Units::Velocity | Units::Acceleration
        )
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

static ACCELERATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[CNM]?M/S\*\*2|^[CNM]?M/SEC\*\*2").expect("valid regex"));
static VELOCITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[CNM]?M/S|^[CNM]?M/SEC").expect("valid regex"));
static DISPLACEMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[CNM]?M[^A-Z/]?").expect("valid regex"));
static COUNTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^COUNTS?[^A-Z]?|^DIGITAL[^A-Z]?").expect("valid regex"));
static VOLTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^V[^A-Z]?|^VOLTS[^A-Z]?").expect("valid regex"));

/// Decodes a RESP unit description such as `M/S - Velocity in Meters Per Second`.
///
/// Matching is case-insensitive and only looks at the leading unit symbol.
/// Unknown names decode to [`Units::Undefined`] and log a warning; the
/// validator rejects them later for functional stages.
pub fn decode_units(name: &str) -> Units {
    let upper = name.trim().to_uppercase();
    if upper.starts_with("PA") {
        return Units::Pressure;
    }
    if upper.starts_with("T -") {
        return Units::Tesla;
    }
    if upper.starts_with("C -") {
        return Units::Centigrade;
    }
    if ACCELERATION.is_match(&upper) {
        Units::Acceleration
    } else if VELOCITY.is_match(&upper) {
        Units::Velocity
    } else if DISPLACEMENT.is_match(&upper) {
        Units::Displacement
    } else if COUNTS.is_match(&upper) {
        Units::Counts
    } else if VOLTS.is_match(&upper) {
        Units::Volts
    } else {
        log::warn!("units '{}' are not supported", name.trim());
        Units::Undefined
    }
}

/// Scale factor turning a ground-motion response expressed per nm, mm or cm
/// into one expressed per meter.
///
/// Only applied to the input units of the first stage of a channel.
pub fn scale_to_meters(name: &str) -> f64 {
    let upper = name.trim().to_uppercase();
    if !decode_units_quiet(&upper).is_ground_motion() {
        return 1.0;
    }
    if upper.starts_with("NM") {
        1.0e9
    } else if upper.starts_with("MM") {
        1.0e3
    } else if upper.starts_with("CM") {
        1.0e2
    } else {
        1.0
    }
}

fn decode_units_quiet(upper: &str) -> Units {
    if ACCELERATION.is_match(upper) {
        Units::Acceleration
    } else if VELOCITY.is_match(upper) {
        Units::Velocity
    } else if DISPLACEMENT.is_match(upper) {
        Units::Displacement
    } else {
        Units::Undefined
    }
}
