//! Writing computed responses to files or to a stream

use evalresp_core::{Response, ResponseType};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const RULE: &str = " --------------------------------------------------";

/// Write `response` to `out`, each format under a banner naming its file.
pub fn write_stream<W: Write + ?Sized>(
    out: &mut W,
    response: &Response,
    response_type: ResponseType,
    unwrap: bool,
) -> io::Result<()> {
    for format in response_type.formats() {
        writeln!(out, "{}", RULE)?;
        writeln!(out, " {}", response.file_name(*format))?;
        writeln!(out, "{}", RULE)?;
        out.write_all(response.render(*format, unwrap).as_bytes())?;
        writeln!(out, "{}", RULE)?;
    }
    Ok(())
}

/// Write `response` into `dir`, one file per format; returns the paths written.
pub fn write_files(
    dir: &Path,
    response: &Response,
    response_type: ResponseType,
    unwrap: bool,
) -> io::Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(response_type.formats().len());
    for format in response_type.formats() {
        let path = dir.join(response.file_name(*format));
        fs::write(&path, response.render(*format, unwrap))?;
        log::info!("wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalresp_core::Sncl;
    use ndarray::Array1;
    use num_complex::Complex64;
    use tempfile::TempDir;

    fn response() -> Response {
        Response {
            sncl: Sncl {
                network: "IU".to_string(),
                station: "ANMO".to_string(),
                location: "00".to_string(),
                channel: "BHZ".to_string(),
            },
            frequencies: Array1::from_vec(vec![1.0, 2.0]),
            values: Array1::from_vec(vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 2.0)]),
        }
    }

    #[test]
    fn test_amplitude_phase_files() {
        let dir = TempDir::new().unwrap();
        let paths = write_files(dir.path(), &response(), ResponseType::AmplitudePhase, false).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["AMP.IU.ANMO.00.BHZ", "PHASE.IU.ANMO.00.BHZ"]);

        let amp = fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(
            amp,
            "1.000000E+00  1.000000E+00\n2.000000E+00  2.000000E+00\n"
        );
        let phase = fs::read_to_string(&paths[1]).unwrap();
        assert!(phase.ends_with("2.000000E+00  9.000000E+01\n"), "{}", phase);
    }

    #[test]
    fn test_stream_banner() {
        let mut out = Vec::new();
        write_stream(&mut out, &response(), ResponseType::Fap, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], RULE);
        assert_eq!(lines[1], " FAP.IU.ANMO.00.BHZ");
        assert_eq!(lines[3], "1.000000E+00  1.000000E+00  0.000000E+00");
        assert_eq!(lines.last().copied(), Some(RULE));
        assert_eq!(lines.len(), 6);
    }
}
