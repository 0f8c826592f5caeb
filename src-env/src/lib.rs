//! Environment and file discovery utilities for evalresp
//!
//! This crate locates RESP files, either in a directory given on the
//! command line or in the current directory and the directory named by the
//! `SEEDRESP` environment variable.

use evalresp_core::{ChannelFilter, Sncl};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming a fallback directory of RESP files
pub const SEEDRESP: &str = "SEEDRESP";

/// Error type for environment and file lookup issues
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("SEEDRESP points to a non-existent directory: {0}")]
    SeedrespNotFound(PathBuf),

    #[error("RESP file or directory not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Get the SEEDRESP directory from a variable lookup
///
/// The lookup is injected so that callers and tests do not depend on the
/// process environment. An unset or empty variable gives `None`.
///
/// # Errors
///
/// Returns an error if the variable points to a non-existent directory.
pub fn seedresp_dir_from<F>(lookup: F) -> Result<Option<PathBuf>, EnvError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(SEEDRESP).filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    let path = PathBuf::from(value.trim());
    if !path.is_dir() {
        return Err(EnvError::SeedrespNotFound(path));
    }
    Ok(Some(path))
}

/// Get the SEEDRESP directory from the process environment
///
/// # Example
///
/// ```no_run
/// use evalresp_env::seedresp_dir;
///
/// if let Some(dir) = seedresp_dir()? {
///     println!("RESP files are also searched in {}", dir.display());
/// }
/// # Ok::<(), evalresp_env::EnvError>(())
/// ```
pub fn seedresp_dir() -> Result<Option<PathBuf>, EnvError> {
    seedresp_dir_from(|key| env::var(key).ok())
}

/// Parse a file name of the form `RESP.NET.STA.LOC.CHA` or `RESP.NET.STA.CHA`
pub fn parse_resp_name(name: &str) -> Option<Sncl> {
    let parts: Vec<&str> = name.split('.').collect();
    let (network, station, location, channel) = match parts.as_slice() {
        ["RESP", n, s, l, c] => (n, s, *l, c),
        ["RESP", n, s, c] => (n, s, "", c),
        _ => return None,
    };
    Some(Sncl {
        network: network.to_string(),
        station: station.to_string(),
        location: location.to_string(),
        channel: channel.to_string(),
    })
}

/// List the RESP files of `dir` whose names match `filter`, sorted by name
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn scan_dir(dir: &Path, filter: &ChannelFilter) -> Result<Vec<PathBuf>, EnvError> {
    let entries = std::fs::read_dir(dir).map_err(|source| EnvError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(parse_resp_name)
                .is_some_and(|sncl| filter.matches_sncl(&sncl))
        })
        .collect();
    files.sort();
    log::debug!("{} RESP files selected in {}", files.len(), dir.display());
    Ok(files)
}

/// Find the RESP files to read
///
/// With an explicit `file`, a regular file is used as is and a directory is
/// scanned. Otherwise `local_dir` is scanned, then `seedresp` when it is a
/// different directory; a local file hides a SEEDRESP file of the same name.
///
/// # Errors
///
/// Returns an error if the explicit path does not exist or if a directory
/// cannot be read.
pub fn find_resp_files(
    file: Option<&Path>,
    filter: &ChannelFilter,
    local_dir: &Path,
    seedresp: Option<&Path>,
) -> Result<Vec<PathBuf>, EnvError> {
    if let Some(file) = file {
        if file.is_dir() {
            return scan_dir(file, filter);
        }
        if file.is_file() {
            return Ok(vec![file.to_path_buf()]);
        }
        return Err(EnvError::NotFound(file.to_path_buf()));
    }

    let mut files = scan_dir(local_dir, filter)?;
    if let Some(seed) = seedresp.filter(|dir| !same_dir(dir, local_dir)) {
        let shadowed: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_os_string())
            .collect();
        let extra: Vec<PathBuf> = scan_dir(seed, filter)?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .is_none_or(|name| !shadowed.iter().any(|s| s == name))
            })
            .collect();
        files.extend(extra);
    }
    if files.is_empty() {
        log::warn!("no RESP file matches the requested channels");
    }
    Ok(files)
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_seedresp_lookup() {
        let dir = TempDir::new().unwrap();
        let value = dir.path().to_string_lossy().to_string();

        let found = seedresp_dir_from(|_| Some(value.clone())).unwrap();
        assert_eq!(found.as_deref(), Some(dir.path()));

        assert!(seedresp_dir_from(|_| None).unwrap().is_none());
        assert!(seedresp_dir_from(|_| Some("  ".to_string())).unwrap().is_none());
        assert!(matches!(
            seedresp_dir_from(|_| Some("/this/path/should/not/exist".to_string())),
            Err(EnvError::SeedrespNotFound(_))
        ));
    }

    #[test]
    fn test_parse_resp_name() {
        let sncl = parse_resp_name("RESP.IU.ANMO.00.BHZ").unwrap();
        assert_eq!(sncl.to_string(), "IU.ANMO.00.BHZ");
        let sncl = parse_resp_name("RESP.IU.ANMO.BHZ").unwrap();
        assert_eq!(sncl.location, "");
        assert!(parse_resp_name("FAP.IU.ANMO.00.BHZ").is_none());
        assert!(parse_resp_name("RESP").is_none());
    }

    #[test]
    fn test_scan_dir_applies_the_filter() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "RESP.IU.ANMO.00.BHZ", "");
        touch(dir.path(), "RESP.IU.ANMO.00.LHZ", "");
        touch(dir.path(), "RESP.IU.COLA.BHZ", "");
        touch(dir.path(), "notes.txt", "");

        let filter = ChannelFilter::new("*", "BHZ", "*", "*", None).unwrap();
        let files = scan_dir(dir.path(), &filter).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["RESP.IU.ANMO.00.BHZ", "RESP.IU.COLA.BHZ"]);
    }

    #[test]
    fn test_local_files_take_precedence() {
        let local = TempDir::new().unwrap();
        let seed = TempDir::new().unwrap();
        let local_file = touch(local.path(), "RESP.IU.ANMO.00.BHZ", "local");
        touch(seed.path(), "RESP.IU.ANMO.00.BHZ", "seed");
        let seed_only = touch(seed.path(), "RESP.IU.ANMO.10.BHZ", "seed");

        let files = find_resp_files(
            None,
            &ChannelFilter::any(),
            local.path(),
            Some(seed.path()),
        )
        .unwrap();
        assert_eq!(files, vec![local_file, seed_only]);
    }

    #[test]
    fn test_explicit_file_or_directory() {
        let dir = TempDir::new().unwrap();
        let file = touch(dir.path(), "my_response.txt", "");
        let filter = ChannelFilter::any();

        let files = find_resp_files(Some(&file), &filter, dir.path(), None).unwrap();
        assert_eq!(files, vec![file]);

        touch(dir.path(), "RESP.XX.TEST.00.BHZ", "");
        let files = find_resp_files(Some(dir.path()), &filter, Path::new("."), None).unwrap();
        assert_eq!(files.len(), 1);

        let missing = dir.path().join("missing");
        assert!(matches!(
            find_resp_files(Some(&missing), &filter, dir.path(), None),
            Err(EnvError::NotFound(_))
        ));
    }
}
