//! Result persistence and small report helpers shared by the suites.

use chrono::Local;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to create results directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Writes suite results as pretty JSON into a results directory.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    dir: PathBuf,
    enabled: bool,
}

impl ResultWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            enabled: true,
        }
    }

    /// A writer that never touches the filesystem.
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `value` to `<prefix>_results_<YYYYmmdd_HHMMSS>.json`.
    ///
    /// Returns `None` when the writer is disabled.
    pub fn write<T: Serialize>(&self, prefix: &str, value: &T) -> Result<Option<PathBuf>, ReportError> {
        if !self.enabled {
            return Ok(None);
        }

        fs::create_dir_all(&self.dir).map_err(|source| ReportError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(results_filename(prefix));
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).map_err(|source| ReportError::Write {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), "Results saved");
        Ok(Some(path))
    }
}

pub fn results_filename(prefix: &str) -> String {
    format!(
        "{}_results_{}.json",
        prefix,
        Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// ISO-8601 timestamp for result files.
pub fn timestamp() -> String {
    Local::now().to_rfc3339()
}

/// `other / base`, or 0 when the base is not positive.
pub fn ratio(other: f64, base: f64) -> f64 {
    if base > 0.0 {
        other / base
    } else {
        0.0
    }
}

/// Relative change from `base` to `other` in percent, if computable.
pub fn percent_change(base: f64, other: f64) -> Option<f64> {
    (base > 0.0).then(|| (other - base) / base * 100.0)
}

pub fn print_banner(title: &str) {
    println!("\n{}", "=".repeat(70));
    println!("{}", title);
    println!("{}", "=".repeat(70));
}

pub fn print_section(title: &str) {
    println!("\n{}", title);
    println!("{}", "-".repeat(50));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_shape() {
        let name = results_filename("quick");
        assert!(name.starts_with("quick_results_"));
        assert!(name.ends_with(".json"));
        // quick_results_ + YYYYmmdd_HHMMSS + .json
        assert_eq!(name.len(), "quick_results_".len() + 15 + 5);
    }

    #[test]
    fn ratios() {
        assert_eq!(ratio(3.0, 1.5), 2.0);
        assert_eq!(ratio(3.0, 0.0), 0.0);
        assert_eq!(percent_change(2.0, 3.0), Some(50.0));
        assert_eq!(percent_change(0.0, 3.0), None);
    }

    #[test]
    fn disabled_writer_skips() {
        let writer = ResultWriter::disabled();
        assert!(writer.write("x", &1).unwrap().is_none());
    }
}
