//! Quick checks on downloaded datasets: `.root` counts per directory and file names
//! referenced in text listings.

use crate::{config::ConfigErrors, error::RunnerError};
use globset::GlobBuilder;
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

#[cfg(test)]
mod sanity_test;

pub const DEFAULT_GLOB: &str = "*.root";

static ROOT_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+\.root").unwrap());

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryCount {
    pub directory: PathBuf,
    pub files: usize,
}

/// Matching files per directory, sorted by directory
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CountReport {
    pub directories: Vec<DirectoryCount>,
    pub total: usize,
}

impl fmt::Display for CountReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .directories
            .iter()
            .map(|count| count.files.to_string().len())
            .max()
            .unwrap_or(1);

        for count in &self.directories {
            writeln!(f, "{:>width$}  {}", count.files, count.directory.display())?;
        }
        write!(f, "total: {}", self.total)
    }
}

/// Count files whose name matches `glob` in every directory below `root`
pub fn count(root: &Path, glob: &str) -> Result<CountReport, RunnerError> {
    if !root.is_dir() {
        return Err(ConfigErrors::FileNotFound(root.to_path_buf()).into());
    }

    let matcher = GlobBuilder::new(glob)
        .literal_separator(true)
        .build()
        .map_err(ConfigErrors::from)?
        .compile_matcher();
    debug!("Filtering with glob: {matcher:?}");

    // hidden directories and ignore files must not hide data
    let mut builder = WalkBuilder::new(root);
    builder.standard_filters(false).follow_links(true);

    let per_directory = builder
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map_or(false, |kind| kind.is_file()))
        .map(DirEntry::into_path)
        .filter(|path| path.file_name().map_or(false, |name| matcher.is_match(name)))
        .filter_map(|path| path.parent().map(Path::to_path_buf))
        .counts();

    let directories = per_directory
        .into_iter()
        .sorted()
        .map(|(directory, files)| DirectoryCount { directory, files })
        .collect_vec();
    let total = directories.iter().map(|count| count.files).sum();

    info!(
        root = ?root,
        "Found {total} files matching {glob} in {} directories",
        directories.len()
    );

    Ok(CountReport { directories, total })
}

/// Every `<name>.root` mentioned in a text file, in order of appearance
pub fn extract(path: &Path) -> Result<Vec<String>, RunnerError> {
    let contents = fs::read_to_string(path).map_err(|e| RunnerError::io(path, e))?;

    Ok(ROOT_FILE
        .find_iter(&contents)
        .map(|found| found.as_str().to_string())
        .collect())
}
