//! Line based reader for the parts of TRExFitter configs needed to split jobs.
//!
//! Only `key: value` entries are interpreted, block structure is ignored. Values may be
//! quoted and hold several `;` separated names, `%` and `#` start comments.

use crate::error::RunnerError;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};


static KEY_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?P<key>[\w-]+)\s*:\s*(?P<value>.*)$").unwrap());

/// `key: value` line of a TRExFitter config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<'a> {
    pub key: &'a str,
    /// value with comments stripped, still quoted
    pub raw: &'a str,
}

impl<'a> Entry<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let captures = KEY_VALUE.captures(line)?;
        let key = captures.name("key")?.as_str();
        let raw = strip_comment(captures.name("value")?.as_str()).trim();

        if raw.is_empty() {
            None
        } else {
            Some(Self { key, raw })
        }
    }

    /// all `;` separated names with surrounding quotes removed
    pub fn values(&self) -> Vec<String> {
        self.raw
            .split(';')
            .map(|value| unquote(value.trim()))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn first(&self) -> Option<String> {
        self.values().into_iter().next()
    }

    pub fn is_quoted(&self) -> bool {
        self.raw.starts_with('"')
    }
}

// cut at the first `%` or `#` outside of double quotes
fn strip_comment(value: &str) -> &str {
    let mut quoted = false;

    for (index, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '%' | '#' if !quoted => return &value[..index],
            _ => {}
        }
    }

    value
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|value| value.strip_suffix('"'))
        .unwrap_or(value)
}

/// Regions, systematics and nuisance parameters found in one config (and its nested configs)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigInventory {
    pub path: PathBuf,
    pub regions: Vec<String>,
    pub systematics: Vec<String>,
    /// systematics with `NuisanceParameter` renames applied plus non-POI norm factors
    pub nuisance_parameters: Vec<String>,
    pub replacement_file: Option<String>,
    /// files the fitter reads besides the config: replacement files and nested configs
    pub companions: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct Scan {
    regions: BTreeSet<String>,
    systematics: BTreeSet<String>,
    nuisance_parameters: Vec<String>,
    replacement_file: Option<String>,
    sub_configs: Vec<String>,
    companions: Vec<PathBuf>,
}

impl Scan {
    fn read(contents: &str) -> Self {
        let mut scan = Self::default();
        // start of the most recent systematic block inside `nuisance_parameters`
        let mut last_block: Option<usize> = None;

        for entry in contents.lines().filter_map(Entry::parse) {
            match entry.key {
                "Region" => scan.regions.extend(entry.values()),
                "Systematic" | "UnfoldingSystematic" => {
                    let names = entry.values();
                    last_block = Some(scan.nuisance_parameters.len());
                    scan.systematics.extend(names.iter().cloned());
                    scan.nuisance_parameters.extend(names);
                }
                "NuisanceParameter" => match last_block.take() {
                    Some(start) => {
                        scan.nuisance_parameters.truncate(start);
                        scan.nuisance_parameters.extend(entry.values());
                    }
                    None => warn!(
                        line = entry.raw,
                        "NuisanceParameter outside of a systematic block, ignoring"
                    ),
                },
                "NormFactor" => {
                    last_block = None;
                    scan.nuisance_parameters.extend(
                        entry
                            .values()
                            .into_iter()
                            .filter(|name| !name.starts_with("mu_")),
                    );
                }
                "ReplacementFile" if scan.replacement_file.is_none() => {
                    scan.replacement_file = entry.first();
                }
                "ConfigFile" => scan.sub_configs.extend(entry.first()),
                _ => {}
            }
        }

        scan
    }

    // `ReplacementFile` is relative to the directory of the config naming it
    fn resolve_replacement(&mut self, parent: &Path) {
        self.companions
            .extend(self.replacement_file.as_ref().map(|file| parent.join(file)));
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or(Path::new("."))
}

impl ConfigInventory {
    /// Read a config from disk, `multi_fit` also pulls in nested `ConfigFile` entries
    pub fn load(path: &Path, multi_fit: bool) -> Result<Self, RunnerError> {
        let mut visited = BTreeSet::new();
        let scan = Self::scan_file(path, multi_fit, &mut visited)?;
        let inventory = Self::from_scan(path, scan);

        inventory.log_summary();

        Ok(inventory)
    }

    /// Build an inventory from config contents without following nested configs
    pub fn from_contents(path: &Path, contents: &str) -> Self {
        let mut scan = Scan::read(contents);
        scan.resolve_replacement(parent_dir(path));

        Self::from_scan(path, scan)
    }

    fn from_scan(path: &Path, scan: Scan) -> Self {
        Self {
            path: path.to_path_buf(),
            regions: scan.regions.into_iter().collect(),
            systematics: scan.systematics.into_iter().collect(),
            nuisance_parameters: scan
                .nuisance_parameters
                .into_iter()
                .sorted()
                .dedup()
                .collect(),
            replacement_file: scan.replacement_file,
            companions: scan.companions.into_iter().unique().collect(),
        }
    }

    fn scan_file(
        path: &Path,
        multi_fit: bool,
        visited: &mut BTreeSet<PathBuf>,
    ) -> Result<Scan, RunnerError> {
        let contents = fs::read_to_string(path).map_err(|e| RunnerError::io(path, e))?;
        let mut scan = Scan::read(&contents);
        let parent = parent_dir(path);
        scan.resolve_replacement(parent);

        if !multi_fit {
            return Ok(scan);
        }

        visited.insert(path.to_path_buf());

        for sub_config in std::mem::take(&mut scan.sub_configs) {
            let sub_path = parent.join(&sub_config);

            if visited.contains(&sub_path) {
                warn!(config = ?path, nested = ?sub_path, "Nested config included twice, skipping");
                continue;
            }

            debug!(config = ?path, nested = ?sub_path, "Reading nested config");
            let nested = Self::scan_file(&sub_path, multi_fit, visited)?;

            scan.companions.push(sub_path);
            scan.companions.extend(nested.companions);
            scan.regions.extend(nested.regions);
            scan.systematics.extend(nested.systematics);
            scan.nuisance_parameters.extend(nested.nuisance_parameters);
        }

        Ok(scan)
    }

    /// Job name component derived from the config file name
    pub fn short_name(&self) -> String {
        short_name(&self.path)
    }

    fn log_summary(&self) {
        info!(
            "Regions found in {:?} (and its nested configs): {}",
            self.path,
            self.regions.join(", ")
        );

        if self.systematics.is_empty() {
            info!("No systematics found in {:?}", self.path);
        } else {
            info!(
                "{} systematics found in {:?} (and its nested configs)",
                self.systematics.len(),
                self.path
            );
            let width = self.systematics.len().to_string().len();
            for (index, systematic) in self.systematics.iter().enumerate() {
                debug!("  {:>width$}. {systematic}", index + 1);
            }
        }
    }
}

pub fn short_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().replace('.', "_"))
        .unwrap_or_default()
}
