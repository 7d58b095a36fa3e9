//! Integrated mode: configs and their replacement files are copied into the work directory
//! and rewritten so that results land in `<work-dir>/results`.

use crate::{
    config::ConfigErrors,
    error::RunnerError,
    trex::{ConfigInventory, Entry},
};
use itertools::Itertools;
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

#[cfg(test)]
mod integrate_test;

/// Marker file in the work directory remembering that a run was integrated
pub const CACHE_FILE: &str = ".integrate.cache";
pub const REPLACEMENT_SUFFIX: &str = "_REPLACEMENTFILE";
const RESULTS_PATH: &str = "../results/";
const PATH_KEYS: [&str; 2] = ["OutputDir", "InputFolder"];

pub fn read_flag(work_dir: &Path) -> Result<bool, RunnerError> {
    let path = work_dir.join(CACHE_FILE);

    if !path.is_file() {
        return Ok(false);
    }

    let contents = fs::read_to_string(&path).map_err(|e| RunnerError::io(&path, e))?;
    Ok(contents.trim().eq_ignore_ascii_case("true"))
}

pub fn write_flag(work_dir: &Path, integrate: bool) -> Result<(), RunnerError> {
    let path = work_dir.join(CACHE_FILE);
    let contents = if integrate { "True" } else { "False" };

    fs::write(&path, contents).map_err(|e| RunnerError::io(&path, e))
}

/// Name a config is cached under, the file name without `.yaml`
pub fn cache_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    match file_name.strip_suffix(".yaml") {
        Some(stem) => stem.to_string(),
        None => file_name,
    }
}

/// A validated config waiting to be copied into the cache
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedConfig {
    pub source: PathBuf,
    pub name: String,
    pub replacement: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ConfigCache {
    dir: PathBuf,
}

impl ConfigCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// All cached configs, replacement files excluded
    pub fn cached(&self) -> Result<Vec<PathBuf>, RunnerError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| RunnerError::io(&self.dir, e))?;
        let mut configs = Vec::new();

        for entry in entries {
            let path = entry.map_err(|e| RunnerError::io(&self.dir, e))?.path();
            if path.is_file() && !path.to_string_lossy().ends_with(REPLACEMENT_SUFFIX) {
                configs.push(path);
            }
        }

        configs.sort();
        Ok(configs)
    }

    /// Validate new configs against each other and the cache without touching the disk
    pub fn plan(&self, configs: &[PathBuf]) -> Result<Vec<StagedConfig>, RunnerError> {
        let mut staged = Vec::with_capacity(configs.len());

        for source in configs {
            if !source.is_file() {
                return Err(ConfigErrors::ConfigNotFound(source.clone()).into());
            }

            let contents = fs::read_to_string(source).map_err(|e| RunnerError::io(source, e))?;
            let replacement = ConfigInventory::from_contents(source, &contents)
                .replacement_file
                .map(|file| source.parent().unwrap_or(Path::new(".")).join(file));

            if let Some(ref replacement) = replacement {
                if !replacement.is_file() {
                    return Err(ConfigErrors::ReplacementNotFound {
                        config: source.clone(),
                        replacement: replacement.clone(),
                    }
                    .into());
                }
            }

            staged.push(StagedConfig {
                source: source.clone(),
                name: cache_name(source),
                replacement,
            });
        }

        if let Some(name) = staged.iter().map(|config| &config.name).duplicates().next() {
            return Err(ConfigErrors::DuplicateConfigName(name.clone()).into());
        }

        let cached: BTreeSet<String> = self
            .cached()?
            .iter()
            .map(|path| cache_name(path))
            .collect();

        if let Some(config) = staged.iter().find(|config| cached.contains(&config.name)) {
            return Err(ConfigErrors::CachedConfigClash(config.name.clone()).into());
        }

        Ok(staged)
    }

    /// Copy validated configs into the cache and rewrite their paths
    pub fn stage(&self, staged: &[StagedConfig]) -> Result<Vec<PathBuf>, RunnerError> {
        fs::create_dir_all(&self.dir).map_err(|e| RunnerError::io(&self.dir, e))?;
        let mut written = Vec::with_capacity(staged.len());

        for config in staged {
            let target = self.dir.join(format!("{}.yaml", config.name));
            let replacement_name = config
                .replacement
                .as_ref()
                .map(|_| format!("{}.yaml{REPLACEMENT_SUFFIX}", config.name));

            if let (Some(source), Some(name)) = (&config.replacement, &replacement_name) {
                let replacement_target = self.dir.join(name);
                fs::copy(source, &replacement_target)
                    .map_err(|e| RunnerError::io(&replacement_target, e))?;
            }

            let contents =
                fs::read_to_string(&config.source).map_err(|e| RunnerError::io(&config.source, e))?;
            fs::write(&target, rewrite_config(&contents, replacement_name.as_deref()))
                .map_err(|e| RunnerError::io(&target, e))?;

            info!(config = ?config.source, cached = ?target, "Integrated config");
            written.push(target);
        }

        Ok(written)
    }

    /// Pick cached configs by name, with or without the `.yaml` extension
    pub fn select(&self, names: &[String]) -> Result<Vec<PathBuf>, RunnerError> {
        let cached = self.cached()?;
        let mut selected: Vec<PathBuf> = Vec::with_capacity(names.len());

        for name in names {
            let wanted = cache_name(Path::new(name));
            let Some(path) = cached.iter().find(|path| cache_name(path) == wanted) else {
                return Err(ConfigErrors::ConfigNotCached {
                    name: name.clone(),
                    cached: cached.iter().map(|path| cache_name(path)).join(", "),
                }
                .into());
            };

            if selected.contains(path) {
                warn!("Config '{name}' was selected twice, ignoring");
            } else {
                selected.push(path.clone());
            }
        }

        debug!("Selected {} cached configs", selected.len());
        Ok(selected)
    }
}

/// Point `ReplacementFile` at the cached copy and output folders at `../results/`
pub fn rewrite_config(contents: &str, replacement: Option<&str>) -> String {
    contents
        .split_inclusive('\n')
        .map(|line| {
            let Some(entry) = Entry::parse(line.trim_end_matches(['\r', '\n'])) else {
                return line.to_string();
            };

            let value = match (entry.key, replacement) {
                ("ReplacementFile", Some(replacement)) if entry.is_quoted() => {
                    format!("\"{replacement}\"")
                }
                ("ReplacementFile", Some(replacement)) => replacement.to_string(),
                (key, _) if PATH_KEYS.contains(&key) => format!("\"{RESULTS_PATH}\""),
                _ => return line.to_string(),
            };

            // only touch the value part after the key
            match line.find(':') {
                Some(colon) => format!(
                    "{}{}",
                    &line[..=colon],
                    line[colon + 1..].replacen(entry.raw, &value, 1)
                ),
                None => line.to_string(),
            }
        })
        .collect()
}
