//! Merging of histogram files produced by jobs split by systematic.
//!
//! Groups are either described by a YAML merge spec or discovered from `*_histos_*.root`
//! files. Each group becomes one `hupdate.exe <output> <inputs...>` call.

use crate::{
    config::{ConfigErrors, MergeConfig},
    error::RunnerError,
    executors::{run_tool, ExecutorError},
};
use globset::GlobBuilder;
use ignore::{DirEntry, WalkBuilder};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, info, instrument};


pub const DEFAULT_HUPDATE: &str = "hupdate.exe";
const DISCOVER_GLOB: &str = "*_histos_*.root";

static HISTOS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<stem>.+)_histos_(?P<systematic>.+)\.root$").unwrap());

/// One region: `inputs` holds a `{}` placeholder replaced by every systematic of the block
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RegionMergeSpec {
    pub output: String,
    pub inputs: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MergeSpec {
    pub executable: Option<PathBuf>,
    // histogram directory, relative file names are resolved against it
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub systematics: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub regions: Vec<RegionMergeSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeGroup {
    pub output: PathBuf,
    pub inputs: Vec<PathBuf>,
}

impl MergeSpec {
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        let contents = fs::read_to_string(path).map_err(|e| RunnerError::io(path, e))?;

        serde_yaml::from_str(&contents).map_err(|source| {
            ConfigErrors::MergeSpec {
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
    }

    /// Resolve all regions against the systematics `block`, `directory` overrides the spec's
    pub fn groups(
        &self,
        block: &str,
        directory: Option<&Path>,
    ) -> Result<Vec<MergeGroup>, ConfigErrors> {
        let systematics =
            self.systematics
                .get(block)
                .ok_or_else(|| ConfigErrors::UnknownSystematicsBlock {
                    block: block.to_string(),
                    available: self.systematics.keys().join(", "),
                })?;

        let base = directory
            .or(self.directory.as_deref())
            .unwrap_or(Path::new(""));

        self.regions
            .iter()
            .map(|region| {
                if !region.inputs.contains("{}") {
                    return Err(ConfigErrors::MissingPlaceholder(region.inputs.clone()));
                }

                Ok(MergeGroup {
                    output: base.join(&region.output),
                    inputs: systematics
                        .iter()
                        .map(|systematic| base.join(region.inputs.replace("{}", systematic)))
                        .collect(),
                })
            })
            .collect()
    }
}

/// Group `<stem>_histos_<systematic>.root` files below `dir` into `<stem>_histos.root`
pub fn discover(dir: &Path) -> Result<Vec<MergeGroup>, RunnerError> {
    if !dir.is_dir() {
        return Err(ConfigErrors::FileNotFound(dir.to_path_buf()).into());
    }

    let glob = GlobBuilder::new(DISCOVER_GLOB)
        .literal_separator(true)
        .build()
        .map_err(ConfigErrors::from)?
        .compile_matcher();

    let mut builder = WalkBuilder::new(dir);
    builder.max_depth(Some(1)).standard_filters(false);

    let groups = builder
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map_or(false, |kind| kind.is_file()))
        .map(DirEntry::into_path)
        .filter(|path| path.file_name().map_or(false, |name| glob.is_match(name)))
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            let stem = HISTOS.captures(&name)?.name("stem")?.as_str().to_string();
            Some((dir.join(format!("{stem}_histos.root")), path))
        })
        .into_group_map();

    debug!(directory = ?dir, "Discovered {} histogram groups", groups.len());

    Ok(groups
        .into_iter()
        .sorted_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(output, inputs)| MergeGroup {
            output,
            inputs: inputs.into_iter().sorted().collect(),
        })
        .collect())
}

/// First of: command line, merge spec, settings file, the TRExFitter build, `hupdate.exe` on PATH
pub fn resolve_executable(
    explicit: Option<&Path>,
    spec: Option<&MergeSpec>,
    settings: &MergeConfig,
    trex_path: Option<&Path>,
) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| spec.and_then(|spec| spec.executable.clone()))
        .or_else(|| settings.executable.clone())
        .or_else(|| trex_path.map(|trex| trex.join("build/bin").join(DEFAULT_HUPDATE)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HUPDATE))
}

#[derive(Clone, Debug)]
pub struct Merger {
    executable: PathBuf,
    dry_run: bool,
}

impl Merger {
    pub fn new(executable: PathBuf, dry_run: bool) -> Self {
        Self {
            executable,
            dry_run,
        }
    }

    pub fn command(&self, group: &MergeGroup) -> Command {
        let mut command = Command::new(&self.executable);
        command.arg(&group.output).args(&group.inputs);
        command
    }

    /// Run all groups in order, the first failure aborts
    #[instrument(skip_all, level = "info")]
    pub fn run(&self, groups: &[MergeGroup]) -> Result<(), ExecutorError> {
        for (index, group) in groups.iter().enumerate() {
            let mut command = self.command(group);

            if self.dry_run {
                info!(command = ?command, "Dry run, not merging");
                continue;
            }

            debug!(command = ?command, "Merging");
            run_tool(&mut command)?;
            info!(
                output = ?group.output,
                "Merged {} files, done with {}/{}",
                group.inputs.len(),
                index + 1,
                groups.len()
            );
        }

        Ok(())
    }
}
