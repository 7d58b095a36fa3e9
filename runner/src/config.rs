use crate::{action::SplitKind, error::RunnerError, triage::ErrorMarker};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error, warn};


/// settings file picked up from the working directory when `--settings` is not given
pub const DEFAULT_SETTINGS_FILE: &str = "trex-runner.yaml";

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Unknown TRExFitter action '{0}'")]
    UnknownAction(char),
    #[error("No actions found in '{0}'")]
    EmptyActions(String),
    #[error("Action '{0}' was given more than once")]
    RepeatedAction(char),
    #[error("Ntuple action `n` must be used alone, got `{0}`")]
    NtupleNotAlone(String),
    #[error("No configs supplied, at least one `--config` is required outside of integrated mode")]
    NoConfigs,
    #[error("{flag} requests a {split} split, which is not supported for actions `{actions}`")]
    IncompatibleSplit {
        flag: &'static str,
        split: SplitKind,
        actions: String,
    },
    #[error("Ranking and likelihood-scan splits cannot be combined for actions `{0}`, use --single-np")]
    CombinedSplits(String),
    #[error("{0} must be at least 1")]
    InvalidBatchSize(&'static str),
    #[error("TRExFitter folder not found at {0}")]
    TrexNotFound(PathBuf),
    #[error("TRExFitter setup script not found at {0}")]
    SetupNotFound(PathBuf),
    #[error("Config not found at {0}")]
    ConfigNotFound(PathBuf),
    #[error("Replacement file {replacement} of {config} not found")]
    ReplacementNotFound { config: PathBuf, replacement: PathBuf },
    #[error("Region '{region}' in {config} is already defined by another config")]
    DuplicateRegion { region: String, config: PathBuf },
    #[error("Multiple configs share the name '{0}'")]
    DuplicateConfigName(String),
    #[error("Config '{0}' clashes with an already cached config")]
    CachedConfigClash(String),
    #[error("Config '{name}' is not cached, available configs: {cached}")]
    ConfigNotCached { name: String, cached: String },
    #[error("Two work units resolve to the same job name '{0}'")]
    DuplicateJob(String),
    #[error("{field} value '{value}' contains a reserved character")]
    InvalidField { field: &'static str, value: String },
    #[error("Systematics block '{block}' is not defined, available blocks: {available}")]
    UnknownSystematicsBlock { block: String, available: String },
    #[error("Merge spec entry '{0}' has no '{{}}' placeholder for the systematic")]
    MissingPlaceholder(String),
    #[error("Failed to parse settings file {path}")]
    Settings {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Failed to parse merge spec {path}")]
    MergeSpec {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Invalid glob")]
    InvalidGlob(#[from] globset::Error),
    #[error("Settings contain errors, see log output above")]
    InvalidSettings,
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[from] Error),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub fitter: FitterConfig,
    #[serde(default)]
    pub triage: TriageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub merge: MergeConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    // command used to enqueue a single submit file
    #[serde(default = "default_submit_command")]
    pub submit_command: String,
    #[serde(default = "default_universe")]
    pub universe: String,
    // requested runtime in seconds, overridden by `--run-time`
    pub run_time: Option<u64>,
    pub request_cpus: Option<u32>,
    pub requirements: Option<String>,
    // files/ directories to stage out when `--transfer-output` is set
    #[serde(default)]
    pub transfer_output_files: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct FitterConfig {
    // name of the fitter binary, expected on PATH after sourcing the setup script
    #[serde(default = "default_fitter_executable")]
    pub executable: String,
    // relative to the TRExFitter folder
    #[serde(default = "default_setup_script")]
    pub setup_script: PathBuf,
    #[serde(default = "default_nps_per_job")]
    pub nps_per_job: usize,
    #[serde(default = "default_systs_per_job")]
    pub systs_per_job: usize,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct TriageConfig {
    #[serde(default = "default_success_marker")]
    pub success_marker: String,
    // appended to the built-in markers
    #[serde(default)]
    pub markers: Vec<ErrorMarker>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default = "default_rsync")]
    pub rsync: PathBuf,
    #[serde(default = "default_rsync_flags")]
    pub flags: String,
    #[serde(default = "default_remote_shell")]
    pub remote_shell: String,
    // KB/s
    #[serde(default = "default_bwlimit")]
    pub bwlimit: u64,
    #[serde(default = "default_sync_threads")]
    pub threads: usize,
    #[serde(default = "default_sync_attempts")]
    pub attempts: u32,
    // seconds, no timeout if unset
    pub timeout: Option<u64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    // path to hupdate.exe, defaults to the one inside the TRExFitter build
    pub executable: Option<PathBuf>,
}

fn default_submit_command() -> String {
    "condor_submit".to_string()
}

fn default_universe() -> String {
    "vanilla".to_string()
}

fn default_fitter_executable() -> String {
    "trex-fitter".to_string()
}

fn default_setup_script() -> PathBuf {
    PathBuf::from("setup.sh")
}

fn default_nps_per_job() -> usize {
    30
}

fn default_systs_per_job() -> usize {
    1
}

fn default_success_marker() -> String {
    "Success".to_string()
}

fn default_rsync() -> PathBuf {
    PathBuf::from("rsync")
}

fn default_rsync_flags() -> String {
    "-vzraWP".to_string()
}

fn default_remote_shell() -> String {
    "ssh".to_string()
}

fn default_bwlimit() -> u64 {
    50000
}

fn default_sync_threads() -> usize {
    4
}

fn default_sync_attempts() -> u32 {
    2
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            submit_command: default_submit_command(),
            universe: default_universe(),
            run_time: None,
            request_cpus: None,
            requirements: None,
            transfer_output_files: Vec::new(),
        }
    }
}

impl Default for FitterConfig {
    fn default() -> Self {
        Self {
            executable: default_fitter_executable(),
            setup_script: default_setup_script(),
            nps_per_job: default_nps_per_job(),
            systs_per_job: default_systs_per_job(),
        }
    }
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            success_marker: default_success_marker(),
            markers: Vec::new(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rsync: default_rsync(),
            flags: default_rsync_flags(),
            remote_shell: default_remote_shell(),
            bwlimit: default_bwlimit(),
            threads: default_sync_threads(),
            attempts: default_sync_attempts(),
            timeout: None,
        }
    }
}

impl RunnerConfig {
    /// Load settings from `path`, or from `trex-runner.yaml` if present, falling back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self, RunnerError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_SETTINGS_FILE), false),
        };

        let config = if explicit || path.is_file() {
            debug!(path = ?path, "Loading settings");
            let contents = fs::read_to_string(&path).map_err(|e| RunnerError::io(&path, e))?;
            Self::parse(&contents).map_err(|source| ConfigErrors::Settings {
                path: path.clone(),
                source,
            })?
        } else {
            Self::default()
        };

        if config.preflight_checks() {
            Err(ConfigErrors::InvalidSettings.into())
        } else {
            Ok(config)
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        // an empty file is a valid, all-default settings file
        if contents.trim().is_empty() {
            Ok(Self::default())
        } else {
            serde_yaml::from_str(contents)
        }
    }

    /// Validate settings, returns `true` if any error was found
    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.scheduler.submit_command.trim().is_empty() {
            error!("scheduler.submit_command cannot be empty");
            contains_error = true;
        }

        if self.fitter.executable.trim().is_empty() {
            error!("fitter.executable cannot be empty");
            contains_error = true;
        }

        if self.fitter.nps_per_job == 0 {
            error!("fitter.nps_per_job must be at least 1");
            contains_error = true;
        }

        if self.fitter.systs_per_job == 0 {
            error!("fitter.systs_per_job must be at least 1");
            contains_error = true;
        }

        if self.triage.success_marker.is_empty() {
            error!("triage.success_marker cannot be empty, every log would count as failed");
            contains_error = true;
        }

        for (index, marker) in self.triage.markers.iter().enumerate() {
            if marker.pattern.is_empty() {
                error!("triage.markers[{index}].pattern cannot be empty");
                contains_error = true;
            }
        }

        if self.sync.threads == 0 {
            error!("sync.threads must be at least 1");
            contains_error = true;
        }

        if self.sync.attempts == 0 {
            error!("sync.attempts must be at least 1");
            contains_error = true;
        }

        if self.sync.timeout == Some(0) {
            warn!("sync.timeout is 0, every transfer will time out immediately");
        }

        if let Some(ref executable) = self.merge.executable {
            match check_executable(executable) {
                Ok(true) => {}
                Ok(false) => {
                    error!(
                        "merge.executable {} is not executable",
                        executable.to_string_lossy()
                    );
                    contains_error = true;
                }
                Err(e) => {
                    error!(
                        "Failed to determine if merge.executable ({}) is an executable: {e}",
                        executable.to_string_lossy()
                    );
                    contains_error = true;
                }
            }
        }

        contains_error
    }
}
