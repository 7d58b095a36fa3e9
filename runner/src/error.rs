use crate::{arguments::RecordError, config::ConfigErrors, executors::ExecutorError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top level error of a run, every variant aborts the current subcommand
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigErrors),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("External tool error: {0}")]
    ExternalTool(#[from] ExecutorError),
    #[error("Malformed arguments file: {0}")]
    Record(#[from] RecordError),
    #[error("Failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

impl RunnerError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
