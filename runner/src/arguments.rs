//! Arguments files, the durable record of what was generated for a run.
//!
//! One [`ArgumentRecord`] per line with the tab separated fields
//! `job kind actions configs region label items options inputs`. Lists inside a field are
//! joined with `,` (configs, items, inputs) or `:` (options). Records written by
//! [`write_records`] parse back into the same WorkUnits and serialize to the same bytes.

use crate::{
    action::ActionSet,
    config::ConfigErrors,
    error::RunnerError,
    work::{Bundle, NpBatch, Slice, WorkUnit},
};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::debug;


#[derive(Error, Debug)]
pub enum RecordError {
    #[error("expected 9 tab separated fields, found {0}")]
    FieldCount(usize),
    #[error("unknown record kind '{0}'")]
    UnknownKind(String),
    #[error("invalid actions: {0}")]
    Actions(#[from] ConfigErrors),
    #[error("record of kind '{kind}' requires a {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("record of kind '{kind}' has an unexpected {field}")]
    UnexpectedField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("invalid label '{0}'")]
    InvalidLabel(String),
    #[error("job '{job}' does not match its fields, expected '{expected}'")]
    JobMismatch { job: String, expected: String },
    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        source: Box<RecordError>,
    },
}

/// A WorkUnit together with the job name it was generated under
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgumentRecord {
    pub job: String,
    pub unit: WorkUnit,
}

impl From<WorkUnit> for ArgumentRecord {
    fn from(unit: WorkUnit) -> Self {
        Self {
            job: unit.name(),
            unit,
        }
    }
}

impl ArgumentRecord {
    pub fn kind(&self) -> &'static str {
        match self.unit.slice {
            Slice::Whole => "whole",
            Slice::Region { .. } => "region",
            Slice::Systematics { .. } => "syst",
            Slice::Nuisance { .. } => "nps",
            Slice::ScanStep { .. } => "scan",
        }
    }

    fn items(&self) -> String {
        match &self.unit.slice {
            Slice::Systematics { bundle, .. } => bundle.systematics.join(","),
            Slice::Nuisance { batch } => batch.parameters.join(","),
            _ => String::new(),
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.to_string_lossy())
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for ArgumentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.job,
            self.kind(),
            self.unit.actions,
            join_paths(&self.unit.configs),
            self.unit.slice.region().unwrap_or_default(),
            self.unit.slice.label().unwrap_or_default(),
            self.items(),
            self.unit.options.join(":"),
            join_paths(&self.unit.inputs),
        )
    }
}

fn split_list(field: &str, separator: char) -> Vec<String> {
    field
        .split(separator)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn require<'a>(
    kind: &'static str,
    field: &'static str,
    value: &'a str,
) -> Result<&'a str, RecordError> {
    if value.is_empty() {
        Err(RecordError::MissingField { kind, field })
    } else {
        Ok(value)
    }
}

fn reject(kind: &'static str, field: &'static str, value: &str) -> Result<(), RecordError> {
    if value.is_empty() {
        Ok(())
    } else {
        Err(RecordError::UnexpectedField { kind, field })
    }
}

// trailing zero padded counter of `NP_batch_0003` / `scan_0003`
fn label_index(label: &str, prefix: &str) -> Result<u32, RecordError> {
    label
        .strip_prefix(prefix)
        .and_then(|index| index.parse().ok())
        .ok_or_else(|| RecordError::InvalidLabel(label.to_string()))
}

impl FromStr for ArgumentRecord {
    type Err = RecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split('\t').collect();
        let [job, kind, actions, configs, region, label, items, options, inputs] = fields[..] else {
            return Err(RecordError::FieldCount(fields.len()));
        };

        let (kind, slice) = match kind {
            "whole" => {
                reject("whole", "region", region)?;
                reject("whole", "label", label)?;
                reject("whole", "item list", items)?;
                ("whole", Slice::Whole)
            }
            "region" => {
                reject("region", "label", label)?;
                reject("region", "item list", items)?;
                let region = require("region", "region", region)?.to_string();
                ("region", Slice::Region { region })
            }
            "syst" => {
                let bundle = Bundle {
                    label: require("syst", "label", label)?.to_string(),
                    systematics: split_list(require("syst", "item list", items)?, ','),
                };
                let region = require("syst", "region", region)?.to_string();
                ("syst", Slice::Systematics { region, bundle })
            }
            "nps" => {
                reject("nps", "region", region)?;
                let batch = NpBatch {
                    index: label_index(require("nps", "label", label)?, "NP_batch_")? as usize,
                    parameters: split_list(require("nps", "item list", items)?, ','),
                };
                ("nps", Slice::Nuisance { batch })
            }
            "scan" => {
                reject("scan", "region", region)?;
                reject("scan", "item list", items)?;
                let step = label_index(require("scan", "label", label)?, "scan_")?;
                ("scan", Slice::ScanStep { step })
            }
            other => return Err(RecordError::UnknownKind(other.to_string())),
        };

        let unit = WorkUnit {
            actions: ActionSet::from_str(actions)?,
            configs: split_list(require(kind, "config", configs)?, ',')
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            slice,
            options: split_list(options, ':'),
            inputs: split_list(inputs, ',')
                .into_iter()
                .map(PathBuf::from)
                .collect(),
        };

        let expected = unit.name();
        if job != expected {
            return Err(RecordError::JobMismatch {
                job: job.to_string(),
                expected,
            });
        }

        Ok(Self {
            job: job.to_string(),
            unit,
        })
    }
}

/// Parse all records of an arguments file, blank lines are skipped
pub fn read_records(path: &Path) -> Result<Vec<ArgumentRecord>, RunnerError> {
    let contents = fs::read_to_string(path).map_err(|e| RunnerError::io(path, e))?;

    let records = contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            line.parse::<ArgumentRecord>()
                .map_err(|source| RecordError::AtLine {
                    line: index + 1,
                    source: Box::new(source),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(path = ?path, "Read {} argument records", records.len());

    Ok(records)
}

/// Write one record per line, an empty slice produces an empty file
pub fn write_records(path: &Path, records: &[ArgumentRecord]) -> Result<(), RunnerError> {
    let contents: String = records
        .iter()
        .map(|record| format!("{record}\n"))
        .collect();

    fs::write(path, contents).map_err(|e| RunnerError::io(path, e))?;
    debug!(path = ?path, "Wrote {} argument records", records.len());

    Ok(())
}
