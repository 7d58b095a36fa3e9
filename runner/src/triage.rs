//! Post-hoc inspection of job logs.
//!
//! Every record of an arguments file is matched to `<logs>/<job>.out` (and `.err` if present).
//! Failed records are written to a new arguments file that `submit --from-args` accepts,
//! together with a YAML report of the reasons.

use crate::{
    action::ActionSet,
    arguments::{read_records, write_records, ArgumentRecord},
    config::TriageConfig,
    error::RunnerError,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};


/// Built-in markers as `(pattern, reason)`, checked before user supplied ones
pub const DEFAULT_MARKERS: [(&str, &str); 3] = [
    ("trex-fitter: command not found", "fitter not on PATH"),
    ("Error in <TFile::TFile>:", "input file could not be opened"),
    ("ERROR::SampleHist::SmoothSyst", "systematic smoothing failed"),
];

/// Substring that marks a job as failed wherever it shows up in its logs
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ErrorMarker {
    pub pattern: String,
    pub reason: String,
}

impl ErrorMarker {
    pub fn new(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    Marker { pattern: String, reason: String },
    MissingSuccess,
    Unreadable,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Marker { reason, .. } => write!(f, "{reason}"),
            Self::MissingSuccess => write!(f, "unknown failure"),
            Self::Unreadable => write!(f, "log unreadable"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureRecord {
    pub record: ArgumentRecord,
    pub reason: FailureReason,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct ReportEntry {
    pub job: String,
    pub reason: String,
    pub log: PathBuf,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct TriageReport {
    pub steps: Option<String>,
    pub total: usize,
    pub failed: usize,
    pub failures: Vec<ReportEntry>,
}

/// Inputs and outputs of one triage pass
#[derive(Clone, Debug)]
pub struct TriageRequest {
    pub log_dir: PathBuf,
    pub arguments: PathBuf,
    pub new_arguments: PathBuf,
    pub report: PathBuf,
    pub steps: Option<ActionSet>,
}

#[derive(Clone, Debug)]
pub struct Triage {
    markers: Vec<ErrorMarker>,
    success_marker: String,
}

impl Triage {
    /// Built-in markers, then the settings file, then `extra` whose reason is the pattern itself
    pub fn new(config: &TriageConfig, extra: &[String]) -> Self {
        let markers = DEFAULT_MARKERS
            .iter()
            .map(|(pattern, reason)| ErrorMarker::new(*pattern, *reason))
            .chain(config.markers.iter().cloned())
            .chain(
                extra
                    .iter()
                    .map(|pattern| ErrorMarker::new(pattern.as_str(), pattern.as_str())),
            )
            .collect();

        Self {
            markers,
            success_marker: config.success_marker.clone(),
        }
    }

    pub fn markers(&self) -> &[ErrorMarker] {
        &self.markers
    }

    pub fn log_path(log_dir: &Path, job: &str, extension: &str) -> PathBuf {
        log_dir.join(format!("{job}.{extension}"))
    }

    /// `None` if the job succeeded
    pub fn classify(&self, log_dir: &Path, record: &ArgumentRecord) -> Option<FailureReason> {
        let out_path = Self::log_path(log_dir, &record.job, "out");
        let output = match fs::read(&out_path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                debug!(job = %record.job, error = ?e, "Primary log could not be read");
                return Some(FailureReason::Unreadable);
            }
        };

        let err_path = Self::log_path(log_dir, &record.job, "err");
        let error = match fs::read(&err_path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => String::new(),
        };

        if let Some(marker) = self
            .markers
            .iter()
            .find(|marker| output.contains(&marker.pattern) || error.contains(&marker.pattern))
        {
            return Some(FailureReason::Marker {
                pattern: marker.pattern.clone(),
                reason: marker.reason.clone(),
            });
        }

        if output.contains(&self.success_marker) {
            None
        } else {
            Some(FailureReason::MissingSuccess)
        }
    }

    /// Classify all matching records, in arguments file order
    pub fn failures(&self, log_dir: &Path, records: &[ArgumentRecord]) -> Vec<FailureRecord> {
        records
            .iter()
            .filter_map(|record| {
                self.classify(log_dir, record).map(|reason| FailureRecord {
                    record: record.clone(),
                    reason,
                })
            })
            .collect()
    }

    pub fn run(&self, request: &TriageRequest) -> Result<TriageReport, RunnerError> {
        fs::read_dir(&request.log_dir).map_err(|e| RunnerError::io(&request.log_dir, e))?;

        let records: Vec<ArgumentRecord> = read_records(&request.arguments)?
            .into_iter()
            .filter(|record| match request.steps {
                Some(ref steps) => &record.unit.actions == steps,
                None => true,
            })
            .collect();

        if records.is_empty() {
            warn!(arguments = ?request.arguments, "No records to check");
        }

        let failures = self.failures(&request.log_dir, &records);

        for failure in &failures {
            info!(job = %failure.record.job, reason = %failure.reason, "Failed");
        }

        let failed_records: Vec<ArgumentRecord> = failures
            .iter()
            .map(|failure| failure.record.clone())
            .collect();
        write_records(&request.new_arguments, &failed_records)?;

        let report = TriageReport {
            steps: request.steps.as_ref().map(ToString::to_string),
            total: records.len(),
            failed: failures.len(),
            failures: failures
                .iter()
                .map(|failure| ReportEntry {
                    job: failure.record.job.clone(),
                    reason: failure.reason.to_string(),
                    log: Self::log_path(&request.log_dir, &failure.record.job, "out"),
                })
                .collect(),
        };

        let contents = serde_yaml::to_string(&report).map_err(|source| RunnerError::Serialize {
            path: request.report.clone(),
            source,
        })?;
        fs::write(&request.report, contents).map_err(|e| RunnerError::io(&request.report, e))?;

        if failures.is_empty() {
            info!("No failed jobs found out of {}", records.len());
        } else {
            info!(
                "{} of {} jobs failed, resubmit with --from-args {:?}",
                failures.len(),
                records.len(),
                request.new_arguments
            );
        }

        Ok(report)
    }
}
