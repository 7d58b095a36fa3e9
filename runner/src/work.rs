use crate::{action::ActionSet, trex::short_name};
use std::path::PathBuf;

#[cfg(test)]
mod work_test;

/// Group of systematics handled by a single histogram job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bundle {
    pub label: String,
    pub systematics: Vec<String>,
}

/// Contiguous slice of a config's nuisance parameters, ranked by a single job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NpBatch {
    pub index: usize,
    pub parameters: Vec<String>,
}

impl NpBatch {
    pub fn label(&self) -> String {
        format!("NP_batch_{:04}", self.index)
    }
}

/// Part of the fitting task covered by a WorkUnit
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slice {
    Whole,
    Region { region: String },
    Systematics { region: String, bundle: Bundle },
    Nuisance { batch: NpBatch },
    ScanStep { step: u32 },
}

impl Slice {
    pub fn region(&self) -> Option<&str> {
        match self {
            Self::Region { region } | Self::Systematics { region, .. } => Some(region),
            _ => None,
        }
    }

    pub fn label(&self) -> Option<String> {
        match self {
            Self::Whole | Self::Region { .. } => None,
            Self::Systematics { bundle, .. } => Some(bundle.label.clone()),
            Self::Nuisance { batch } => Some(batch.label()),
            Self::ScanStep { step } => Some(format!("scan_{step:04}")),
        }
    }
}

/// One independently submittable piece of work
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkUnit {
    pub actions: ActionSet,
    pub configs: Vec<PathBuf>,
    pub slice: Slice,
    /// passthrough options for the fitter, `<Option>=<Value>`
    pub options: Vec<String>,
    /// files read alongside the configs, staged with them when outputs are transferred
    pub inputs: Vec<PathBuf>,
}

impl WorkUnit {
    /// Deterministic identity used for script, submit and log file names
    pub fn name(&self) -> String {
        let config = match self.configs.as_slice() {
            [config] => short_name(config),
            _ => "combined".to_string(),
        };

        let mut parts = vec![self.actions.to_string(), config];
        parts.extend(self.slice.region().map(str::to_string));
        parts.extend(self.slice.label());

        parts
            .iter()
            .map(|part| sanitize(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Full option list handed to the fitter, generated options first
    pub fn trex_options(&self) -> Vec<String> {
        let mut options = match &self.slice {
            Slice::Whole => Vec::new(),
            Slice::Region { region } => vec![format!("Regions={region}")],
            Slice::Systematics { region, bundle } => vec![
                format!("Regions={region}"),
                format!("Systematics={}", bundle.systematics.join(",")),
                format!("SaveSuffix=_{}", bundle.label),
            ],
            Slice::Nuisance { batch } => vec![format!("Ranking={}", batch.parameters.join(","))],
            Slice::ScanStep { step } => vec![
                "Parallel2Dscan=TRUE".to_string(),
                format!("Parallel2DscanStep={step}"),
            ],
        };

        options.extend(self.options.iter().cloned());
        options
    }
}

/// Replace everything outside `[A-Za-z0-9_-]` so names are safe as file names
pub fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
