//! `submit`: partition a fitting task, write descriptors and enqueue them.
//!
//! All validation (actions, split flags, TRExFitter installation, configs and the
//! resulting job names) runs before the first generated file is written. Integrated mode
//! is the exception as the cached configs have to exist before they can be partitioned.

use crate::{
    action::ActionSet,
    arguments::{read_records, write_records, ArgumentRecord},
    config::{ConfigErrors, RunnerConfig},
    descriptor::{DescriptorSettings, JobDescriptor, Layout},
    error::RunnerError,
    executors::Executors,
    integrate::{self, ConfigCache},
    partition::{Partitioner, SplitRequest},
    trex::ConfigInventory,
    work::WorkUnit,
};
use itertools::Itertools;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};


#[derive(Clone, Debug, Default)]
pub struct SubmitRequest {
    pub work_dir: PathBuf,
    pub trex_path: PathBuf,
    /// no actions: only integrate/ update configs
    pub actions: Option<ActionSet>,
    pub configs: Vec<PathBuf>,
    pub use_configs: Vec<String>,
    pub options: Vec<String>,
    pub integrate: bool,
    pub dry_run: bool,
    pub transfer_output: bool,
    pub run_time: Option<u64>,
    pub split: SplitRequest,
    pub from_args: Option<PathBuf>,
}

/// Run a full submission, returns the descriptors that were written
#[instrument(skip_all, level = "info")]
pub fn submit(
    request: &SubmitRequest,
    settings: &RunnerConfig,
) -> Result<Vec<JobDescriptor>, RunnerError> {
    let layout = Layout::new(absolute(&request.work_dir)?);

    if let Some(ref arguments) = request.from_args {
        return resubmit(request, settings, &layout, arguments);
    }

    let integrate = request.integrate || integrate::read_flag(layout.work_dir())?;
    if !integrate && !request.use_configs.is_empty() {
        warn!("--use-config has no effect outside of integrated mode");
    }

    let partitioner = request
        .actions
        .as_ref()
        .map(|actions| {
            let plan = request
                .split
                .plan(actions.clone(), &settings.fitter, request.options.clone())?;
            Partitioner::new(plan)
        })
        .transpose()?;
    let descriptor_settings = partitioner
        .as_ref()
        .map(|_| descriptor_settings(request, settings))
        .transpose()?;

    let configs = if integrate {
        let cache = ConfigCache::new(layout.configs_dir());
        let staged = cache.plan(&request.configs)?;

        cache.stage(&staged)?;
        integrate::write_flag(layout.work_dir(), true)?;

        if request.use_configs.is_empty() {
            cache.cached()?
        } else {
            cache.select(&request.use_configs)?
        }
    } else {
        request
            .configs
            .iter()
            .map(|config| resolve_config(config))
            .collect::<Result<Vec<_>, _>>()?
    };

    let (Some(partitioner), Some(descriptor_settings)) = (partitioner, descriptor_settings) else {
        if integrate {
            info!("No actions given, {} configs cached", configs.len());
        } else {
            warn!("No actions given and not integrating, nothing to do");
        }
        return Ok(Vec::new());
    };

    let actions = &partitioner.plan().actions;
    let inventories = configs
        .iter()
        .map(|config| ConfigInventory::load(config, actions.is_multi_fit()))
        .collect::<Result<Vec<_>, _>>()?;
    let units = partitioner.partition(&inventories)?;

    layout.create()?;
    if !integrate {
        integrate::write_flag(layout.work_dir(), false)?;
    }

    let descriptors = materialise(
        &units,
        &layout,
        &descriptor_settings,
        Some(layout.arguments_path(actions)),
    )?;
    enqueue(&descriptors, settings, request.dry_run)?;

    Ok(descriptors)
}

/// Regenerate descriptors for the records of an arguments file, configs are not re-read
fn resubmit(
    request: &SubmitRequest,
    settings: &RunnerConfig,
    layout: &Layout,
    arguments: &Path,
) -> Result<Vec<JobDescriptor>, RunnerError> {
    if request.actions.is_some() || !request.options.is_empty() || !request.configs.is_empty() {
        warn!("Actions, options and configs are taken from {arguments:?}, ignoring the command line");
    }

    let descriptor_settings = descriptor_settings(request, settings)?;
    let units = read_records(arguments)?
        .into_iter()
        .map(|record| record.unit)
        .collect_vec();

    if let Some(name) = units.iter().map(WorkUnit::name).duplicates().next() {
        return Err(ConfigErrors::DuplicateJob(name).into());
    }

    if units.is_empty() {
        info!("No jobs listed in {arguments:?}, nothing to resubmit");
        return Ok(Vec::new());
    }

    layout.create()?;
    let descriptors = materialise(&units, layout, &descriptor_settings, None)?;
    enqueue(&descriptors, settings, request.dry_run)?;

    Ok(descriptors)
}

fn descriptor_settings(
    request: &SubmitRequest,
    settings: &RunnerConfig,
) -> Result<DescriptorSettings, RunnerError> {
    let trex_path = absolute(&request.trex_path)?;
    if !trex_path.is_dir() {
        return Err(ConfigErrors::TrexNotFound(trex_path).into());
    }

    let setup_script = trex_path.join(&settings.fitter.setup_script);
    if !setup_script.is_file() {
        return Err(ConfigErrors::SetupNotFound(setup_script).into());
    }

    Ok(DescriptorSettings {
        setup_script,
        fitter: settings.fitter.executable.clone(),
        universe: settings.scheduler.universe.clone(),
        run_time: request.run_time.or(settings.scheduler.run_time),
        request_cpus: settings.scheduler.request_cpus,
        requirements: settings.scheduler.requirements.clone(),
        transfer_output: request.transfer_output,
        transfer_output_files: settings.scheduler.transfer_output_files.clone(),
    })
}

/// Render and write every descriptor, then the arguments file
fn materialise(
    units: &[WorkUnit],
    layout: &Layout,
    settings: &DescriptorSettings,
    arguments: Option<PathBuf>,
) -> Result<Vec<JobDescriptor>, RunnerError> {
    let descriptors = units
        .iter()
        .map(|unit| JobDescriptor::render(unit, layout, settings))
        .collect_vec();

    for descriptor in &descriptors {
        descriptor.write()?;
    }

    if let Some(path) = arguments {
        let records = units.iter().cloned().map(ArgumentRecord::from).collect_vec();
        write_records(&path, &records)?;
        info!(arguments = ?path, "Wrote {} job arguments", records.len());
    }

    info!(
        "Wrote {} job descriptors to {:?}",
        descriptors.len(),
        layout.scripts_dir()
    );

    Ok(descriptors)
}

fn enqueue(
    descriptors: &[JobDescriptor],
    settings: &RunnerConfig,
    dry_run: bool,
) -> Result<(), RunnerError> {
    Executors::load(&settings.scheduler, dry_run).submit(descriptors)?;
    Ok(())
}

fn resolve_config(config: &Path) -> Result<PathBuf, RunnerError> {
    if !config.is_file() {
        return Err(ConfigErrors::ConfigNotFound(config.to_path_buf()).into());
    }

    let resolved = fs::canonicalize(config).map_err(|e| RunnerError::io(config, e))?;
    debug!(config = ?config, resolved = ?resolved, "Resolved config");

    Ok(resolved)
}

// wrappers `cd` into config directories, every generated path has to be absolute
fn absolute(path: &Path) -> Result<PathBuf, RunnerError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        env::current_dir()
            .map(|dir| dir.join(path))
            .map_err(|e| RunnerError::io(path, e))
    }
}
