//! Materialisation of WorkUnits into HTCondor submit descriptors and bash wrappers.
//!
//! Rendering only depends on its inputs, the same units always produce the same bytes.

use crate::{action::ActionSet, error::RunnerError, work::WorkUnit};
use itertools::Itertools;
use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tracing::{debug, trace};

#[cfg(test)]
mod descriptor_test;

/// Directory layout below the work directory
#[derive(Clone, Debug)]
pub struct Layout {
    work_dir: PathBuf,
}

impl Layout {
    pub const SCRIPTS: &'static str = "scripts";
    pub const LOGS: &'static str = "logs";
    pub const CONFIGS: &'static str = "configs";
    pub const RESULTS: &'static str = "results";

    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.work_dir.join(Self::SCRIPTS)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.work_dir.join(Self::LOGS)
    }

    pub fn configs_dir(&self) -> PathBuf {
        self.work_dir.join(Self::CONFIGS)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.work_dir.join(Self::RESULTS)
    }

    pub fn script_path(&self, name: &str) -> PathBuf {
        self.scripts_dir().join(format!("{name}.sh"))
    }

    pub fn submit_path(&self, name: &str) -> PathBuf {
        self.scripts_dir().join(format!("{name}.sub"))
    }

    /// `extension` is one of `log`, `out` or `err`
    pub fn log_path(&self, name: &str, extension: &str) -> PathBuf {
        self.logs_dir().join(format!("{name}.{extension}"))
    }

    pub fn arguments_path(&self, actions: &ActionSet) -> PathBuf {
        self.work_dir.join(format!("job_arguments_{actions}.txt"))
    }

    /// Create the work directory and all sub-directories
    pub fn create(&self) -> Result<(), RunnerError> {
        for dir in [
            self.scripts_dir(),
            self.logs_dir(),
            self.configs_dir(),
            self.results_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| RunnerError::io(&dir, e))?;
        }

        Ok(())
    }
}

/// Everything besides the WorkUnit itself that ends up in the generated files
#[derive(Clone, Debug)]
pub struct DescriptorSettings {
    pub setup_script: PathBuf,
    pub fitter: String,
    pub universe: String,
    pub run_time: Option<u64>,
    pub request_cpus: Option<u32>,
    pub requirements: Option<String>,
    /// stage configs in and results out instead of relying on a shared filesystem
    pub transfer_output: bool,
    pub transfer_output_files: Vec<String>,
}

/// Wrapper script and submit descriptor of a single WorkUnit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobDescriptor {
    pub name: String,
    pub script_path: PathBuf,
    pub submit_path: PathBuf,
    pub script: String,
    pub submit: String,
}

/// Quote for bash, `'` inside the value is closed, escaped and reopened
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'\''"#))
}

impl JobDescriptor {
    pub fn render(unit: &WorkUnit, layout: &Layout, settings: &DescriptorSettings) -> Self {
        let name = unit.name();
        let script_path = layout.script_path(&name);
        let submit_path = layout.submit_path(&name);

        let script = render_script(unit, settings);
        let submit = render_submit(&name, unit, &script_path, layout, settings);

        Self {
            name,
            script_path,
            submit_path,
            script,
            submit,
        }
    }

    /// Write both files, the wrapper is made executable
    pub fn write(&self) -> Result<(), RunnerError> {
        fs::write(&self.script_path, &self.script)
            .map_err(|e| RunnerError::io(&self.script_path, e))?;
        fs::set_permissions(&self.script_path, fs::Permissions::from_mode(0o755))
            .map_err(|e| RunnerError::io(&self.script_path, e))?;
        fs::write(&self.submit_path, &self.submit)
            .map_err(|e| RunnerError::io(&self.submit_path, e))?;

        debug!(job = %self.name, "Wrote {:?}", self.submit_path);
        trace!(job = %self.name, script = %self.script, "Wrapper script");

        Ok(())
    }
}

fn render_script(unit: &WorkUnit, settings: &DescriptorSettings) -> String {
    let options = unit.trex_options().join(":");
    let mut lines = vec![
        "#!/bin/bash".to_string(),
        format!("# {}", unit.name()),
        "set -e".to_string(),
        String::new(),
        format!(
            "source {}",
            shell_quote(&settings.setup_script.to_string_lossy())
        ),
    ];

    for config in &unit.configs {
        lines.push(String::new());

        // staged configs land next to the job in the scratch directory
        let config_arg = if settings.transfer_output {
            config
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            if let Some(dir) = config.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                lines.push(format!("cd {}", shell_quote(&dir.to_string_lossy())));
            }
            config.to_string_lossy().into_owned()
        };

        for token in unit.actions.tokens() {
            let mut call = format!(
                "{} {} {}",
                settings.fitter,
                shell_quote(&token),
                shell_quote(&config_arg)
            );
            if !options.is_empty() {
                call.push(' ');
                call.push_str(&shell_quote(&options));
            }
            lines.push(call);
        }
    }

    lines.push(String::new());
    lines.push("echo \"Success\"".to_string());

    lines.join("\n") + "\n"
}

fn render_submit(
    name: &str,
    unit: &WorkUnit,
    script_path: &Path,
    layout: &Layout,
    settings: &DescriptorSettings,
) -> String {
    let mut lines = vec![
        format!("universe = {}", settings.universe),
        format!("executable = {}", script_path.display()),
        String::new(),
        format!("log = {}", layout.log_path(name, "log").display()),
        format!("output = {}", layout.log_path(name, "out").display()),
        format!("error = {}", layout.log_path(name, "err").display()),
    ];

    if settings.transfer_output {
        // replacement files and nested configs travel with the configs reading them
        let inputs = unit
            .configs
            .iter()
            .chain(unit.inputs.iter())
            .map(|path| path.display().to_string())
            .unique()
            .join(",");

        lines.extend([
            String::new(),
            format!("initialdir = {}", layout.results_dir().display()),
            "should_transfer_files = YES".to_string(),
            "when_to_transfer_output = ON_EXIT".to_string(),
            format!("transfer_input_files = {inputs}"),
        ]);
        if !settings.transfer_output_files.is_empty() {
            lines.push(format!(
                "transfer_output_files = {}",
                settings.transfer_output_files.join(",")
            ));
        }
    }

    lines.push(String::new());
    lines.extend(settings.run_time.map(|run_time| format!("+RequestRuntime = {run_time}")));
    lines.extend(settings.request_cpus.map(|cpus| format!("RequestCpus = {cpus}")));
    lines.extend(
        settings
            .requirements
            .as_ref()
            .map(|requirements| format!("requirements = {requirements}")),
    );
    lines.push("queue".to_string());

    lines.join("\n") + "\n"
}
