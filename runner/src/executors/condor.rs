use super::{command_line, run_tool, ExecutorError};
use crate::{config::SchedulerConfig, descriptor::JobDescriptor};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument};

static CLUSTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"submitted to cluster (?P<cluster>\d+)").unwrap());

/// Executor handing each submit descriptor to `condor_submit`
#[derive(Clone, Debug)]
pub struct CondorExecutor {
    submit_command: String,
}

impl CondorExecutor {
    pub fn load(config: &SchedulerConfig) -> Self {
        Self {
            submit_command: config.submit_command.clone(),
        }
    }

    #[instrument(skip_all, level = "info")]
    pub fn submit(&self, descriptors: &[JobDescriptor]) -> Result<(), ExecutorError> {
        for (index, descriptor) in descriptors.iter().enumerate() {
            let mut command = command_line(&self.submit_command)?;
            command.arg(&descriptor.submit_path);

            let output = run_tool(&mut command)?;
            let stdout = String::from_utf8_lossy(&output.stdout);

            match cluster_id(&stdout) {
                Some(cluster) => info!(job = %descriptor.name, cluster, "Submitted"),
                None => info!(job = %descriptor.name, "Submitted"),
            }
            info!("Done with {}/{}", index + 1, descriptors.len());
        }

        Ok(())
    }
}

pub fn cluster_id(stdout: &str) -> Option<u64> {
    CLUSTER
        .captures(stdout)
        .and_then(|captures| captures.name("cluster"))
        .and_then(|cluster| cluster.as_str().parse().ok())
}
