use crate::{
    action::ActionSet,
    config::SyncConfig,
    partition::SplitRequest,
    sanity::DEFAULT_GLOB,
    submit::SubmitRequest,
    triage::TriageRequest,
};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[cfg(test)]
mod cli_test;

/// Operator tools for running TRExFitter on HTCondor
#[derive(Debug, Parser)]
#[command(name = "trex-runner", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output, repeat for trace level. `RUST_LOG` takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// YAML settings file, `trex-runner.yaml` in the current directory is used if present
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Split a TRExFitter task into HTCondor jobs and submit them
    Submit(SubmitArgs),
    /// Find failed jobs and write an arguments file to resubmit them
    Retry(RetryArgs),
    /// Merge histogram files split by systematic with hupdate
    Merge(MergeArgs),
    /// Copy dataset directories with rsync
    Sync(SyncArgs),
    /// Count .root files per directory
    Count(CountArgs),
    /// Print .root file names found in a text file
    Extract(ExtractArgs),
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// Directory for scripts and logs (and configs and results when integrating)
    #[arg(value_name = "WORK_DIR")]
    pub work_dir: PathBuf,

    /// Root folder of the TRExFitter installation
    #[arg(value_name = "TREX_PATH")]
    pub trex_path: PathBuf,

    /// TRExFitter actions, e.g. `n`, `dwf` or `mwf`. Without actions configs are only updated
    #[arg(short, long)]
    pub actions: Option<ActionSet>,

    /// TRExFitter config, can be given multiple times
    #[arg(short, long = "config", value_name = "PATH")]
    pub configs: Vec<PathBuf>,

    /// Cached config to run on in integrated mode, all cached configs by default
    #[arg(short, long = "use-config", value_name = "CONFIG")]
    pub use_configs: Vec<String>,

    /// Extra fitter option `<Option>=<Value>`, several can be joined with `:`
    #[arg(short, long = "option", value_name = "OPT=VALUE")]
    pub options: Vec<String>,

    /// Cache configs and results inside the work directory
    #[arg(long)]
    pub integrate_everything: bool,

    /// Generate all files without submitting
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Transfer configs to and outputs from the worker nodes
    #[arg(short, long)]
    pub transfer_output: bool,

    /// Requested job runtime in seconds
    #[arg(short, long, value_name = "SECONDS")]
    pub run_time: Option<u64>,

    /// Run `n` in a single job per config
    #[arg(long)]
    pub single_reg: bool,

    /// Do not split by systematic (`n`) or nuisance parameter (`r`)
    #[arg(long)]
    pub single_np: bool,

    /// Nuisance parameters per ranking job
    #[arg(long, value_name = "NUM")]
    pub nps_per_job: Option<usize>,

    /// Systematics per histogram job
    #[arg(long, value_name = "NUM")]
    pub systs_per_job: Option<usize>,

    /// Split the likelihood scan of a fit into this many steps
    #[arg(long, value_name = "STEPS")]
    pub split_scan: Option<u32>,

    /// Regenerate and submit the jobs listed in an arguments file, e.g. from `retry`
    #[arg(long, value_name = "FILE", conflicts_with_all = ["integrate_everything", "use_configs"])]
    pub from_args: Option<PathBuf>,
}

impl SubmitArgs {
    pub fn request(self) -> SubmitRequest {
        SubmitRequest {
            work_dir: self.work_dir,
            trex_path: self.trex_path,
            actions: self.actions,
            configs: self.configs,
            use_configs: self.use_configs,
            options: split_options(&self.options),
            integrate: self.integrate_everything,
            dry_run: self.dry_run,
            transfer_output: self.transfer_output,
            run_time: self.run_time,
            split: SplitRequest {
                single_reg: self.single_reg,
                single_np: self.single_np,
                nps_per_job: self.nps_per_job,
                systs_per_job: self.systs_per_job,
                split_scan: self.split_scan,
            },
            from_args: self.from_args,
        }
    }
}

/// `-o A=1:B=2 -o C=3` -> `[A=1, B=2, C=3]`
pub fn split_options(options: &[String]) -> Vec<String> {
    options
        .iter()
        .flat_map(|option| option.split(':'))
        .map(str::trim)
        .filter(|option| !option.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Args)]
pub struct RetryArgs {
    /// Directory holding the job logs
    #[arg(short = 'd', long = "directory", value_name = "DIR")]
    pub log_dir: PathBuf,

    /// Failure report to write (YAML)
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Arguments file of the original submission
    #[arg(short = 'a', long = "args", value_name = "FILE")]
    pub arguments: PathBuf,

    /// Arguments file listing only the failed jobs
    #[arg(short = 'n', long = "newargs", value_name = "FILE")]
    pub new_arguments: PathBuf,

    /// Only check jobs of these actions
    #[arg(short, long)]
    pub steps: Option<ActionSet>,

    /// Additional error message to look for, can be given multiple times
    #[arg(short, long = "error", value_name = "MESSAGE")]
    pub errors: Vec<String>,
}

impl RetryArgs {
    pub fn request(&self) -> TriageRequest {
        TriageRequest {
            log_dir: self.log_dir.clone(),
            arguments: self.arguments.clone(),
            new_arguments: self.new_arguments.clone(),
            report: self.output.clone(),
            steps: self.steps.clone(),
        }
    }
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// YAML merge spec with systematics blocks and regions
    #[arg(long, value_name = "FILE", required_unless_present = "discover", conflicts_with = "discover")]
    pub spec: Option<PathBuf>,

    /// Systematics block of the merge spec to use
    #[arg(long, value_name = "BLOCK", default_value = "STXS")]
    pub systematics: String,

    /// Group `*_histos_*.root` files found in this directory instead of using a merge spec
    #[arg(long, value_name = "DIR")]
    pub discover: Option<PathBuf>,

    /// Histogram directory, overrides the one in the merge spec
    #[arg(long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// hupdate executable
    #[arg(long, value_name = "PATH")]
    pub executable: Option<PathBuf>,

    /// TRExFitter installation providing `build/bin/hupdate.exe`
    #[arg(long, value_name = "PATH")]
    pub trex_path: Option<PathBuf>,

    /// Only print the merge commands
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// rsync source, local or `host:path`
    #[arg(long)]
    pub source: String,

    /// rsync destination, local or `host:path`
    #[arg(long)]
    pub destination: String,

    /// Sub-directory to copy, can be given multiple times
    #[arg(short, long = "dir", value_name = "DIR")]
    pub directories: Vec<String>,

    /// File listing sub-directories to copy, one per line
    #[arg(long, value_name = "FILE")]
    pub directories_file: Option<PathBuf>,

    /// Bandwidth limit in KB/s
    #[arg(long, value_name = "KBPS")]
    pub bwlimit: Option<u64>,

    /// Pattern excluded from the transfer, can be given multiple times
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Attempts per directory
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Parallel transfers, capped by the number of CPUs
    #[arg(long)]
    pub threads: Option<usize>,

    /// Kill a transfer after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Combined rsync output of all transfers
    #[arg(long, value_name = "FILE", default_value = "rsync_transfers.log")]
    pub log_file: PathBuf,
}

impl SyncArgs {
    /// Command line values take precedence over the settings file
    pub fn apply(&self, config: SyncConfig) -> SyncConfig {
        SyncConfig {
            bwlimit: self.bwlimit.unwrap_or(config.bwlimit),
            attempts: self.attempts.unwrap_or(config.attempts),
            threads: self.threads.unwrap_or(config.threads),
            timeout: self.timeout.or(config.timeout),
            ..config
        }
    }
}

#[derive(Debug, Args)]
pub struct CountArgs {
    /// Root of the tree to walk
    pub directory: PathBuf,

    #[arg(long, default_value = DEFAULT_GLOB)]
    pub glob: String,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Text file to search
    pub file: PathBuf,
}
