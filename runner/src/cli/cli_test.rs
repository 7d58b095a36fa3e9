use super::{split_options, Cli, Command};
use crate::config::SyncConfig;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;

#[test]
pub fn cli_verify() {
    Cli::command().debug_assert();
}

#[test]
pub fn submit_request_from_flags() {
    let cli = Cli::parse_from([
        "trex-runner",
        "-vv",
        "submit",
        "work",
        "/opt/TRExFitter",
        "-a",
        "n",
        "-c",
        "a.yaml",
        "--config",
        "b.yaml",
        "-o",
        "Suffix=_v2:Lumi=140",
        "-o",
        "BlindSR=TRUE",
        "--single-np",
        "--systs-per-job",
        "3",
        "-n",
    ]);
    assert_eq!(cli.verbose, 2);

    let Command::Submit(args) = cli.command else {
        panic!("expected submit");
    };
    let request = args.request();

    assert_eq!(request.work_dir, PathBuf::from("work"));
    assert_eq!(request.actions.unwrap().to_string(), "n");
    assert_eq!(
        request.configs,
        vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")]
    );
    assert_eq!(
        request.options,
        vec!["Suffix=_v2", "Lumi=140", "BlindSR=TRUE"]
    );
    assert!(request.dry_run);
    assert!(request.split.single_np);
    assert_eq!(request.split.systs_per_job, Some(3));
    assert!(!request.integrate);
}

#[test]
pub fn invalid_values_are_rejected() {
    assert!(Cli::try_parse_from(["trex-runner", "submit", "w", "t", "-a", "nq"]).is_err());
    assert!(Cli::try_parse_from(["trex-runner", "submit", "w", "t", "-r", "soon"]).is_err());
    assert!(Cli::try_parse_from([
        "trex-runner",
        "submit",
        "w",
        "t",
        "--from-args",
        "retry.txt",
        "--integrate-everything",
    ])
    .is_err());
    assert!(Cli::try_parse_from(["trex-runner", "merge"]).is_err());
    assert!(Cli::try_parse_from([
        "trex-runner",
        "merge",
        "--spec",
        "merge.yaml",
        "--discover",
        "histos"
    ])
    .is_err());
}

#[test]
pub fn retry_flags() {
    let cli = Cli::parse_from([
        "trex-runner",
        "retry",
        "-d",
        "work/logs",
        "-o",
        "report.yaml",
        "-a",
        "work/job_arguments_n.txt",
        "-n",
        "retry.txt",
        "-s",
        "n",
        "-e",
        "segmentation violation",
        "-e",
        "bad_alloc",
    ]);

    let Command::Retry(args) = cli.command else {
        panic!("expected retry");
    };
    assert_eq!(args.errors, vec!["segmentation violation", "bad_alloc"]);

    let request = args.request();
    assert_eq!(request.log_dir, PathBuf::from("work/logs"));
    assert_eq!(request.new_arguments, PathBuf::from("retry.txt"));
    assert_eq!(request.report, PathBuf::from("report.yaml"));
    assert_eq!(request.steps.unwrap().to_string(), "n");
}

#[test]
pub fn sync_overrides_settings() {
    let cli = Cli::parse_from([
        "trex-runner",
        "--settings",
        "site.yaml",
        "sync",
        "--source",
        "lxplus:/eos/l2",
        "--destination",
        "/data/l2",
        "-d",
        "1l",
        "-d",
        "2l",
        "--bwlimit",
        "1000",
        "--exclude",
        "*.log",
    ]);
    assert_eq!(cli.settings, Some(PathBuf::from("site.yaml")));

    let Command::Sync(args) = cli.command else {
        panic!("expected sync");
    };
    let config = args.apply(SyncConfig {
        attempts: 5,
        ..SyncConfig::default()
    });

    assert_eq!(args.directories, vec!["1l", "2l"]);
    assert_eq!(config.bwlimit, 1000);
    assert_eq!(config.attempts, 5);
    assert_eq!(config.threads, SyncConfig::default().threads);
    assert_eq!(args.log_file, PathBuf::from("rsync_transfers.log"));
}

#[test]
pub fn options_split_on_colons() {
    assert_eq!(
        split_options(&["A=1::B=2".to_string(), " ".to_string(), "C=3".to_string()]),
        vec!["A=1", "B=2", "C=3"]
    );
    assert!(split_options(&[]).is_empty());
}
