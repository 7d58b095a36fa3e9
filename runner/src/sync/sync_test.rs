use super::{read_directories, transfers, Syncer, Transfer};
use crate::{config::SyncConfig, executors::ExecutorError};
use std::{fs, path::PathBuf};

fn config(rsync: &str) -> SyncConfig {
    SyncConfig {
        rsync: PathBuf::from(rsync),
        ..SyncConfig::default()
    }
}

#[test]
pub fn transfer_paths() {
    let transfer = Transfer::new("lxplus:/eos/l2/", "/data/l2", "1l/boosted/");

    assert_eq!(transfer.source, "lxplus:/eos/l2/1l/boosted/");
    assert_eq!(transfer.destination, "/data/l2/1l/boosted/");
    assert_eq!(
        transfer.local_parent(),
        Some(std::path::Path::new("/data/l2/1l"))
    );

    let remote = Transfer::new("/data", "host:/backup", "2l");
    assert_eq!(remote.local_parent(), None);

    assert_eq!(
        transfers("/a", "/b", &[]),
        vec![Transfer::new("/a", "/b", "")]
    );
    assert_eq!(transfers("/a", "/b", &[]).first().unwrap().source, "/a");
}

#[test]
pub fn rsync_arguments() {
    let syncer = Syncer::new(
        SyncConfig::default(),
        vec!["*.log".to_string(), "tmp/".to_string()],
        None,
    )
    .unwrap();
    let command = syncer.command(&Transfer::new("host:/src", "/dst", "1l"));

    assert_eq!(command.get_program(), "rsync");
    assert_eq!(
        command.get_args().collect::<Vec<_>>(),
        vec![
            "-vzraWP",
            "-e",
            "ssh",
            "--bwlimit=50000",
            "--exclude",
            "*.log",
            "--exclude",
            "tmp/",
            "host:/src/1l",
            "/dst/1l",
        ]
    );
}

#[test]
pub fn directories_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dirs.txt");
    fs::write(&path, "# production\n1l/boosted/\n\n2l/ttH/  # signal\n").unwrap();

    assert_eq!(
        read_directories(&path).unwrap(),
        vec!["1l/boosted/", "2l/ttH/"]
    );
}

#[test]
pub fn successful_transfers_are_logged() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("sync.log");
    let syncer = Syncer::new(config("true"), Vec::new(), Some(&log)).unwrap();

    let directories = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let summary = syncer
        .run(&transfers("/nowhere", "host:/dst", &directories))
        .unwrap();

    assert!(summary.is_success());
    let mut succeeded = summary.succeeded.clone();
    succeeded.sort();
    assert_eq!(succeeded, directories);

    let contents = fs::read_to_string(&log).unwrap();
    for directory in &directories {
        assert!(contents.contains(&format!("== {directory} (attempt 1) ==")));
    }
}

#[test]
pub fn failures_are_retried() {
    let syncer = Syncer::new(
        SyncConfig {
            attempts: 3,
            ..config("false")
        },
        Vec::new(),
        None,
    )
    .unwrap();

    let outcome = syncer.transfer(&Transfer::new("/src", "host:/dst", "a"));
    assert_eq!(outcome.attempts, 3);
    assert!(matches!(outcome.result, Err(ExecutorError::Failed { .. })));

    let summary = syncer
        .run(&transfers("/src", "host:/dst", &["a".to_string()]))
        .unwrap();
    assert!(!summary.is_success());
    assert_eq!(summary.failed[0].0, "a");
}
