use super::{count, extract, DirectoryCount, DEFAULT_GLOB};
use crate::{config::ConfigErrors, error::RunnerError};
use std::fs;

#[test]
pub fn counts_root_files_per_directory() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("1l/boosted")).unwrap();
    fs::create_dir_all(root.join("2l")).unwrap();
    fs::create_dir_all(root.join(".hidden")).unwrap();

    for file in [
        "1l/a.root",
        "1l/b.root",
        "1l/notes.txt",
        "1l/boosted/c.root",
        "2l/d.root",
        "2l/d.root.part",
        ".hidden/e.root",
    ] {
        fs::write(root.join(file), "").unwrap();
    }

    let report = count(root, DEFAULT_GLOB).unwrap();

    assert_eq!(report.total, 5);
    assert_eq!(
        report.directories,
        vec![
            DirectoryCount {
                directory: root.join(".hidden"),
                files: 1
            },
            DirectoryCount {
                directory: root.join("1l"),
                files: 2
            },
            DirectoryCount {
                directory: root.join("1l/boosted"),
                files: 1
            },
            DirectoryCount {
                directory: root.join("2l"),
                files: 1
            },
        ]
    );
    assert!(report.to_string().ends_with("total: 5"));

    assert_eq!(count(root, "*.txt").unwrap().total, 1);
}

#[test]
pub fn count_requires_a_directory() {
    let dir = tempfile::tempdir().unwrap();

    assert!(matches!(
        count(&dir.path().join("missing"), DEFAULT_GLOB),
        Err(RunnerError::Config(ConfigErrors::FileNotFound(_)))
    ));
    assert!(matches!(
        count(dir.path(), "[*.root"),
        Err(RunnerError::Config(ConfigErrors::InvalidGlob(_)))
    ));
}

#[test]
pub fn extracts_file_names_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let listing = dir.path().join("1l_5j3b_ttb.txt");
    fs::write(
        &listing,
        "rucio list: user.ttH_1l.root, user.ttbb_5j3b.root\n\
         missing: mc16e/ttW.root (2 of 3)\n\
         not a match: ntuple.root.part2 .root\n",
    )
    .unwrap();

    assert_eq!(
        extract(&listing).unwrap(),
        vec![
            "ttH_1l.root",
            "ttbb_5j3b.root",
            "ttW.root",
            "ntuple.root",
        ]
    );

    assert!(matches!(
        extract(&dir.path().join("missing.txt")),
        Err(RunnerError::Io { .. })
    ));
}
