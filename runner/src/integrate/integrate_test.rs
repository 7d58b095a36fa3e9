use super::{cache_name, read_flag, rewrite_config, write_flag, ConfigCache};
use crate::{config::ConfigErrors, error::RunnerError};
use std::{fs, path::Path};

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
pub fn cache_flag_defaults_to_false() {
    let dir = tempfile::tempdir().unwrap();
    assert!(!read_flag(dir.path()).unwrap());

    write_flag(dir.path(), true).unwrap();
    assert_eq!(
        fs::read_to_string(dir.path().join(".integrate.cache")).unwrap(),
        "True"
    );
    assert!(read_flag(dir.path()).unwrap());

    write_flag(dir.path(), false).unwrap();
    assert!(!read_flag(dir.path()).unwrap());
}

#[test]
pub fn names_drop_yaml_extension() {
    assert_eq!(cache_name(Path::new("/a/ttH_1l.yaml")), "ttH_1l");
    assert_eq!(cache_name(Path::new("ttH_1l")), "ttH_1l");
    assert_eq!(cache_name(Path::new("/a/fit.config")), "fit.config");
}

#[test]
pub fn rewrite_paths_and_replacement() {
    let config = "Job: \"ttH\"\n  OutputDir: /eos/user/out % old\n  InputFolder: \"/eos/ntuples/\"\n  ReplacementFile: rep/ttH.txt\nRegion: SR\n";

    assert_eq!(
        rewrite_config(config, Some("ttH.yaml_REPLACEMENTFILE")),
        "Job: \"ttH\"\n  OutputDir: \"../results/\" % old\n  InputFolder: \"../results/\"\n  ReplacementFile: ttH.yaml_REPLACEMENTFILE\nRegion: SR\n"
    );

    // without a replacement file the entry is left alone
    assert!(rewrite_config("ReplacementFile: \"a.txt\"", None).contains("\"a.txt\""));
}

#[test]
pub fn stage_copies_and_rewrites() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("analysis/ttH_1l.yaml");
    write(
        &source,
        "Job: ttH\n  OutputDir: out\n  ReplacementFile: \"replacements.txt\"\n",
    );
    write(&dir.path().join("analysis/replacements.txt"), "XXX_LUMI: 139\n");

    let cache = ConfigCache::new(dir.path().join("work/configs"));
    let staged = cache.plan(&[source.clone()]).unwrap();
    assert_eq!(staged[0].name, "ttH_1l");
    assert_eq!(
        staged[0].replacement.as_deref(),
        Some(dir.path().join("analysis/replacements.txt").as_path())
    );

    let written = cache.stage(&staged).unwrap();
    assert_eq!(written, vec![dir.path().join("work/configs/ttH_1l.yaml")]);

    assert_eq!(
        fs::read_to_string(&written[0]).unwrap(),
        "Job: ttH\n  OutputDir: \"../results/\"\n  ReplacementFile: \"ttH_1l.yaml_REPLACEMENTFILE\"\n"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("work/configs/ttH_1l.yaml_REPLACEMENTFILE")).unwrap(),
        "XXX_LUMI: 139\n"
    );

    // replacement files are not configs
    assert_eq!(cache.cached().unwrap(), written);
}

#[test]
pub fn plan_rejects_clashes() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a/fit.yaml");
    let second = dir.path().join("b/fit.yaml");
    write(&first, "Job: a\n");
    write(&second, "Job: b\n");

    let cache = ConfigCache::new(dir.path().join("configs"));

    assert!(matches!(
        cache.plan(&[first.clone(), second]),
        Err(RunnerError::Config(ConfigErrors::DuplicateConfigName(name))) if name == "fit"
    ));

    let staged = cache.plan(&[first.clone()]).unwrap();
    cache.stage(&staged).unwrap();

    assert!(matches!(
        cache.plan(&[first]),
        Err(RunnerError::Config(ConfigErrors::CachedConfigClash(name))) if name == "fit"
    ));
}

#[test]
pub fn plan_requires_existing_files() {
    let dir = tempfile::tempdir().unwrap();
    let cache = ConfigCache::new(dir.path().join("configs"));

    assert!(matches!(
        cache.plan(&[dir.path().join("missing.yaml")]),
        Err(RunnerError::Config(ConfigErrors::ConfigNotFound(_)))
    ));

    let config = dir.path().join("fit.yaml");
    write(&config, "ReplacementFile: nowhere.txt\n");
    assert!(matches!(
        cache.plan(&[config]),
        Err(RunnerError::Config(ConfigErrors::ReplacementNotFound { .. }))
    ));
}

#[test]
pub fn select_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let configs = dir.path().join("configs");
    write(&configs.join("a.yaml"), "");
    write(&configs.join("b.yaml"), "");

    let cache = ConfigCache::new(&configs);

    assert_eq!(
        cache
            .select(&["b".to_string(), "a.yaml".to_string(), "b.yaml".to_string()])
            .unwrap(),
        vec![configs.join("b.yaml"), configs.join("a.yaml")]
    );

    match cache.select(&["c".to_string()]) {
        Err(RunnerError::Config(ConfigErrors::ConfigNotCached { name, cached })) => {
            assert_eq!(name, "c");
            assert_eq!(cached, "a, b");
        }
        other => panic!("unexpected result {other:?}"),
    }
}
