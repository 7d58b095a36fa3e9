use super::{shell_quote, DescriptorSettings, JobDescriptor, Layout};
use crate::work::{Slice, WorkUnit};
use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf};

fn settings() -> DescriptorSettings {
    DescriptorSettings {
        setup_script: PathBuf::from("/opt/TRExFitter/setup.sh"),
        fitter: "trex-fitter".to_string(),
        universe: "vanilla".to_string(),
        run_time: Some(7200),
        request_cpus: None,
        requirements: None,
        transfer_output: false,
        transfer_output_files: Vec::new(),
    }
}

fn region_unit() -> WorkUnit {
    WorkUnit {
        actions: "n".parse().unwrap(),
        configs: vec![PathBuf::from("/analysis/configs/ttH_1l.yaml")],
        slice: Slice::Region {
            region: "SR_5j".to_string(),
        },
        options: vec!["Lumi=139".to_string()],
        inputs: Vec::new(),
    }
}

#[test]
pub fn layout_paths() {
    let layout = Layout::new("/work");

    assert_eq!(
        layout.script_path("n.a.SR"),
        PathBuf::from("/work/scripts/n.a.SR.sh")
    );
    assert_eq!(
        layout.submit_path("n.a.SR"),
        PathBuf::from("/work/scripts/n.a.SR.sub")
    );
    assert_eq!(
        layout.log_path("n.a.SR", "out"),
        PathBuf::from("/work/logs/n.a.SR.out")
    );
    assert_eq!(
        layout.arguments_path(&"mwf".parse().unwrap()),
        PathBuf::from("/work/job_arguments_mwf.txt")
    );
}

#[test]
pub fn wrapper_script() {
    let descriptor = JobDescriptor::render(&region_unit(), &Layout::new("/work"), &settings());

    assert_eq!(
        descriptor.script,
        "#!/bin/bash\n\
         # n.ttH_1l.SR_5j\n\
         set -e\n\
         \n\
         source '/opt/TRExFitter/setup.sh'\n\
         \n\
         cd '/analysis/configs'\n\
         trex-fitter 'n' '/analysis/configs/ttH_1l.yaml' 'Regions=SR_5j:Lumi=139'\n\
         \n\
         echo \"Success\"\n"
    );
}

#[test]
pub fn wrapper_runs_every_action_for_every_config() {
    let unit = WorkUnit {
        actions: "mwf".parse().unwrap(),
        configs: vec![PathBuf::from("/c/a.yaml"), PathBuf::from("/d/b.yaml")],
        slice: Slice::Whole,
        options: Vec::new(),
        inputs: Vec::new(),
    };
    let descriptor = JobDescriptor::render(&unit, &Layout::new("/work"), &settings());

    let calls: Vec<&str> = descriptor
        .script
        .lines()
        .filter(|line| line.starts_with("trex-fitter"))
        .collect();

    assert_eq!(
        calls,
        vec![
            "trex-fitter 'mw' '/c/a.yaml'",
            "trex-fitter 'mf' '/c/a.yaml'",
            "trex-fitter 'mw' '/d/b.yaml'",
            "trex-fitter 'mf' '/d/b.yaml'",
        ]
    );
    assert!(descriptor.script.ends_with("echo \"Success\"\n"));
}

#[test]
pub fn submit_descriptor() {
    let descriptor = JobDescriptor::render(&region_unit(), &Layout::new("/work"), &settings());

    assert_eq!(
        descriptor.submit,
        "universe = vanilla\n\
         executable = /work/scripts/n.ttH_1l.SR_5j.sh\n\
         \n\
         log = /work/logs/n.ttH_1l.SR_5j.log\n\
         output = /work/logs/n.ttH_1l.SR_5j.out\n\
         error = /work/logs/n.ttH_1l.SR_5j.err\n\
         \n\
         +RequestRuntime = 7200\n\
         queue\n"
    );
}

#[test]
pub fn transfer_output_stages_configs() {
    let settings = DescriptorSettings {
        transfer_output: true,
        transfer_output_files: vec!["ttH_1l".to_string()],
        request_cpus: Some(4),
        requirements: Some("(OpSysAndVer =?= \"CentOS7\")".to_string()),
        ..settings()
    };
    let descriptor = JobDescriptor::render(&region_unit(), &Layout::new("/work"), &settings);

    assert!(descriptor.submit.contains("initialdir = /work/results\n"));
    assert!(descriptor.submit.contains("should_transfer_files = YES\n"));
    assert!(descriptor.submit.contains("when_to_transfer_output = ON_EXIT\n"));
    assert!(descriptor
        .submit
        .contains("transfer_input_files = /analysis/configs/ttH_1l.yaml\n"));
    assert!(descriptor.submit.contains("transfer_output_files = ttH_1l\n"));
    assert!(descriptor.submit.contains("RequestCpus = 4\n"));
    assert!(descriptor
        .submit
        .contains("requirements = (OpSysAndVer =?= \"CentOS7\")\n"));

    // no cd into the submit side directory on the worker
    assert!(!descriptor.script.contains("cd "));
    assert!(descriptor
        .script
        .contains("trex-fitter 'n' 'ttH_1l.yaml' 'Regions=SR_5j:Lumi=139'\n"));
}

#[test]
pub fn transfer_stages_companion_inputs() {
    let transfer = DescriptorSettings {
        transfer_output: true,
        ..settings()
    };
    let unit = WorkUnit {
        inputs: vec![
            PathBuf::from("/work/configs/ttH_1l.yaml_REPLACEMENTFILE"),
            PathBuf::from("/analysis/configs/ttH_1l.yaml"),
        ],
        ..region_unit()
    };
    let descriptor = JobDescriptor::render(&unit, &Layout::new("/work"), &transfer);

    assert!(descriptor.submit.contains(
        "transfer_input_files = /analysis/configs/ttH_1l.yaml,/work/configs/ttH_1l.yaml_REPLACEMENTFILE\n"
    ));

    // nothing is staged when the job runs next to the configs
    let local = JobDescriptor::render(&unit, &Layout::new("/work"), &settings());
    assert!(!local.submit.contains("REPLACEMENTFILE"));
}

#[test]
pub fn quoting() {
    assert_eq!(shell_quote("plain"), "'plain'");
    assert_eq!(shell_quote("it's"), r#"'it'\''s'"#);
    assert_eq!(shell_quote("$HOME `x`"), "'$HOME `x`'");
}

#[test]
pub fn write_creates_executable_wrapper() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::new(dir.path().join("work"));
    layout.create().unwrap();

    let descriptor = JobDescriptor::render(&region_unit(), &layout, &settings());
    descriptor.write().unwrap();

    assert_eq!(
        fs::read_to_string(&descriptor.script_path).unwrap(),
        descriptor.script
    );
    assert_eq!(
        fs::read_to_string(&descriptor.submit_path).unwrap(),
        descriptor.submit
    );

    let mode = fs::metadata(&descriptor.script_path)
        .unwrap()
        .permissions()
        .mode();
    assert_ne!(mode & 0o111, 0);
}
