use super::{sanitize, Bundle, NpBatch, Slice, WorkUnit};
use std::path::PathBuf;

fn unit(actions: &str, configs: &[&str], slice: Slice) -> WorkUnit {
    WorkUnit {
        actions: actions.parse().unwrap(),
        configs: configs.iter().map(PathBuf::from).collect(),
        slice,
        options: vec!["Suffix=_v2".to_string()],
        inputs: Vec::new(),
    }
}

#[test]
pub fn names_are_file_safe() {
    assert_eq!(sanitize("SR_5j 3b/ttH"), "SR_5j_3b_ttH");
    assert_eq!(sanitize("JET-JES_1"), "JET-JES_1");

    let region = unit(
        "n",
        &["/configs/ttH.1l.yaml"],
        Slice::Region {
            region: "SR 5j".to_string(),
        },
    );
    assert_eq!(region.name(), "n.ttH_1l.SR_5j");

    let combined = unit("mwf", &["/c/a.yaml", "/c/b.yaml"], Slice::Whole);
    assert_eq!(combined.name(), "mwf.combined");
}

#[test]
pub fn generated_options_come_first() {
    let syst = unit(
        "n",
        &["/c/a.yaml"],
        Slice::Systematics {
            region: "SR".to_string(),
            bundle: Bundle {
                label: "Syst_group_0001".to_string(),
                systematics: vec!["JES".to_string(), "JER".to_string()],
            },
        },
    );
    assert_eq!(syst.name(), "n.a.SR.Syst_group_0001");
    assert_eq!(
        syst.trex_options(),
        vec![
            "Regions=SR",
            "Systematics=JES,JER",
            "SaveSuffix=_Syst_group_0001",
            "Suffix=_v2"
        ]
    );

    let batch = NpBatch {
        index: 12,
        parameters: vec!["k_ttbb".to_string()],
    };
    assert_eq!(batch.label(), "NP_batch_0012");

    let scan = unit("f", &["/c/a.yaml"], Slice::ScanStep { step: 7 });
    assert_eq!(scan.slice.label().unwrap(), "scan_0007");
    assert_eq!(scan.slice.region(), None);
}
