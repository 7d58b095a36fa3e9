use super::{Action, ActionSet, SplitKind};
use crate::config::ConfigErrors;

#[test]
pub fn parse_plain_actions() {
    let actions: ActionSet = "dwfp".parse().unwrap();

    assert!(!actions.is_multi_fit());
    assert_eq!(
        actions.steps(),
        &[
            Action::PreFitPlots,
            Action::Workspace,
            Action::Fit,
            Action::PostFitPlots
        ]
    );
    assert_eq!(actions.tokens(), vec!["d", "w", "f", "p"]);
    assert_eq!(actions.to_string(), "dwfp");
}

#[test]
pub fn parse_multi_fit_actions() {
    let actions: ActionSet = "mwf".parse().unwrap();

    assert!(actions.is_multi_fit());
    assert_eq!(actions.tokens(), vec!["mw", "mf"]);
    assert_eq!(actions.to_string(), "mwf");
}

#[test]
pub fn reject_invalid_action_sets() {
    assert!(matches!(
        "fq".parse::<ActionSet>(),
        Err(ConfigErrors::UnknownAction('q'))
    ));
    assert!(matches!(
        "m".parse::<ActionSet>(),
        Err(ConfigErrors::EmptyActions(_))
    ));
    assert!(matches!(
        "ff".parse::<ActionSet>(),
        Err(ConfigErrors::RepeatedAction('f'))
    ));
    assert!(matches!(
        "nf".parse::<ActionSet>(),
        Err(ConfigErrors::NtupleNotAlone(_))
    ));
}

#[test]
pub fn split_compatibility_table() {
    let ntuple: ActionSet = "n".parse().unwrap();
    let ranking: ActionSet = "r".parse().unwrap();
    let fit: ActionSet = "wf".parse().unwrap();
    let multi_fit: ActionSet = "mf".parse().unwrap();

    assert!(ntuple.supports(SplitKind::Region));
    assert!(!ntuple.supports(SplitKind::Nuisance));
    assert!(!ntuple.supports(SplitKind::Scan));

    assert!(ranking.supports(SplitKind::Nuisance));
    assert!(!ranking.supports(SplitKind::Region));

    assert!(fit.supports(SplitKind::Scan));
    assert!(!fit.supports(SplitKind::Region));

    assert!(multi_fit.supports(SplitKind::Scan));
    assert!(!multi_fit.supports(SplitKind::Region));
}
