use crate::config::ConfigErrors;
use itertools::Itertools;
use std::{fmt, str::FromStr};

#[cfg(test)]
mod action_test;

/// Single TRExFitter action letter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    /// ntuple to histogram conversion, the histogram-generation step
    Ntuple,
    Histograms,
    Rebin,
    Workspace,
    Fit,
    PreFitPlots,
    PostFitPlots,
    Limit,
    Significance,
    Ranking,
    GroupedImpact,
    MultiFitPlots,
}

/// Axis along which a fitting task can be cut into WorkUnits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitKind {
    Region,
    Nuisance,
    Scan,
}

impl fmt::Display for SplitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Region => write!(f, "region/systematic"),
            Self::Nuisance => write!(f, "nuisance-parameter"),
            Self::Scan => write!(f, "likelihood-scan"),
        }
    }
}

impl Action {
    pub fn letter(self) -> char {
        match self {
            Self::Ntuple => 'n',
            Self::Histograms => 'h',
            Self::Rebin => 'b',
            Self::Workspace => 'w',
            Self::Fit => 'f',
            Self::PreFitPlots => 'd',
            Self::PostFitPlots => 'p',
            Self::Limit => 'l',
            Self::Significance => 's',
            Self::Ranking => 'r',
            Self::GroupedImpact => 'i',
            Self::MultiFitPlots => 'x',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        Some(match letter {
            'n' => Self::Ntuple,
            'h' => Self::Histograms,
            'b' => Self::Rebin,
            'w' => Self::Workspace,
            'f' => Self::Fit,
            'd' => Self::PreFitPlots,
            'p' => Self::PostFitPlots,
            'l' => Self::Limit,
            's' => Self::Significance,
            'r' => Self::Ranking,
            'i' => Self::GroupedImpact,
            'x' => Self::MultiFitPlots,
            _ => return None,
        })
    }
}

/// Ordered, non-empty set of actions as passed on the command line, e.g. `dwfp` or `mwf`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionSet {
    multi_fit: bool,
    steps: Vec<Action>,
}

impl ActionSet {
    pub fn steps(&self) -> &[Action] {
        &self.steps
    }

    pub fn is_multi_fit(&self) -> bool {
        self.multi_fit
    }

    pub fn contains(&self, action: Action) -> bool {
        self.steps.contains(&action)
    }

    /// tokens handed to the fitter, one per invocation
    pub fn tokens(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|action| {
                if self.multi_fit {
                    format!("m{}", action.letter())
                } else {
                    action.letter().to_string()
                }
            })
            .collect()
    }

    /// compatibility table between action sets and splitting strategies
    pub fn supports(&self, split: SplitKind) -> bool {
        match split {
            SplitKind::Region => !self.multi_fit && self.steps == [Action::Ntuple],
            SplitKind::Nuisance => self.contains(Action::Ranking),
            SplitKind::Scan => self.contains(Action::Fit),
        }
    }
}

impl fmt::Display for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.multi_fit {
            write!(f, "m")?;
        }
        for action in &self.steps {
            write!(f, "{}", action.letter())?;
        }

        Ok(())
    }
}

impl FromStr for ActionSet {
    type Err = ConfigErrors;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let (multi_fit, letters) = match trimmed.strip_prefix('m') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let steps = letters
            .chars()
            .map(|letter| Action::from_letter(letter).ok_or(ConfigErrors::UnknownAction(letter)))
            .collect::<Result<Vec<_>, _>>()?;

        if steps.is_empty() {
            return Err(ConfigErrors::EmptyActions(input.to_string()));
        }

        if let Some(duplicate) = steps.iter().duplicates().next() {
            return Err(ConfigErrors::RepeatedAction(duplicate.letter()));
        }

        // `n` only ever runs on its own
        if steps.contains(&Action::Ntuple) && (steps.len() > 1 || multi_fit) {
            return Err(ConfigErrors::NtupleNotAlone(input.to_string()));
        }

        Ok(Self { multi_fit, steps })
    }
}
