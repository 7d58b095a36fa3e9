//! Splitting of a fitting task into independently submittable WorkUnits.
//!
//! Which axis is split is decided by the actions (see [`ActionSet::supports`]):
//! `n` is split by region and systematic, `r` by batches of nuisance parameters and
//! fits by likelihood-scan step when requested. Everything else becomes a single unit.

use crate::{
    action::{Action, ActionSet, SplitKind},
    config::{ConfigErrors, FitterConfig},
    trex::ConfigInventory,
    work::{Bundle, NpBatch, Slice, WorkUnit},
};
use itertools::{iproduct, Itertools};
use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};
use tracing::{debug, info, warn};


/// Splitting flags as requested on the command line
#[derive(Clone, Debug, Default)]
pub struct SplitRequest {
    pub single_reg: bool,
    pub single_np: bool,
    pub nps_per_job: Option<usize>,
    pub systs_per_job: Option<usize>,
    pub split_scan: Option<u32>,
}

/// Resolved splitting strategy for one action set
#[derive(Clone, Debug)]
pub struct PartitionPlan {
    pub actions: ActionSet,
    pub split_regions: bool,
    pub split_systematics: bool,
    pub systs_per_job: usize,
    pub split_nuisance: bool,
    pub nps_per_job: usize,
    pub scan_steps: Option<u32>,
    pub options: Vec<String>,
}

impl SplitRequest {
    /// Apply the compatibility table, explicit flags on unsupported actions are errors
    pub fn plan(
        &self,
        actions: ActionSet,
        defaults: &FitterConfig,
        options: Vec<String>,
    ) -> Result<PartitionPlan, ConfigErrors> {
        let require = |flag: &'static str, split: SplitKind| {
            if actions.supports(split) {
                Ok(())
            } else {
                Err(ConfigErrors::IncompatibleSplit {
                    flag,
                    split,
                    actions: actions.to_string(),
                })
            }
        };

        if self.single_reg {
            require("--single-reg", SplitKind::Region)?;
        }
        if self.systs_per_job.is_some() {
            require("--systs-per-job", SplitKind::Region)?;
        }
        if self.single_np && !actions.supports(SplitKind::Region) {
            require("--single-np", SplitKind::Nuisance)?;
        }
        if self.nps_per_job.is_some() {
            require("--nps-per-job", SplitKind::Nuisance)?;
        }
        if self.split_scan.is_some() {
            require("--split-scan", SplitKind::Scan)?;
        }

        let split_regions = actions.supports(SplitKind::Region) && !self.single_reg;
        let split_nuisance = actions.supports(SplitKind::Nuisance) && !self.single_np;

        if split_nuisance && self.split_scan.is_some() {
            return Err(ConfigErrors::CombinedSplits(actions.to_string()));
        }

        Ok(PartitionPlan {
            split_regions,
            split_systematics: split_regions && !self.single_np,
            systs_per_job: self.systs_per_job.unwrap_or(defaults.systs_per_job),
            split_nuisance,
            nps_per_job: self.nps_per_job.unwrap_or(defaults.nps_per_job),
            scan_steps: self.split_scan,
            options,
            actions,
        })
    }
}

#[derive(Debug)]
pub struct Partitioner {
    plan: PartitionPlan,
}

impl Partitioner {
    pub fn new(plan: PartitionPlan) -> Result<Self, ConfigErrors> {
        if plan.systs_per_job == 0 {
            return Err(ConfigErrors::InvalidBatchSize("--systs-per-job"));
        }
        if plan.nps_per_job == 0 {
            return Err(ConfigErrors::InvalidBatchSize("--nps-per-job"));
        }
        if plan.scan_steps == Some(0) {
            return Err(ConfigErrors::InvalidBatchSize("--split-scan"));
        }
        for option in &plan.options {
            check_field("option", option, &['\t', '\n'])?;
        }

        Ok(Self { plan })
    }

    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    /// Enumerate all WorkUnits for the given configs
    pub fn partition(&self, inventories: &[ConfigInventory]) -> Result<Vec<WorkUnit>, ConfigErrors> {
        if inventories.is_empty() {
            return Err(ConfigErrors::NoConfigs);
        }

        for inventory in inventories {
            check_inventory(inventory)?;
        }

        check_unique_names(inventories)?;
        if self.plan.actions.contains(Action::Ntuple) {
            check_unique_regions(inventories)?;
        }

        let actions = &self.plan.actions;
        let mut units = Vec::new();

        if self.plan.split_regions {
            for inventory in inventories {
                units.extend(self.region_units(inventory));
            }
        } else if self.plan.split_nuisance {
            for inventory in inventories {
                units.extend(self.nuisance_units(inventory));
            }
        } else if let Some(steps) = self.plan.scan_steps {
            for (inventory, step) in iproduct!(inventories, 0..steps) {
                units.push(self.unit(inventory, Slice::ScanStep { step }));
            }
        } else if actions.supports(SplitKind::Region) || actions.supports(SplitKind::Nuisance) {
            // collapsed by --single-reg/ --single-np, still one job per config
            for inventory in inventories {
                units.push(self.unit(inventory, Slice::Whole));
            }
        } else {
            units.push(WorkUnit {
                actions: actions.clone(),
                configs: inventories.iter().map(|inv| inv.path.clone()).collect(),
                slice: Slice::Whole,
                options: self.plan.options.clone(),
                inputs: inventories
                    .iter()
                    .flat_map(|inv| inv.companions.iter().cloned())
                    .unique()
                    .collect(),
            });
        }

        let mut names = BTreeSet::new();
        for unit in &units {
            let name = unit.name();
            if !names.insert(name.clone()) {
                return Err(ConfigErrors::DuplicateJob(name));
            }
        }

        info!(
            actions = %actions,
            configs = inventories.len(),
            "Partitioned into {} work units",
            units.len()
        );

        Ok(units)
    }

    fn unit(&self, inventory: &ConfigInventory, slice: Slice) -> WorkUnit {
        WorkUnit {
            actions: self.plan.actions.clone(),
            configs: vec![inventory.path.clone()],
            slice,
            options: self.plan.options.clone(),
            inputs: inventory.companions.clone(),
        }
    }

    fn region_units(&self, inventory: &ConfigInventory) -> Vec<WorkUnit> {
        if inventory.regions.is_empty() {
            warn!(config = ?inventory.path, "No regions found, running the config in a single job");
            return vec![self.unit(inventory, Slice::Whole)];
        }

        if self.plan.split_systematics && inventory.systematics.is_empty() {
            info!(config = ?inventory.path, "No systematics present, splitting this config by region only");
        }

        if self.plan.split_systematics && !inventory.systematics.is_empty() {
            let bundles = bundle_systematics(&inventory.systematics, self.plan.systs_per_job);
            debug!(
                config = ?inventory.path,
                "{} regions x {} systematic bundles",
                inventory.regions.len(),
                bundles.len()
            );

            iproduct!(inventory.regions.iter(), bundles.iter())
                .map(|(region, bundle)| {
                    self.unit(
                        inventory,
                        Slice::Systematics {
                            region: region.clone(),
                            bundle: bundle.clone(),
                        },
                    )
                })
                .collect()
        } else {
            inventory
                .regions
                .iter()
                .map(|region| {
                    self.unit(
                        inventory,
                        Slice::Region {
                            region: region.clone(),
                        },
                    )
                })
                .collect()
        }
    }

    fn nuisance_units(&self, inventory: &ConfigInventory) -> Vec<WorkUnit> {
        if inventory.nuisance_parameters.is_empty() {
            warn!(config = ?inventory.path, "No nuisance parameters found, ranking in a single job");
            return vec![self.unit(inventory, Slice::Whole)];
        }

        nuisance_batches(&inventory.nuisance_parameters, self.plan.nps_per_job)
            .into_iter()
            .map(|batch| self.unit(inventory, Slice::Nuisance { batch }))
            .collect()
    }
}

/// Bundle systematics into groups of `per_job`, single systematics keep their own name as label
pub fn bundle_systematics(systematics: &[String], per_job: usize) -> Vec<Bundle> {
    if per_job == 1 {
        return systematics
            .iter()
            .map(|systematic| Bundle {
                label: systematic.clone(),
                systematics: vec![systematic.clone()],
            })
            .collect();
    }

    systematics
        .chunks(per_job.max(1))
        .enumerate()
        .map(|(index, chunk)| Bundle {
            label: format!("Syst_group_{index:04}"),
            systematics: chunk.to_vec(),
        })
        .collect()
}

/// Cut `parameters` into contiguous batches of at most `per_job` entries
pub fn nuisance_batches(parameters: &[String], per_job: usize) -> Vec<NpBatch> {
    parameters
        .chunks(per_job.max(1))
        .enumerate()
        .map(|(index, chunk)| NpBatch {
            index,
            parameters: chunk.to_vec(),
        })
        .collect()
}

fn check_field(field: &'static str, value: &str, reserved: &[char]) -> Result<(), ConfigErrors> {
    if value.contains(reserved) {
        Err(ConfigErrors::InvalidField {
            field,
            value: value.to_string(),
        })
    } else {
        Ok(())
    }
}

// names end up in comma/tab separated argument records
fn check_inventory(inventory: &ConfigInventory) -> Result<(), ConfigErrors> {
    const RESERVED: [char; 3] = ['\t', '\n', ','];

    check_field("config", &inventory.path.to_string_lossy(), &RESERVED)?;
    for companion in &inventory.companions {
        check_field("input", &companion.to_string_lossy(), &RESERVED)?;
    }
    for region in &inventory.regions {
        check_field("region", region, &RESERVED)?;
    }
    for name in inventory
        .systematics
        .iter()
        .chain(inventory.nuisance_parameters.iter())
    {
        check_field("systematic", name, &RESERVED)?;
    }

    Ok(())
}

fn check_unique_names(inventories: &[ConfigInventory]) -> Result<(), ConfigErrors> {
    match inventories
        .iter()
        .map(ConfigInventory::short_name)
        .duplicates()
        .next()
    {
        Some(name) => Err(ConfigErrors::DuplicateConfigName(name)),
        None => Ok(()),
    }
}

fn check_unique_regions(inventories: &[ConfigInventory]) -> Result<(), ConfigErrors> {
    let mut owners: BTreeMap<&str, &PathBuf> = BTreeMap::new();

    for inventory in inventories {
        for region in &inventory.regions {
            if owners.insert(region, &inventory.path).is_some() {
                return Err(ConfigErrors::DuplicateRegion {
                    region: region.clone(),
                    config: inventory.path.clone(),
                });
            }
        }
    }

    Ok(())
}
