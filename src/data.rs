//! Experimental dataset records.
//!
//! Datasets arrive already parsed. Static datasets carry observed fluxes, dynamic datasets
//! carry concentration time courses and initial conditions.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::global::DataKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("No datasets were provided")]
    NoDatasets,
    #[error("Dataset id {0} is used twice")]
    DuplicateDataset(String),
    #[error("Dataset {dataset} has a non-positive standard deviation {sd} for {key}")]
    InvalidDeviation { dataset: String, key: String, sd: f64 },
    #[error("Series {observable} of dataset {dataset} has {found} values, expected {expected}")]
    SeriesLength {
        dataset: String,
        observable: String,
        expected: usize,
        found: usize,
    },
    #[error("Dataset {0} has a negative time point")]
    NegativeTime(String),
    #[error("Time delay list has {found} entries but there are {expected} experiments")]
    DelayCount { expected: usize, found: usize },
    #[error("Time delay map has no entry for experiment {0}")]
    MissingDelay(String),
}

/// An observed value and its standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    #[serde(default = "unit_deviation")]
    pub sd: f64,
}

impl Measurement {
    pub fn new(value: f64, sd: f64) -> Self {
        Self { value, sd }
    }
}

fn unit_deviation() -> f64 {
    1.0
}

/// Enzyme-level perturbation of one reaction in one experiment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Perturbation {
    /// Enzyme fully removed
    Knockout,
    /// Enzyme level relative to the baseline of 1
    Level(f64),
}

impl Perturbation {
    pub fn target(&self) -> f64 {
        match self {
            Perturbation::Knockout => 0.0,
            Perturbation::Level(level) => *level,
        }
    }
}

/// Steady-state fluxes of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StaticDataset {
    pub id: String,
    /// Observed flux per reaction id
    #[serde(default)]
    pub fluxes: BTreeMap<String, Measurement>,
    /// Enzyme perturbations per reaction id
    #[serde(default)]
    pub perturbations: BTreeMap<String, Perturbation>,
}

/// Concentration time courses of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DynamicDataset {
    pub id: String,
    pub time: Vec<f64>,
    /// Observed concentration series per metabolite; `null` marks a missing value
    #[serde(default)]
    pub observables: BTreeMap<String, Vec<Option<f64>>>,
    /// Standard deviation series per metabolite, 1 where absent
    #[serde(default)]
    pub sd: BTreeMap<String, Vec<f64>>,
    /// Initial concentrations and enzyme levels at `t = 0`
    #[serde(default)]
    pub initial: BTreeMap<String, f64>,
    #[serde(default)]
    pub perturbations: BTreeMap<String, Perturbation>,
}

impl DynamicDataset {
    /// Standard deviation of `observable` at the `i`-th time point.
    pub fn deviation(&self, observable: &str, i: usize) -> f64 {
        self.sd
            .get(observable)
            .and_then(|s| s.get(i))
            .copied()
            .unwrap_or(1.0)
    }
}

/// A dataset of either kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Dataset {
    Static(StaticDataset),
    Dynamic(DynamicDataset),
}

impl Dataset {
    pub fn id(&self) -> &str {
        match self {
            Dataset::Static(d) => &d.id,
            Dataset::Dynamic(d) => &d.id,
        }
    }

    pub fn kind(&self) -> DataKind {
        match self {
            Dataset::Static(_) => DataKind::Static,
            Dataset::Dynamic(_) => DataKind::Dynamic,
        }
    }

    pub fn perturbations(&self) -> &BTreeMap<String, Perturbation> {
        match self {
            Dataset::Static(d) => &d.perturbations,
            Dataset::Dynamic(d) => &d.perturbations,
        }
    }

    /// Checks deviations, series lengths and time points.
    pub fn check(&self) -> Result<(), DataError> {
        match self {
            Dataset::Static(d) => {
                for (reaction, m) in &d.fluxes {
                    if !(m.sd > 0.0) {
                        return Err(DataError::InvalidDeviation {
                            dataset: d.id.clone(),
                            key: reaction.clone(),
                            sd: m.sd,
                        });
                    }
                }
            }
            Dataset::Dynamic(d) => {
                if d.time.iter().any(|t| *t < 0.0) {
                    return Err(DataError::NegativeTime(d.id.clone()));
                }
                let series = d
                    .observables
                    .iter()
                    .map(|(k, v)| (k, v.len()))
                    .chain(d.sd.iter().map(|(k, v)| (k, v.len())));
                for (observable, len) in series {
                    if len != d.time.len() {
                        return Err(DataError::SeriesLength {
                            dataset: d.id.clone(),
                            observable: observable.clone(),
                            expected: d.time.len(),
                            found: len,
                        });
                    }
                }
                for (observable, sds) in &d.sd {
                    if let Some(sd) = sds.iter().find(|sd| !(**sd > 0.0)) {
                        return Err(DataError::InvalidDeviation {
                            dataset: d.id.clone(),
                            key: observable.clone(),
                            sd: *sd,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Checks a dataset collection: non-empty, unique ids, every dataset well-formed.
pub fn check_datasets(datasets: &[Dataset]) -> Result<(), DataError> {
    if datasets.is_empty() {
        return Err(DataError::NoDatasets);
    }
    let mut seen = HashSet::new();
    for dataset in datasets {
        if !seen.insert(dataset.id()) {
            return Err(DataError::DuplicateDataset(dataset.id().to_string()));
        }
        dataset.check()?;
    }
    Ok(())
}

/// Time delay option: one value for all experiments, one per experiment in order, or a
/// map keyed by experiment id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeDelay {
    Scalar(f64),
    List(Vec<f64>),
    Map(BTreeMap<String, f64>),
}

impl Default for TimeDelay {
    fn default() -> Self {
        TimeDelay::Scalar(0.0)
    }
}

impl TimeDelay {
    /// Resolves the delay of every experiment.
    ///
    /// # Errors
    ///
    /// A list must have one entry per experiment and a map must name every experiment.
    pub fn resolve(&self, experiments: &[&str]) -> Result<BTreeMap<String, f64>, DataError> {
        match self {
            TimeDelay::Scalar(delay) => Ok(experiments
                .iter()
                .map(|id| (id.to_string(), *delay))
                .collect()),
            TimeDelay::List(delays) => {
                if delays.len() != experiments.len() {
                    return Err(DataError::DelayCount {
                        expected: experiments.len(),
                        found: delays.len(),
                    });
                }
                Ok(experiments
                    .iter()
                    .zip(delays)
                    .map(|(id, delay)| (id.to_string(), *delay))
                    .collect())
            }
            TimeDelay::Map(delays) => experiments
                .iter()
                .map(|id| {
                    delays
                        .get(*id)
                        .map(|delay| (id.to_string(), *delay))
                        .ok_or_else(|| DataError::MissingDelay(id.to_string()))
                })
                .collect(),
        }
    }
}
