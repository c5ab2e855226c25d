//! Composition of experiment blocks into one global model.
//!
//! The composer checks the whole configuration before building anything, declares and
//! seeds the shared parameters, assembles one block per dataset with that dataset's
//! enzyme overrides, attaches the error terms, anchors the basis experiment and sets the
//! objective to the sum of block errors.

use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    time::Instant,
};

use log::{info, warn};
use thiserror::Error;

use crate::{
    assembly::{
        block::{block_key, error_key, BlockAssembler},
        conservation::{EnzymeConservation, EnzymeOverrides},
        dynamic::{DynamicDiscretizer, TimeGrid},
        error::AssemblyError,
        parameters::ParameterSet,
    },
    config::{ConfigError, KetchupOptions},
    data::{check_datasets, DataError, Dataset, DynamicDataset, StaticDataset},
    mechanism::{
        catalog::MechanismCatalog,
        error::MechanismError,
        record::{MechanismRecord, RateLawFamily},
    },
    model::{
        constraint::{Constraint, ConstraintGroup},
        error::ModelError,
        expr::Expr,
        global::{BlockSummary, DataKind, GlobalModel},
        variable::{VarKind, Variable},
    },
    network::{MetabolicNetwork, NetworkError},
    seed::{ParameterSeeder, SeedError},
    solver::backend::{NlpBackend, SolveStatus},
};

/// Id of the wild-type experiment, preferred as basis when none is configured.
pub const WILD_TYPE: &str = "WT";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    #[error("No seed was provided")]
    MissingSeed,
    #[error("Basis experiment {0} is not among the datasets")]
    MissingBasis(String),
    #[error("Dataset {dataset} is {found:?} but the run expects {expected:?} data")]
    DataKindMismatch {
        dataset: String,
        expected: DataKind,
        found: DataKind,
    },
    #[error("Dataset {dataset} references unknown reaction {reaction}")]
    UnknownDatasetReaction { dataset: String, reaction: String },
    #[error("Dataset {dataset} observes {observable}, which is not a network metabolite")]
    UnknownObservable { dataset: String, observable: String },
    #[error("Dataset {dataset} perturbs reaction {reaction}, which has no mechanism")]
    UnknownPerturbation { dataset: String, reaction: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Mechanism(#[from] MechanismError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Seed(#[from] SeedError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// A composed model and the shared structures it was built from.
#[derive(Debug, Clone)]
pub struct Composition {
    pub model: GlobalModel,
    pub catalog: MechanismCatalog,
    pub conservation: EnzymeConservation,
    pub parameters: ParameterSet,
    /// Id of the basis experiment
    pub basis: String,
    pub seed: u64,
}

/// Builds the global model of a set of experiments.
#[derive(bon::Builder)]
pub struct ExperimentComposer<'a> {
    network: &'a MetabolicNetwork,
    mechanisms: &'a [MechanismRecord],
    datasets: &'a [Dataset],
    #[builder(default)]
    options: KetchupOptions,
}

impl ExperimentComposer<'_> {
    /// Composes the global model.
    ///
    /// All configuration errors surface before the first block is built.
    pub fn compose(&self) -> Result<Composition, ComposeError> {
        let options = &self.options;
        options.validate()?;
        self.network.check()?;
        check_datasets(self.datasets)?;

        for dataset in self.datasets {
            if dataset.kind() != options.data_type {
                return Err(ComposeError::DataKindMismatch {
                    dataset: dataset.id().to_string(),
                    expected: options.data_type,
                    found: dataset.kind(),
                });
            }
        }

        let seed = options.seed.ok_or(ComposeError::MissingSeed)?;
        let basis = self.basis()?;

        let ids: Vec<&str> = self.datasets.iter().map(Dataset::id).collect();
        let delays = match options.data_type {
            DataKind::Dynamic => options.time_delay.resolve(&ids)?,
            DataKind::Static => BTreeMap::new(),
        };

        let catalog = MechanismCatalog::build(self.mechanisms, options.mechanism_type)?;
        let conservation = EnzymeConservation::from_catalog(&catalog);

        let mut model = GlobalModel::new(&options.model_name, options.mechanism_type);
        let parameters =
            ParameterSet::declare(&mut model, &catalog, self.network, options.k_upper_bound)?;
        let mut seeder = ParameterSeeder::new(seed)?;
        parameters.seed(&mut model, &mut seeder, options.scale(), options.distribution)?;

        let discretizer = DynamicDiscretizer::builder()
            .density(options.discretization_density)
            .precision(options.time_precision)
            .build();

        // Overrides are resolved up front so perturbation errors are configuration errors
        let overrides = self
            .datasets
            .iter()
            .map(|d| self.overrides(d, &basis, &catalog))
            .collect::<Result<Vec<_>, _>>()?;

        let mut errors = vec![];
        for (index, (dataset, overrides)) in self.datasets.iter().zip(&overrides).enumerate() {
            let grid = match dataset {
                Dataset::Dynamic(d) => {
                    let delay = delays.get(&d.id).copied().unwrap_or_default();
                    Some(discretizer.discretize(&d.id, &d.time, delay)?)
                }
                Dataset::Static(_) => None,
            };
            let initial = match dataset {
                Dataset::Dynamic(d) => Some(&d.initial),
                Dataset::Static(_) => None,
            };

            let bundle = BlockAssembler::builder()
                .index(index)
                .prefix(dataset.id())
                .network(self.network)
                .catalog(&catalog)
                .parameters(&parameters)
                .conservation(&conservation)
                .overrides(overrides)
                .maybe_grid(grid.as_ref())
                .maybe_initial(initial)
                .build()
                .assemble(model.variables().len())?;

            let enzyme_targets = bundle.enzyme_targets.clone();
            let times = bundle.times.clone();
            let (variables, constraints) = bundle.attach(&mut model)?;

            let id = dataset.id();
            if id == basis {
                if let Dataset::Static(d) = dataset {
                    self.anchor_basis(&mut model, d, index)?;
                }
            }

            let residual = match (dataset, &grid) {
                (Dataset::Static(d), _) => self.static_error(&model, d)?,
                (Dataset::Dynamic(d), Some(grid)) => self.dynamic_error(&model, d, grid)?,
                (Dataset::Dynamic(_), None) => Expr::zero(),
            };

            let mut error = Variable::new(error_key(id), VarKind::Error)
                .bounds(Some(0.0), None)
                .in_block(index, None);
            error.value = residual.eval(&model.point());
            let error = model.add_variable(error)?;
            model.add_constraint(
                Constraint::equality(
                    format!("{id}.{}", ConstraintGroup::Error),
                    ConstraintGroup::Error,
                    Expr::var(error),
                    residual,
                )
                .in_block(index, None),
            );

            model.push_block(BlockSummary {
                id: id.to_string(),
                kind: dataset.kind(),
                times,
                variables: variables.start..model.variables().len(),
                constraints: constraints.start..model.constraints().len(),
                error,
                enzyme_targets,
                delay: grid.map(|g| g.delay),
            });
            errors.push(Expr::var(error));
        }

        model.set_objective(Expr::sum(errors));
        model.validate()?;

        info!(
            "Composed model {} with {} variables, {} constraints and {} blocks (basis {basis}, seed {seed})",
            model.name,
            model.variables().len(),
            model.constraints().len(),
            model.blocks().len()
        );

        Ok(Composition {
            model,
            catalog,
            conservation,
            parameters,
            basis,
            seed,
        })
    }

    /// Configured basis id, else `WT` if present, else the first dataset.
    fn basis(&self) -> Result<String, ComposeError> {
        let exists = |id: &str| self.datasets.iter().any(|d| d.id() == id);
        match &self.options.basis_id {
            Some(id) if exists(id) => Ok(id.clone()),
            Some(id) => Err(ComposeError::MissingBasis(id.clone())),
            None if exists(WILD_TYPE) => Ok(WILD_TYPE.to_string()),
            None => self
                .datasets
                .first()
                .map(|d| d.id().to_string())
                .ok_or(ComposeError::Data(DataError::NoDatasets)),
        }
    }

    /// Enzyme targets of one experiment. Later sources win: initial enzyme levels of
    /// dynamic data, knockouts inferred from the dataset id, explicit perturbations.
    fn overrides(
        &self,
        dataset: &Dataset,
        basis: &str,
        catalog: &MechanismCatalog,
    ) -> Result<EnzymeOverrides, ComposeError> {
        let mut overrides = EnzymeOverrides::new();
        let id = dataset.id();

        if let Dataset::Dynamic(d) = dataset {
            for expansion in catalog.expansions() {
                let Some(reaction) = self.network.reaction(expansion.reaction()) else {
                    continue;
                };
                let Some(gene) = &reaction.gene else {
                    continue;
                };
                match d.initial.get(gene) {
                    Some(level) => overrides = overrides.with(&reaction.id, *level),
                    None => warn!(
                        "Experiment {id} has no initial level for enzyme {gene} of reaction {}. Using 1",
                        reaction.id
                    ),
                }
            }
        }

        if self.options.infer_knockouts
            && dataset.kind() == DataKind::Static
            && id != basis
            && id != WILD_TYPE
            && catalog.contains(id)
        {
            info!("Treating experiment {id} as a knockout of reaction {id}");
            overrides = overrides.knockout(id);
        }

        for (reaction, perturbation) in dataset.perturbations() {
            if !catalog.contains(reaction) {
                return Err(ComposeError::UnknownPerturbation {
                    dataset: id.to_string(),
                    reaction: reaction.clone(),
                });
            }
            overrides = overrides.with(reaction, perturbation.target());
        }

        Ok(overrides)
    }

    /// `sum(((rate[r] - flux) / sd)^2)` over the observed fluxes.
    fn static_error(&self, model: &GlobalModel, dataset: &StaticDataset) -> Result<Expr, ComposeError> {
        let terms = dataset
            .fluxes
            .iter()
            .map(|(reaction, m)| {
                let rate = model
                    .id(&block_key(&dataset.id, VarKind::Rate, None, reaction))
                    .ok_or_else(|| ComposeError::UnknownDatasetReaction {
                        dataset: dataset.id.clone(),
                        reaction: reaction.clone(),
                    })?;
                Ok(((Expr::var(rate) - m.value) * Expr::constant(1.0 / m.sd)).powi(2))
            })
            .collect::<Result<Vec<_>, ComposeError>>()?;
        Ok(Expr::sum(terms))
    }

    /// Mean squared normalized concentration residual, including the `t = 0` anchor when
    /// the observations were shifted.
    fn dynamic_error(
        &self,
        model: &GlobalModel,
        dataset: &DynamicDataset,
        grid: &TimeGrid,
    ) -> Result<Expr, ComposeError> {
        let concentration = |node: usize, observable: &str| {
            model
                .id(&block_key(
                    &dataset.id,
                    VarKind::Concentration,
                    Some(grid.nodes[node]),
                    observable,
                ))
                .map(Expr::var)
                .ok_or_else(|| ComposeError::UnknownObservable {
                    dataset: dataset.id.clone(),
                    observable: observable.to_string(),
                })
        };

        let mut terms = vec![];
        for (observable, series) in &dataset.observables {
            for (i, (value, observation)) in series.iter().zip(&grid.observations).enumerate() {
                let Some(value) = value else {
                    continue;
                };
                let sd = dataset.deviation(observable, i);
                let c = concentration(observation.node, observable)?;
                terms.push(((c - *value) * Expr::constant(1.0 / sd)).powi(2));
            }

            if grid.is_shifted() {
                if let Some(initial) = dataset.initial.get(observable) {
                    terms.push((concentration(0, observable)? - *initial).powi(2));
                }
            }
        }

        if terms.is_empty() {
            warn!("Experiment {} has no observations", dataset.id);
            return Ok(Expr::zero());
        }
        let n = terms.len() as f64;
        Ok(Expr::constant(1.0 / n) * Expr::sum(terms))
    }

    /// Fixes the observed fluxes of the basis block and, for elemental models, pins every
    /// concentration of the block to the unit reference.
    fn anchor_basis(
        &self,
        model: &mut GlobalModel,
        dataset: &StaticDataset,
        index: usize,
    ) -> Result<(), ComposeError> {
        for (reaction, m) in &dataset.fluxes {
            let key = block_key(&dataset.id, VarKind::Rate, None, reaction);
            let var = model
                .variable_mut(&key)
                .ok_or_else(|| ComposeError::UnknownDatasetReaction {
                    dataset: dataset.id.clone(),
                    reaction: reaction.clone(),
                })?;
            var.fix(m.value);
        }

        if model.family() == RateLawFamily::Elemental {
            for metabolite in &self.network.metabolites {
                let key = block_key(&dataset.id, VarKind::Concentration, None, &metabolite.id);
                let id = model
                    .id(&key)
                    .ok_or_else(|| ModelError::UnknownVariable(key.clone()))?;
                model.add_constraint(
                    Constraint::equality(
                        format!(
                            "{}.{}[{}]",
                            dataset.id,
                            ConstraintGroup::ReferenceConcentration,
                            metabolite.id
                        ),
                        ConstraintGroup::ReferenceConcentration,
                        Expr::var(id),
                        Expr::constant(1.0),
                    )
                    .in_block(index, None),
                );
            }
        }

        info!(
            "Fixed {} fluxes of basis experiment {}",
            dataset.fluxes.len(),
            dataset.id
        );
        Ok(())
    }
}

/// Hands the model to `backend` and writes the solution back.
///
/// Backend errors and panics are mapped to [`SolveStatus::Failed`]; the model keeps its
/// previous values in that case and stays inspectable.
pub fn solve<B: NlpBackend>(model: &mut GlobalModel, backend: &mut B) -> SolveStatus {
    backend.declare_variables(model.variables());
    backend.declare_constraints(model.constraints());
    backend.minimize(model.objective());

    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| backend.solve()));
    let elapsed = start.elapsed().as_secs_f64();

    let status = match outcome {
        Ok(Ok(output)) => match model.set_point(&output.values) {
            Ok(()) => output.status,
            Err(e) => SolveStatus::Failed(e.to_string()),
        },
        Ok(Err(e)) => SolveStatus::Failed(e.to_string()),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "solver panicked".to_string());
            SolveStatus::Failed(message)
        }
    };

    if let SolveStatus::Failed(reason) = &status {
        warn!("Solve of model {} failed: {reason}", model.name);
    }

    info!("Solve finished with status {status} after {elapsed:.3}s");
    model.status = Some(status.clone());
    model.solve_time = Some(elapsed);
    status
}
