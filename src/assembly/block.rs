//! Variables and constraints of a single experiment block.
//!
//! A [`BlockAssembler`] never touches the global model. It returns a [`BlockBundle`] whose
//! variable ids already account for the position the bundle will take in the model, and
//! the composer attaches the bundle afterwards.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    ops::Range,
};

use log::debug;

use crate::{
    mechanism::{
        catalog::MechanismCatalog,
        expander::{Expansion, StepTable},
        record::MechanismKind,
        step::StepKind,
    },
    model::{
        constraint::{Constraint, ConstraintGroup},
        error::ModelError,
        expr::{Expr, VarId},
        global::GlobalModel,
        variable::{VarKind, Variable},
    },
    network::MetabolicNetwork,
};

use super::{
    conservation::{EnzymeConservation, EnzymeOverrides},
    dynamic::{backward_difference, initial_conditions, TimeGrid},
    error::AssemblyError,
    parameters::ParameterSet,
    ratelaw::{forward_velocity, michaelis_menten, reverse_velocity, Denominator, RateLawScope},
};

/// Upper bound of every concentration variable.
pub const MAX_CONCENTRATION: f64 = 1e3;

/// Key of a block variable, e.g. `WT.c[A]` or `KO.rate[1.5,R1]`.
pub fn block_key(prefix: &str, kind: VarKind, time: Option<f64>, name: &str) -> String {
    match time {
        Some(t) => format!("{prefix}.{}[{t},{name}]", kind.symbol()),
        None => format!("{prefix}.{}[{name}]", kind.symbol()),
    }
}

/// Key of a block's residual error variable.
pub fn error_key(prefix: &str) -> String {
    format!("{prefix}.{}", VarKind::Error.symbol())
}

/// Variables and constraints of one experiment, ready to be attached to a model.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockBundle {
    pub index: usize,
    pub prefix: String,
    /// Id of the first variable once attached
    pub offset: usize,
    pub variables: Vec<Variable>,
    pub constraints: Vec<Constraint>,
    /// Conservation target per reaction used by this block
    pub enzyme_targets: Vec<(String, f64)>,
    /// Node times of dynamic blocks
    pub times: Vec<f64>,
}

impl BlockBundle {
    /// Moves the bundle into `model`.
    ///
    /// # Returns
    ///
    /// The variable and constraint index ranges the block occupies.
    pub fn attach(
        self,
        model: &mut GlobalModel,
    ) -> Result<(Range<usize>, Range<usize>), AssemblyError> {
        if model.variables().len() != self.offset {
            return Err(ModelError::DimensionMismatch {
                expected: self.offset,
                found: model.variables().len(),
            }
            .into());
        }

        let first_constraint = model.constraints().len();
        for variable in self.variables {
            model.add_variable(variable)?;
        }
        for constraint in self.constraints {
            model.add_constraint(constraint);
        }

        Ok((
            self.offset..model.variables().len(),
            first_constraint..model.constraints().len(),
        ))
    }

    pub fn id(&self, key: &str) -> Option<VarId> {
        self.variables
            .iter()
            .position(|v| v.key == key)
            .map(|i| VarId(self.offset + i))
    }
}

/// Builds the variables and constraints of one experiment.
#[derive(bon::Builder)]
pub struct BlockAssembler<'a> {
    /// Position of the block in the model
    index: usize,
    /// Experiment id, prefixed to every key
    #[builder(into)]
    prefix: String,
    network: &'a MetabolicNetwork,
    catalog: &'a MechanismCatalog,
    parameters: &'a ParameterSet,
    conservation: &'a EnzymeConservation,
    overrides: &'a EnzymeOverrides,
    /// Time grid of dynamic experiments
    grid: Option<&'a TimeGrid>,
    /// Initial conditions of dynamic experiments
    initial: Option<&'a BTreeMap<String, f64>>,
}

impl BlockAssembler<'_> {
    /// Assembles the block.
    ///
    /// # Arguments
    ///
    /// * `offset` - Number of variables already in the model
    ///
    /// # Returns
    ///
    /// * `Result<BlockBundle, AssemblyError>` - The block, or the first structural error
    pub fn assemble(&self, offset: usize) -> Result<BlockBundle, AssemblyError> {
        self.check_catalog()?;

        let times = self.grid.map(|g| g.nodes.as_slice());
        let nodes: Vec<Option<usize>> = match times {
            Some(t) => (0..t.len()).map(Some).collect(),
            None => vec![None],
        };

        let mut frame = Frame {
            prefix: &self.prefix,
            index: self.index,
            offset,
            times,
            variables: vec![],
            lookup: HashMap::new(),
        };

        let enzyme_targets: Vec<(String, f64)> = self
            .conservation
            .groups()
            .iter()
            .map(|g| {
                let target = self.conservation.target(&g.reaction, self.overrides).unwrap_or(g.target);
                (g.reaction.clone(), target)
            })
            .collect();

        for &node in &nodes {
            self.declare_variables(&mut frame, node, &enzyme_targets);
        }

        let mut constraints = vec![];
        for &node in &nodes {
            self.conservation_constraints(&frame, node, &enzyme_targets, &mut constraints)?;
            if node.is_none() {
                self.steady_state(&frame, &mut constraints)?;
            }
            self.rate_laws(&frame, node, &mut constraints)?;
        }

        if let Some(grid) = self.grid {
            let conc = |k: usize, s: &str| frame.expr(VarKind::Concentration, Some(k), s);
            let rate = |k: usize, r: &str| frame.expr(VarKind::Rate, Some(k), r);
            constraints.extend(backward_difference(grid, self.network, conc, rate)?);
            if let Some(initial) = self.initial {
                constraints.extend(initial_conditions(self.network, initial, conc)?);
            }
        }

        let constraints: Vec<Constraint> = constraints
            .into_iter()
            .map(|mut c| {
                c.name = format!("{}.{}", self.prefix, c.name);
                let node = c.node;
                c.in_block(self.index, node)
            })
            .collect();

        debug!(
            "Assembled block {} with {} variables and {} constraints",
            self.prefix,
            frame.variables.len(),
            constraints.len()
        );

        Ok(BlockBundle {
            index: self.index,
            prefix: self.prefix.clone(),
            offset,
            variables: frame.variables,
            constraints,
            enzyme_targets,
            times: times.map(<[f64]>::to_vec).unwrap_or_default(),
        })
    }

    /// Every mechanism must belong to a network reaction, and every elemental mechanism
    /// must cover all participants of its reaction with metabolite ligands.
    fn check_catalog(&self) -> Result<(), AssemblyError> {
        for expansion in self.catalog.expansions() {
            let reaction = self
                .network
                .reaction(expansion.reaction())
                .ok_or_else(|| AssemblyError::UnknownReaction(expansion.reaction().to_string()))?;

            let Expansion::Elemental(table) = expansion else {
                continue;
            };

            for step in &table.steps {
                for ligand in [step.ligand_reactant(), step.ligand_product()].into_iter().flatten() {
                    if self.network.metabolite(ligand).is_none() {
                        return Err(AssemblyError::UnknownSpecies {
                            step: step.label(),
                            species: ligand.to_string(),
                        });
                    }
                }
            }

            let covered: BTreeSet<&str> = table
                .core_steps()
                .flat_map(|s| [s.ligand_reactant(), s.ligand_product()])
                .flatten()
                .collect();
            if let Some(species) = reaction.participants().find(|s| !covered.contains(s)) {
                return Err(AssemblyError::MissingSteps {
                    reaction: reaction.id.clone(),
                    species: species.to_string(),
                });
            }
        }
        Ok(())
    }

    fn declare_variables(&self, frame: &mut Frame, node: Option<usize>, targets: &[(String, f64)]) {
        for metabolite in &self.network.metabolites {
            frame.declare(
                Variable::new("", VarKind::Concentration)
                    .bounds(Some(0.0), Some(MAX_CONCENTRATION))
                    .value(1.0),
                node,
                &metabolite.id,
            );
        }

        for (group, (_, target)) in self.conservation.groups().iter().zip(targets) {
            let n = group.members.len() as f64;
            for member in &group.members {
                frame.declare(
                    Variable::new("", VarKind::EnzymeFraction)
                        .bounds(Some(0.0), Some(target.max(1.0)))
                        .value(target / n),
                    node,
                    member,
                );
            }
        }

        for reaction in &self.network.reactions {
            frame.declare(Variable::new("", VarKind::Rate), node, &reaction.id);
        }

        for step in self.catalog.steps() {
            let label = step.label();
            for kind in [VarKind::ForwardVelocity, VarKind::ReverseVelocity] {
                frame.declare(
                    Variable::new("", kind).bounds(Some(0.0), None),
                    node,
                    &label,
                );
            }
        }
    }

    fn conservation_constraints(
        &self,
        frame: &Frame,
        node: Option<usize>,
        targets: &[(String, f64)],
        out: &mut Vec<Constraint>,
    ) -> Result<(), AssemblyError> {
        for (group, (reaction, target)) in self.conservation.groups().iter().zip(targets) {
            let members = group
                .members
                .iter()
                .map(|m| frame.expr(VarKind::EnzymeFraction, node, m))
                .collect::<Result<Vec<_>, _>>()?;
            out.push(frame.constraint(
                ConstraintGroup::EnzymeConservation,
                node,
                reaction,
                Expr::sum(members),
                Expr::constant(*target),
            ));
        }
        Ok(())
    }

    fn steady_state(&self, frame: &Frame, out: &mut Vec<Constraint>) -> Result<(), AssemblyError> {
        let (matrix, species) = self.network.stoichiometry_matrix()?;
        let balanced: BTreeSet<&str> = self
            .network
            .balanced_metabolites()
            .into_iter()
            .map(|m| m.id.as_str())
            .collect();

        for (i, s) in species.iter().enumerate() {
            if !balanced.contains(s.as_str()) {
                continue;
            }
            let terms = self
                .network
                .reactions
                .iter()
                .enumerate()
                .filter(|(j, _)| matrix[(i, *j)] != 0.0)
                .map(|(j, r)| Ok(matrix[(i, j)] * frame.expr(VarKind::Rate, None, &r.id)?))
                .collect::<Result<Vec<_>, AssemblyError>>()?;
            out.push(frame.constraint(
                ConstraintGroup::SteadyState,
                None,
                s,
                Expr::sum(terms),
                Expr::zero(),
            ));
        }
        Ok(())
    }

    fn rate_laws(
        &self,
        frame: &Frame,
        node: Option<usize>,
        out: &mut Vec<Constraint>,
    ) -> Result<(), AssemblyError> {
        let scope = NodeScope {
            frame,
            parameters: self.parameters,
            node,
        };

        for expansion in self.catalog.expansions() {
            let reaction = self
                .network
                .reaction(expansion.reaction())
                .ok_or_else(|| AssemblyError::UnknownReaction(expansion.reaction().to_string()))?;
            let rate = frame.expr(VarKind::Rate, node, &reaction.id)?;

            match expansion {
                Expansion::Elemental(table) => {
                    self.elemental(frame, &scope, table, rate, out)?;
                }
                Expansion::MichaelisMenten(ligands) => {
                    let denominator = match node {
                        None => Denominator::Additive,
                        Some(_) => Denominator::Factored,
                    };
                    let law = michaelis_menten(ligands, reaction, &scope, denominator)?;
                    out.push(frame.constraint(ConstraintGroup::RateLaw, node, &reaction.id, rate, law));
                }
                Expansion::Custom { .. } => {
                    let law = self
                        .parameters
                        .custom_law(&reaction.id)
                        .ok_or_else(|| AssemblyError::InvalidRateLaw {
                            reaction: reaction.id.clone(),
                            message: "rate law was not declared".into(),
                        })?
                        .build(reaction, &scope)?;
                    out.push(frame.constraint(ConstraintGroup::RateLaw, node, &reaction.id, rate, law));
                }
            }
        }
        Ok(())
    }

    fn elemental(
        &self,
        frame: &Frame,
        scope: &NodeScope,
        table: &StepTable,
        rate: Expr,
        out: &mut Vec<Constraint>,
    ) -> Result<(), AssemblyError> {
        let node = scope.node;
        let mut net = HashMap::new();

        for step in &table.steps {
            let label = step.label();
            let vf = frame.expr(VarKind::ForwardVelocity, node, &label)?;
            let vr = frame.expr(VarKind::ReverseVelocity, node, &label)?;

            out.push(frame.constraint(
                ConstraintGroup::ForwardRate,
                node,
                &label,
                vf.clone(),
                forward_velocity(step, scope)?,
            ));
            out.push(frame.constraint(
                ConstraintGroup::ReverseRate,
                node,
                &label,
                vr.clone(),
                reverse_velocity(step, scope)?,
            ));

            let step_net = vf - vr;
            if step.is_regulatory() {
                out.push(frame.constraint(
                    ConstraintGroup::NetBalance,
                    node,
                    &label,
                    step_net,
                    Expr::zero(),
                ));
            } else if table.kind != MechanismKind::Random || step.kind == StepKind::Catalytic {
                out.push(frame.constraint(
                    ConstraintGroup::NetBalance,
                    node,
                    &label,
                    rate.clone(),
                    step_net.clone(),
                ));
                net.insert(label, step_net);
            } else {
                net.insert(label, step_net);
            }
        }

        if table.kind == MechanismKind::Random {
            for form in table.intermediate_forms() {
                let production = table
                    .core_steps()
                    .filter_map(|s| {
                        let flux = net.get(&s.label())?.clone();
                        if s.enzyme_product() == form {
                            Some(flux)
                        } else if s.enzyme_reactant() == form {
                            Some(-flux)
                        } else {
                            None
                        }
                    })
                    .collect::<Vec<_>>();
                out.push(frame.constraint(
                    ConstraintGroup::ComplexBalance,
                    node,
                    &form,
                    Expr::sum(production),
                    Expr::zero(),
                ));
            }
        }

        Ok(())
    }
}

/// Block-local variable table.
struct Frame<'s> {
    prefix: &'s str,
    index: usize,
    offset: usize,
    times: Option<&'s [f64]>,
    variables: Vec<Variable>,
    lookup: HashMap<String, usize>,
}

impl Frame<'_> {
    fn time(&self, node: Option<usize>) -> Option<f64> {
        node.and_then(|k| self.times.map(|t| t[k]))
    }

    /// Declares `template` under the key built from its kind, the node and `name`.
    fn declare(&mut self, template: Variable, node: Option<usize>, name: &str) -> VarId {
        let key = block_key(self.prefix, template.kind, self.time(node), name);
        if let Some(&i) = self.lookup.get(&key) {
            return VarId(self.offset + i);
        }

        let mut variable = template.in_block(self.index, node);
        variable.key = key.clone();
        self.lookup.insert(key, self.variables.len());
        self.variables.push(variable);
        VarId(self.offset + self.variables.len() - 1)
    }

    fn expr(&self, kind: VarKind, node: Option<usize>, name: &str) -> Result<Expr, AssemblyError> {
        let key = block_key(self.prefix, kind, self.time(node), name);
        self.lookup
            .get(&key)
            .map(|i| Expr::var(VarId(self.offset + i)))
            .ok_or(AssemblyError::UnknownVariable(key))
    }

    /// Constraint named `{group}[{t},{index}]`, prefixed later with the block id.
    fn constraint(
        &self,
        group: ConstraintGroup,
        node: Option<usize>,
        index: &str,
        lhs: Expr,
        rhs: Expr,
    ) -> Constraint {
        let name = match self.time(node) {
            Some(t) => format!("{group}[{t},{index}]"),
            None => format!("{group}[{index}]"),
        };
        let mut constraint = Constraint::equality(name, group, lhs, rhs);
        constraint.node = node;
        constraint
    }
}

/// Resolves rate-law references at one node of a block.
struct NodeScope<'f, 's> {
    frame: &'f Frame<'s>,
    parameters: &'f ParameterSet,
    node: Option<usize>,
}

impl RateLawScope for NodeScope<'_, '_> {
    fn concentration(&self, species: &str) -> Result<Expr, AssemblyError> {
        self.frame.expr(VarKind::Concentration, self.node, species)
    }

    fn enzyme(&self, form: &str) -> Result<Expr, AssemblyError> {
        self.frame.expr(VarKind::EnzymeFraction, self.node, form)
    }

    fn parameter(&self, key: &str) -> Result<Expr, AssemblyError> {
        self.parameters.expr(key)
    }
}
