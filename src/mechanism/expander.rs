//! Expansion of compact mechanism records into elemental step tables.
//!
//! Step numbering follows the binding walk:
//!
//! ```text
//! sequential  A + B -> P + Q
//!   _0  E + A    -> E+A        binding
//!   _1  E+A + B  -> E+A+B      binding
//!   _2  E+A+B    -> E+P+Q      catalytic
//!   _3  E+P+Q    -> E+Q + P    release
//!   _4  E+Q      -> E + Q      release
//!
//! ping-pong   A + B -> P + Q
//!   _0  E + A    -> E+A        binding
//!   _1  E+A      -> E+P        catalytic
//!   _2  E+P      -> E_1 + P    release
//!   _3  E_1 + B  -> E_1+B      binding
//!   _4  E_1+B    -> E_1+Q      catalytic
//!   _5  E_1+Q    -> E + Q      release
//! ```
//!
//! Modifier steps are appended with ids `i0, i1, ...` in the order competitive,
//! uncompetitive, noncompetitive, activators.

use std::collections::HashSet;

use itertools::Itertools;
use log::debug;

use super::{
    error::MechanismError,
    record::{MechanismKind, MechanismRecord, RateLawFamily},
    step::{complex_name, ElementalStep, StepId, StepKind},
};

/// Largest ligand count per side accepted for random-order mechanisms.
pub const MAX_RANDOM_LIGANDS: usize = 6;

/// Ordered elemental steps of one reaction.
#[derive(Debug, Clone, PartialEq)]
pub struct StepTable {
    pub reaction: String,
    pub kind: MechanismKind,
    pub base_enzyme: String,
    pub steps: Vec<ElementalStep>,
}

impl StepTable {
    /// Binding, catalytic and release steps in id order.
    pub fn core_steps(&self) -> impl Iterator<Item = &ElementalStep> {
        self.steps.iter().filter(|s| !s.is_regulatory())
    }

    /// Inhibition and activation steps in id order.
    pub fn modifier_steps(&self) -> impl Iterator<Item = &ElementalStep> {
        self.steps.iter().filter(|s| s.is_regulatory())
    }

    /// Every distinct enzyme form in first-appearance order, base enzyme first.
    pub fn enzyme_forms(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut forms = vec![];
        for form in std::iter::once(self.base_enzyme.as_str()).chain(
            self.steps
                .iter()
                .flat_map(|s| [s.enzyme_reactant(), s.enzyme_product()]),
        ) {
            if seen.insert(form) {
                forms.push(form.to_string());
            }
        }
        forms
    }

    /// Enzyme forms other than the free base enzyme that take part in core steps.
    pub fn intermediate_forms(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.core_steps()
            .flat_map(|s| [s.enzyme_reactant(), s.enzyme_product()])
            .filter(|f| *f != self.base_enzyme)
            .filter(|f| seen.insert(*f))
            .map(String::from)
            .collect()
    }
}

/// Ligand roles of a reaction, used by the non-elemental rate-law families.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LigandTable {
    pub reaction: String,
    pub substrates: Vec<String>,
    pub products: Vec<String>,
    pub competitive: Vec<String>,
    pub uncompetitive: Vec<String>,
    pub noncompetitive: Vec<String>,
    pub activators: Vec<String>,
}

impl LigandTable {
    fn from_record(record: &MechanismRecord) -> Self {
        Self {
            reaction: record.reaction.clone(),
            substrates: record.substrates.clone(),
            products: record.products.clone(),
            competitive: record.competitive.clone(),
            uncompetitive: record.uncompetitive.clone(),
            noncompetitive: record.noncompetitive.clone(),
            activators: record.activators.clone(),
        }
    }

    /// Inhibitors acting on the free enzyme (competitive and noncompetitive).
    pub fn free_enzyme_inhibitors(&self) -> impl Iterator<Item = &String> {
        self.noncompetitive.iter().chain(&self.competitive)
    }

    /// Inhibitors acting on the substrate-bound enzyme (uncompetitive and noncompetitive).
    pub fn bound_enzyme_inhibitors(&self) -> impl Iterator<Item = &String> {
        self.noncompetitive.iter().chain(&self.uncompetitive)
    }
}

/// Result of expanding one mechanism record under a rate-law family.
#[derive(Debug, Clone, PartialEq)]
pub enum Expansion {
    Elemental(StepTable),
    MichaelisMenten(LigandTable),
    Custom { ligands: LigandTable, rate_law: String },
}

impl Expansion {
    pub fn reaction(&self) -> &str {
        match self {
            Expansion::Elemental(table) => &table.reaction,
            Expansion::MichaelisMenten(ligands) | Expansion::Custom { ligands, .. } => {
                &ligands.reaction
            }
        }
    }

    /// Enzyme forms whose fractions are conserved for this reaction.
    pub fn enzyme_forms(&self) -> Vec<String> {
        match self {
            Expansion::Elemental(table) => table.enzyme_forms(),
            _ => vec![format!("{}_ENZ", self.reaction())],
        }
    }

    pub fn steps(&self) -> &[ElementalStep] {
        match self {
            Expansion::Elemental(table) => &table.steps,
            _ => &[],
        }
    }
}

/// Expands mechanism records for one rate-law family.
#[derive(Debug, Clone, Copy)]
pub struct MechanismExpander {
    family: RateLawFamily,
}

impl MechanismExpander {
    pub fn new(family: RateLawFamily) -> Self {
        Self { family }
    }

    /// Expands a single mechanism record.
    ///
    /// # Arguments
    ///
    /// * `record` - The mechanism descriptor of one reaction
    ///
    /// # Returns
    ///
    /// * `Result<Expansion, MechanismError>` - The step table or ligand table of the reaction
    pub fn expand(&self, record: &MechanismRecord) -> Result<Expansion, MechanismError> {
        match self.family {
            RateLawFamily::Elemental => Ok(Expansion::Elemental(expand_steps(record)?)),
            RateLawFamily::MichaelisMenten => {
                Ok(Expansion::MichaelisMenten(LigandTable::from_record(record)))
            }
            RateLawFamily::Custom => {
                let rate_law = record
                    .rate_law
                    .clone()
                    .filter(|law| !law.trim().is_empty())
                    .ok_or_else(|| MechanismError::MissingRateLaw(record.reaction.clone()))?;
                Ok(Expansion::Custom {
                    ligands: LigandTable::from_record(record),
                    rate_law,
                })
            }
        }
    }
}

/// Expands a mechanism record into its ordered elemental steps.
pub fn expand_steps(record: &MechanismRecord) -> Result<StepTable, MechanismError> {
    if record.reaction.is_empty() {
        return Err(MechanismError::InvalidIdentifier {
            id: record.reaction.clone(),
            reason: "reaction id is empty".into(),
        });
    }

    let base = format!("{}_ENZ", record.reaction);
    let mut walker = StepWalker::new(&record.reaction);

    match record.kind {
        MechanismKind::Sequential => sequential(&mut walker, &base, record)?,
        MechanismKind::PingPong => ping_pong(&mut walker, &base, record)?,
        MechanismKind::Random => random(&mut walker, &base, record)?,
    }

    modifiers(&mut walker, &base, record)?;

    debug!(
        "Expanded {} mechanism of {} into {} steps",
        record.kind,
        record.reaction,
        walker.steps.len()
    );

    Ok(StepTable {
        reaction: record.reaction.clone(),
        kind: record.kind,
        base_enzyme: base,
        steps: walker.steps,
    })
}

/// Accumulates steps and hands out consecutive ids.
struct StepWalker<'a> {
    reaction: &'a str,
    core: usize,
    modifier: usize,
    steps: Vec<ElementalStep>,
}

impl<'a> StepWalker<'a> {
    fn new(reaction: &'a str) -> Self {
        Self {
            reaction,
            core: 0,
            modifier: 0,
            steps: vec![],
        }
    }

    fn push(&mut self, kind: StepKind, reactants: Vec<String>, products: Vec<String>) {
        let id = if kind.is_regulatory() {
            self.modifier += 1;
            StepId::Modifier(self.modifier - 1)
        } else {
            self.core += 1;
            StepId::Core(self.core - 1)
        };

        self.steps.push(ElementalStep {
            reaction: self.reaction.to_string(),
            id,
            kind,
            reactants,
            products,
        });
    }
}

fn sequential(
    walker: &mut StepWalker,
    base: &str,
    record: &MechanismRecord,
) -> Result<(), MechanismError> {
    let substrates = &record.substrates;
    let products = &record.products;

    let mut enzyme = base.to_string();
    for (k, substrate) in substrates.iter().enumerate() {
        let bound = complex_name(base, &substrates[..=k])?;
        walker.push(
            StepKind::Binding,
            vec![enzyme, substrate.clone()],
            vec![bound.clone()],
        );
        enzyme = bound;
    }

    let converted = complex_name(base, products)?;
    walker.push(StepKind::Catalytic, vec![enzyme], vec![converted.clone()]);
    enzyme = converted;

    // Released ligands pop off from the left
    for (k, product) in products.iter().enumerate() {
        let remaining = complex_name(base, &products[k + 1..])?;
        walker.push(
            StepKind::Release,
            vec![enzyme],
            vec![remaining.clone(), product.clone()],
        );
        enzyme = remaining;
    }

    Ok(())
}

fn ping_pong(
    walker: &mut StepWalker,
    base: &str,
    record: &MechanismRecord,
) -> Result<(), MechanismError> {
    let substrates = &record.substrates;
    let products = &record.products;

    if substrates.len() != products.len() {
        return Err(MechanismError::PingPongMismatch {
            reaction: record.reaction.clone(),
            substrates: substrates.len(),
            products: products.len(),
        });
    }

    let n = substrates.len();
    for (k, (substrate, product)) in substrates.iter().zip(products).enumerate() {
        let current = if k == 0 {
            base.to_string()
        } else {
            format!("{base}_{k}")
        };
        let next = if k + 1 < n {
            format!("{base}_{}", k + 1)
        } else {
            base.to_string()
        };

        let bound = complex_name(&current, &[substrate])?;
        walker.push(
            StepKind::Binding,
            vec![current.clone(), substrate.clone()],
            vec![bound.clone()],
        );

        let converted = complex_name(&current, &[product])?;
        walker.push(StepKind::Catalytic, vec![bound], vec![converted.clone()]);

        walker.push(
            StepKind::Release,
            vec![converted],
            vec![next, product.clone()],
        );
    }

    Ok(())
}

/// Subsets of `0..n` as index lists, ordered by size and then lexicographically.
fn ordered_subsets(n: usize) -> Vec<Vec<usize>> {
    (0..=n)
        .flat_map(|size| (0..n).combinations(size))
        .collect()
}

fn pick<'a>(ligands: &'a [String], indices: &[usize]) -> Vec<&'a str> {
    indices.iter().map(|&i| ligands[i].as_str()).collect()
}

fn random(
    walker: &mut StepWalker,
    base: &str,
    record: &MechanismRecord,
) -> Result<(), MechanismError> {
    let substrates = &record.substrates;
    let products = &record.products;

    for side in [substrates, products] {
        if side.len() > MAX_RANDOM_LIGANDS {
            return Err(MechanismError::TooManyLigands {
                reaction: record.reaction.clone(),
                max: MAX_RANDOM_LIGANDS,
                found: side.len(),
            });
        }
    }

    // Bound ligands are kept in declared order so each physical complex has one name
    for bound in ordered_subsets(substrates.len()) {
        if bound.len() == substrates.len() {
            continue;
        }
        let enzyme = complex_name(base, &pick(substrates, &bound))?;
        for next in (0..substrates.len()).filter(|i| !bound.contains(i)) {
            let grown: Vec<usize> = bound
                .iter()
                .copied()
                .chain(std::iter::once(next))
                .sorted()
                .collect();
            walker.push(
                StepKind::Binding,
                vec![enzyme.clone(), substrates[next].clone()],
                vec![complex_name(base, &pick(substrates, &grown))?],
            );
        }
    }

    walker.push(
        StepKind::Catalytic,
        vec![complex_name(base, substrates)?],
        vec![complex_name(base, products)?],
    );

    let mut release_sets = ordered_subsets(products.len());
    release_sets.reverse();
    for held in release_sets.into_iter().filter(|s| !s.is_empty()) {
        let enzyme = complex_name(base, &pick(products, &held))?;
        for &released in held.iter() {
            let remaining: Vec<usize> = held.iter().copied().filter(|&i| i != released).collect();
            walker.push(
                StepKind::Release,
                vec![enzyme.clone()],
                vec![
                    complex_name(base, &pick(products, &remaining))?,
                    products[released].clone(),
                ],
            );
        }
    }

    Ok(())
}

fn modifiers(
    walker: &mut StepWalker,
    base: &str,
    record: &MechanismRecord,
) -> Result<(), MechanismError> {
    let substrates = &record.substrates;

    for inhibitor in &record.competitive {
        free_binding(walker, base, inhibitor, StepKind::Competitive)?;
    }
    for inhibitor in &record.uncompetitive {
        saturated_binding(walker, base, substrates, inhibitor, StepKind::Uncompetitive)?;
    }
    for inhibitor in &record.noncompetitive {
        free_binding(walker, base, inhibitor, StepKind::Noncompetitive)?;
        saturated_binding(walker, base, substrates, inhibitor, StepKind::Noncompetitive)?;
    }
    for activator in &record.activators {
        walker.push(
            StepKind::Activation,
            vec![format!("{base}_inactive"), activator.clone()],
            vec![base.to_string()],
        );
    }

    Ok(())
}

/// Inhibitor binding to the free enzyme.
fn free_binding(
    walker: &mut StepWalker,
    base: &str,
    inhibitor: &str,
    kind: StepKind,
) -> Result<(), MechanismError> {
    let bound = complex_name(base, &[format!("{inhibitor}_ci")])?;
    walker.push(
        kind,
        vec![base.to_string(), inhibitor.to_string()],
        vec![bound],
    );
    Ok(())
}

/// Inhibitor binding to the fully substrate-bound enzyme.
///
/// The inhibited complex keeps the enzyme base and appends the inhibitor tag to the
/// substrate list, so its name parses back into the same base and ligands.
fn saturated_binding(
    walker: &mut StepWalker,
    base: &str,
    substrates: &[String],
    inhibitor: &str,
    kind: StepKind,
) -> Result<(), MechanismError> {
    let saturated = complex_name(base, substrates)?;
    let ligands: Vec<String> = substrates
        .iter()
        .cloned()
        .chain(std::iter::once(format!("{inhibitor}_ui")))
        .collect();
    let bound = complex_name(base, &ligands)?;
    walker.push(
        kind,
        vec![saturated, inhibitor.to_string()],
        vec![bound],
    );
    Ok(())
}
