//! Consistency report over a network, its mechanisms and the datasets.
//!
//! Unlike the checks run during composition, which stop at the first error, these checks
//! collect every finding so a configuration can be fixed in one pass.

use std::{collections::HashSet, fmt};

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::{
    data::Dataset,
    mechanism::record::{MechanismRecord, RateLawFamily},
    network::MetabolicNetwork,
};

/// Checks the consistency of a configuration.
///
/// # Arguments
///
/// * `network` - The metabolic network
/// * `mechanisms` - One mechanism record per modelled reaction
/// * `datasets` - The experiments to fit
/// * `family` - Rate-law family the mechanisms will be expanded with
///
/// # Returns
///
/// A `Report` with one entry per finding.
pub fn check_consistency(
    network: &MetabolicNetwork,
    mechanisms: &[MechanismRecord],
    datasets: &[Dataset],
    family: RateLawFamily,
) -> Report {
    let mut report = Report::default();

    check_network(network, &mut report);
    check_mechanisms(network, mechanisms, family, &mut report);
    check_datasets(network, mechanisms, datasets, &mut report);

    report
}

/// The results of the validation checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub is_valid: bool,
    pub errors: Vec<ValidationResult>,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            is_valid: true,
            errors: vec![],
        }
    }
}

impl Report {
    pub fn add_result(&mut self, result: ValidationResult) {
        if result.severity == Severity::Error {
            self.is_valid = false;
        }
        self.errors.push(result);
    }

    /// Findings of the given severity.
    pub fn filter(&self, severity: Severity) -> impl Iterator<Item = &ValidationResult> {
        self.errors.iter().filter(move |r| r.severity == severity)
    }
}

/// The result of a single check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub location: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationResult {
    pub fn new(location: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
            severity,
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (severity, message) = match self.severity {
            Severity::Error => ("Error".bold().red(), self.message.bold().red()),
            Severity::Warning => ("Warning".bold().yellow(), self.message.bold().yellow()),
            Severity::Info => ("Info".bold().green(), self.message.bold().green()),
        };
        write!(
            f,
            "[{}] {}:\n\t└── {}",
            self.location.bold(),
            severity,
            message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Copy, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "Error"),
            Severity::Warning => write!(f, "Warning"),
            Severity::Info => write!(f, "Info"),
        }
    }
}

fn check_network(network: &MetabolicNetwork, report: &mut Report) {
    if network.reactions.is_empty() {
        report.add_result(ValidationResult::new(
            "/reactions",
            "Network does not contain any reactions.",
            Severity::Error,
        ));
    }

    let mut seen = HashSet::new();
    for id in network
        .metabolites
        .iter()
        .map(|m| &m.id)
        .chain(network.reactions.iter().map(|r| &r.id))
    {
        if !seen.insert(id) {
            report.add_result(ValidationResult::new(
                format!("/{id}"),
                format!("Identifier '{id}' is used more than once."),
                Severity::Error,
            ));
        }
    }

    for (idx, reaction) in network.reactions.iter().enumerate() {
        for species in reaction.participants() {
            if network.metabolite(species).is_none() {
                report.add_result(ValidationResult::new(
                    format!("/reactions/{idx}"),
                    format!(
                        "Species '{species}' in reaction '{}' is not a network metabolite.",
                        reaction.id
                    ),
                    Severity::Error,
                ));
            }
        }
        if reaction.lower_bound > reaction.upper_bound {
            report.add_result(ValidationResult::new(
                format!("/reactions/{idx}"),
                format!(
                    "Reaction '{}' has a lower flux bound above its upper bound.",
                    reaction.id
                ),
                Severity::Error,
            ));
        }
    }
}

fn check_mechanisms(
    network: &MetabolicNetwork,
    mechanisms: &[MechanismRecord],
    family: RateLawFamily,
    report: &mut Report,
) {
    let mut seen = HashSet::new();

    for (idx, record) in mechanisms.iter().enumerate() {
        let location = format!("/mechanisms/{idx}");
        if !seen.insert(record.reaction.as_str()) {
            report.add_result(ValidationResult::new(
                &location,
                format!("Reaction '{}' has more than one mechanism.", record.reaction),
                Severity::Error,
            ));
        }

        let Some(reaction) = network.reaction(&record.reaction) else {
            report.add_result(ValidationResult::new(
                &location,
                format!(
                    "Mechanism references reaction '{}', which is not in the network.",
                    record.reaction
                ),
                Severity::Error,
            ));
            continue;
        };

        if record.substrates.is_empty() && family != RateLawFamily::Custom {
            report.add_result(ValidationResult::new(
                &location,
                format!("Mechanism of '{}' has no substrates.", record.reaction),
                Severity::Error,
            ));
        }
        if family == RateLawFamily::Custom && record.rate_law.is_none() {
            report.add_result(ValidationResult::new(
                &location,
                format!("Mechanism of '{}' has no rate law expression.", record.reaction),
                Severity::Error,
            ));
        }

        let ligands = record
            .substrates
            .iter()
            .map(|l| ("substrates", l))
            .chain(record.products.iter().map(|l| ("products", l)))
            .chain(record.modifiers().map(|l| ("modifiers", l)));
        for (role, ligand) in ligands {
            if network.metabolite(ligand).is_none() {
                report.add_result(ValidationResult::new(
                    format!("{location}/{role}"),
                    format!("Ligand '{ligand}' is not a network metabolite."),
                    Severity::Error,
                ));
            }
        }

        for substrate in &record.substrates {
            if !reaction.has_reactant(substrate) && !reaction.has_product(substrate) {
                report.add_result(ValidationResult::new(
                    format!("{location}/substrates"),
                    format!(
                        "Substrate '{substrate}' does not take part in reaction '{}'.",
                        reaction.id
                    ),
                    Severity::Warning,
                ));
            }
        }
        for product in &record.products {
            if !reaction.has_reactant(product) && !reaction.has_product(product) {
                report.add_result(ValidationResult::new(
                    format!("{location}/products"),
                    format!(
                        "Product '{product}' does not take part in reaction '{}'.",
                        reaction.id
                    ),
                    Severity::Warning,
                ));
            }
        }
    }

    for reaction in &network.reactions {
        if !seen.contains(reaction.id.as_str()) {
            report.add_result(ValidationResult::new(
                format!("/reactions/{}", reaction.id),
                format!(
                    "Reaction '{}' has no mechanism and will not be modelled.",
                    reaction.id
                ),
                Severity::Warning,
            ));
        }
    }
}

fn check_datasets(
    network: &MetabolicNetwork,
    mechanisms: &[MechanismRecord],
    datasets: &[Dataset],
    report: &mut Report,
) {
    if datasets.is_empty() {
        report.add_result(ValidationResult::new(
            "/datasets",
            "No datasets were provided.",
            Severity::Error,
        ));
    }

    let modelled: HashSet<&str> = mechanisms.iter().map(|m| m.reaction.as_str()).collect();
    let mut seen = HashSet::new();

    for (idx, dataset) in datasets.iter().enumerate() {
        let location = format!("/datasets/{idx}");
        if !seen.insert(dataset.id()) {
            report.add_result(ValidationResult::new(
                &location,
                format!("Dataset id '{}' is used twice.", dataset.id()),
                Severity::Error,
            ));
        }
        if let Err(e) = dataset.check() {
            report.add_result(ValidationResult::new(&location, e.to_string(), Severity::Error));
        }

        for reaction in dataset.perturbations().keys() {
            if !modelled.contains(reaction.as_str()) {
                report.add_result(ValidationResult::new(
                    format!("{location}/perturbations"),
                    format!("Perturbed reaction '{reaction}' has no mechanism."),
                    Severity::Error,
                ));
            }
        }

        match dataset {
            Dataset::Static(d) => {
                for reaction in d.fluxes.keys() {
                    if !modelled.contains(reaction.as_str()) {
                        report.add_result(ValidationResult::new(
                            format!("{location}/fluxes"),
                            format!("Flux of '{reaction}' refers to an unmodelled reaction."),
                            Severity::Error,
                        ));
                    }
                }
            }
            Dataset::Dynamic(d) => {
                for observable in d.observables.keys() {
                    if network.metabolite(observable).is_none() {
                        report.add_result(ValidationResult::new(
                            format!("{location}/observables"),
                            format!("Observable '{observable}' is not a network metabolite."),
                            Severity::Error,
                        ));
                    }
                }
                for species in d.initial.keys() {
                    let is_gene = network
                        .reactions
                        .iter()
                        .any(|r| r.gene.as_deref() == Some(species.as_str()));
                    if network.metabolite(species).is_none() && !is_gene {
                        report.add_result(ValidationResult::new(
                            format!("{location}/initial"),
                            format!(
                                "Initial value of '{species}' matches neither a metabolite nor an enzyme."
                            ),
                            Severity::Warning,
                        ));
                    }
                }
            }
        }
    }
}
