//! Rate-law expression builders.
//!
//! Every builder folds over ligand or step lists and returns an [`Expr`]; no rate law is
//! ever assembled from formatted source text.

use lazy_static::lazy_static;
use meval::tokenizer::{Operation, Token};
use regex::Regex;

use crate::{
    mechanism::{expander::LigandTable, step::ElementalStep},
    model::{
        expr::{Expr, Func},
        variable::VarKind,
    },
    network::{MetabolicNetwork, Reaction},
};

use super::error::AssemblyError;

/// Symbol of the catalysing enzyme fraction inside custom rate laws.
pub const ENZYME_SYMBOL: &str = "E";

lazy_static! {
    static ref CONSTANT_FAMILY: Regex =
        Regex::new(r"(?i)^k_?(cat|m|i)").expect("constant family pattern is valid");
}

/// Resolves variables referenced by a rate law inside one block (and one time node).
pub trait RateLawScope {
    /// Concentration of a metabolite.
    fn concentration(&self, species: &str) -> Result<Expr, AssemblyError>;
    /// Fraction of an enzyme form.
    fn enzyme(&self, form: &str) -> Result<Expr, AssemblyError>;
    /// Shared kinetic parameter by key, e.g. `kf[R1_0]`.
    fn parameter(&self, key: &str) -> Result<Expr, AssemblyError>;
}

/// Key of a shared parameter, `"{symbol}[{index}]"`.
pub fn parameter_key(kind: VarKind, index: &str) -> String {
    format!("{}[{}]", kind.symbol(), index)
}

/// Forward velocity of an elemental step: `kf * e[enzyme] (* c[ligand])`.
pub fn forward_velocity(step: &ElementalStep, scope: &impl RateLawScope) -> Result<Expr, AssemblyError> {
    let mut factors = vec![
        scope.parameter(&parameter_key(VarKind::ForwardConstant, &step.label()))?,
        scope.enzyme(step.enzyme_reactant())?,
    ];
    if let Some(ligand) = step.ligand_reactant() {
        factors.push(scope.concentration(ligand)?);
    }
    Ok(Expr::product(factors))
}

/// Reverse velocity of an elemental step: `kr * e[enzyme] (* c[ligand])`.
pub fn reverse_velocity(step: &ElementalStep, scope: &impl RateLawScope) -> Result<Expr, AssemblyError> {
    let mut factors = vec![
        scope.parameter(&parameter_key(VarKind::ReverseConstant, &step.label()))?,
        scope.enzyme(step.enzyme_product())?,
    ];
    if let Some(ligand) = step.ligand_product() {
        factors.push(scope.concentration(ligand)?);
    }
    Ok(Expr::product(factors))
}

/// Shape of the Michaelis-Menten denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denominator {
    /// `sum(|coef| c / KM)` over reactants and products
    Additive,
    /// `prod(1 + |coef| c / KM)` over reactants plus the same over products, minus one
    Factored,
}

/// Michaelis-Menten key suffix of a ligand, `"{reaction}+{ligand}"`.
pub fn ligand_index(reaction: &str, ligand: &str) -> String {
    format!("{reaction}+{ligand}")
}

/// Checks the ligand roles of a Michaelis-Menten mechanism against its reaction.
pub fn check_michaelis_menten(ligands: &LigandTable, reaction: &Reaction) -> Result<(), AssemblyError> {
    if ligands.substrates.is_empty() {
        return Err(AssemblyError::MissingSubstrates(reaction.id.clone()));
    }
    for substrate in &ligands.substrates {
        if !reaction.has_reactant(substrate) {
            return Err(AssemblyError::UnknownLigand {
                reaction: reaction.id.clone(),
                ligand: substrate.clone(),
                role: "reactant",
            });
        }
    }
    for product in &ligands.products {
        if !reaction.has_product(product) {
            return Err(AssemblyError::UnknownLigand {
                reaction: reaction.id.clone(),
                ligand: product.clone(),
                role: "product",
            });
        }
    }
    Ok(())
}

/// Builds the Michaelis-Menten net rate of a reaction.
///
/// ```text
/// num = Kcat_f * prod(c[s]) / prod(KM_r) - Kcat_r * prod(c[p]) / prod(KM_p)
/// den = sum(|coef| c / KM_r) * (1 + sum(c[i] / Ki_uci)) + sum(c[i] / Ki_ci) + sum(|coef| c / KM_p)
/// rate = num * e / den
/// ```
///
/// Without products, the numerator of a reversible efflux reaction changes sign.
///
/// # Errors
///
/// Fails for reactions without substrates and for ligands that are not participants of
/// the reaction.
pub fn michaelis_menten(
    ligands: &LigandTable,
    reaction: &Reaction,
    scope: &impl RateLawScope,
    denominator: Denominator,
) -> Result<Expr, AssemblyError> {
    check_michaelis_menten(ligands, reaction)?;
    let r = &reaction.id;

    let km = |kind: VarKind, species: &str| scope.parameter(&parameter_key(kind, &ligand_index(r, species)));
    let saturation = |kind: VarKind, elements: &[crate::network::ReactionElement]| {
        elements
            .iter()
            .map(|el| {
                Ok(Expr::constant(el.stoichiometry.abs()) * scope.concentration(&el.species_id)?
                    / km(kind, &el.species_id)?)
            })
            .collect::<Result<Vec<Expr>, AssemblyError>>()
    };
    let combine = |terms: Vec<Expr>| match denominator {
        Denominator::Additive => Expr::sum(terms),
        Denominator::Factored => Expr::product(terms.into_iter().map(|t| t + 1.0)),
    };

    let substrate_conc = ligands
        .substrates
        .iter()
        .map(|s| scope.concentration(s))
        .collect::<Result<Vec<_>, _>>()?;
    let reactant_km = reaction
        .reactants
        .iter()
        .map(|el| km(VarKind::KmReactant, &el.species_id))
        .collect::<Result<Vec<_>, _>>()?;

    let mut num = Expr::product(
        std::iter::once(scope.parameter(&parameter_key(VarKind::KcatForward, r))?).chain(substrate_conc),
    ) / Expr::product(reactant_km);

    let mut den = combine(saturation(VarKind::KmReactant, &reaction.reactants)?);

    let bound_inhibition = ligands
        .bound_enzyme_inhibitors()
        .map(|i| {
            Ok(scope.concentration(i)?
                / scope.parameter(&parameter_key(
                    VarKind::KmInhibitor,
                    &ligand_index(r, &format!("{i}_uci")),
                ))?)
        })
        .collect::<Result<Vec<_>, AssemblyError>>()?;
    if !bound_inhibition.is_empty() {
        den = den * (Expr::sum(bound_inhibition) + 1.0);
    }

    let free_inhibition = ligands
        .free_enzyme_inhibitors()
        .map(|i| {
            Ok(scope.concentration(i)?
                / scope.parameter(&parameter_key(
                    VarKind::KmInhibitor,
                    &ligand_index(r, &format!("{i}_ci")),
                ))?)
        })
        .collect::<Result<Vec<_>, AssemblyError>>()?;
    if !free_inhibition.is_empty() {
        den = den + Expr::sum(free_inhibition);
    }

    if !ligands.products.is_empty() {
        let product_conc = ligands
            .products
            .iter()
            .map(|p| scope.concentration(p))
            .collect::<Result<Vec<_>, _>>()?;
        let product_km = reaction
            .products
            .iter()
            .map(|el| km(VarKind::KmProduct, &el.species_id))
            .collect::<Result<Vec<_>, _>>()?;

        num = num
            - Expr::product(
                std::iter::once(scope.parameter(&parameter_key(VarKind::KcatReverse, r))?)
                    .chain(product_conc),
            ) / Expr::product(product_km);
        den = den + combine(saturation(VarKind::KmProduct, &reaction.products)?);
    } else if reaction.is_efflux() {
        num = -num;
    }

    if denominator == Denominator::Factored {
        den = den - 1.0;
    }

    Ok(num * scope.enzyme(&reaction.base_enzyme())? / den)
}

/// Role of a symbol inside a custom rate law.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Concentration(String),
    Enzyme,
    Constant { name: String, kind: VarKind },
}

/// Classifies a free constant by its name prefix: `kcat*`, `km*`, `ki*` or other.
pub fn classify_constant(name: &str) -> VarKind {
    match CONSTANT_FAMILY
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .as_deref()
    {
        Some("cat") => VarKind::CustomKcat,
        Some("m") => VarKind::CustomKm,
        Some("i") => VarKind::CustomKi,
        _ => VarKind::CustomConstant,
    }
}

/// A parsed user-supplied rate law.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomRateLaw {
    pub reaction: String,
    /// Postfix token stream of the expression
    tokens: Vec<Token>,
    symbols: Vec<Symbol>,
}

impl CustomRateLaw {
    /// Parses `expression` for `reaction`.
    ///
    /// Symbols naming a network metabolite become concentrations, the symbol `E` is the
    /// reaction's enzyme fraction and every other symbol is a shared constant.
    pub fn parse(
        reaction: &str,
        expression: &str,
        network: &MetabolicNetwork,
    ) -> Result<Self, AssemblyError> {
        let invalid = |message: String| AssemblyError::InvalidRateLaw {
            reaction: reaction.to_string(),
            message,
        };

        let parsed: meval::Expr = expression.parse().map_err(|e: meval::Error| invalid(e.to_string()))?;
        let tokens: Vec<Token> = parsed.iter().cloned().collect();

        let mut symbols: Vec<Symbol> = vec![];
        for token in &tokens {
            match token {
                Token::Var(name) => {
                    let symbol = if network.metabolite(name).is_some() {
                        Symbol::Concentration(name.clone())
                    } else if name == ENZYME_SYMBOL {
                        Symbol::Enzyme
                    } else {
                        Symbol::Constant {
                            name: name.clone(),
                            kind: classify_constant(name),
                        }
                    };
                    if !symbols.contains(&symbol) {
                        symbols.push(symbol);
                    }
                }
                Token::Func(name, Some(1)) if ["exp", "ln", "sqrt"].contains(&name.as_str()) => {}
                Token::Func(name, _) => return Err(invalid(format!("unsupported function {name}"))),
                Token::Binary(Operation::Rem) => return Err(invalid("unsupported operator %".into())),
                _ => {}
            }
        }

        Ok(Self {
            reaction: reaction.to_string(),
            tokens,
            symbols,
        })
    }

    /// Constants of the law in order of first appearance.
    pub fn constants(&self) -> impl Iterator<Item = (&str, VarKind)> {
        self.symbols.iter().filter_map(|s| match s {
            Symbol::Constant { name, kind } => Some((name.as_str(), *kind)),
            _ => None,
        })
    }

    /// Index of a constant, `"{reaction}+{name}"`.
    pub fn constant_index(&self, name: &str) -> String {
        ligand_index(&self.reaction, name)
    }

    /// Instantiates the law as an expression inside `scope`.
    pub fn build(&self, reaction: &Reaction, scope: &impl RateLawScope) -> Result<Expr, AssemblyError> {
        let invalid = || AssemblyError::InvalidRateLaw {
            reaction: self.reaction.clone(),
            message: "malformed expression".into(),
        };

        let mut stack: Vec<Expr> = vec![];
        for token in &self.tokens {
            let expr = match token {
                Token::Number(n) => Expr::constant(*n),
                Token::Var(name) => {
                    if network_symbol(&self.symbols, name) {
                        scope.concentration(name)?
                    } else if name == ENZYME_SYMBOL {
                        scope.enzyme(&reaction.base_enzyme())?
                    } else {
                        let kind = classify_constant(name);
                        scope.parameter(&parameter_key(kind, &self.constant_index(name)))?
                    }
                }
                Token::Unary(op) => {
                    let a = stack.pop().ok_or_else(invalid)?;
                    match op {
                        Operation::Plus => a,
                        Operation::Minus => -a,
                        _ => return Err(invalid()),
                    }
                }
                Token::Binary(op) => {
                    let b = stack.pop().ok_or_else(invalid)?;
                    let a = stack.pop().ok_or_else(invalid)?;
                    match op {
                        Operation::Plus => a + b,
                        Operation::Minus => a - b,
                        Operation::Times => a * b,
                        Operation::Div => a / b,
                        Operation::Pow => a.powf(b),
                        _ => return Err(invalid()),
                    }
                }
                Token::Func(name, Some(1)) => {
                    let a = stack.pop().ok_or_else(invalid)?;
                    match name.as_str() {
                        "exp" => a.apply(Func::Exp),
                        "ln" => a.apply(Func::Ln),
                        "sqrt" => a.apply(Func::Sqrt),
                        _ => return Err(invalid()),
                    }
                }
                _ => return Err(invalid()),
            };
            stack.push(expr);
        }

        match (stack.pop(), stack.is_empty()) {
            (Some(expr), true) => Ok(expr),
            _ => Err(invalid()),
        }
    }
}

fn network_symbol(symbols: &[Symbol], name: &str) -> bool {
    symbols
        .iter()
        .any(|s| matches!(s, Symbol::Concentration(id) if id == name))
}
