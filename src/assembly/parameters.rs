//! The shared kinetic parameter set.
//!
//! Parameters are declared once per global model, before any experiment block, in the
//! order they are seeded. Every block references the same [`VarId`]s.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::{
    mechanism::{catalog::MechanismCatalog, expander::Expansion, record::RateLawFamily},
    model::{
        expr::{Expr, VarId},
        global::GlobalModel,
        variable::{VarKind, Variable},
    },
    network::MetabolicNetwork,
    seed::{Distribution, ParameterSeeder, SeedError},
};

use super::{
    error::AssemblyError,
    ratelaw::{check_michaelis_menten, ligand_index, parameter_key, CustomRateLaw},
};

/// Default upper bound of every kinetic parameter.
pub const DEFAULT_K_UPPER: f64 = 1e5;

/// Default seeding scale of elemental and custom constants.
pub const DEFAULT_SCALE: f64 = 5000.0;

/// Seeding scale used when none is configured.
pub fn default_scale(family: RateLawFamily, k_upper: f64) -> f64 {
    match family {
        RateLawFamily::MichaelisMenten => k_upper,
        RateLawFamily::Elemental | RateLawFamily::Custom => DEFAULT_SCALE,
    }
}

/// A declared shared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterEntry {
    pub key: String,
    pub kind: VarKind,
    pub id: VarId,
}

/// Shared kinetic parameters of a global model, in seeding order.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    entries: Vec<ParameterEntry>,
    lookup: HashMap<String, VarId>,
    laws: BTreeMap<String, CustomRateLaw>,
}

impl ParameterSet {
    /// Declares every kinetic parameter the catalog requires.
    ///
    /// # Arguments
    ///
    /// * `model` - The global model receiving the variables
    /// * `catalog` - Expanded mechanisms of the network reactions
    /// * `network` - The metabolic network
    /// * `k_upper` - Upper bound of every parameter
    ///
    /// # Returns
    ///
    /// * `Result<ParameterSet, AssemblyError>` - The declared set, or the first configuration error
    pub fn declare(
        model: &mut GlobalModel,
        catalog: &MechanismCatalog,
        network: &MetabolicNetwork,
        k_upper: f64,
    ) -> Result<Self, AssemblyError> {
        let mut set = Self::default();

        for expansion in catalog.expansions() {
            if network.reaction(expansion.reaction()).is_none() {
                return Err(AssemblyError::UnknownReaction(expansion.reaction().to_string()));
            }
        }

        match catalog.family() {
            RateLawFamily::Elemental => set.declare_elemental(model, catalog, k_upper)?,
            RateLawFamily::MichaelisMenten => {
                set.declare_michaelis_menten(model, catalog, network, k_upper)?
            }
            RateLawFamily::Custom => set.declare_custom(model, catalog, network, k_upper)?,
        }

        debug!(
            "Declared {} shared {} parameters",
            set.entries.len(),
            catalog.family()
        );

        Ok(set)
    }

    fn push(
        &mut self,
        model: &mut GlobalModel,
        kind: VarKind,
        index: &str,
        k_upper: f64,
    ) -> Result<(), AssemblyError> {
        let key = parameter_key(kind, index);
        if self.lookup.contains_key(&key) {
            return Ok(());
        }

        let id = model.add_variable(Variable::new(&key, kind).bounds(Some(0.0), Some(k_upper)))?;
        self.lookup.insert(key.clone(), id);
        self.entries.push(ParameterEntry { key, kind, id });
        Ok(())
    }

    fn declare_elemental(
        &mut self,
        model: &mut GlobalModel,
        catalog: &MechanismCatalog,
        k_upper: f64,
    ) -> Result<(), AssemblyError> {
        let labels: Vec<String> = catalog.steps().map(|s| s.label()).collect();
        for kind in [VarKind::ForwardConstant, VarKind::ReverseConstant] {
            for label in &labels {
                self.push(model, kind, label, k_upper)?;
            }
        }
        Ok(())
    }

    fn declare_michaelis_menten(
        &mut self,
        model: &mut GlobalModel,
        catalog: &MechanismCatalog,
        network: &MetabolicNetwork,
        k_upper: f64,
    ) -> Result<(), AssemblyError> {
        let mut pairs = vec![];
        for expansion in catalog.expansions() {
            if let Expansion::MichaelisMenten(ligands) = expansion {
                let reaction = network
                    .reaction(&ligands.reaction)
                    .ok_or_else(|| AssemblyError::UnknownReaction(ligands.reaction.clone()))?;
                check_michaelis_menten(ligands, reaction)?;
                pairs.push((ligands, reaction));
            }
        }

        for (_, reaction) in &pairs {
            for el in &reaction.reactants {
                let index = ligand_index(&reaction.id, &el.species_id);
                self.push(model, VarKind::KmReactant, &index, k_upper)?;
            }
        }
        for (ligands, reaction) in &pairs {
            if ligands.products.is_empty() {
                continue;
            }
            for el in &reaction.products {
                let index = ligand_index(&reaction.id, &el.species_id);
                self.push(model, VarKind::KmProduct, &index, k_upper)?;
            }
        }
        for (ligands, reaction) in &pairs {
            let r = &reaction.id;
            let suffixed = ligands
                .noncompetitive
                .iter()
                .flat_map(|i| [format!("{i}_ci"), format!("{i}_uci")])
                .chain(ligands.competitive.iter().map(|i| format!("{i}_ci")))
                .chain(ligands.uncompetitive.iter().map(|i| format!("{i}_uci")));
            for inhibitor in suffixed {
                self.push(model, VarKind::KmInhibitor, &ligand_index(r, &inhibitor), k_upper)?;
            }
        }
        for (_, reaction) in &pairs {
            self.push(model, VarKind::KcatForward, &reaction.id, k_upper)?;
        }
        for (ligands, reaction) in &pairs {
            if !ligands.products.is_empty() {
                self.push(model, VarKind::KcatReverse, &reaction.id, k_upper)?;
            }
        }
        Ok(())
    }

    fn declare_custom(
        &mut self,
        model: &mut GlobalModel,
        catalog: &MechanismCatalog,
        network: &MetabolicNetwork,
        k_upper: f64,
    ) -> Result<(), AssemblyError> {
        for expansion in catalog.expansions() {
            if let Expansion::Custom { ligands, rate_law } = expansion {
                let law = CustomRateLaw::parse(&ligands.reaction, rate_law, network)?;
                self.laws.insert(ligands.reaction.clone(), law);
            }
        }

        for kind in [
            VarKind::CustomKcat,
            VarKind::CustomKm,
            VarKind::CustomKi,
            VarKind::CustomConstant,
        ] {
            let indices: Vec<String> = self
                .laws
                .values()
                .flat_map(|law| {
                    law.constants()
                        .filter(|(_, k)| *k == kind)
                        .map(|(name, _)| law.constant_index(name))
                        .collect::<Vec<_>>()
                })
                .collect();
            for index in indices {
                self.push(model, kind, &index, k_upper)?;
            }
        }
        Ok(())
    }

    /// Draws initial values for every parameter in declaration order and writes them into
    /// the model.
    pub fn seed(
        &self,
        model: &mut GlobalModel,
        seeder: &mut ParameterSeeder,
        scale: f64,
        distribution: Distribution,
    ) -> Result<(), SeedError> {
        let values = seeder.draw(self.entries.iter().map(|e| e.key.as_str()), scale, distribution)?;
        for (entry, (_, value)) in self.entries.iter().zip(values) {
            let var = &mut model.variables_mut()[entry.id.0];
            var.value = var.clamp(value);
        }
        Ok(())
    }

    pub fn entries(&self) -> &[ParameterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<VarId> {
        self.lookup.get(key).copied()
    }

    /// Parameter by key as an expression.
    pub fn expr(&self, key: &str) -> Result<Expr, AssemblyError> {
        self.get(key)
            .map(Expr::var)
            .ok_or_else(|| AssemblyError::UnknownParameter(key.to_string()))
    }

    /// Parsed custom rate law of a reaction.
    pub fn custom_law(&self, reaction: &str) -> Option<&CustomRateLaw> {
        self.laws.get(reaction)
    }
}
