//! Tests for the composition of experiments into a global model.

#[cfg(test)]
mod test_compose {
    use std::collections::BTreeMap;

    use approx::assert_relative_eq;
    use ketchup::{
        assembly::{block::block_key, conservation::BASELINE_TARGET},
        mechanism::record::{MechanismRecord, MechanismRecordBuilder, RateLawFamily},
        model::{constraint::ConstraintGroup, variable::VarKind},
        prelude::*,
    };
    use pretty_assertions::assert_eq;

    fn network() -> MetabolicNetwork {
        let metabolites = ["A", "B"]
            .iter()
            .map(|id| MetaboliteBuilder::default().id(*id).boundary(true).build().unwrap())
            .collect();
        let reactions = vec![ReactionBuilder::default()
            .id("R1")
            .to_reactants(ReactionElement::new("A", 1.0))
            .to_products(ReactionElement::new("B", 1.0))
            .build()
            .unwrap()];
        MetabolicNetwork::new(metabolites, reactions).unwrap()
    }

    fn mechanisms() -> Vec<MechanismRecord> {
        vec![MechanismRecordBuilder::default()
            .reaction("R1")
            .to_substrates("A")
            .to_products("B")
            .build()
            .unwrap()]
    }

    fn flux_dataset(id: &str, flux: f64, sd: f64) -> Dataset {
        Dataset::Static(StaticDataset {
            id: id.into(),
            fluxes: BTreeMap::from([("R1".to_string(), Measurement::new(flux, sd))]),
            perturbations: BTreeMap::new(),
        })
    }

    fn options() -> KetchupOptions {
        KetchupOptionsBuilder::default().seed(0u64).build().unwrap()
    }

    fn compose(datasets: &[Dataset], options: KetchupOptions) -> Result<Composition, ComposeError> {
        let network = network();
        let mechanisms = mechanisms();
        ExperimentComposer::builder()
            .network(&network)
            .mechanisms(&mechanisms)
            .datasets(datasets)
            .options(options)
            .build()
            .compose()
    }

    #[test]
    fn test_parameters_precede_blocks() {
        // ARRANGE
        let datasets = [flux_dataset("WT", 2.0, 0.1)];

        // ACT
        let composition = compose(&datasets, options()).unwrap();

        // ASSERT
        let keys: Vec<&str> = composition.model.variables()[..6]
            .iter()
            .map(|v| v.key.as_str())
            .collect();
        assert_eq!(
            keys,
            vec!["kf[R1_0]", "kf[R1_1]", "kf[R1_2]", "kr[R1_0]", "kr[R1_1]", "kr[R1_2]"]
        );
        for var in &composition.model.variables()[..6] {
            assert!(var.value >= 0.0 && var.value <= 1e5);
        }
        assert_eq!(composition.basis, "WT");
        assert_eq!(composition.seed, 0);
    }

    #[test]
    fn test_basis_fluxes_are_fixed() {
        let datasets = [flux_dataset("WT", 2.0, 0.1)];
        let composition = compose(&datasets, options()).unwrap();
        let model = &composition.model;

        let rate = model
            .variable(&block_key("WT", VarKind::Rate, None, "R1"))
            .unwrap();
        assert!(rate.fixed);
        assert_eq!(rate.value, 2.0);

        let references = model
            .constraints()
            .iter()
            .filter(|c| c.group == ConstraintGroup::ReferenceConcentration)
            .count();
        assert_eq!(references, 2);

        // The basis residual vanishes at the fixed flux
        let error = model.variable("WT.error").unwrap();
        assert_eq!(error.value, 0.0);
        assert!(model.constraints().iter().any(|c| c.name == "WT.compute_error"));
    }

    #[test]
    fn test_knockout_does_not_touch_shared_table() {
        let datasets = [flux_dataset("WT", 2.0, 0.1), flux_dataset("R1", 0.0, 1.0)];
        let composition = compose(&datasets, options()).unwrap();

        let knockout = composition.model.block("R1").unwrap();
        assert_eq!(knockout.enzyme_targets, vec![("R1".to_string(), 0.0)]);

        let wild_type = composition.model.block("WT").unwrap();
        assert_eq!(
            wild_type.enzyme_targets,
            vec![("R1".to_string(), BASELINE_TARGET)]
        );
        assert_eq!(
            composition.conservation.group("R1").unwrap().target,
            BASELINE_TARGET
        );
    }

    #[test]
    fn test_knockout_inference_can_be_disabled() {
        let datasets = [flux_dataset("WT", 2.0, 0.1), flux_dataset("R1", 0.0, 1.0)];
        let options = KetchupOptionsBuilder::default()
            .seed(0u64)
            .infer_knockouts(false)
            .build()
            .unwrap();
        let composition = compose(&datasets, options).unwrap();
        let block = composition.model.block("R1").unwrap();
        assert_eq!(block.enzyme_targets, vec![("R1".to_string(), 1.0)]);
    }

    #[test]
    fn test_explicit_perturbation_level() {
        let mut overexpressed = StaticDataset {
            id: "OE".into(),
            fluxes: BTreeMap::from([("R1".to_string(), Measurement::new(3.0, 0.5))]),
            perturbations: BTreeMap::new(),
        };
        overexpressed
            .perturbations
            .insert("R1".into(), Perturbation::Level(2.0));
        let datasets = [flux_dataset("WT", 2.0, 0.1), Dataset::Static(overexpressed)];

        let composition = compose(&datasets, options()).unwrap();
        let model = &composition.model;
        let block = model.block("OE").unwrap();
        assert_eq!(block.enzyme_targets, vec![("R1".to_string(), 2.0)]);

        let free = model.variable("OE.e[R1_ENZ]").unwrap();
        assert_eq!(free.upper, Some(2.0));
        assert_relative_eq!(free.value, 2.0 / 3.0);
    }

    #[test]
    fn test_unknown_perturbation_fails_before_assembly() {
        let mut dataset = StaticDataset {
            id: "KO".into(),
            ..Default::default()
        };
        dataset
            .perturbations
            .insert("R9".into(), Perturbation::Knockout);
        let datasets = [flux_dataset("WT", 2.0, 0.1), Dataset::Static(dataset)];

        let err = compose(&datasets, options()).unwrap_err();
        assert_eq!(
            err,
            ComposeError::UnknownPerturbation {
                dataset: "KO".into(),
                reaction: "R9".into()
            }
        );
    }

    #[test]
    fn test_configuration_errors() {
        let datasets = [flux_dataset("WT", 2.0, 0.1)];

        let unseeded = compose(&datasets, KetchupOptions::default()).unwrap_err();
        assert_eq!(unseeded, ComposeError::MissingSeed);

        let missing_basis = KetchupOptionsBuilder::default()
            .seed(0u64)
            .basis_id("REF")
            .build()
            .unwrap();
        assert_eq!(
            compose(&datasets, missing_basis).unwrap_err(),
            ComposeError::MissingBasis("REF".into())
        );

        let dynamic = KetchupOptionsBuilder::default()
            .seed(0u64)
            .data_type(DataKind::Dynamic)
            .build()
            .unwrap();
        assert!(matches!(
            compose(&datasets, dynamic).unwrap_err(),
            ComposeError::DataKindMismatch { .. }
        ));

        let unknown_reaction = [flux_dataset("WT", 2.0, 0.1), {
            let mut d = StaticDataset {
                id: "X".into(),
                ..Default::default()
            };
            d.fluxes.insert("R7".into(), Measurement::new(1.0, 1.0));
            Dataset::Static(d)
        }];
        assert_eq!(
            compose(&unknown_reaction, options()).unwrap_err(),
            ComposeError::UnknownDatasetReaction {
                dataset: "X".into(),
                reaction: "R7".into()
            }
        );
    }

    #[test]
    fn test_first_dataset_is_basis_without_wild_type() {
        let datasets = [flux_dataset("REF", 1.0, 0.1), flux_dataset("MUT", 0.5, 0.1)];
        let composition = compose(&datasets, options()).unwrap();
        assert_eq!(composition.basis, "REF");
        assert!(!composition.model.variable("MUT.rate[R1]").unwrap().fixed);
    }

    #[test]
    fn test_seed_reproducibility() {
        let datasets = [flux_dataset("WT", 2.0, 0.1)];
        let first = compose(&datasets, options()).unwrap();
        let second = compose(&datasets, options()).unwrap();
        assert_eq!(first.model.point(), second.model.point());
    }

    #[test]
    fn test_report_of_unsolved_model() {
        let datasets = [flux_dataset("WT", 2.0, 0.1), flux_dataset("R1", 0.0, 1.0)];
        let model = compose(&datasets, options()).unwrap().model;

        let report = SolutionReport::from_model(&model, None).with_seed(0);

        assert_eq!(report.status, "unsolved");
        assert_eq!(report.seed, Some(0));
        assert_eq!(report.parameters.len(), 6);
        assert!(report.parameters.contains_key("kf[R1_0]"));

        let ids: Vec<&str> = report.blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["WT", "R1"]);
        assert_eq!(report.blocks[0].rates.get("WT.rate[R1]"), Some(&2.0));
        assert_eq!(report.blocks[0].error, 0.0);
        assert_relative_eq!(report.total_error(), report.blocks[1].error);
    }

    #[cfg(feature = "optimization")]
    #[test]
    fn test_solve_keeps_basis_rate() {
        // ARRANGE
        let datasets = [flux_dataset("WT", 2.0, 0.1)];
        let mut model = compose(&datasets, options()).unwrap().model;

        // ACT
        let mut backend = PenaltyLbfgs::default();
        let status = solve(&mut model, &mut backend);

        // ASSERT
        assert!(!matches!(status, SolveStatus::Failed(_)), "{status}");
        assert_eq!(model.value("WT.rate[R1]"), Some(2.0));
        assert_relative_eq!(model.objective_value(), 0.0, epsilon = 1e-6);
        assert!(model.solve_time.is_some());
        assert_eq!(model.status, Some(status));
    }

    #[test]
    fn test_conservation_table_survives_failed_block() {
        use ketchup::assembly::{
            block::BlockAssembler,
            conservation::{EnzymeConservation, EnzymeOverrides},
            parameters::ParameterSet,
        };

        let network = network();
        let catalog =
            MechanismCatalog::build(&mechanisms(), RateLawFamily::Elemental).unwrap();
        let conservation = EnzymeConservation::from_catalog(&catalog);
        let pristine = conservation.clone();

        let mut model = GlobalModel::new("test", RateLawFamily::Elemental);
        let parameters = ParameterSet::declare(&mut model, &catalog, &network, 1e5).unwrap();
        let overrides = EnzymeOverrides::new().knockout("R1");

        let bundle = BlockAssembler::builder()
            .index(0)
            .prefix("KO")
            .network(&network)
            .catalog(&catalog)
            .parameters(&parameters)
            .conservation(&conservation)
            .overrides(&overrides)
            .build()
            .assemble(model.variables().len() + 1)
            .unwrap();
        assert_eq!(bundle.enzyme_targets, vec![("R1".to_string(), 0.0)]);

        // Wrong offset, the bundle is rejected
        assert!(bundle.attach(&mut model).is_err());
        assert_eq!(conservation, pristine);
        assert_eq!(conservation.target("R1", &EnzymeOverrides::new()), Some(1.0));
    }

    #[cfg(feature = "optimization")]
    #[test]
    fn test_knockout_forces_enzyme_to_zero() {
        let datasets = [flux_dataset("WT", 2.0, 0.1), flux_dataset("R1", 0.0, 1.0)];
        let mut model = compose(&datasets, options()).unwrap().model;

        let status = solve(&mut model, &mut PenaltyLbfgs::default());
        assert!(!matches!(status, SolveStatus::Failed(_)), "{status}");

        let block = model.block("R1").unwrap().clone();
        let fractions: Vec<f64> = model.variables()[block.variables.clone()]
            .iter()
            .filter(|v| v.kind == VarKind::EnzymeFraction)
            .map(|v| v.value)
            .collect();
        assert_eq!(fractions.len(), 3);
        for value in fractions {
            assert!(value >= 0.0);
            assert_relative_eq!(value, 0.0, epsilon = 1e-3);
        }
    }

    fn inhibited_network() -> MetabolicNetwork {
        let metabolites = ["A", "B", "J", "K"]
            .iter()
            .map(|id| MetaboliteBuilder::default().id(*id).boundary(true).build().unwrap())
            .collect();
        let reactions = vec![ReactionBuilder::default()
            .id("R1")
            .to_reactants(ReactionElement::new("A", 1.0))
            .to_products(ReactionElement::new("B", 1.0))
            .build()
            .unwrap()];
        MetabolicNetwork::new(metabolites, reactions).unwrap()
    }

    fn compose_inhibited(family: RateLawFamily) -> Composition {
        let network = inhibited_network();
        let mechanisms = vec![MechanismRecordBuilder::default()
            .reaction("R1")
            .to_substrates("A")
            .to_products("B")
            .to_uncompetitive("J")
            .to_noncompetitive("K")
            .build()
            .unwrap()];
        let datasets = [flux_dataset("WT", 2.0, 0.1)];
        let options = KetchupOptionsBuilder::default()
            .seed(0u64)
            .mechanism_type(family)
            .build()
            .unwrap();
        ExperimentComposer::builder()
            .network(&network)
            .mechanisms(&mechanisms)
            .datasets(&datasets)
            .options(options)
            .build()
            .compose()
            .unwrap()
    }

    #[test]
    fn test_elemental_inhibitors_are_composed() {
        // ARRANGE & ACT
        let composition = compose_inhibited(RateLawFamily::Elemental);
        let model = &composition.model;

        // ASSERT
        assert_eq!(composition.parameters.len(), 12);
        assert!(composition.parameters.get("kf[R1_i2]").is_some());
        assert_eq!(
            composition.conservation.group("R1").unwrap().members,
            vec![
                "R1_ENZ",
                "R1_ENZ+A",
                "R1_ENZ+B",
                "R1_ENZ+A+J_ui",
                "R1_ENZ+K_ci",
                "R1_ENZ+A+K_ui"
            ]
        );
        assert!(model.variable("WT.e[R1_ENZ+A+J_ui]").is_some());

        let block = model.block("WT").unwrap();
        let net: Vec<&str> = model.constraints()[block.constraints.clone()]
            .iter()
            .filter(|c| c.group == ConstraintGroup::NetBalance)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(net.len(), 6);
        assert!(net.contains(&"WT.es_net_balance[R1_i0]"));
        model.validate().unwrap();
    }

    #[test]
    fn test_michaelis_menten_inhibitors_are_composed() {
        let composition = compose_inhibited(RateLawFamily::MichaelisMenten);
        let model = &composition.model;

        let keys: Vec<&str> = composition
            .parameters
            .entries()
            .iter()
            .map(|e| e.key.as_str())
            .collect();
        assert_eq!(
            keys,
            vec![
                "KM_reactants[R1+A]",
                "KM_products[R1+B]",
                "KM_inhibitors[R1+K_ci]",
                "KM_inhibitors[R1+K_uci]",
                "KM_inhibitors[R1+J_uci]",
                "Kcat_f[R1]",
                "Kcat_r[R1]"
            ]
        );

        let mut x = model.point();
        for (key, value) in [
            ("Kcat_f[R1]", 10.0),
            ("Kcat_r[R1]", 2.0),
            ("KM_reactants[R1+A]", 4.0),
            ("KM_products[R1+B]", 2.0),
            ("KM_inhibitors[R1+J_uci]", 0.5),
            ("KM_inhibitors[R1+K_uci]", 4.0),
            ("KM_inhibitors[R1+K_ci]", 1.0),
            ("WT.c[A]", 2.0),
            ("WT.c[B]", 1.0),
            ("WT.c[J]", 1.0),
            ("WT.c[K]", 2.0),
            ("WT.e[R1_ENZ]", 0.5),
        ] {
            x[model.id(key).unwrap().0] = value;
        }

        // rate = (5 - 1) * 0.5 / (0.5 * (1 + 0.5 + 2) + 2 + 0.5)
        let law = model
            .constraints()
            .iter()
            .find(|c| c.group == ConstraintGroup::RateLaw)
            .unwrap();
        assert_eq!(law.name, "WT.rate_law[R1]");
        assert_relative_eq!(law.residual(&x), 2.0 - 2.0 / 4.25, epsilon = 1e-12);
    }

    #[cfg(feature = "optimization")]
    #[test]
    fn test_solve_with_inhibitors_balances_modifier_steps() {
        let mut model = compose_inhibited(RateLawFamily::Elemental).model;

        let status = solve(&mut model, &mut PenaltyLbfgs::default());
        assert!(!matches!(status, SolveStatus::Failed(_)), "{status}");
        assert_eq!(model.value("WT.rate[R1]"), Some(2.0));

        for step in ["R1_i0", "R1_i1", "R1_i2"] {
            let vf = model.value(&format!("WT.vf[{step}]")).unwrap();
            let vr = model.value(&format!("WT.vr[{step}]")).unwrap();
            assert_relative_eq!(vf, vr, epsilon = 1e-3);
        }

        model.status = Some(SolveStatus::Optimal);
        let report = StabilityAnalyzer::default().analyze(&model).unwrap();
        assert_eq!(report.blocks[0].eigenvalues.len(), 12);
    }

    #[test]
    fn test_backend_failure_is_reported() {
        struct Failing;

        impl NlpBackend for Failing {
            fn declare_variables(&mut self, _: &[ketchup::model::variable::Variable]) {}
            fn declare_constraints(&mut self, _: &[ketchup::model::constraint::Constraint]) {}
            fn minimize(&mut self, _: &ketchup::model::expr::Expr) {}
            fn solve(&mut self) -> Result<SolverOutput, ketchup::solver::error::SolverError> {
                panic!("backend crashed")
            }
        }

        let datasets = [flux_dataset("WT", 2.0, 0.1)];
        let mut model = compose(&datasets, options()).unwrap().model;
        let before = model.point();

        let status = solve(&mut model, &mut Failing);

        assert_eq!(status, SolveStatus::Failed("backend crashed".into()));
        assert_eq!(model.point(), before);
        assert!(StabilityAnalyzer::default().analyze(&model).is_none());
    }
}
