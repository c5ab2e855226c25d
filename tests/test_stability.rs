//! Tests for the post-solve stability analysis.

#[cfg(test)]
mod test_stability {
    use std::collections::BTreeMap;

    use approx::assert_relative_eq;
    use ketchup::{
        mechanism::record::{MechanismRecord, MechanismRecordBuilder},
        model::{constraint::ConstraintGroup, variable::VarKind},
        prelude::*,
        stability::{classify, eigenvalues},
    };
    use nalgebra::{Complex, DMatrix};
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

    fn static_model(family: RateLawFamily) -> GlobalModel {
        let network = network();
        let mechanisms = mechanisms();
        let datasets = [Dataset::Static(StaticDataset {
            id: "WT".into(),
            fluxes: BTreeMap::from([("R1".to_string(), Measurement::new(2.0, 0.1))]),
            perturbations: BTreeMap::new(),
        })];
        let options = KetchupOptionsBuilder::default()
            .seed(11u64)
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
            .model
    }

    #[test]
    fn test_classify_hand_built_matrices() {
        let diagonal = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![1.0, -2.0, 0.0]));
        let eigs = eigenvalues(&diagonal).unwrap();
        let counts = classify(&eigs, DEFAULT_THRESHOLD);
        assert_eq!((counts.positive, counts.negative, counts.zero), (1, 1, 1));

        // Pure rotation: eigenvalues +-i have zero real part
        let rotation = DMatrix::from_row_slice(2, 2, &[0.0, -1.0, 1.0, 0.0]);
        let eigs = eigenvalues(&rotation).unwrap();
        let counts = classify(&eigs, DEFAULT_THRESHOLD);
        assert_eq!(counts.zero, 2);
        let mut imaginary: Vec<f64> = eigs.iter().map(|c: &Complex<f64>| c.im).collect();
        imaginary.sort_by(|a, b| a.total_cmp(b));
        assert_relative_eq!(imaginary[0], -1.0, epsilon = 1e-10);
        assert_relative_eq!(imaginary[1], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_elemental_block_is_analysed() {
        let mut model = static_model(RateLawFamily::Elemental);
        model.status = Some(SolveStatus::Optimal);

        let report = StabilityAnalyzer::default().analyze(&model).unwrap();
        assert_eq!(report.threshold, DEFAULT_THRESHOLD);
        assert_eq!(report.blocks.len(), 1);

        let block = &report.blocks[0];
        assert_eq!(block.block, "WT");
        assert_eq!(block.time, None);
        // Three forward and three reverse rows against three kf and three kr columns
        assert_eq!(block.eigenvalues.len(), 6);
        let counts = block.counts;
        assert_eq!(counts.positive + counts.negative + counts.zero, 6);
        assert_eq!(report.stable, block.is_stable());
    }

    #[test]
    fn test_skipped_unless_optimal_elemental() {
        let mut model = static_model(RateLawFamily::Elemental);
        assert!(StabilityAnalyzer::default().analyze(&model).is_none());

        model.status = Some(SolveStatus::Infeasible);
        assert!(StabilityAnalyzer::default().analyze(&model).is_none());

        let mut mm = static_model(RateLawFamily::MichaelisMenten);
        mm.status = Some(SolveStatus::Optimal);
        assert!(StabilityAnalyzer::default().analyze(&mm).is_none());
    }

    #[test]
    fn test_dynamic_blocks_are_analysed_per_node() {
        let network = network();
        let mechanisms = mechanisms();
        let datasets = [Dataset::Dynamic(DynamicDataset {
            id: "T1".into(),
            time: vec![1.0],
            observables: BTreeMap::from([("B".to_string(), vec![Some(0.4)])]),
            ..Default::default()
        })];
        let options = KetchupOptionsBuilder::default()
            .seed(2u64)
            .data_type(DataKind::Dynamic)
            .build()
            .unwrap();
        let mut model = ExperimentComposer::builder()
            .network(&network)
            .mechanisms(&mechanisms)
            .datasets(&datasets)
            .options(options)
            .build()
            .compose()
            .unwrap()
            .model;
        model.status = Some(SolveStatus::Optimal);

        let report = StabilityAnalyzer::new(0.5).analyze(&model).unwrap();
        let times: Vec<Option<f64>> = report.blocks.iter().map(|b| b.time).collect();
        assert_eq!(times, vec![Some(0.0), Some(0.5), Some(1.0)]);
        assert!(report.blocks.iter().all(|b| b.eigenvalues.len() == 6));
        assert_eq!(report.threshold, 0.5);
    }

    #[test]
    fn test_modifier_steps_enter_the_analysis() {
        // ARRANGE
        let metabolites = ["A", "B", "J"]
            .iter()
            .map(|id| MetaboliteBuilder::default().id(*id).boundary(true).build().unwrap())
            .collect();
        let network = MetabolicNetwork::new(metabolites, network().reactions).unwrap();
        let mechanisms = vec![MechanismRecordBuilder::default()
            .reaction("R1")
            .to_substrates("A")
            .to_products("B")
            .to_uncompetitive("J")
            .build()
            .unwrap()];
        let datasets = [Dataset::Static(StaticDataset {
            id: "WT".into(),
            fluxes: BTreeMap::from([("R1".to_string(), Measurement::new(2.0, 0.1))]),
            perturbations: BTreeMap::new(),
        })];
        let options = KetchupOptionsBuilder::default().seed(5u64).build().unwrap();
        let mut model = ExperimentComposer::builder()
            .network(&network)
            .mechanisms(&mechanisms)
            .datasets(&datasets)
            .options(options)
            .build()
            .compose()
            .unwrap()
            .model;
        model.status = Some(SolveStatus::Optimal);

        // ACT
        let report = StabilityAnalyzer::default().analyze(&model).unwrap();

        // ASSERT
        // Four steps, each with a forward and a reverse row and constant
        assert_eq!(report.blocks[0].eigenvalues.len(), 8);

        let block = model.block("WT").unwrap();
        let rows = block.rows(&model, ConstraintGroup::ForwardRate, None);
        let inhibition = rows
            .iter()
            .copied()
            .find(|&r| model.constraints()[r].name == "WT.elemental_vf[R1_i0]")
            .unwrap();
        let kf = model.id("kf[R1_i0]").unwrap();
        let x = model.point();
        let jacobian = model.jacobian_block(&[inhibition], &[kf], &x);
        let expected = -x[model.id("WT.e[R1_ENZ+A]").unwrap().0] * x[model.id("WT.c[J]").unwrap().0];
        assert_relative_eq!(jacobian[(0, 0)], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        use finitediff::FiniteDiff;
        use ndarray::Array1;

        let model = static_model(RateLawFamily::Elemental);
        let block = model.block("WT").unwrap();
        let rows: Vec<usize> = block
            .rows(&model, ConstraintGroup::ForwardRate, None)
            .into_iter()
            .chain(block.rows(&model, ConstraintGroup::ReverseRate, None))
            .collect();
        let cols = model.parameters().to_vec();
        assert!(cols
            .iter()
            .all(|id| matches!(model.variables()[id.0].kind, VarKind::ForwardConstant | VarKind::ReverseConstant)));

        let x = model.point();
        let analytic = model.jacobian_block(&rows, &cols, &x);

        let params: Array1<f64> = cols.iter().map(|id| x[id.0]).collect();
        for (i, &row) in rows.iter().enumerate() {
            let body = &model.constraints()[row].body;
            let numeric = params.central_diff(&|p: &Array1<f64>| {
                let mut point = x.clone();
                for (id, v) in cols.iter().zip(p.iter()) {
                    point[id.0] = *v;
                }
                body.eval(&point)
            });
            for j in 0..cols.len() {
                assert_relative_eq!(analytic[(i, j)], numeric[j], epsilon = 1e-5);
            }
        }
    }
}
