//! Tests for mechanism expansion and the step-label and complex-name codecs.

#[cfg(test)]
mod test_mechanism {
    use ketchup::mechanism::{
        catalog::MechanismCatalog,
        error::MechanismError,
        expander::{expand_steps, Expansion},
        record::{MechanismKind, MechanismRecord, MechanismRecordBuilder, RateLawFamily},
        step::{complex_name, parse_label, EnzymeComplex, StepId, StepKind},
    };
    use pretty_assertions::assert_eq;

    fn sequential(reaction: &str, substrates: &[&str], products: &[&str]) -> MechanismRecord {
        let mut builder = MechanismRecordBuilder::default();
        builder.reaction(reaction);
        for s in substrates {
            builder.to_substrates(*s);
        }
        for p in products {
            builder.to_products(*p);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_sequential_step_count_and_order() {
        let ligands = ["S0", "S1", "S2"];
        for n in 1..=3 {
            for m in 0..=3 {
                let record = sequential("R1", &ligands[..n], &["P0", "P1", "P2"][..m]);
                let table = expand_steps(&record).unwrap();

                let ids: Vec<StepId> = table.core_steps().map(|s| s.id).collect();
                let expected: Vec<StepId> = (0..=(n + m)).map(StepId::Core).collect();
                assert_eq!(ids, expected, "n = {n}, m = {m}");

                let catalytic: Vec<usize> = table
                    .core_steps()
                    .enumerate()
                    .filter(|(_, s)| s.kind == StepKind::Catalytic)
                    .map(|(i, _)| i)
                    .collect();
                assert_eq!(catalytic, vec![n]);
            }
        }
    }

    #[test]
    fn test_labels_roundtrip() {
        let record = sequential("PGI_c_2", &["g6p_c"], &["f6p_c"]);
        let table = expand_steps(&record).unwrap();

        for step in &table.steps {
            let (reaction, id) = parse_label(&step.label()).unwrap();
            assert_eq!(reaction, "PGI_c_2");
            assert_eq!(id, step.id);
        }
    }

    #[test]
    fn test_complex_names_roundtrip() {
        let record = sequential("R1", &["A", "B"], &["P"]);
        let table = expand_steps(&record).unwrap();

        for form in table.enzyme_forms() {
            let complex = EnzymeComplex::parse(&form).unwrap();
            assert_eq!(complex.name(), form);
        }
        assert_eq!(complex_name("R1_ENZ", &["A", "B"]).unwrap(), "R1_ENZ+A+B");
        assert!(complex_name("R1_ENZ", &["A+B"]).is_err());
    }

    #[test]
    fn test_malformed_label() {
        assert_eq!(
            parse_label("R1"),
            Err(MechanismError::MalformedLabel("R1".into()))
        );
        assert!(parse_label("R1_x").is_err());
    }

    #[test]
    fn test_ping_pong_count_mismatch() {
        let mut record = sequential("R1", &["A", "B"], &["P"]);
        record.kind = MechanismKind::PingPong;

        assert_eq!(
            expand_steps(&record).unwrap_err(),
            MechanismError::PingPongMismatch {
                reaction: "R1".into(),
                substrates: 2,
                products: 1
            }
        );
    }

    #[test]
    fn test_catalog_per_family() {
        let records = vec![sequential("R1", &["A"], &["B"]), sequential("R2", &["B"], &[])];

        let elemental = MechanismCatalog::build(&records, RateLawFamily::Elemental).unwrap();
        assert_eq!(elemental.steps().count(), 3 + 2);
        assert!(elemental.contains("R2"));

        let mm = MechanismCatalog::build(&records, RateLawFamily::MichaelisMenten).unwrap();
        assert_eq!(mm.steps().count(), 0);
        assert!(matches!(mm.get("R1"), Some(Expansion::MichaelisMenten(_))));

        let duplicate = vec![sequential("R1", &["A"], &["B"]), sequential("R1", &["A"], &["B"])];
        assert_eq!(
            MechanismCatalog::build(&duplicate, RateLawFamily::Elemental).unwrap_err(),
            MechanismError::DuplicateReaction("R1".into())
        );
    }

    #[test]
    fn test_records_from_json() {
        let json = r#"[
            {"reaction": "R1", "kind": "ping-pong", "substrates": "A;B", "products": ["P", "Q"]},
            {"reaction": "R2", "substrates": ["C"], "competitive": "I"}
        ]"#;
        let records: Vec<MechanismRecord> = serde_json::from_str(json).unwrap();

        assert_eq!(records[0].kind, MechanismKind::PingPong);
        assert_eq!(records[0].substrates, vec!["A", "B"]);
        assert_eq!(records[1].kind, MechanismKind::Sequential);
        assert_eq!(records[1].competitive, vec!["I"]);

        let catalog = MechanismCatalog::build(&records, RateLawFamily::Elemental).unwrap();
        // 6 ping-pong steps, 2 steps for R2 and one competitive binding
        assert_eq!(catalog.steps().count(), 9);
    }
}
